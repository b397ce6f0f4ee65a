use std::sync::Arc;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::claims::Claims;
use super::dto::{
    LoginResponse, PublicUser, RefreshResponse, ResendCodeResponse, SetRoleResponse,
    SignUpResponse, VerifyEmailResponse, VerifyTokenResponse,
};
use super::jwt::JwtKeys;
use super::password::{hash_password, verify_password};
use super::repo::{CodeStore, UserStore};
use super::repo_types::{NewUser, Role, User, VerificationCode};
use crate::error::{AppError, AppResult};
use crate::mail::{verification_email, Mailer};

const EMAIL_TAKEN: &str = "Email already in use";
const USERNAME_TAKEN: &str = "Username already taken";
const INVALID_CREDENTIALS: &str = "Invalid credentials";
const EMAIL_NOT_VERIFIED: &str = "Email not verified. Please verify your email to continue.";
const INVALID_CODE: &str = "Invalid or expired verification code";
const INVALID_REFRESH: &str = "Invalid or expired refresh token";
const INVALID_ACCESS: &str = "Invalid or expired access token";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Six decimal digits, leading digit non-zero.
pub(crate) fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

/// Sign-up, verification, sign-in and token lifecycle.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    codes: Arc<dyn CodeStore>,
    keys: JwtKeys,
    mailer: Arc<dyn Mailer>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        codes: Arc<dyn CodeStore>,
        keys: JwtKeys,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            users,
            codes,
            keys,
            mailer,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn sign_up(
        &self,
        email: &str,
        username: &str,
        password: &str,
        role: Option<&str>,
    ) -> AppResult<SignUpResponse> {
        let email = email.trim().to_lowercase();
        let username = username.trim();

        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }
        if username.is_empty() {
            return Err(AppError::validation("Username is required"));
        }
        if password.is_empty() {
            return Err(AppError::validation("Password is required"));
        }

        let by_email = self.users.find_by_email(&email).await?;
        let by_username = self.users.find_by_username(username).await?;
        if let Some(existing) = by_email.as_ref().filter(|u| u.is_email_verified) {
            warn!(user_id = %existing.id, "sign-up collides with verified email");
            return Err(AppError::conflict(EMAIL_TAKEN));
        }
        if let Some(existing) = by_username.as_ref().filter(|u| u.is_email_verified) {
            warn!(user_id = %existing.id, "sign-up collides with verified username");
            return Err(AppError::conflict(USERNAME_TAKEN));
        }

        // unverified owners of the email or username are abandoned slots
        let mut reclaim: Vec<Uuid> = [by_email, by_username]
            .into_iter()
            .flatten()
            .map(|u| u.id)
            .collect();
        reclaim.dedup();

        let password_hash = hash_password(password)?;
        let user = self
            .users
            .create(
                NewUser {
                    email,
                    username: username.to_string(),
                    password_hash,
                    role: Role::for_signup(role),
                },
                &reclaim,
            )
            .await?
            .ok_or_else(|| AppError::conflict(USERNAME_TAKEN))?;
        if !reclaim.is_empty() {
            info!(reclaimed = ?reclaim, "reclaimed unverified accounts");
        }

        self.send_verification(&user).await?;

        info!(user_id = %user.id, "user registered");
        Ok(SignUpResponse {
            success: true,
            message: "User registered successfully. Please verify your email to continue.".into(),
            user: PublicUser::from(&user),
        })
    }

    /// Persists a fresh code and emails it. Delivery failure is logged, not returned.
    /// Issues a code for an account whose email was just changed.
    #[instrument(skip(self))]
    pub async fn reverify(&self, user_id: Uuid) -> AppResult<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        self.send_verification(&user).await
    }

    async fn send_verification(&self, user: &User) -> AppResult<()> {
        let code = VerificationCode::issue(user.id, generate_code(), OffsetDateTime::now_utc());
        self.codes.insert(&code).await?;

        if let Err(e) = self
            .mailer
            .send_mail(verification_email(&user.email, &code.code))
            .await
        {
            error!(error = %e, user_id = %user.id, "verification email failed");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn resend_verification(&self, email: &str) -> AppResult<ResendCodeResponse> {
        let email = email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        if user.is_email_verified {
            return Err(AppError::conflict("Email already verified"));
        }

        self.send_verification(&user).await?;
        Ok(ResendCodeResponse {
            success: true,
            message: "Verification code sent.".into(),
        })
    }

    #[instrument(skip(self, code))]
    pub async fn verify_email(&self, email: &str, code: &str) -> AppResult<VerifyEmailResponse> {
        let email = email.trim().to_lowercase();
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let now = OffsetDateTime::now_utc();
        let codes = self.codes.list_for_user(user.id).await?;
        let valid = codes
            .iter()
            .find(|c| c.redeemable(code, now))
            .ok_or_else(|| AppError::validation(INVALID_CODE))?;

        // one-time use: losing the delete race means someone else redeemed it
        if !self.codes.delete(valid.id).await? {
            return Err(AppError::validation(INVALID_CODE));
        }
        self.users.mark_email_verified(user.id).await?;

        let verified = User {
            is_email_verified: true,
            ..user
        };
        let tokens = self.keys.sign_pair(&verified)?;

        info!(user_id = %verified.id, "email verified");
        Ok(VerifyEmailResponse {
            success: true,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            message: "Email verified successfully.".into(),
        })
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let user = match self.users.find_by_username(username.trim()).await? {
            Some(u) => u,
            None => {
                warn!("login unknown username");
                return Err(AppError::authentication(INVALID_CREDENTIALS));
            }
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::authentication(INVALID_CREDENTIALS));
        }

        // only checked once the password is known to be right
        if !user.is_email_verified {
            return Err(AppError::authentication(EMAIL_NOT_VERIFIED));
        }

        let tokens = self.keys.sign_pair(&user)?;
        info!(user_id = %user.id, "user logged in");
        Ok(LoginResponse {
            success: true,
            message: "Login successful".into(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: PublicUser::from(&user),
        })
    }

    /// Issues a new access token; the refresh token itself is not rotated.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<RefreshResponse> {
        let user = self
            .resolve_subject(self.keys.verify_refresh(refresh_token))
            .await
            .ok_or_else(|| AppError::validation(INVALID_REFRESH))?;

        let access_token = self.keys.sign_access(&user)?;
        Ok(RefreshResponse { access_token })
    }

    #[instrument(skip_all)]
    pub async fn verify_token(&self, access_token: &str) -> AppResult<VerifyTokenResponse> {
        self.resolve_subject(self.keys.verify_access(access_token))
            .await
            .ok_or_else(|| AppError::validation(INVALID_ACCESS))?;
        Ok(VerifyTokenResponse { valid: true })
    }

    /// Folds every failure (signature, expiry, kind, missing user, store error) into `None`.
    async fn resolve_subject(&self, verified: anyhow::Result<Claims>) -> Option<User> {
        let claims = verified.ok()?;
        match self.users.find_by_id(claims.sub).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "token subject lookup failed");
                None
            }
        }
    }

    /// Caller-side authorization is the gate's and the handler's job.
    #[instrument(skip(self))]
    pub async fn set_role(&self, user_id: Uuid, role: &str) -> AppResult<SetRoleResponse> {
        let role =
            Role::parse(role).ok_or_else(|| AppError::validation(format!("Invalid role: {role}")))?;

        let user = self
            .users
            .set_role(user_id, role)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User with ID {user_id} not found")))?;

        let tokens = self.keys.sign_pair(&user)?;
        info!(user_id = %user.id, role = %user.role, "role updated");
        Ok(SetRoleResponse {
            id: user.id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            username: user.username,
            email: user.email,
            role: user.role,
        })
    }
}
