use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    claims::Claims,
    dto::{
        LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, ResendCodeRequest,
        ResendCodeResponse, SetRoleRequest, SetRoleResponse, SignUpRequest, SignUpResponse,
        VerifyEmailRequest, VerifyEmailResponse, VerifyTokenRequest, VerifyTokenResponse,
    },
    jwt::JwtKeys,
    repo_types::Role,
};
use crate::{
    access::{guard, CurrentUser, RouteAccess},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes(keys: &JwtKeys) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/signup", post(sign_up))
        .route("/auth/login", post(login))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/resend-code", post(resend_code))
        .route("/auth/refresh", post(refresh))
        .route("/auth/verify", post(verify));

    let authenticated = Router::new()
        .route("/auth/set-role", patch(set_role))
        .route("/auth/profile", get(current_user));

    Router::new()
        .merge(guard(public, keys, RouteAccess::Public))
        .merge(guard(authenticated, keys, RouteAccess::Authenticated))
}

/// Non-admins may only change their own role, and never to admin.
fn check_role_change(caller: &Claims, target: Uuid, requested: &str) -> AppResult<()> {
    if caller.role == Role::Admin {
        return Ok(());
    }
    if target != caller.sub || requested == Role::Admin.as_str() {
        warn!(user_id = %caller.sub, target = %target, "role change denied");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::validation(format!("{name} is required")))
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<SignUpResponse>)> {
    let res = state
        .auth
        .sign_up(
            &payload.email,
            &payload.username,
            &payload.password,
            payload.role.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    Ok(Json(
        state.auth.sign_in(&payload.username, &payload.password).await?,
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> AppResult<Json<VerifyEmailResponse>> {
    Ok(Json(
        state
            .auth
            .verify_email(&payload.email, payload.code.trim())
            .await?,
    ))
}

#[instrument(skip(state, payload))]
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<ResendCodeRequest>,
) -> AppResult<Json<ResendCodeResponse>> {
    Ok(Json(state.auth.resend_verification(&payload.email).await?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let token = required(payload.refresh_token, "Refresh token")?;
    Ok(Json(state.auth.refresh_token(&token).await?))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    Json(payload): Json<VerifyTokenRequest>,
) -> AppResult<Json<VerifyTokenResponse>> {
    let token = required(payload.access_token, "Access token")?;
    Ok(Json(state.auth.verify_token(&token).await?))
}

#[instrument(skip(state, payload), fields(user_id = %user.sub))]
pub async fn set_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<SetRoleRequest>,
) -> AppResult<Json<SetRoleResponse>> {
    let target = payload.user_id.unwrap_or(user.sub);
    check_role_change(&user, target, &payload.role)?;
    Ok(Json(state.auth.set_role(target, &payload.role).await?))
}

#[instrument(skip_all, fields(user_id = %user.sub))]
pub async fn current_user(user: CurrentUser) -> Json<Claims> {
    Json(user.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{caller, sample_user, test_keys};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[test]
    fn non_admin_can_only_change_own_role_to_user() {
        let ann = caller(&sample_user("ann", Role::User, true));
        assert!(check_role_change(&ann, ann.sub, "user").is_ok());
        assert!(matches!(
            check_role_change(&ann, ann.sub, "admin"),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            check_role_change(&ann, Uuid::new_v4(), "user"),
            Err(AppError::Forbidden)
        ));

        let root = caller(&sample_user("root", Role::Admin, true));
        assert!(check_role_change(&root, Uuid::new_v4(), "admin").is_ok());
    }

    #[test]
    fn missing_tokens_are_validation_errors() {
        assert!(matches!(
            required(None, "Refresh token"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            required(Some("  ".into()), "Access token"),
            Err(AppError::Validation(_))
        ));
        assert_eq!(required(Some("abc".into()), "x").unwrap(), "abc");
    }

    fn app() -> Router {
        routes(&test_keys()).with_state(AppState::fake())
    }

    async fn post_json(uri: &str, body: &str) -> StatusCode {
        app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn refresh_without_token_is_bad_request() {
        assert_eq!(post_json("/auth/refresh", "{}").await, StatusCode::BAD_REQUEST);
        assert_eq!(post_json("/auth/verify", "{}").await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_then_login_over_http() {
        let app = app();
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/signup")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"email":"a@a.com","username":"ann","password":"pw","role":"user"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"ann","password":"pw"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        // unverified email
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_echoes_claims() {
        let token = test_keys()
            .sign_access(&sample_user("ann", Role::User, true))
            .unwrap();
        let res = app()
            .oneshot(
                Request::builder()
                    .uri("/auth/profile")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["username"], "ann");
        assert_eq!(json["role"], "user");
    }
}
