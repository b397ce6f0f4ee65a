use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::repo::{Profile, ProfilePatch, UpdateOutcome};
use crate::{
    access::{guard, CurrentUser, RouteAccess},
    auth::{jwt::JwtKeys, services::is_valid_email},
    error::{AppError, AppResult},
    state::AppState,
    storage::ext_from_mime,
};

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
}

impl UpdateProfileRequest {
    /// Blank username or email is a validation error; blank description clears nothing.
    pub fn into_patch(self) -> AppResult<ProfilePatch> {
        let username = match self.username.map(|u| u.trim().to_string()) {
            Some(u) if u.is_empty() => return Err(AppError::validation("Username cannot be empty")),
            other => other,
        };
        let email = match self.email.map(|e| e.trim().to_lowercase()) {
            Some(e) if !is_valid_email(&e) => return Err(AppError::validation("Invalid email")),
            other => other,
        };
        let description = self.description.filter(|d| !d.trim().is_empty());
        Ok(ProfilePatch {
            username,
            email,
            description,
        })
    }
}

pub fn routes(keys: &JwtKeys) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/profile", get(my_profile))
        .route("/profile/:id", get(profile_by_id))
        .route("/profile/update", put(update_profile))
        .route("/profile/picture", put(update_picture))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)); // 10MB

    guard(authenticated, keys, RouteAccess::Authenticated)
}

async fn load(state: &AppState, id: Uuid) -> AppResult<Profile> {
    state
        .profiles
        .find_profile(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

#[instrument(skip(state), fields(user_id = %user.sub))]
pub async fn my_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Profile>> {
    Ok(Json(load(&state, user.sub).await?))
}

#[instrument(skip(state))]
pub async fn profile_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Profile>> {
    Ok(Json(load(&state, id).await?))
}

/// A changed email is unverified until the code sent to it is redeemed.
#[instrument(skip(state, payload), fields(user_id = %user.sub))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let patch = payload.into_patch()?;
    match state.profiles.update_profile(user.sub, &patch).await? {
        UpdateOutcome::Updated {
            profile,
            email_changed,
        } => {
            info!(email_changed, "profile updated");
            if email_changed {
                if let Err(e) = state.auth.reverify(user.sub).await {
                    error!(error = %e, "verification for new email failed");
                }
            }
            Ok(Json(profile))
        }
        UpdateOutcome::Missing => Err(AppError::not_found("User not found")),
        UpdateOutcome::UsernameTaken => Err(AppError::conflict("Username already taken")),
        UpdateOutcome::EmailTaken => Err(AppError::conflict("Email already in use")),
    }
}

/// Multipart field `file`. The previous picture is removed from the bucket first.
#[instrument(skip(state, mp), fields(user_id = %user.sub))]
pub async fn update_picture(
    State(state): State<AppState>,
    user: CurrentUser,
    mut mp: Multipart,
) -> AppResult<Json<Profile>> {
    let current = load(&state, user.sub).await?;

    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        upload = Some((body, content_type));
        break;
    }
    let (body, content_type) = upload.ok_or_else(|| AppError::validation("file is required"))?;

    let old_key = current
        .profile_pic
        .as_deref()
        .and_then(|url| state.storage.key_from_url(url));
    if current.profile_pic.is_some() && old_key.is_none() {
        warn!("previous picture url outside the bucket; not deleted");
    }
    let ext = ext_from_mime(&content_type).unwrap_or("bin");
    let new_key = format!("profile-pics/{}/{}.{}", user.sub, Uuid::new_v4(), ext);
    let url = state
        .storage
        .replace_file(old_key.as_deref(), body, &new_key, &content_type)
        .await?;

    let profile = state
        .profiles
        .set_profile_pic(user.sub, &url)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(key = %new_key, "profile picture replaced");
    Ok(Json(profile))
}
