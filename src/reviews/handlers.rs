use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::Review;
use crate::{
    access::{guard, CurrentUser, RouteAccess, USER},
    auth::jwt::JwtKeys,
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub comment: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn routes(keys: &JwtKeys) -> Router<AppState> {
    let public = Router::new().route("/reviews/get/:post_id", get(list_reviews));
    let author = Router::new().route("/reviews/create/:post_id", post(create_review));
    let owner = Router::new().route("/reviews/:review_id", delete(delete_review));

    Router::new()
        .merge(guard(public, keys, RouteAccess::Public))
        .merge(guard(author, keys, RouteAccess::Roles(USER)))
        .merge(guard(owner, keys, RouteAccess::Authenticated))
}

fn validate_comment(comment: &str) -> AppResult<&str> {
    let comment = comment.trim();
    if comment.is_empty() {
        return Err(AppError::validation("Comment is required"));
    }
    Ok(comment)
}

#[instrument(skip(state, payload), fields(user_id = %user.sub))]
pub async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let comment = validate_comment(&payload.comment)?;
    state.posts.ensure_exists(post_id).await?;
    let review = state.reviews.insert(post_id, user.sub, comment).await?;
    info!(review_id = %review.id, post_id = %post_id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<Vec<Review>>> {
    Ok(Json(state.reviews.list_for_post(post_id).await?))
}

/// Someone else's review looks the same as a missing one.
#[instrument(skip(state), fields(user_id = %user.sub))]
pub async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(review_id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    if !state.reviews.delete_by_author(review_id, user.sub).await? {
        return Err(AppError::not_found("Review not found"));
    }
    info!(review_id = %review_id, "review deleted");
    Ok(Json(MessageResponse {
        message: "Review deleted".into(),
    }))
}
