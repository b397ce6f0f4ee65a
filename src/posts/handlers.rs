use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    CreatePostRequest, MessageResponse, Pagination, PostView, SearchQuery, UpdatePostRequest,
};
use super::repo_types::Location;
use super::services::ImageUpload;
use crate::{
    access::{guard, CurrentUser, RouteAccess},
    auth::jwt::JwtKeys,
    error::{AppError, AppResult},
    state::AppState,
};

pub fn routes(keys: &JwtKeys) -> Router<AppState> {
    let public = Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/search", get(search_posts))
        .route("/posts/locations", get(list_locations))
        .route("/posts/:id", get(get_post));

    let authenticated = Router::new()
        .route("/posts/create", post(create_post))
        .route("/posts/update/:id", put(update_post))
        .route("/posts/:id/images", post(upload_post_images))
        .route("/posts/delete/:id", delete(delete_post))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)); // 20MB

    Router::new()
        .merge(guard(public, keys, RouteAccess::Public))
        .merge(guard(authenticated, keys, RouteAccess::Authenticated))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let view = state.posts.create(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.list(p).await?))
}

/// `?keywords=&serviceTypes=a,b&animalType=&animalSizes=a,b&locationId=`
pub async fn search_posts(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.search(q).await?))
}

pub async fn list_locations(State(state): State<AppState>) -> AppResult<Json<Vec<Location>>> {
    Ok(Json(state.posts.locations().await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.posts.get(id).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.posts.update(&user, id, payload).await?))
}

/// Multipart field `images` (repeatable).
#[instrument(skip(state, mp), fields(user_id = %user.sub))]
pub async fn upload_post_images(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> AppResult<Json<PostView>> {
    let mut uploads = Vec::new();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        if !matches!(field.name(), Some("images") | Some("images[]")) {
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
        uploads.push(ImageUpload { body, content_type });
    }
    Ok(Json(state.posts.add_images(&user, id, uploads).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.posts.delete(&user, id).await?;
    Ok(Json(MessageResponse {
        message: "Post successfully deleted.".into(),
    }))
}
