use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    BookingListQuery, BookingView, CreateBookingRequest, MessageResponse, UpdateBookingRequest,
};
use crate::{
    access::{guard, CurrentUser, RouteAccess, ADMIN, ANY_ROLE, USER},
    auth::jwt::JwtKeys,
    error::AppResult,
    state::AppState,
};

pub fn routes(keys: &JwtKeys) -> Router<AppState> {
    let requester = Router::new().route("/bookings/create", post(create_booking));

    let admin = Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/:id", put(update_booking))
        .route("/bookings/disapprove/:id", patch(disapprove_booking));

    let participants = Router::new()
        .route("/bookings/approve/:id", put(approve_booking))
        .route("/bookings/pending", get(pending_bookings))
        .route("/bookings/approved", get(approved_bookings));

    let own = Router::new().route("/bookings/user", get(user_bookings));

    Router::new()
        .merge(guard(requester, keys, RouteAccess::Roles(USER)))
        .merge(guard(admin, keys, RouteAccess::Roles(ADMIN)))
        .merge(guard(participants, keys, RouteAccess::Roles(ANY_ROLE)))
        .merge(guard(own, keys, RouteAccess::Authenticated))
}

#[instrument(skip(state, payload))]
pub async fn create_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingView>)> {
    let view = state.bookings.create(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state, payload))]
pub async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingRequest>,
) -> AppResult<Json<BookingView>> {
    Ok(Json(state.bookings.update(id, payload).await?))
}

#[instrument(skip(state))]
pub async fn approve_booking(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingView>> {
    Ok(Json(state.bookings.approve(&user, id).await?))
}

#[instrument(skip(state))]
pub async fn disapprove_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    state.bookings.disapprove(id).await?;
    Ok(Json(MessageResponse {
        message: "Booking disapproved and deleted".into(),
    }))
}

#[instrument(skip(state))]
pub async fn pending_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.bookings.pending_for_owner(user.sub).await?))
}

#[instrument(skip(state))]
pub async fn approved_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.bookings.approved_for_user(user.sub).await?))
}

#[instrument(skip(state))]
pub async fn user_bookings(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.bookings.list_for_user(user.sub).await?))
}

#[instrument(skip(state))]
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingListQuery>,
) -> AppResult<Json<Vec<BookingView>>> {
    Ok(Json(state.bookings.list_all(query.into()).await?))
}
