pub mod availability;
pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use crate::{auth::jwt::JwtKeys, state::AppState};
use axum::Router;

pub fn router(keys: &JwtKeys) -> Router<AppState> {
    handlers::routes(keys)
}
