use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod cleanup;
pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router(keys: &jwt::JwtKeys) -> Router<AppState> {
    handlers::routes(keys)
}
