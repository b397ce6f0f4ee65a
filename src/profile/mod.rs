pub mod handlers;
pub mod repo;

use crate::{auth::jwt::JwtKeys, state::AppState};
use axum::Router;

pub fn router(keys: &JwtKeys) -> Router<AppState> {
    handlers::routes(keys)
}
