use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tracing::{debug, warn};

use crate::{
    auth::{claims::Claims, jwt::JwtKeys, repo_types::Role},
    error::AppError,
    state::AppState,
};

const TOKEN_NOT_FOUND: &str = "Token not found";
const INVALID_TOKEN: &str = "Invalid or expired token";

pub const ADMIN: &[Role] = &[Role::Admin];
pub const USER: &[Role] = &[Role::User];
pub const ANY_ROLE: &[Role] = &[Role::Admin, Role::User];

/// Per-route gate configuration. `Public` carries no roles, so a public
/// route can never be role-gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Authenticated,
    Roles(&'static [Role]),
}

/// Runs both gate stages against the request headers. Returns the caller's
/// claims when the route is not public.
pub fn authorize(
    access: RouteAccess,
    headers: &HeaderMap,
    keys: &JwtKeys,
) -> Result<Option<Claims>, AppError> {
    let claims = match access {
        RouteAccess::Public => None,
        RouteAccess::Authenticated | RouteAccess::Roles(_) => Some(authenticate(headers, keys)?),
    };

    if let RouteAccess::Roles(allowed) = access {
        if !role_allowed(allowed, claims.as_ref()) {
            warn!(required = ?allowed, "role check denied");
            return Err(AppError::Forbidden);
        }
    }
    Ok(claims)
}

/// An empty role list places no restriction; otherwise anonymous callers are denied.
fn role_allowed(allowed: &[Role], claims: Option<&Claims>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    claims.map(|c| allowed.contains(&c.role)).unwrap_or(false)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(headers: &HeaderMap, keys: &JwtKeys) -> Result<Claims, AppError> {
    let token =
        bearer_token(headers).ok_or_else(|| AppError::authentication(TOKEN_NOT_FOUND))?;
    let claims = keys.verify_access(token).map_err(|e| {
        debug!(error = %e, "bearer token rejected");
        AppError::authentication(INVALID_TOKEN)
    })?;
    Ok(claims)
}

/// Middleware state: the verifier plus the access rule of one route group.
#[derive(Clone)]
pub struct Gate {
    keys: JwtKeys,
    access: RouteAccess,
}

impl Gate {
    pub fn new(keys: JwtKeys, access: RouteAccess) -> Self {
        Self { keys, access }
    }
}

pub async fn gate(
    State(gate): State<Gate>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(claims) = authorize(gate.access, req.headers(), &gate.keys)? {
        req.extensions_mut().insert(claims);
    }
    Ok(next.run(req).await)
}

/// Wraps every route of `router` with the gate for `access`.
pub fn guard(router: Router<AppState>, keys: &JwtKeys, access: RouteAccess) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        Gate::new(keys.clone(), access),
        gate,
    ))
}

/// Claims attached by the gate.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = Claims;

    fn deref(&self) -> &Claims {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::authentication(TOKEN_NOT_FOUND))
    }
}
