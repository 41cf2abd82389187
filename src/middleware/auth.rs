use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::Error;
use crate::utils::token::{Claims, TokenKind};
use crate::AppState;

fn bearer_token(req: &Request) -> Result<&str, Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| Error::Unauthorized("Missing authorization header".to_string()))?;
    let value = header
        .to_str()
        .map_err(|_| Error::Unauthorized("Malformed authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Unauthorized("Unsupported authorization scheme".to_string()))
}

/// Accepts only access tokens and exposes their claims to handlers.
pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = match bearer_token(&req).and_then(|token| state.jwt.verify(token, TokenKind::Access)) {
        Ok(claims) => claims,
        Err(Error::Jwt(_)) => {
            return Error::Unauthorized("Could not validate credentials".to_string()).into_response()
        }
        Err(e) => return e.into_response(),
    };
    req.extensions_mut().insert(claims);
    next.run(req).await
}

/// Runs after `require_bearer_auth`; lets only admin claims through.
pub async fn require_admin(req: Request, next: Next) -> Response {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.is_admin() => next.run(req).await,
        Some(_) => Error::Forbidden("Administrator privileges required".to_string()).into_response(),
        None => Error::Unauthorized("Not authenticated".to_string()).into_response(),
    }
}
