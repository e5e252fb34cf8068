use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::de::DeserializeOwned;

use atrium_types::api::{AdminClaims, Claims};

use crate::auth::AppState;
use crate::error::{ApiError, Result};

/// Validate a user token and stash its claims for the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Auth("authentication required".to_string()))?;
    let claims: Claims = decode_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Validate an admin token. User tokens fail here: the two claim shapes
/// share no deserializable form.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Auth("authentication required".to_string()))?;
    let claims: AdminClaims = decode_token(&state.jwt_secret, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Like `require_admin`, but only the super admin passes.
pub async fn require_super_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::Auth("authentication required".to_string()))?;
    let claims: AdminClaims = decode_token(&state.jwt_secret, token)?;
    if !claims.is_super {
        return Err(ApiError::Forbidden("super admin only".to_string()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn decode_token<C: DeserializeOwned>(secret: &str, token: &str) -> Result<C> {
    decode::<C>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Auth("invalid or expired token".to_string()))
}
