//! HTTP route handlers
//!
//! Handlers return `Result<Response<FullBody>>`; the server converts errors
//! into the shared envelope. Request bodies are generic so the router can be
//! driven by `hyper::body::Incoming` in production and `Full<Bytes>` in tests.

pub mod achievements;
pub mod auth_routes;
pub mod health;
pub mod reports;
pub mod response;

pub use achievements::parse_upload;
pub use health::{health_check, HealthResponse};
pub use response::{error_response, not_found_response, preflight_response, FullBody};

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::header::{HeaderMap, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::auth::{extract_token_from_header, TokenKind};
use crate::lifecycle::Principal;
use crate::server::AppState;
use crate::types::{AccoladeError, Result};

/// Limit for JSON request bodies
pub const MAX_JSON_BODY_BYTES: usize = 1024 * 1024;

/// Collect a request body, refusing anything over `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => Err(
            AccoladeError::ValidationFailed(format!("request body exceeds {} bytes", limit)),
        ),
        Err(e) => Err(AccoladeError::BadRequest(format!(
            "Failed to read request body: {}",
            e
        ))),
    }
}

/// Parse a JSON request body.
pub async fn read_json<T, B>(body: B) -> Result<T>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = read_body(body, MAX_JSON_BODY_BYTES).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AccoladeError::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Resolve the bearer token on a request into a principal.
///
/// The token only identifies the caller; role and permissions are re-read
/// from the directory so deactivated accounts lose access immediately.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal> {
    let header = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok());
    let token = extract_token_from_header(header)
        .ok_or_else(|| AccoladeError::Unauthorized("Missing bearer token".into()))?;

    let claims = state.jwt.verify_kind(token, TokenKind::Access).into_claims()?;
    state
        .engine
        .bounded(
            "principal lookup",
            state
                .engine
                .directory()
                .resolve_principal(&claims.user_id, &claims.role_id),
        )
        .await
}
