//! Authentication endpoints
//!
//! - `POST /api/v1/auth/login`   - exchange username/email and password for tokens
//! - `POST /api/v1/auth/refresh` - exchange a refresh token for a new access token
//! - `POST /api/v1/auth/logout`  - acknowledge a logout (tokens are stateless)
//! - `GET  /api/v1/auth/profile` - the directory's view of the caller

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::response::{ok, with_message, FullBody};
use super::{authenticate, read_json};
use crate::auth::{verify_password, TokenInput, TokenKind};
use crate::lifecycle::{Principal, StudentProfile};
use crate::server::AppState;
use crate::types::{AccoladeError, Result};

/// Same message for every login failure to avoid account enumeration
const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub role_id: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub principal: Principal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentProfile>,
}

pub async fn login<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: LoginRequest = read_json(req.into_body()).await?;
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(AccoladeError::ValidationFailed(
            "username and password are required".into(),
        ));
    }

    let directory = state.engine.directory();
    let credentials = state
        .engine
        .bounded("credential lookup", directory.find_credentials(body.username.trim()))
        .await?;

    let credentials = match credentials {
        Some(c) if c.is_active => c,
        Some(_) => {
            warn!("Login failed - account inactive: {}", body.username);
            return Err(AccoladeError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        None => {
            warn!("Login failed - user not found: {}", body.username);
            return Err(AccoladeError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
    };

    if !verify_password(&body.password, &credentials.password_hash)? {
        warn!("Login failed - wrong password: {}", body.username);
        return Err(AccoladeError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let permissions = state
        .engine
        .bounded("role permissions", directory.role_permissions(&credentials.role_id))
        .await?;
    let input = TokenInput {
        user_id: credentials.user_id.clone(),
        role_id: credentials.role_id.clone(),
        permissions: permissions.clone(),
    };
    let token = state.jwt.generate_token(input.clone())?;
    let refresh_token = state.jwt.generate_refresh_token(input)?;

    info!(user_id = %credentials.user_id, role_id = %credentials.role_id, "Login succeeded");

    Ok(ok(LoginResponse {
        token,
        refresh_token,
        expires_in: state.jwt.expiry_seconds(),
        user: UserInfo {
            id: credentials.user_id,
            username: credentials.username,
            full_name: credentials.full_name,
            role_id: credentials.role_id,
            permissions,
        },
    }))
}

pub async fn refresh<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body: RefreshRequest = read_json(req.into_body()).await?;
    let claims = state
        .jwt
        .verify_kind(&body.refresh_token, TokenKind::Refresh)
        .into_claims()?;

    // The account must still be active with the same role.
    let directory = state.engine.directory();
    let principal = state
        .engine
        .bounded(
            "principal lookup",
            directory.resolve_principal(&claims.user_id, &claims.role_id),
        )
        .await?;
    let permissions = state
        .engine
        .bounded("role permissions", directory.role_permissions(&claims.role_id))
        .await?;

    let token = state.jwt.generate_token(TokenInput {
        user_id: principal.user_id,
        role_id: claims.role_id,
        permissions,
    })?;

    Ok(ok(RefreshResponse {
        token,
        expires_in: state.jwt.expiry_seconds(),
    }))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub user_id: String,
}

/// Tokens are not tracked server-side, so logout only checks the access
/// token and records the event; the client discards its tokens.
pub async fn logout<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    info!(user_id = %principal.user_id, "Logout");
    Ok(with_message(
        StatusCode::OK,
        Some("Logged out successfully"),
        LogoutResponse {
            user_id: principal.user_id,
        },
    ))
}

pub async fn profile<B>(state: &AppState, req: Request<B>) -> Result<Response<FullBody>> {
    let principal = authenticate(state, req.headers()).await?;
    let student = match principal.student_id() {
        Some(student_id) => {
            state
                .engine
                .bounded(
                    "student lookup",
                    state.engine.directory().student_profile(student_id),
                )
                .await?
        }
        None => None,
    };

    Ok(ok(ProfileResponse { principal, student }))
}
