//! JWT token handling
//!
//! Access tokens carry the user id, role id and the role's permission names;
//! the role is re-resolved against the directory on every request, so the
//! token only needs to identify the caller.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Access tokens default to 1 hour, refresh tokens last 7 days
//! - A refresh token is never accepted where an access token is expected

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::AccoladeError;

/// Refresh token lifetime (7 days)
const REFRESH_EXPIRY_SECONDS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub token_type: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub role_id: String,
    pub permissions: Vec<String>,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Claims of a valid token, or `Unauthorized` with the reason.
    pub fn into_claims(self) -> Result<Claims, AccoladeError> {
        match self.claims {
            Some(claims) if self.valid => Ok(claims),
            _ => Err(AccoladeError::Unauthorized(
                self.error.unwrap_or_else(|| "Invalid token".into()),
            )),
        }
    }
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or shorter than 32 characters
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, AccoladeError> {
        if secret.is_empty() {
            return Err(AccoladeError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(AccoladeError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    fn issue(&self, input: TokenInput, kind: TokenKind, lifetime: u64) -> Result<String, AccoladeError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AccoladeError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            user_id: input.user_id,
            role_id: input.role_id,
            permissions: input.permissions,
            token_type: kind,
            iat: now,
            exp: now + lifetime,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AccoladeError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Generate an access token
    pub fn generate_token(&self, input: TokenInput) -> Result<String, AccoladeError> {
        self.issue(input, TokenKind::Access, self.expiry_seconds)
    }

    /// Generate a refresh token with longer expiry (7 days)
    pub fn generate_refresh_token(&self, input: TokenInput) -> Result<String, AccoladeError> {
        self.issue(input, TokenKind::Refresh, REFRESH_EXPIRY_SECONDS)
    }

    /// Verify and decode a JWT token of any kind
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let validation = Validation::default();

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }

    /// Verify a token and require it to be of `kind`
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> TokenValidationResult {
        let result = self.verify_token(token);
        match &result.claims {
            Some(claims) if claims.token_type != kind => {
                TokenValidationResult::invalid("Wrong token type")
            }
            _ => result,
        }
    }
}

/// Extract token from an `Authorization: Bearer <token>` header
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    fn input() -> TokenInput {
        TokenInput {
            user_id: "user-1".into(),
            role_id: "role-student".into(),
            permissions: vec!["achievements:create".into()],
        }
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();

        let token = validator.generate_token(input()).unwrap();
        let result = validator.verify_kind(&token, TokenKind::Access);
        assert!(result.valid);

        let claims = result.claims.unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.role_id, "role-student");
        assert_eq!(claims.permissions, vec!["achievements:create"]);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_refresh_token_not_accepted_as_access() {
        let validator = test_validator();
        let refresh = validator.generate_refresh_token(input()).unwrap();

        assert!(!validator.verify_kind(&refresh, TokenKind::Access).valid);
        let claims = validator
            .verify_kind(&refresh, TokenKind::Refresh)
            .into_claims()
            .unwrap();
        assert_eq!(claims.exp - claims.iat, REFRESH_EXPIRY_SECONDS);
    }

    #[test]
    fn test_invalid_token() {
        let result = test_validator().verify_token("invalid-token");
        assert!(!result.valid);
        assert!(matches!(
            result.into_claims(),
            Err(AccoladeError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
        )
        .unwrap();

        let token = test_validator().generate_token(input()).unwrap();
        assert!(!other.verify_token(&token).valid);
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("abc123")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
        assert!(JwtValidator::new("".into(), 3600).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600).is_ok());
    }

    #[test]
    fn test_dev_mode_validator() {
        let validator = JwtValidator::new_dev();
        let token = validator.generate_token(input()).unwrap();
        assert!(validator.verify_token(&token).valid);
    }
}
