//! Authentication for Accolade
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Password hashing with Argon2
//!
//! Authorization against individual achievements lives in
//! `crate::lifecycle::access`.

pub mod jwt;
pub mod password;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenKind, TokenValidationResult};
pub use password::{hash_password, verify_password};
