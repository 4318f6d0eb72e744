//! Configuration for Accolade
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::uploads::DEFAULT_MAX_UPLOAD_BYTES;

/// Accolade - academic achievement tracking service
#[derive(Parser, Debug, Clone)]
#[command(name = "accolade")]
#[command(about = "Records, submits and verifies student achievements")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:1063")]
    pub listen: SocketAddr,

    /// Enable development mode (dev JWT secret, in-memory detail store
    /// fallback, demo accounts)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// SQLite database file for accounts and achievement references
    /// (`:memory:` for a throwaway database)
    #[arg(long, env = "SQLITE_PATH", default_value = "accolade.db")]
    pub sqlite_path: String,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "accolade")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT access token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Timeout for each individual store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Directory attachments are written to
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: String,

    /// Largest accepted attachment in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Effective JWT secret; dev mode falls back to `None` so the caller
    /// uses the built-in development validator.
    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret().is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("MAX_UPLOAD_BYTES must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["accolade"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_production_requires_secret() {
        let args = parse(&["--jwt-secret", ""]);
        assert!(args.jwt_secret().is_none());
        assert!(args.validate().is_err());

        let args = parse(&["--jwt-secret", "a-production-secret-of-32-characters"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_mode_defaults() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.store_timeout(), Duration::from_secs(5));
        assert_eq!(args.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(args.listen.port(), 1063);
    }

    #[test]
    fn test_zero_limits_rejected() {
        assert!(parse(&["--dev-mode", "--store-timeout-ms", "0"]).validate().is_err());
        assert!(parse(&["--dev-mode", "--max-upload-bytes", "0"]).validate().is_err());
    }
}
