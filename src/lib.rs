//! Accolade - academic achievement tracking
//!
//! Students record achievements as drafts, submit them, and their academic
//! advisor verifies or rejects them. Each achievement lives in two stores:
//!
//! - **References** (SQLite): status of record, workflow timestamps, actor
//! - **Details** (MongoDB): title, type, free-form details, attachments
//!
//! ## Modules
//!
//! - **lifecycle**: state machine, authorization and the engine coordinating
//!   both stores
//! - **db**: SQLite reference store and identity directory, MongoDB detail store
//! - **reports**: statistics and per-student reports
//! - **auth**: JWT tokens and password hashing
//! - **server** / **routes**: the HTTP API under `/api/v1`

pub mod auth;
pub mod config;
pub mod db;
pub mod lifecycle;
pub mod reports;
pub mod routes;
pub mod server;
pub mod types;
pub mod uploads;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{AccoladeError, Result};
