//! Shared types for Accolade

pub mod error;

pub use error::{AccoladeError, Result};
