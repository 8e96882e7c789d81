//! Core error model.

use thiserror::Error;

/// Core-level error.
///
/// Only parse failures of shared primitives live here. Validation, delivery
/// and scheduling failures have their own types in the crates that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
