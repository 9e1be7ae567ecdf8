//! Errors raised while constructing domain values.

use thiserror::Error;

/// A raw value could not become a domain value.
///
/// Only identifier construction fails at this level; document, configuration
/// and run failures are typed in the crates that detect them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
