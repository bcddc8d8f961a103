//! Common error types for Hearing Hub components.

use thiserror::Error;

/// Errors raised while parsing shared value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// An identifier was not a valid UUID.
    #[error("Invalid {kind} id: {value}")]
    InvalidId {
        /// Which identifier failed to parse (e.g. "conference").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}
