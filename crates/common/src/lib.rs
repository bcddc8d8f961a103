//! Common utilities and types shared across Hearing Hub components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for strongly typed identifiers
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
