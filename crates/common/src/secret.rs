//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. The downstream API bearer token is
//! held as a [`SecretString`]; its `Debug` output is redacted, so structs that
//! derive `Debug` around it stay safe to log.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let token = SecretString::from("video-api-token");
//! assert!(!format!("{token:?}").contains("video-api-token"));
//! assert_eq!(token.expose_secret(), "video-api-token");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
