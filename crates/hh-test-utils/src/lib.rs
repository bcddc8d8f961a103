//! # Hearing Hub Test Utilities
//!
//! Shared test utilities for the Hearing Hub service.
//!
//! This crate provides:
//! - Conference fixtures (`ConferenceBuilder`, `profile`)
//! - Server test harness (`TestHubServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hh_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let conference = ConferenceBuilder::new("Leeds").judge("judge@court.test").build();
//!     let server = TestHubServer::spawn().await?;
//!     server.video_api().insert(conference);
//!
//!     let response = reqwest::get(format!("{}/metrics", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
