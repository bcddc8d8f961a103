//! Background tasks for Hearing Hub.
//!
//! # Tasks
//!
//! - `cache_refresh` - Daily eviction and reload of cached conferences

pub mod cache_refresh;

pub use cache_refresh::start_cache_refresh;
