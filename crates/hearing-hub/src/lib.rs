//! Hearing Hub Service Library
//!
//! Real-time event and notification subsystem for video hearings:
//!
//! - Receives state-change callbacks from the video platform
//! - Keeps a cached read model of each conference
//! - Rejects out-of-order callbacks against that model
//! - Routes internal events from other services to registered handlers
//! - Pushes status messages to connected clients over a WebSocket hub
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> events/ | internal_events/
//!                                      |            |
//!                                      v            v
//!                                    cache/  ->  hub/ (actor + dispatcher)
//! ```
//!
//! # Modules
//!
//! - `cache` - Conference cache with per-conference locking
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `events` - Callback classification, ordering guard and processing
//! - `handlers` - HTTP and WebSocket handlers
//! - `hub` - Connection registry, groups and message dispatch
//! - `internal_events` - Internal event types and handler registry
//! - `models` - Conference, participant and endpoint models
//! - `notifiers` - Push operations used by internal event handlers
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `services` - Video API and User API clients
//! - `tasks` - Background tasks

pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod hub;
pub mod internal_events;
pub mod models;
pub mod notifiers;
pub mod observability;
pub mod routes;
pub mod services;
pub mod tasks;
