//! Observability for Hearing Hub.
//!
//! Prometheus metrics live in `metrics`. Tracing is configured in `main`.

pub mod metrics;
