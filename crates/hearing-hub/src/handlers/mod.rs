//! HTTP and WebSocket request handlers for Hearing Hub.

pub mod callback;
pub mod hub;
pub mod internal_event;
pub mod metrics;

pub use callback::handle_callback;
pub use hub::{hub_socket, HUB_USER_HEADER};
pub use internal_event::handle_internal_event;
pub use metrics::metrics_handler;
