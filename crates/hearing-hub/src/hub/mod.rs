//! Push hub.
//!
//! - `connection` - one socket's bounded outbound queue
//! - `messages` - wire frames, groups and actor commands
//! - `actor` - registry of connections and group memberships
//! - `dispatcher` - maps accepted events to frames and audiences
//! - `session` - answers one client's subscribe and ping requests

pub mod actor;
pub mod connection;
pub mod dispatcher;
pub mod messages;
pub mod session;

pub use actor::HubActorHandle;
pub use connection::{ConnectionHandle, ConnectionId, DeliveryOutcome};
pub use dispatcher::HubDispatcher;
pub use messages::{ClientMessage, ControlFrame, DeliveryReport, HubGroup, HubMessage, HubStatus};
pub use session::HubSession;
