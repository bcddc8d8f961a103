//! One live hub connection and its bounded outbound queue.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Identifies a single socket. A user with several tabs has several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Queue at capacity; the frame is dropped for this connection.
    Full,
    /// Socket task has gone away.
    Closed,
}

/// Registry-side view of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub username: String,
    pub is_officer: bool,
    sender: mpsc::Sender<Arc<str>>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end drained by the socket task.
    pub fn channel(
        username: impl Into<String>,
        is_officer: bool,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: ConnectionId::new(),
            username: username.into(),
            is_officer,
            sender,
        };
        (handle, receiver)
    }

    /// Queue a frame without waiting.
    pub fn try_deliver(&self, frame: &Arc<str>) -> DeliveryOutcome {
        match self.sender.try_send(Arc::clone(frame)) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => DeliveryOutcome::Full,
            Err(TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }
}
