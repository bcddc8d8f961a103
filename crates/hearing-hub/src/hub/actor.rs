//! `HubActor` - owner of live connections and group memberships.
//!
//! All registry state lives inside the actor task, so publish, join and
//! unregister never race. Callers talk to it through [`HubActorHandle`].
//!
//! Delivery inside a publish never waits on a client: frames go through
//! `try_send` into each connection's bounded queue. A closed queue means the
//! socket task is gone and the connection is unregistered on the spot.

use super::connection::{ConnectionHandle, ConnectionId, DeliveryOutcome};
use super::messages::{DeliveryReport, HubCommand, HubGroup, HubStatus};
use crate::errors::HubError;
use crate::observability::metrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the hub mailbox.
const HUB_CHANNEL_BUFFER: usize = 1000;

/// Handle to the `HubActor`.
#[derive(Clone)]
pub struct HubActorHandle {
    sender: mpsc::Sender<HubCommand>,
    cancel_token: CancellationToken,
}

impl HubActorHandle {
    /// Spawn the actor and return a handle to it.
    ///
    /// The actor stops when `cancel_token` is cancelled or every handle is dropped.
    #[must_use]
    pub fn new(cancel_token: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let actor = HubActor::new(receiver, cancel_token.clone());

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    async fn request<T>(
        &self,
        command: HubCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, HubError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| HubError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| HubError::Internal(format!("response receive failed: {e}")))
    }

    /// Add a connection. It joins its user group, and `Officers` if it is an officer.
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Register {
                connection,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Remove a connection from the registry and all of its groups.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Unregister {
                connection_id,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Add a registered connection to `group`.
    pub async fn join(&self, connection_id: ConnectionId, group: HubGroup) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Join {
                connection_id,
                group,
                respond_to: tx,
            },
            rx,
        )
        .await?
    }

    pub async fn leave(&self, connection_id: ConnectionId, group: HubGroup) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Leave {
                connection_id,
                group,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    /// Push a serialized frame to every connection in any of `groups`, once each.
    pub async fn publish(
        &self,
        groups: Vec<HubGroup>,
        frame: Arc<str>,
    ) -> Result<DeliveryReport, HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Publish {
                groups,
                frame,
                respond_to: tx,
            },
            rx,
        )
        .await
    }

    pub async fn get_status(&self) -> Result<HubStatus, HubError> {
        let (tx, rx) = oneshot::channel();
        self.request(HubCommand::GetStatus { respond_to: tx }, rx)
            .await
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `HubActor` implementation.
pub struct HubActor {
    receiver: mpsc::Receiver<HubCommand>,
    cancel_token: CancellationToken,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    groups: HashMap<HubGroup, HashSet<ConnectionId>>,
}

impl HubActor {
    fn new(receiver: mpsc::Receiver<HubCommand>, cancel_token: CancellationToken) -> Self {
        Self {
            receiver,
            cancel_token,
            connections: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "hh.hub.actor")]
    async fn run(mut self) {
        info!(target: "hh.hub", "HubActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "hh.hub", "HubActor received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!(target: "hh.hub", "HubActor channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "hh.hub",
            connections_remaining = self.connections.len(),
            "HubActor stopped"
        );
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                connection,
                respond_to,
            } => {
                self.register(connection);
                let _ = respond_to.send(());
            }

            HubCommand::Unregister {
                connection_id,
                respond_to,
            } => {
                self.unregister(connection_id);
                let _ = respond_to.send(());
            }

            HubCommand::Join {
                connection_id,
                group,
                respond_to,
            } => {
                let _ = respond_to.send(self.join(connection_id, group));
            }

            HubCommand::Leave {
                connection_id,
                group,
                respond_to,
            } => {
                self.leave(connection_id, &group);
                let _ = respond_to.send(());
            }

            HubCommand::Publish {
                groups,
                frame,
                respond_to,
            } => {
                let report = self.publish(&groups, &frame);
                let _ = respond_to.send(report);
            }

            HubCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(HubStatus {
                    connections: self.connections.len(),
                    groups: self.groups.len(),
                });
            }
        }
    }

    fn register(&mut self, connection: ConnectionHandle) {
        let id = connection.id;
        let mut automatic = vec![HubGroup::user(&connection.username)];
        if connection.is_officer {
            automatic.push(HubGroup::Officers);
        }

        debug!(
            target: "hh.hub",
            connection_id = %id,
            username = %connection.username,
            is_officer = connection.is_officer,
            "Connection registered"
        );

        self.connections.insert(id, connection);
        for group in automatic {
            self.groups.entry(group).or_default().insert(id);
        }
        metrics::set_hub_connections(self.connections.len());
    }

    fn unregister(&mut self, connection_id: ConnectionId) {
        if self.connections.remove(&connection_id).is_none() {
            return;
        }
        self.groups.retain(|_, members| {
            members.remove(&connection_id);
            !members.is_empty()
        });

        debug!(target: "hh.hub", connection_id = %connection_id, "Connection unregistered");
        metrics::set_hub_connections(self.connections.len());
    }

    fn join(&mut self, connection_id: ConnectionId, group: HubGroup) -> Result<(), HubError> {
        if !self.connections.contains_key(&connection_id) {
            return Err(HubError::NotFound(format!("connection {connection_id}")));
        }
        self.groups.entry(group).or_default().insert(connection_id);
        Ok(())
    }

    fn leave(&mut self, connection_id: ConnectionId, group: &HubGroup) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    fn publish(&mut self, groups: &[HubGroup], frame: &Arc<str>) -> DeliveryReport {
        let audience: HashSet<ConnectionId> = groups
            .iter()
            .filter_map(|group| self.groups.get(group))
            .flatten()
            .copied()
            .collect();

        let mut report = DeliveryReport {
            recipients: audience.len(),
            ..DeliveryReport::default()
        };
        let mut closed = Vec::new();

        for id in audience {
            let Some(connection) = self.connections.get(&id) else {
                continue;
            };
            match connection.try_deliver(frame) {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Full => {
                    warn!(
                        target: "hh.hub",
                        connection_id = %id,
                        username = %connection.username,
                        "Outbound queue full, dropping frame"
                    );
                    report.dropped += 1;
                }
                DeliveryOutcome::Closed => {
                    report.dropped += 1;
                    closed.push(id);
                }
            }
        }

        for id in closed {
            self.unregister(id);
        }

        metrics::record_hub_delivery(report.delivered, report.dropped);
        report
    }
}
