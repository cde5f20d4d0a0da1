//! Connection hub
//!
//! Every socket registers an unbounded sender here. Session logic never touches
//! sockets directly: it returns [`Outbound`] envelopes naming the recipient
//! connections, and the hub fans them out. Recipients that have already gone
//! away are skipped silently.

use crate::protocol::ServerMessage;
use crate::types::ConnectionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;
pub type ConnectionReceiver = mpsc::UnboundedReceiver<ServerMessage>;

/// A message addressed to an explicit set of connections
#[derive(Debug, Clone)]
pub struct Outbound {
    pub recipients: Vec<ConnectionId>,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn to_one(connection_id: &ConnectionId, message: ServerMessage) -> Self {
        Self {
            recipients: vec![connection_id.clone()],
            message,
        }
    }

    pub fn to_many(recipients: Vec<ConnectionId>, message: ServerMessage) -> Self {
        Self {
            recipients,
            message,
        }
    }
}

#[derive(Clone, Default)]
pub struct Hub {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionSender>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and get the receiving end of its outbound queue
    pub async fn register(&self, connection_id: &ConnectionId) -> ConnectionReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .await
            .insert(connection_id.clone(), tx);
        rx
    }

    pub async fn unregister(&self, connection_id: &ConnectionId) {
        self.connections.write().await.remove(connection_id);
    }

    pub async fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    pub async fn send(&self, connection_id: &ConnectionId, message: ServerMessage) {
        let connections = self.connections.read().await;
        if let Some(tx) = connections.get(connection_id) {
            // A closed receiver means the socket is shutting down
            let _ = tx.send(message);
        }
    }

    pub async fn deliver(&self, outbound: Outbound) {
        let connections = self.connections.read().await;
        for recipient in &outbound.recipients {
            if let Some(tx) = connections.get(recipient) {
                let _ = tx.send(outbound.message.clone());
            }
        }
    }

    pub async fn deliver_all(&self, batch: Vec<Outbound>) {
        for outbound in batch {
            self.deliver(outbound).await;
        }
    }
}
