//! Channel-transport connection management.
//!
//! Provides per-connection backpressure via bounded mpsc channels and
//! lock-free concurrent connection tracking via `DashMap`. Each connection
//! carries the caller identity established at upgrade time and the socket
//! namespace it joined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actionhub_core::Caller;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::config::ConnectionConfig;

/// Unique identifier for a connection, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Frame to be sent outbound to a connection.
#[derive(Debug)]
pub enum OutboundMessage {
    /// A JSON text frame.
    Text(String),
    /// A `MsgPack` binary frame.
    Binary(Vec<u8>),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Error returned when sending a frame to a connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The channel stayed full for the whole timeout.
    #[error("send timed out")]
    Timeout,
    /// The connection has been closed; the receiver was dropped.
    #[error("connection closed")]
    Disconnected,
}

/// Handle to a single connection.
///
/// The receiver end of the outbound channel is held by the `WebSocket`
/// write loop; this handle holds the sender end.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tx: mpsc::Sender<OutboundMessage>,
    /// Identity every call on this connection runs as.
    pub caller: Caller,
    /// Socket namespace joined at upgrade, `None` for the default one.
    pub socket_namespace: Option<String>,
    pub connected_at: Instant,
}

impl ConnectionHandle {
    /// Attempts to enqueue a frame without blocking.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Enqueues a frame, waiting at most `timeout` for channel capacity.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Timeout` if the channel remains full for the
    /// entire timeout, `SendError::Disconnected` if the write loop is gone.
    pub async fn send_timeout(
        &self,
        msg: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Disconnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Thread-safe registry of all open channel connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a new empty registry. Connection IDs start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new connection, returning a handle and the frame receiver.
    pub fn register(
        &self,
        caller: Caller,
        socket_namespace: Option<String>,
        config: &ConnectionConfig,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);

        let handle = Arc::new(ConnectionHandle {
            id,
            tx,
            caller,
            socket_namespace,
            connected_at: Instant::now(),
        });

        self.connections.insert(id, Arc::clone(&handle));
        (handle, rx)
    }

    /// Removes a connection from the registry, returning its handle if found.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(&id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Counts connections joined to a socket namespace.
    #[must_use]
    pub fn count_in_namespace(&self, socket_namespace: Option<&str>) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().socket_namespace.as_deref() == socket_namespace)
            .count()
    }

    /// Removes and returns all connections. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ConnectionHandle>> {
        let keys: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        keys.into_iter()
            .filter_map(|key| self.connections.remove(&key).map(|(_, handle)| handle))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
