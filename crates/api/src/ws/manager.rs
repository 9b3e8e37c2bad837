use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use fetchline_core::job_events::CLOSE_GOING_AWAY;
use fetchline_core::types::{JobId, Timestamp};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// One open push connection.
pub struct WsConnection {
    /// Job whose updates this connection receives.
    pub job_id: JobId,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Registry of open push connections.
///
/// Outbound frames go through an unbounded channel per connection so
/// writers never wait on a slow socket.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection and return the receiver to drain into the
    /// socket sink.
    pub async fn add(&self, conn_id: String, job_id: JobId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            job_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection. Frames already queued are still flushed.
    pub async fn remove(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let connected_secs = (chrono::Utc::now() - conn.connected_at).num_seconds();
            tracing::debug!(conn_id, job_id = %conn.job_id, connected_secs, "Connection removed");
        }
    }

    /// Queue a frame for one connection. Returns `false` if it is gone.
    pub async fn send(&self, conn_id: &str, message: Message) -> bool {
        match self.connections.read().await.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Serialize `payload` as a JSON text frame and queue it.
    pub async fn send_json<T: Serialize>(&self, conn_id: &str, payload: &T) -> bool {
        match serde_json::to_string(payload) {
            Ok(text) => self.send(conn_id, Message::Text(text.into())).await,
            Err(e) => {
                tracing::error!(conn_id, error = %e, "Failed to serialize WebSocket payload");
                false
            }
        }
    }

    /// Connection ids currently bound to `job_id`.
    pub async fn connections_for_job(&self, job_id: &JobId) -> Vec<String> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(_, conn)| conn.job_id == *job_id)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a going-away Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                code: CLOSE_GOING_AWAY,
                reason: "server shutting down".into(),
            })));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
