//! WebSocket side of the client: connect to a job's push endpoint and turn
//! frames into [`TransportEvent`]s.

use fetchline_core::delivery::TransportEvent;
use fetchline_core::job_events::{StatusMessage, CLOSE_JOB_NOT_FOUND, CLOSE_PUSH_DEADLINE};
use fetchline_core::types::JobId;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::ClientError;

/// How long [`PushConnection::close`] waits for the server's Close reply.
const CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// A live push connection for one job.
pub struct PushConnection {
    pub job_id: JobId,
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl PushConnection {
    /// Connect to `url` (absolute `ws://` or `wss://`).
    ///
    /// An HTTP 404 on the upgrade means the job is unknown and maps to
    /// [`ClientError::JobGone`].
    pub async fn connect(url: &str, job_id: JobId) -> Result<Self, ClientError> {
        let (ws_stream, _response) = connect_async(url).await.map_err(|e| match e {
            tungstenite::Error::Http(response) if response.status().as_u16() == 404 => {
                ClientError::JobGone(job_id)
            }
            other => ClientError::Connection(format!("Failed to connect to {url}: {other}")),
        })?;

        tracing::info!(job_id = %job_id, "Push connection established");
        Ok(Self { job_id, ws_stream })
    }

    /// Wait for the next event that matters to the session.
    ///
    /// Cancel safe: nothing is consumed from the stream unless an event is
    /// returned.
    pub async fn next_event(&mut self) -> TransportEvent {
        loop {
            let frame = match self.ws_stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => return TransportEvent::Closed(None),
            };
            if let Some(event) = frame_to_event(frame) {
                return event;
            }
        }
    }

    /// Best-effort normal close.
    pub async fn close(mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(job_id = %self.job_id, error = %e, "Push close failed");
        }
        let drain = async { while let Some(Ok(_)) = self.ws_stream.next().await {} };
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, drain).await;
    }
}

/// Map one inbound frame. Control frames other than Close yield `None`.
pub fn frame_to_event(frame: Message) -> Option<TransportEvent> {
    match frame {
        Message::Text(text) => Some(match serde_json::from_str::<StatusMessage>(&text) {
            Ok(msg) => TransportEvent::Message(msg),
            Err(e) => TransportEvent::Error(format!("malformed status frame: {e}")),
        }),
        Message::Close(frame) => Some(match frame.map(|f| u16::from(f.code)) {
            Some(CLOSE_JOB_NOT_FOUND) => TransportEvent::JobGone,
            Some(CLOSE_PUSH_DEADLINE) => TransportEvent::DeadlineElapsed,
            code => TransportEvent::Closed(code),
        }),
        Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
