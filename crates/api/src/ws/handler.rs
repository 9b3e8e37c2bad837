use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use fetchline_core::delivery::{FallbackReason, SessionAction, SessionPhase, TransportEvent};
use fetchline_core::job_events::{CLOSE_JOB_NOT_FOUND, CLOSE_NORMAL, CLOSE_PUSH_DEADLINE};
use fetchline_core::types::JobId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::delivery::PushBinding;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// How long to wait for queued frames to flush after a session ends.
const FLUSH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct PushQuery {
    pub job_id: Option<String>,
}

/// GET /api/v1/download/ws?job_id=...
///
/// Unknown or malformed ids are rejected before the upgrade, so clients see
/// a plain HTTP error rather than an open-then-close socket.
pub async fn download_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<PushQuery>,
) -> AppResult<impl IntoResponse> {
    let raw = query
        .job_id
        .ok_or_else(|| AppError::BadRequest("Missing job_id query parameter".into()))?;
    let job_id = JobId::parse(&raw)?;
    let binding = state.delivery.open_push(&job_id)?;

    Ok(ws.on_upgrade(move |socket| run_push_session(socket, state, job_id, binding)))
}

/// What the session loop decided to do with the socket.
enum SessionEnd {
    /// Send a Close frame with this code and reason.
    Close(u16, &'static str),
    /// The peer is already gone.
    Dropped,
}

/// Serve one job over an upgraded socket until the session finishes.
///
/// Waits on three sources: job feed changes, inbound frames, and the push
/// deadline. Every event goes through the session state machine.
async fn run_push_session(socket: WebSocket, state: AppState, job_id: JobId, binding: PushBinding) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let ws_manager = state.ws_manager;
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "Push session opened");

    let mut rx = ws_manager.add(conn_id.clone(), job_id).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let PushBinding {
        mut session,
        mut updates,
        deadline,
    } = binding;

    session.handle(TransportEvent::Opened);

    // Current snapshot first, so late subscribers start from the present.
    let snapshot = updates.borrow_and_update().clone();
    let mut end = dispatch(
        &ws_manager,
        &conn_id,
        session.handle(TransportEvent::Message(snapshot)),
        session.phase(),
    )
    .await;

    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    while end.is_none() {
        let event = tokio::select! {
            changed = updates.changed() => match changed {
                Ok(()) => Some(TransportEvent::Message(updates.borrow_and_update().clone())),
                Err(_) => Some(TransportEvent::JobGone),
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(frame))) => {
                    Some(TransportEvent::Closed(frame.map(|f| f.code)))
                }
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                    None
                }
                Some(Ok(_)) => None,
                Some(Err(e)) => Some(TransportEvent::Error(e.to_string())),
                None => Some(TransportEvent::Closed(None)),
            },
            () = &mut deadline => Some(TransportEvent::DeadlineElapsed),
        };

        let Some(event) = event else { continue };
        let action = session.handle(event);
        end = dispatch(&ws_manager, &conn_id, action, session.phase()).await;
    }

    if let Some(SessionEnd::Close(code, reason)) = end {
        ws_manager
            .send(
                &conn_id,
                Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
            )
            .await;
    }

    // Dropping the sender lets the send task drain what is queued and exit.
    ws_manager.remove(&conn_id).await;
    if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "Timed out flushing WebSocket frames");
    }
    tracing::info!(conn_id = %conn_id, job_id = %job_id, "Push session closed");
}

/// Turn a session action into outbound frames. Returns how the session
/// ends, or `None` to keep going.
async fn dispatch(
    ws_manager: &crate::ws::WsManager,
    conn_id: &str,
    action: SessionAction,
    phase: SessionPhase,
) -> Option<SessionEnd> {
    match action {
        SessionAction::Forward(msg) => {
            ws_manager.send_json(conn_id, &msg).await;
            None
        }
        SessionAction::Deliver(msg) => {
            ws_manager.send_json(conn_id, &msg).await;
            Some(SessionEnd::Close(CLOSE_NORMAL, "job finished"))
        }
        // Terminal state already served elsewhere.
        SessionAction::Discard if phase == SessionPhase::Delivered => {
            Some(SessionEnd::Close(CLOSE_NORMAL, "job finished"))
        }
        SessionAction::Discard => None,
        SessionAction::FallBack(FallbackReason::DeadlineElapsed) => {
            tracing::info!(conn_id, "Push deadline elapsed, client should poll");
            Some(SessionEnd::Close(CLOSE_PUSH_DEADLINE, "push deadline elapsed"))
        }
        SessionAction::FallBack(reason) => {
            tracing::debug!(conn_id, reason = %reason, "Push session ended by client");
            Some(SessionEnd::Dropped)
        }
        SessionAction::Abort => Some(SessionEnd::Close(CLOSE_JOB_NOT_FOUND, "job not found")),
    }
}
