//! End-to-end download flow: estimate, follow the job over push or pull,
//! fall back to polling, run the terminal action once.

use std::sync::Arc;

use fetchline_core::delivery::{
    DeliverySession, FallbackReason, SessionAction, SessionPhase, TerminalLatch, Transport,
    TransportEvent,
};
use fetchline_core::delivery_mode::DeliveryMode;
use fetchline_core::job_events::StatusMessage;
use fetchline_core::types::{ItemId, JobId};

use crate::api::DownloadApi;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::push::PushConnection;

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// The terminal message this run handed to the terminal action.
    Delivered(StatusMessage),
    /// Some other holder of the latch already ran the terminal action.
    AlreadyDelivered,
    /// The job expired or was never known to the server.
    JobGone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub job_id: JobId,
    /// Mode chosen at negotiation. Unchanged by fallback.
    pub mode: DeliveryMode,
    /// Why push was abandoned, if it was.
    pub fell_back: Option<FallbackReason>,
    pub outcome: DeliveryOutcome,
}

/// Drives one download from negotiation to its terminal state.
pub struct DownloadDriver {
    api: DownloadApi,
    config: ClientConfig,
}

/// How one transport phase ended.
enum Step {
    Finished(DeliveryOutcome),
    FellBack(FallbackReason),
}

impl DownloadDriver {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            api: DownloadApi::new(config.base_url.clone()),
            config,
        }
    }

    /// Negotiate a job for `file_ids` and follow it to the end.
    ///
    /// `on_update` sees every non-terminal status with the transport it came
    /// over. `on_terminal` runs at most once, with the completed or failed
    /// status.
    pub async fn run<U, T>(
        &self,
        file_ids: &[ItemId],
        on_update: U,
        on_terminal: T,
    ) -> Result<DeliveryReport, ClientError>
    where
        U: FnMut(Transport, &StatusMessage),
        T: FnOnce(&StatusMessage),
    {
        let negotiated = self.api.estimate(file_ids).await?;
        tracing::info!(
            job_id = %negotiated.job_id,
            mode = %negotiated.mode,
            estimated_duration_secs = negotiated.estimated_duration_secs,
            "Download negotiated",
        );

        let latch = Arc::new(TerminalLatch::new());
        self.follow(
            negotiated.job_id,
            negotiated.mode,
            negotiated.websocket_url.as_deref(),
            latch,
            on_update,
            on_terminal,
        )
        .await
    }

    /// Follow an already negotiated job, sharing `latch` with any other
    /// transport serving the same job for this client.
    ///
    /// `websocket_url` may be a path on the server or an absolute `ws://` /
    /// `wss://` URL.
    pub async fn follow<U, T>(
        &self,
        job_id: JobId,
        mode: DeliveryMode,
        websocket_url: Option<&str>,
        latch: Arc<TerminalLatch>,
        mut on_update: U,
        on_terminal: T,
    ) -> Result<DeliveryReport, ClientError>
    where
        U: FnMut(Transport, &StatusMessage),
        T: FnOnce(&StatusMessage),
    {
        let mut on_terminal = Some(on_terminal);
        let report = |fell_back: Option<FallbackReason>, outcome: DeliveryOutcome| DeliveryReport {
            job_id,
            mode,
            fell_back,
            outcome,
        };

        let mut session = match mode {
            DeliveryMode::Push => DeliverySession::push(latch),
            DeliveryMode::Pull => DeliverySession::pull(latch),
        };

        let mut fell_back = None;
        if mode == DeliveryMode::Push {
            let url = match websocket_url {
                Some(url) if url.starts_with("ws://") || url.starts_with("wss://") => {
                    url.to_string()
                }
                Some(path) => format!("{}{path}", self.config.ws_base_url()),
                None => format!(
                    "{}/api/v1/download/ws?job_id={job_id}",
                    self.config.ws_base_url()
                ),
            };

            match self
                .push_phase(&url, job_id, &mut session, &mut on_update, &mut on_terminal)
                .await
            {
                Step::Finished(outcome) => return Ok(report(None, outcome)),
                Step::FellBack(reason) => {
                    tracing::info!(job_id = %job_id, reason = %reason, "Falling back to polling");
                    session.resume_with_pull();
                    fell_back = Some(reason);
                }
            }
        } else {
            match self.api.initiate(&job_id).await {
                Ok(accepted) => {
                    tracing::debug!(job_id = %job_id, status = %accepted.status, "Job initiated");
                }
                Err(e) if e.is_not_found() => {
                    return Ok(report(None, DeliveryOutcome::JobGone));
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = self
            .pull_phase(job_id, &mut session, &mut on_update, &mut on_terminal)
            .await;
        Ok(report(fell_back, outcome))
    }

    async fn push_phase<U, T>(
        &self,
        url: &str,
        job_id: JobId,
        session: &mut DeliverySession,
        on_update: &mut U,
        on_terminal: &mut Option<T>,
    ) -> Step
    where
        U: FnMut(Transport, &StatusMessage),
        T: FnOnce(&StatusMessage),
    {
        let deadline = tokio::time::sleep(self.config.push_timeout);
        tokio::pin!(deadline);

        // The handshake counts against the deadline too.
        let connected = tokio::select! {
            result = PushConnection::connect(url, job_id) => result,
            () = &mut deadline => {
                tracing::warn!(job_id = %job_id, "Push handshake did not finish before the deadline");
                return match session.handle(TransportEvent::DeadlineElapsed) {
                    SessionAction::FallBack(reason) => Step::FellBack(reason),
                    _ => Step::FellBack(FallbackReason::DeadlineElapsed),
                };
            }
        };

        let mut conn = match connected {
            Ok(conn) => Some(conn),
            Err(ClientError::JobGone(_)) => {
                session.handle(TransportEvent::JobGone);
                return Step::Finished(DeliveryOutcome::JobGone);
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Push connection failed");
                None
            }
        };

        let mut pending = match conn {
            Some(_) => TransportEvent::Opened,
            None => TransportEvent::Error("connection failed".to_string()),
        };

        loop {
            let action = session.handle(pending);
            if let Some(step) = apply(Transport::Push, session, action, on_update, on_terminal) {
                if let Some(conn) = conn.take() {
                    conn.close().await;
                }
                return step;
            }

            // `apply` returns a step whenever the connection is missing.
            let Some(live) = conn.as_mut() else {
                return Step::FellBack(FallbackReason::TransportError(
                    "connection failed".to_string(),
                ));
            };

            pending = tokio::select! {
                event = live.next_event() => event,
                () = &mut deadline => TransportEvent::DeadlineElapsed,
            };
        }
    }

    async fn pull_phase<U, T>(
        &self,
        job_id: JobId,
        session: &mut DeliverySession,
        on_update: &mut U,
        on_terminal: &mut Option<T>,
    ) -> DeliveryOutcome
    where
        U: FnMut(Transport, &StatusMessage),
        T: FnOnce(&StatusMessage),
    {
        loop {
            let event = match self.api.status(&job_id).await {
                Ok(status) => TransportEvent::Message(status.to_message()),
                Err(e) if e.is_not_found() => TransportEvent::JobGone,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Status poll failed, retrying");
                    TransportEvent::Error(e.to_string())
                }
            };

            let action = session.handle(event);
            match apply(Transport::Pull, session, action, on_update, on_terminal) {
                Some(Step::Finished(outcome)) => return outcome,
                Some(Step::FellBack(_)) | None => {}
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// Run the caller's side of one session action.
fn apply<U, T>(
    transport: Transport,
    session: &DeliverySession,
    action: SessionAction,
    on_update: &mut U,
    on_terminal: &mut Option<T>,
) -> Option<Step>
where
    U: FnMut(Transport, &StatusMessage),
    T: FnOnce(&StatusMessage),
{
    match action {
        SessionAction::Forward(msg) => {
            on_update(transport, &msg);
            None
        }
        SessionAction::Deliver(msg) => {
            if let Some(terminal) = on_terminal.take() {
                terminal(&msg);
            }
            Some(Step::Finished(DeliveryOutcome::Delivered(msg)))
        }
        SessionAction::FallBack(reason) => Some(Step::FellBack(reason)),
        SessionAction::Abort => Some(Step::Finished(DeliveryOutcome::JobGone)),
        SessionAction::Discard => match session.phase() {
            SessionPhase::Delivered => Some(Step::Finished(DeliveryOutcome::AlreadyDelivered)),
            SessionPhase::Aborted => Some(Step::Finished(DeliveryOutcome::JobGone)),
            _ => None,
        },
    }
}
