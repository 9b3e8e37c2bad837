//! Server side of the dual-transport delivery protocol.
//!
//! [`DeliveryCoordinator`] binds push sessions to a job's change feed and
//! answers polls from the registry. Both paths share one
//! [`TerminalLatch`] per job, kept by [`DeliveryLatches`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fetchline_core::delivery::{DeliverySession, TerminalLatch};
use fetchline_core::download::StatusResponse;
use fetchline_core::error::CoreError;
use fetchline_core::job::JobRecord;
use fetchline_core::job_events::StatusMessage;
use fetchline_core::types::JobId;
use fetchline_events::JobFeed;
use fetchline_registry::{JobObserver, JobRegistry};
use tokio::sync::watch;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Latches
// ---------------------------------------------------------------------------

/// One terminal latch per live job, created with the job and dropped with it.
#[derive(Default)]
pub struct DeliveryLatches {
    latches: DashMap<JobId, Arc<TerminalLatch>>,
}

impl DeliveryLatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<TerminalLatch>> {
        self.latches.get(id).map(|latch| latch.value().clone())
    }
}

impl JobObserver for DeliveryLatches {
    fn job_updated(&self, job: &JobRecord) {
        self.latches.entry(job.id).or_default();
    }

    fn job_removed(&self, id: &JobId) {
        self.latches.remove(id);
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Everything a push connection needs to serve one job.
#[derive(Debug)]
pub struct PushBinding {
    pub session: DeliverySession,
    /// Latest job snapshot; closes when the job is removed.
    pub updates: watch::Receiver<StatusMessage>,
    /// Fallback is forced at this instant.
    pub deadline: Instant,
}

pub struct DeliveryCoordinator {
    registry: Arc<dyn JobRegistry>,
    feed: Arc<JobFeed>,
    latches: Arc<DeliveryLatches>,
    push_timeout: Duration,
}

impl DeliveryCoordinator {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        feed: Arc<JobFeed>,
        latches: Arc<DeliveryLatches>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            feed,
            latches,
            push_timeout,
        }
    }

    pub fn push_timeout(&self) -> Duration {
        self.push_timeout
    }

    /// Bind a push session to `id`, arming its deadline now.
    pub fn open_push(&self, id: &JobId) -> Result<PushBinding, CoreError> {
        // Reading through the registry applies lazy expiry first.
        self.registry.get(id).ok_or_else(|| CoreError::job_not_found(id))?;

        let updates = self
            .feed
            .subscribe(id)
            .ok_or_else(|| CoreError::job_not_found(id))?;
        let latch = self
            .latches
            .get(id)
            .ok_or_else(|| CoreError::job_not_found(id))?;

        Ok(PushBinding {
            session: DeliverySession::push(latch),
            updates,
            deadline: Instant::now() + self.push_timeout,
        })
    }

    /// Current status for a poll.
    ///
    /// A terminal answer claims the job's latch so a push session still
    /// attached to the same job stays silent.
    pub fn poll(&self, id: &JobId) -> Result<StatusResponse, CoreError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| CoreError::job_not_found(id))?;

        if job.is_terminal() {
            if let Some(latch) = self.latches.get(id) {
                if latch.try_claim() {
                    tracing::debug!(job_id = %id, status = %job.status, "Terminal status served by poll");
                }
            }
        }

        let position = self.registry.queue_position(id);
        Ok(StatusResponse::from_record(&job, position))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use fetchline_core::clock::ManualClock;
    use fetchline_core::delivery::{SessionAction, TransportEvent};
    use fetchline_core::delivery_mode::DeliveryMode;
    use fetchline_core::job::{JobPatch, JobStatus, NewJob};
    use fetchline_registry::{InMemoryRegistry, DEFAULT_RETENTION};

    use super::*;

    struct Fixture {
        registry: Arc<InMemoryRegistry>,
        coordinator: DeliveryCoordinator,
    }

    fn fixture() -> Fixture {
        let feed = Arc::new(JobFeed::new());
        let latches = Arc::new(DeliveryLatches::new());
        let registry = Arc::new(
            InMemoryRegistry::new(Arc::new(ManualClock::starting_now()), DEFAULT_RETENTION)
                .with_observer(feed.clone())
                .with_observer(latches.clone()),
        );
        let coordinator = DeliveryCoordinator::new(
            registry.clone(),
            feed,
            latches,
            Duration::from_secs(90),
        );
        Fixture {
            registry,
            coordinator,
        }
    }

    fn create(registry: &InMemoryRegistry) -> JobId {
        let id = JobId::new();
        registry
            .create(NewJob {
                id,
                mode: DeliveryMode::Push,
                items: vec![1001],
                estimated_duration_secs: 1,
            })
            .unwrap();
        id
    }

    fn finish(registry: &InMemoryRegistry, id: &JobId) {
        registry.update(id, JobPatch::start_processing()).unwrap();
        registry.update(id, JobPatch::completed("https://x/a.zip")).unwrap();
    }

    #[test]
    fn unknown_job_cannot_be_bound_or_polled() {
        let f = fixture();
        assert_matches!(
            f.coordinator.open_push(&JobId::new()),
            Err(CoreError::NotFound { .. })
        );
        assert_matches!(
            f.coordinator.poll(&JobId::new()),
            Err(CoreError::NotFound { .. })
        );
    }

    #[test]
    fn poll_reports_queue_position_while_queued() {
        let f = fixture();
        let id = create(&f.registry);
        let status = f.coordinator.poll(&id).unwrap();
        assert_eq!(status.status, JobStatus::Queued);
        assert_eq!(status.queue_position, Some(1));
    }

    #[test]
    fn terminal_poll_silences_bound_push_session() {
        let f = fixture();
        let id = create(&f.registry);
        let mut binding = f.coordinator.open_push(&id).unwrap();
        binding.session.handle(TransportEvent::Opened);

        finish(&f.registry, &id);
        let polled = f.coordinator.poll(&id).unwrap();
        assert_eq!(polled.status, JobStatus::Completed);
        assert!(polled.artifact_ref.is_some());

        let latest = binding.updates.borrow_and_update().clone();
        assert_eq!(
            binding.session.handle(TransportEvent::Message(latest)),
            SessionAction::Discard
        );
    }

    #[test]
    fn push_session_wins_when_first() {
        let f = fixture();
        let id = create(&f.registry);
        let mut binding = f.coordinator.open_push(&id).unwrap();
        binding.session.handle(TransportEvent::Opened);

        finish(&f.registry, &id);
        let latest = binding.updates.borrow_and_update().clone();
        assert_matches!(
            binding.session.handle(TransportEvent::Message(latest)),
            SessionAction::Deliver(_)
        );
        // Polling still answers with the artifact.
        assert!(f.coordinator.poll(&id).unwrap().artifact_ref.is_some());
    }

    #[test]
    fn removal_drops_latch_and_feed() {
        let f = fixture();
        let id = create(&f.registry);
        let binding = f.coordinator.open_push(&id).unwrap();

        assert!(f.registry.expire(&id));
        assert!(binding.updates.has_changed().is_err());
        assert_matches!(f.coordinator.open_push(&id), Err(CoreError::NotFound { .. }));
    }
}
