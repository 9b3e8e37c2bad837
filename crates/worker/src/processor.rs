//! Simulated job execution.
//!
//! A job's estimate is split into [`PROGRESS_STEPS`] equal intervals. After
//! each of the first nine the worker writes progress `10..=90`; after the
//! last it issues the artifact and completes the job. Every failure ends in
//! a `failed` record, never a job stuck in `processing`.

use std::sync::Arc;
use std::time::Duration;

use fetchline_core::clock::Timer;
use fetchline_core::error::CoreError;
use fetchline_core::job::{JobPatch, JobRecord};
use fetchline_core::types::JobId;
use fetchline_registry::JobRegistry;
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::issuer::ArtifactIssuer;

pub const PROGRESS_STEPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Completed,
    Failed,
    /// The job disappeared (expired) before finishing.
    Vanished,
    /// Another start request already moved the job out of `queued`.
    AlreadyStarted,
}

#[derive(Clone)]
pub struct JobWorker {
    registry: Arc<dyn JobRegistry>,
    issuer: Arc<dyn ArtifactIssuer>,
    timer: Arc<dyn Timer>,
}

impl JobWorker {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        issuer: Arc<dyn ArtifactIssuer>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        Self {
            registry,
            issuer,
            timer,
        }
    }

    /// Run the job on its own task.
    ///
    /// A panic inside the job is contained and recorded as a failure.
    pub fn spawn(&self, job_id: JobId) -> JoinHandle<WorkOutcome> {
        let worker = self.clone();
        tokio::spawn(async move {
            let inner = tokio::spawn({
                let worker = worker.clone();
                async move { worker.run(job_id).await }
            });

            match inner.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = if e.is_panic() {
                        "Worker panicked"
                    } else {
                        "Worker cancelled"
                    };
                    tracing::error!(job_id = %job_id, error = %e, "Job task aborted");
                    worker.fail(job_id, reason)
                }
            }
        })
    }

    /// Drive `job_id` to completion on the current task.
    pub async fn run(&self, job_id: JobId) -> WorkOutcome {
        let job = match self.registry.update(&job_id, JobPatch::start_processing()) {
            Ok(job) => job,
            Err(CoreError::NotFound { .. }) => return WorkOutcome::Vanished,
            Err(CoreError::Conflict(_)) => {
                tracing::debug!(job_id = %job_id, "Job already started");
                return WorkOutcome::AlreadyStarted;
            }
            Err(e) => return self.fail(job_id, &e.to_string()),
        };

        tracing::info!(
            job_id = %job_id,
            estimate_secs = job.estimated_duration_secs,
            items = job.requested_items.len(),
            "Job processing started",
        );

        match self.process(&job).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, "Job completed");
                WorkOutcome::Completed
            }
            Err(e) if e.is_vanished() => {
                tracing::debug!(job_id = %job_id, "Job vanished during processing");
                WorkOutcome::Vanished
            }
            Err(e) => self.fail(job_id, &e.to_string()),
        }
    }

    async fn process(&self, job: &JobRecord) -> Result<(), WorkerError> {
        let interval = Duration::from_secs(u64::from(job.estimated_duration_secs)) / PROGRESS_STEPS;

        for step in 1..PROGRESS_STEPS {
            self.timer.sleep(interval).await;
            let progress = (step * 100 / PROGRESS_STEPS) as u8;
            self.registry.update(&job.id, JobPatch::progress(progress))?;
            tracing::debug!(job_id = %job.id, progress, "Job progress");
        }

        self.timer.sleep(interval).await;
        let current = self
            .registry
            .get(&job.id)
            .ok_or_else(|| CoreError::job_not_found(job.id))?;
        let artifact = self.issuer.issue(&current).await?;
        self.registry.update(&job.id, JobPatch::completed(artifact))?;
        Ok(())
    }

    fn fail(&self, job_id: JobId, reason: &str) -> WorkOutcome {
        match self.registry.update(&job_id, JobPatch::failed(reason)) {
            Ok(_) => {
                tracing::warn!(job_id = %job_id, reason, "Job failed");
                WorkOutcome::Failed
            }
            Err(CoreError::NotFound { .. }) => WorkOutcome::Vanished,
            Err(e) => {
                tracing::warn!(job_id = %job_id, reason, error = %e, "Could not record job failure");
                WorkOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use fetchline_core::clock::{ManualClock, TokioTimer};
    use fetchline_core::delivery_mode::DeliveryMode;
    use fetchline_core::job::{JobStatus, NewJob};
    use fetchline_registry::{InMemoryRegistry, JobObserver, DEFAULT_RETENTION};

    use super::*;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<(JobStatus, u8)>>,
    }

    impl JobObserver for Recorder {
        fn job_updated(&self, job: &JobRecord) {
            self.progress.lock().unwrap().push((job.status, job.progress));
        }

        fn job_removed(&self, _id: &JobId) {}
    }

    struct FixedIssuer;

    #[async_trait]
    impl ArtifactIssuer for FixedIssuer {
        async fn issue(&self, job: &JobRecord) -> Result<String, WorkerError> {
            Ok(format!("https://dl.test/{}.zip", job.id))
        }
    }

    struct BrokenIssuer;

    #[async_trait]
    impl ArtifactIssuer for BrokenIssuer {
        async fn issue(&self, _job: &JobRecord) -> Result<String, WorkerError> {
            Err(WorkerError::Issuer("storage offline".into()))
        }
    }

    struct PanickingIssuer;

    #[async_trait]
    impl ArtifactIssuer for PanickingIssuer {
        async fn issue(&self, _job: &JobRecord) -> Result<String, WorkerError> {
            panic!("issuer exploded");
        }
    }

    struct Harness {
        registry: Arc<InMemoryRegistry>,
        recorder: Arc<Recorder>,
    }

    impl Harness {
        fn new() -> Self {
            let recorder = Arc::new(Recorder::default());
            let registry = Arc::new(
                InMemoryRegistry::new(Arc::new(ManualClock::starting_now()), DEFAULT_RETENTION)
                    .with_observer(recorder.clone()),
            );
            Self { registry, recorder }
        }

        fn worker(&self, issuer: impl ArtifactIssuer + 'static) -> JobWorker {
            JobWorker::new(self.registry.clone(), Arc::new(issuer), Arc::new(TokioTimer))
        }

        fn job(&self, estimate: u32) -> JobId {
            let id = JobId::new();
            self.registry
                .create(NewJob {
                    id,
                    mode: DeliveryMode::Push,
                    items: vec![1001],
                    estimated_duration_secs: estimate,
                })
                .unwrap();
            id
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_estimate_with_ten_progress_steps() {
        let h = Harness::new();
        let id = h.job(10);
        let started = tokio::time::Instant::now();

        let outcome = h.worker(FixedIssuer).spawn(id).await.unwrap();

        assert_eq!(outcome, WorkOutcome::Completed);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));

        let seen: Vec<u8> = h.recorder.progress.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(seen, vec![0, 0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

        let job = h.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.artifact_ref, Some(format!("https://dl.test/{id}.zip")));
    }

    #[tokio::test(start_paused = true)]
    async fn issuer_error_marks_job_failed() {
        let h = Harness::new();
        let id = h.job(5);

        assert_eq!(h.worker(BrokenIssuer).spawn(id).await.unwrap(), WorkOutcome::Failed);

        let job = h.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 90);
        assert!(job.failure_reason.unwrap().contains("storage offline"));
        assert!(job.artifact_ref.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn panic_is_contained_and_recorded() {
        let h = Harness::new();
        let id = h.job(1);

        assert_eq!(h.worker(PanickingIssuer).spawn(id).await.unwrap(), WorkOutcome::Failed);
        assert_eq!(h.registry.get(&id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let h = Harness::new();
        let id = h.job(10);
        let worker = h.worker(FixedIssuer);

        let first = worker.spawn(id);
        let second = worker.spawn(id);

        let mut outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        outcomes.sort_by_key(|o| *o == WorkOutcome::Completed);
        assert_eq!(outcomes, vec![WorkOutcome::AlreadyStarted, WorkOutcome::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_silently_when_job_expires() {
        let h = Harness::new();
        let id = h.job(10);
        let handle = h.worker(FixedIssuer).spawn(id);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(h.registry.expire(&id));

        assert_eq!(handle.await.unwrap(), WorkOutcome::Vanished);
        assert!(h.registry.get(&id).is_none());
        let last = *h.recorder.progress.lock().unwrap().last().unwrap();
        assert_eq!(last, (JobStatus::Processing, 30));
    }

    #[tokio::test]
    async fn unknown_job_vanishes() {
        let h = Harness::new();
        assert_matches!(
            h.worker(FixedIssuer).run(JobId::new()).await,
            WorkOutcome::Vanished
        );
    }
}
