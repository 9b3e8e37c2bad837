use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fetchline_core::clock::Clock;
use fetchline_core::error::CoreError;
use fetchline_core::job::{JobPatch, JobRecord, JobStatus, NewJob};
use fetchline_core::types::JobId;

use crate::{JobObserver, JobRegistry};

/// Sharded in-memory job store.
///
/// Each record lives behind its own shard lock, so updates to one job are
/// linearizable and different jobs rarely contend. Records past the
/// retention window are treated as absent on access and removed by
/// [`purge_expired`](JobRegistry::purge_expired).
pub struct InMemoryRegistry {
    jobs: DashMap<JobId, JobRecord>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    observers: Vec<Arc<dyn JobObserver>>,
}

impl InMemoryRegistry {
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            clock,
            retention,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    fn notify_updated(&self, job: &JobRecord) {
        for observer in &self.observers {
            observer.job_updated(job);
        }
    }

    fn notify_removed(&self, id: &JobId) {
        for observer in &self.observers {
            observer.job_removed(id);
        }
    }

    /// Remove `id` if it is past retention. Returns whether it was removed.
    fn remove_if_expired(&self, id: &JobId) -> bool {
        let now = self.clock.now();
        let removed = self
            .jobs
            .remove_if(id, |_, job| job.is_expired(now, self.retention))
            .is_some();
        if removed {
            tracing::debug!(job_id = %id, "Job expired");
            self.notify_removed(id);
        }
        removed
    }
}

impl JobRegistry for InMemoryRegistry {
    fn create(&self, new: NewJob) -> Result<JobRecord, CoreError> {
        let now = self.clock.now();
        let id = new.id;

        match self.jobs.entry(id) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now, self.retention) {
                    return Err(CoreError::Conflict(format!("Job {id} already exists")));
                }
                // Reuse of a stale slot: report the old one as gone first.
                self.notify_removed(&id);
                let record = JobRecord::new(new, now);
                occupied.insert(record.clone());
                self.notify_updated(&record);
                Ok(record)
            }
            Entry::Vacant(vacant) => {
                let record = JobRecord::new(new, now);
                let stored = vacant.insert(record.clone());
                self.notify_updated(&stored);
                tracing::debug!(
                    job_id = %id,
                    mode = %record.mode,
                    estimate_secs = record.estimated_duration_secs,
                    "Job created",
                );
                Ok(record)
            }
        }
    }

    fn get(&self, id: &JobId) -> Option<JobRecord> {
        let now = self.clock.now();
        let job = self.jobs.get(id).map(|entry| entry.value().clone())?;
        if job.is_expired(now, self.retention) {
            self.remove_if_expired(id);
            return None;
        }
        Some(job)
    }

    fn update(&self, id: &JobId, patch: JobPatch) -> Result<JobRecord, CoreError> {
        let now = self.clock.now();
        {
            let Some(mut entry) = self.jobs.get_mut(id) else {
                return Err(CoreError::job_not_found(id));
            };

            if !entry.is_expired(now, self.retention) {
                let next = entry.apply(&patch, now)?;
                *entry = next.clone();
                self.notify_updated(&entry);
                return Ok(next);
            }
        }

        self.remove_if_expired(id);
        Err(CoreError::job_not_found(id))
    }

    fn expire(&self, id: &JobId) -> bool {
        let removed = self.jobs.remove(id).is_some();
        if removed {
            tracing::info!(job_id = %id, "Job expired");
            self.notify_removed(id);
        }
        removed
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| entry.is_expired(now, self.retention))
            .map(|entry| *entry.key())
            .collect();

        stale
            .iter()
            .filter(|id| self.remove_if_expired(id))
            .count()
    }

    fn queue_position(&self, id: &JobId) -> Option<usize> {
        let target = self.get(id)?;
        if target.status != JobStatus::Queued {
            return None;
        }

        let now = self.clock.now();
        let ahead = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.status == JobStatus::Queued
                    && !job.is_expired(now, self.retention)
                    && (job.created_at, job.id) < (target.created_at, target.id)
            })
            .count();

        Some(ahead + 1)
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use fetchline_core::clock::ManualClock;
    use fetchline_core::delivery_mode::DeliveryMode;

    use super::*;
    use crate::DEFAULT_RETENTION;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl JobObserver for Recorder {
        fn job_updated(&self, job: &JobRecord) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}", job.status, job.progress));
        }

        fn job_removed(&self, id: &JobId) {
            self.events.lock().unwrap().push(format!("removed:{id}"));
        }
    }

    fn new_job() -> NewJob {
        NewJob {
            id: JobId::new(),
            mode: DeliveryMode::Push,
            items: vec![1001],
            estimated_duration_secs: 1,
        }
    }

    fn setup() -> (Arc<ManualClock>, Arc<Recorder>, InMemoryRegistry) {
        let clock = Arc::new(ManualClock::starting_now());
        let recorder = Arc::new(Recorder::default());
        let registry = InMemoryRegistry::new(clock.clone(), DEFAULT_RETENTION)
            .with_observer(recorder.clone());
        (clock, recorder, registry)
    }

    #[test]
    fn create_then_get() {
        let (_, _, registry) = setup();
        let job = registry.create(new_job()).unwrap();
        assert_eq!(registry.get(&job.id), Some(job));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_id_is_a_conflict() {
        let (_, _, registry) = setup();
        let new = new_job();
        registry.create(new.clone()).unwrap();
        assert_matches!(registry.create(new), Err(CoreError::Conflict(_)));
    }

    #[test]
    fn update_unknown_is_not_found() {
        let (_, _, registry) = setup();
        assert_matches!(
            registry.update(&JobId::new(), JobPatch::start_processing()),
            Err(CoreError::NotFound { .. })
        );
    }

    #[test]
    fn rejected_update_keeps_record_and_skips_observers() {
        let (_, recorder, registry) = setup();
        let job = registry.create(new_job()).unwrap();

        assert_matches!(
            registry.update(&job.id, JobPatch::completed("u")),
            Err(CoreError::Conflict(_))
        );
        assert_eq!(registry.get(&job.id).unwrap().status, JobStatus::Queued);
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[test]
    fn observers_see_updates_in_order() {
        let (_, recorder, registry) = setup();
        let job = registry.create(new_job()).unwrap();
        registry.update(&job.id, JobPatch::start_processing()).unwrap();
        registry.update(&job.id, JobPatch::progress(50)).unwrap();
        registry.update(&job.id, JobPatch::completed("u")).unwrap();

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["queued:0", "processing:0", "processing:50", "completed:100"]
        );
    }

    #[test]
    fn record_vanishes_exactly_at_retention() {
        let (clock, recorder, registry) = setup();
        let job = registry.create(new_job()).unwrap();

        clock.advance(DEFAULT_RETENTION - Duration::from_millis(1));
        assert!(registry.get(&job.id).is_some());

        clock.advance(Duration::from_millis(1));
        assert!(registry.get(&job.id).is_none());
        assert_eq!(registry.len(), 0);
        assert!(recorder
            .events
            .lock()
            .unwrap()
            .contains(&format!("removed:{}", job.id)));
    }

    #[test]
    fn completed_jobs_expire_too() {
        let (clock, _, registry) = setup();
        let job = registry.create(new_job()).unwrap();
        registry.update(&job.id, JobPatch::start_processing()).unwrap();
        registry.update(&job.id, JobPatch::completed("u")).unwrap();

        clock.advance(DEFAULT_RETENTION);
        assert_matches!(
            registry.update(&job.id, JobPatch::progress(1)),
            Err(CoreError::NotFound { .. })
        );
    }

    #[test]
    fn purge_removes_only_stale_records() {
        let (clock, _, registry) = setup();
        let old = registry.create(new_job()).unwrap();
        clock.advance(Duration::from_secs(1800));
        let fresh = registry.create(new_job()).unwrap();
        clock.advance(Duration::from_secs(1800));

        assert_eq!(registry.purge_expired(), 1);
        assert!(registry.get(&old.id).is_none());
        assert!(registry.get(&fresh.id).is_some());
        assert_eq!(registry.purge_expired(), 0);
    }

    #[test]
    fn expire_is_idempotent() {
        let (_, recorder, registry) = setup();
        let job = registry.create(new_job()).unwrap();
        assert!(registry.expire(&job.id));
        assert!(!registry.expire(&job.id));
        let removals = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with("removed:"))
            .count();
        assert_eq!(removals, 1);
    }

    #[test]
    fn queue_position_counts_older_queued_jobs() {
        let (clock, _, registry) = setup();
        let first = registry.create(new_job()).unwrap();
        clock.advance(Duration::from_secs(1));
        let second = registry.create(new_job()).unwrap();
        clock.advance(Duration::from_secs(1));
        let third = registry.create(new_job()).unwrap();

        assert_eq!(registry.queue_position(&first.id), Some(1));
        assert_eq!(registry.queue_position(&third.id), Some(3));

        registry.update(&first.id, JobPatch::start_processing()).unwrap();
        assert_eq!(registry.queue_position(&first.id), None);
        assert_eq!(registry.queue_position(&second.id), Some(1));
        assert_eq!(registry.queue_position(&third.id), Some(2));
    }

    #[test]
    fn concurrent_progress_updates_stay_monotonic() {
        let (_, _, registry) = setup();
        let registry = Arc::new(registry);
        let job = registry.create(new_job()).unwrap();
        registry.update(&job.id, JobPatch::start_processing()).unwrap();

        std::thread::scope(|scope| {
            for p in 1..=50u8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    // Lower values may be rejected; that is the point.
                    let _ = registry.update(&job.id, JobPatch::progress(p));
                });
            }
        });

        let progress = registry.get(&job.id).unwrap().progress;
        assert!((1..=50).contains(&progress));
        assert_matches!(
            registry.update(&job.id, JobPatch::progress(progress - 1)),
            Err(CoreError::Conflict(_))
        );
    }
}
