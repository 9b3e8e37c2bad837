//! Latest-value broadcast of job status, one `watch` channel per job.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fetchline_core::job::JobRecord;
use fetchline_core::job_events::StatusMessage;
use fetchline_core::types::JobId;
use fetchline_registry::JobObserver;
use tokio::sync::watch;

/// Fan-out of job snapshots to any number of subscribers.
///
/// Slow subscribers only ever see the newest snapshot; intermediate values
/// are coalesced. Removing a job drops its sender, which wakes every
/// subscriber with a closed-channel error.
#[derive(Default)]
pub struct JobFeed {
    channels: DashMap<JobId, watch::Sender<StatusMessage>>,
}

impl JobFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver positioned at the current snapshot, or `None` if the job is
    /// unknown or already removed.
    pub fn subscribe(&self, id: &JobId) -> Option<watch::Receiver<StatusMessage>> {
        self.channels.get(id).map(|tx| tx.subscribe())
    }

    /// Number of jobs with a live channel.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl JobObserver for JobFeed {
    fn job_updated(&self, job: &JobRecord) {
        let msg = StatusMessage::from(job);
        match self.channels.entry(job.id) {
            Entry::Occupied(entry) => {
                entry.get().send_replace(msg);
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = watch::channel(msg);
                entry.insert(tx);
            }
        }
    }

    fn job_removed(&self, id: &JobId) {
        if self.channels.remove(id).is_some() {
            tracing::debug!(job_id = %id, "Job feed closed");
        }
    }
}
