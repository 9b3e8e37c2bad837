//! Job registry: the single source of truth for job state.
//!
//! [`JobRegistry`] is the injectable seam; [`InMemoryRegistry`] is the
//! production implementation. Every successful mutation is reported to the
//! registered [`JobObserver`]s.

mod memory;

use std::time::Duration;

use fetchline_core::error::CoreError;
use fetchline_core::job::{JobPatch, JobRecord, NewJob};
use fetchline_core::types::JobId;

pub use memory::InMemoryRegistry;

/// Records are removed this long after creation, whatever their status.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Receives registry changes.
///
/// Callbacks run synchronously inside the registry, in update order, while
/// the record is locked. Implementations must be quick and must not call
/// back into the registry.
pub trait JobObserver: Send + Sync {
    /// A record was created or updated.
    fn job_updated(&self, job: &JobRecord);

    /// A record was removed (expired).
    fn job_removed(&self, id: &JobId);
}

pub trait JobRegistry: Send + Sync {
    /// Insert a new queued record. Conflicts if the id is taken.
    fn create(&self, new: NewJob) -> Result<JobRecord, CoreError>;

    /// Current record, or `None` if unknown or expired.
    fn get(&self, id: &JobId) -> Option<JobRecord>;

    /// Apply `patch` atomically and return the new record.
    fn update(&self, id: &JobId, patch: JobPatch) -> Result<JobRecord, CoreError>;

    /// Remove a record now. Returns whether it existed.
    fn expire(&self, id: &JobId) -> bool;

    /// Remove every record past its retention window. Returns how many.
    fn purge_expired(&self) -> usize;

    /// 1-based position among queued jobs ordered by creation time.
    fn queue_position(&self, id: &JobId) -> Option<usize>;

    /// Number of records currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
