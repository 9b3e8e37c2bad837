//! Job record, lifecycle states, and the rules for mutating a record.
//!
//! Every mutation goes through [`JobRecord::apply`], which validates a
//! [`JobPatch`] against the lifecycle before producing the next record:
//!
//! ```text
//! queued -> processing -> completed
//!                      -> failed
//! queued -> failed
//! ```
//!
//! Terminal records are frozen. Progress never decreases while processing,
//! and reaches 100 only together with `completed`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery_mode::DeliveryMode;
use crate::error::CoreError;
use crate::types::{ItemId, JobId, Timestamp};

/// Progress value reserved for a completed job.
pub const PROGRESS_COMPLETE: u8 = 100;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub mode: DeliveryMode,
    pub items: Vec<ItemId>,
    pub estimated_duration_secs: u32,
}

/// Authoritative state of one accepted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub mode: DeliveryMode,
    pub status: JobStatus,
    /// Percent complete, 0-100.
    pub progress: u8,
    pub requested_items: Vec<ItemId>,
    pub estimated_duration_secs: u32,
    /// Retrieval locator, present only once `completed`.
    pub artifact_ref: Option<String>,
    /// Human-readable failure, present only once `failed`.
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// A freshly queued record with zero progress.
    pub fn new(new: NewJob, now: Timestamp) -> Self {
        Self {
            id: new.id,
            mode: new.mode,
            status: JobStatus::Queued,
            progress: 0,
            requested_items: new.items,
            estimated_duration_secs: new.estimated_duration_secs,
            artifact_ref: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the retention window measured from `created_at` has elapsed.
    pub fn is_expired(&self, now: Timestamp, retention: Duration) -> bool {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        match self.created_at.checked_add_signed(retention) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Produce the record that results from applying `patch`.
    ///
    /// Returns [`CoreError::Conflict`] when the patch would break the
    /// lifecycle, and [`CoreError::Validation`] for out-of-range values.
    /// `self` is never modified.
    pub fn apply(&self, patch: &JobPatch, now: Timestamp) -> Result<JobRecord, CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.id, self.status
            )));
        }

        let status = match patch.status {
            Some(next) if next == self.status => {
                return Err(CoreError::Conflict(format!(
                    "Job {} is already {}",
                    self.id, self.status
                )));
            }
            Some(next) if !self.status.can_transition_to(next) => {
                return Err(CoreError::Conflict(format!(
                    "Job {} cannot move from {} to {}",
                    self.id, self.status, next
                )));
            }
            Some(next) => next,
            None => self.status,
        };

        let progress = patch.progress.unwrap_or(self.progress);
        if progress > PROGRESS_COMPLETE {
            return Err(CoreError::Validation(format!(
                "Progress must be between 0 and {PROGRESS_COMPLETE}, got {progress}"
            )));
        }

        if patch.artifact_ref.is_some() && status != JobStatus::Completed {
            return Err(CoreError::Conflict(
                "An artifact reference can only be set on completion".to_string(),
            ));
        }
        if patch.failure_reason.is_some() && status != JobStatus::Failed {
            return Err(CoreError::Conflict(
                "A failure reason can only be set on failure".to_string(),
            ));
        }

        match status {
            JobStatus::Queued if progress != 0 => {
                return Err(CoreError::Conflict(
                    "A queued job cannot report progress".to_string(),
                ));
            }
            JobStatus::Processing => {
                if progress == PROGRESS_COMPLETE {
                    return Err(CoreError::Conflict(
                        "Progress 100 is reserved for completion".to_string(),
                    ));
                }
                // Entering processing resets progress; afterwards it only grows.
                if self.status == JobStatus::Processing && progress < self.progress {
                    return Err(CoreError::Conflict(format!(
                        "Progress cannot go backwards ({} -> {progress})",
                        self.progress
                    )));
                }
            }
            JobStatus::Completed => {
                if progress != PROGRESS_COMPLETE {
                    return Err(CoreError::Conflict(
                        "A completed job must report progress 100".to_string(),
                    ));
                }
                if patch.artifact_ref.is_none() {
                    return Err(CoreError::Conflict(
                        "Completion requires an artifact reference".to_string(),
                    ));
                }
            }
            JobStatus::Failed => {
                if patch.failure_reason.is_none() {
                    return Err(CoreError::Conflict(
                        "Failure requires a reason".to_string(),
                    ));
                }
                if progress == PROGRESS_COMPLETE {
                    return Err(CoreError::Conflict(
                        "A failed job cannot report progress 100".to_string(),
                    ));
                }
            }
            JobStatus::Queued => {}
        }

        Ok(JobRecord {
            status,
            progress,
            artifact_ref: patch.artifact_ref.clone().or_else(|| self.artifact_ref.clone()),
            failure_reason: patch
                .failure_reason
                .clone()
                .or_else(|| self.failure_reason.clone()),
            updated_at: now,
            ..self.clone()
        })
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub artifact_ref: Option<String>,
    pub failure_reason: Option<String>,
}

impl JobPatch {
    /// `queued -> processing`, progress reset to 0.
    pub fn start_processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(0),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Terminal success: progress forced to 100 and the artifact recorded.
    pub fn completed(artifact_ref: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(PROGRESS_COMPLETE),
            artifact_ref: Some(artifact_ref.into()),
            ..Default::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
