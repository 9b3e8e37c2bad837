//! Status snapshot carried by both transports, and WebSocket close codes.

use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, JobStatus};

/// Normal closure; sent after the terminal message.
pub const CLOSE_NORMAL: u16 = 1000;

/// Server shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// The push session did not reach a terminal state before its deadline.
pub const CLOSE_PUSH_DEADLINE: u16 = 4008;

/// The job was unknown, or vanished while the session was open.
pub const CLOSE_JOB_NOT_FOUND: u16 = 4404;

/// A point-in-time view of a job as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StatusMessage {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Default for StatusMessage {
    fn default() -> Self {
        Self {
            status: JobStatus::Queued,
            progress: 0,
            artifact_ref: None,
            failure_reason: None,
        }
    }
}

impl From<&JobRecord> for StatusMessage {
    fn from(job: &JobRecord) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            artifact_ref: job.artifact_ref.clone(),
            failure_reason: job.failure_reason.clone(),
        }
    }
}
