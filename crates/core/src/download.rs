//! Request and response bodies for the download API.
//!
//! Shared by the HTTP server and the client so both sides agree on the wire
//! shape. Responses travel inside a `{ "data": ... }` envelope.

use serde::{Deserialize, Serialize};

use crate::delivery_mode::DeliveryMode;
use crate::job::{JobRecord, JobStatus};
use crate::job_events::StatusMessage;
use crate::types::{ItemId, JobId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub file_ids: Vec<ItemId>,
}

/// Outcome of negotiation. Exactly one of `websocket_url` / `polling_url`
/// is set, matching `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub job_id: JobId,
    pub mode: DeliveryMode,
    pub estimated_duration_secs: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_url: Option<String>,
    /// Pull mode: where to `POST` the job id to start processing. Status
    /// is then read from `/api/v1/download/status/{job_id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_url: Option<String>,
}

/// The job id arrives as a string so malformed values surface as a 400
/// rather than a body-deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: JobId,
    pub mode: DeliveryMode,
    pub status: JobStatus,
    pub progress: u8,
    /// 1-based position among queued jobs; only present while queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StatusResponse {
    pub fn from_record(job: &JobRecord, queue_position: Option<usize>) -> Self {
        Self {
            job_id: job.id,
            mode: job.mode,
            status: job.status,
            progress: job.progress,
            queue_position: queue_position.filter(|_| job.status == JobStatus::Queued),
            artifact_ref: job.artifact_ref.clone(),
            failure_reason: job.failure_reason.clone(),
        }
    }

    pub fn to_message(&self) -> StatusMessage {
        StatusMessage {
            status: self.status,
            progress: self.progress,
            artifact_ref: self.artifact_ref.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}
