//! Handlers for the `/download` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use fetchline_core::delivery_mode::{select_mode, DeliveryMode};
use fetchline_core::download::{EstimateRequest, EstimateResponse, InitiateRequest, InitiateResponse};
use fetchline_core::error::CoreError;
use fetchline_core::estimation::{estimate_duration, validate_item_ids};
use fetchline_core::job::{JobStatus, NewJob};
use fetchline_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Unwrap a JSON body, reporting malformed input as a 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// POST /api/v1/download/estimate
///
/// Estimate the bundle, pick a transport, and create the job. Push jobs
/// start processing immediately; pull jobs wait for `initiate`.
pub async fn estimate(
    State(state): State<AppState>,
    payload: Result<Json<EstimateRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let input = json_body(payload)?;
    validate_item_ids(&input.file_ids)?;

    let estimated_duration_secs = estimate_duration(&input.file_ids, state.sizes.as_ref())?;
    let mode = select_mode(estimated_duration_secs);

    let job = state.registry.create(NewJob {
        id: JobId::new(),
        mode,
        items: input.file_ids,
        estimated_duration_secs,
    })?;

    tracing::info!(
        job_id = %job.id,
        mode = %mode,
        estimate_secs = estimated_duration_secs,
        items = job.requested_items.len(),
        "Download negotiated",
    );

    if mode == DeliveryMode::Push {
        state.worker.spawn(job.id);
    }

    let (websocket_url, polling_url) = match mode {
        DeliveryMode::Push => (Some(format!("/api/v1/download/ws?job_id={}", job.id)), None),
        DeliveryMode::Pull => (None, Some("/api/v1/download/initiate".to_string())),
    };

    Ok(Json(DataResponse {
        data: EstimateResponse {
            job_id: job.id,
            mode,
            estimated_duration_secs,
            websocket_url,
            polling_url,
        },
    }))
}

// ---------------------------------------------------------------------------
// Initiate
// ---------------------------------------------------------------------------

/// POST /api/v1/download/initiate
///
/// Start processing a negotiated job. Repeated calls are accepted and do
/// not restart the job.
pub async fn initiate(
    State(state): State<AppState>,
    payload: Result<Json<InitiateRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let input = json_body(payload)?;
    let job_id = JobId::parse(&input.job_id)?;

    let job = state
        .registry
        .get(&job_id)
        .ok_or_else(|| CoreError::job_not_found(job_id))?;

    if job.status == JobStatus::Queued {
        state.worker.spawn(job.id);
        tracing::info!(job_id = %job.id, "Download initiated");
    } else {
        tracing::debug!(job_id = %job.id, status = %job.status, "Initiate on started job ignored");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: InitiateResponse {
                job_id: job.id,
                status: job.status,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/download/status/{job_id}
pub async fn status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job_id = JobId::parse(&raw_id)?;
    let status = state.delivery.poll(&job_id)?;
    Ok(Json(DataResponse { data: status }))
}
