//! REST calls against `/api/v1/download`.

use fetchline_core::download::{
    EstimateRequest, EstimateResponse, InitiateRequest, InitiateResponse, StatusResponse,
};
use fetchline_core::types::{ItemId, JobId};
use serde::Deserialize;

use crate::error::ClientError;

/// The `{ "data": ... }` envelope every success response arrives in.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// HTTP client for one download server.
#[derive(Clone)]
pub struct DownloadApi {
    client: reqwest::Client,
    base_url: String,
}

impl DownloadApi {
    /// * `base_url` - server root, e.g. `http://host:3000`.
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// `POST /api/v1/download/estimate`
    pub async fn estimate(&self, file_ids: &[ItemId]) -> Result<EstimateResponse, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/v1/download/estimate", self.base_url))
            .json(&EstimateRequest {
                file_ids: file_ids.to_vec(),
            })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /api/v1/download/initiate`. Safe to repeat.
    pub async fn initiate(&self, job_id: &JobId) -> Result<InitiateResponse, ClientError> {
        let response = self
            .client
            .post(format!("{}/api/v1/download/initiate", self.base_url))
            .json(&InitiateRequest {
                job_id: job_id.to_string(),
            })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/v1/download/status/{job_id}`
    pub async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ClientError> {
        let response = self
            .client
            .get(format!("{}/api/v1/download/status/{job_id}", self.base_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Envelope<T>>().await?.data)
    }
}
