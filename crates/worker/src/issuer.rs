//! Artifact locators for completed jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fetchline_core::clock::Clock;
use fetchline_core::job::JobRecord;
use fetchline_core::types::JobId;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WorkerError;

/// Produces the retrieval locator for a finished job.
#[async_trait]
pub trait ArtifactIssuer: Send + Sync {
    async fn issue(&self, job: &JobRecord) -> Result<String, WorkerError>;
}

// ---------------------------------------------------------------------------
// Signed URLs
// ---------------------------------------------------------------------------

type HmacSha256 = Hmac<Sha256>;

/// Issues time-limited signed download URLs of the form
/// `{base}/{job_id}.zip?expires={unix}&token={hex}`.
///
/// The token is HMAC-SHA256 over `"{job_id}:{expires}"`.
pub struct HmacArtifactIssuer {
    base_url: String,
    secret: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl HmacArtifactIssuer {
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.into(),
            ttl,
            clock,
        }
    }

    fn mac(&self, job_id: &JobId, expires: i64) -> Result<HmacSha256, WorkerError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| WorkerError::Issuer(e.to_string()))?;
        mac.update(format!("{job_id}:{expires}").as_bytes());
        Ok(mac)
    }

    /// Hex token for `job_id` valid until the unix time `expires`.
    pub fn sign(&self, job_id: &JobId, expires: i64) -> Result<String, WorkerError> {
        Ok(hex::encode(self.mac(job_id, expires)?.finalize().into_bytes()))
    }

    /// Check a token issued by [`sign`](Self::sign) and that it has not
    /// expired.
    pub fn verify(&self, job_id: &JobId, expires: i64, token: &str) -> bool {
        if self.clock.now().timestamp() >= expires {
            return false;
        }
        let Some(expected) = hex::decode(token) else {
            return false;
        };
        match self.mac(job_id, expires) {
            Ok(mac) => mac.verify_slice(&expected).is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ArtifactIssuer for HmacArtifactIssuer {
    async fn issue(&self, job: &JobRecord) -> Result<String, WorkerError> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = self.clock.now().timestamp().saturating_add(ttl);
        let token = self.sign(&job.id, expires)?;
        Ok(format!(
            "{}/{}.zip?expires={expires}&token={token}",
            self.base_url, job.id
        ))
    }
}

// ---------------------------------------------------------------------------
// hex encoding helper (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}
