//! Background job execution.
//!
//! [`JobWorker`] drives a job from `queued` to a terminal state, reporting
//! progress through the registry. The finished artifact's locator comes from
//! an [`ArtifactIssuer`].

pub mod error;
pub mod issuer;
pub mod processor;

pub use error::WorkerError;
pub use issuer::{ArtifactIssuer, HmacArtifactIssuer};
pub use processor::{JobWorker, WorkOutcome, PROGRESS_STEPS};
