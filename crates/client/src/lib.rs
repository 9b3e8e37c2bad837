//! Reference client for the download API.
//!
//! [`DownloadDriver`] negotiates a job, follows it over push or pull,
//! falls back to polling when the push transport gives up, and runs the
//! caller's terminal action exactly once.

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod push;

pub use api::DownloadApi;
pub use config::ClientConfig;
pub use driver::{DeliveryOutcome, DeliveryReport, DownloadDriver};
pub use error::ClientError;
