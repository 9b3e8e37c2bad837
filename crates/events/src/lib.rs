//! Per-job change feeds.
//!
//! [`JobFeed`] observes the registry and republishes each job's latest
//! [`StatusMessage`](fetchline_core::job_events::StatusMessage) on a
//! `tokio::sync::watch` channel, so push sessions wake on change without
//! polling and never block the writer.

pub mod feed;

pub use feed::JobFeed;
