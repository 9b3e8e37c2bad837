//! Transport mode selection from an estimated duration.

use serde::{Deserialize, Serialize};

/// Estimates strictly below this many seconds are delivered over push.
pub const PUSH_THRESHOLD_SECS: u32 = 60;

/// How a job's updates are meant to reach the client.
///
/// Recorded on the job at creation and never changed afterwards, even when
/// delivery falls back from push to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Server-initiated WebSocket stream.
    Push,
    /// Client-initiated status polling.
    Pull,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the transport for a job estimated to take `duration_secs`.
pub fn select_mode(duration_secs: u32) -> DeliveryMode {
    if duration_secs < PUSH_THRESHOLD_SECS {
        DeliveryMode::Push
    } else {
        DeliveryMode::Pull
    }
}
