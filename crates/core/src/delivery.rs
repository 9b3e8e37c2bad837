//! Delivery session state machine shared by the server push path and the
//! client driver.
//!
//! A [`DeliverySession`] consumes [`TransportEvent`]s one at a time and
//! answers each with a [`SessionAction`]. It owns no I/O; the caller turns
//! actions into frames, closes, fallbacks, or the terminal user action.
//!
//! ```text
//! negotiating -> active(push) -> delivered | fallen-back
//! negotiating -> active(pull) -> delivered
//! fallen-back -> active(pull) -> delivered
//! any non-terminal            -> aborted
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::job_events::StatusMessage;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Push sessions that have not reached a terminal state after this many
/// seconds fall back to polling.
pub const PUSH_TIMEOUT_SECS: u64 = 90;

/// Interval between status polls.
pub const CLIENT_POLL_INTERVAL_SECS: u64 = 3;

// ---------------------------------------------------------------------------
// Terminal latch
// ---------------------------------------------------------------------------

/// One-shot flag guarding the terminal action for a job.
///
/// Every transport serving the same job shares one latch; only the first
/// [`try_claim`](Self::try_claim) succeeds.
#[derive(Debug, Default)]
pub struct TerminalLatch {
    claimed: AtomicBool,
}

impl TerminalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Events, phases, actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Push,
    Pull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Push transport requested but not yet open.
    Negotiating,
    Active(Transport),
    /// Push gave up; waiting for the caller to resume with pull.
    FallenBack,
    /// Terminal message observed, whether or not this session delivered it.
    Delivered,
    /// The job no longer exists.
    Aborted,
}

impl SessionPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Delivered | Self::Aborted)
    }
}

/// Everything a transport can report to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(StatusMessage),
    Error(String),
    /// Connection closed, with the close code when one was given.
    Closed(Option<u16>),
    DeadlineElapsed,
    JobGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    TransportError(String),
    ClosedEarly(Option<u16>),
    DeadlineElapsed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportError(cause) => write!(f, "transport error: {cause}"),
            Self::ClosedEarly(Some(code)) => write!(f, "closed before completion (code {code})"),
            Self::ClosedEarly(None) => f.write_str("closed before completion"),
            Self::DeadlineElapsed => f.write_str("push deadline elapsed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Pass a non-terminal update on.
    Forward(StatusMessage),
    /// Terminal update; this session won the latch and must run the
    /// terminal action.
    Deliver(StatusMessage),
    /// Abandon push and continue with pull.
    FallBack(FallbackReason),
    Abort,
    /// Nothing to do.
    Discard,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DeliverySession {
    phase: SessionPhase,
    last_progress: Option<u8>,
    latch: Arc<TerminalLatch>,
}

impl DeliverySession {
    /// A session that will try push first.
    pub fn push(latch: Arc<TerminalLatch>) -> Self {
        Self {
            phase: SessionPhase::Negotiating,
            last_progress: None,
            latch,
        }
    }

    /// A session that polls from the start.
    pub fn pull(latch: Arc<TerminalLatch>) -> Self {
        Self {
            phase: SessionPhase::Active(Transport::Pull),
            last_progress: None,
            latch,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Highest progress forwarded so far.
    pub fn last_progress(&self) -> Option<u8> {
        self.last_progress
    }

    /// Continue a fallen-back session over pull. Returns `false` from any
    /// other phase.
    pub fn resume_with_pull(&mut self) -> bool {
        if self.phase == SessionPhase::FallenBack {
            self.phase = SessionPhase::Active(Transport::Pull);
            true
        } else {
            false
        }
    }

    pub fn handle(&mut self, event: TransportEvent) -> SessionAction {
        match self.phase {
            SessionPhase::Delivered | SessionPhase::Aborted | SessionPhase::FallenBack => {
                return SessionAction::Discard;
            }
            SessionPhase::Negotiating | SessionPhase::Active(_) => {}
        }

        // Another transport already ran the terminal action.
        if self.latch.is_claimed() {
            self.phase = SessionPhase::Delivered;
            return SessionAction::Discard;
        }

        let transport = match self.phase {
            SessionPhase::Active(t) => t,
            _ => Transport::Push,
        };

        match event {
            TransportEvent::Opened => {
                if self.phase == SessionPhase::Negotiating {
                    self.phase = SessionPhase::Active(Transport::Push);
                }
                SessionAction::Discard
            }
            TransportEvent::Message(msg) => self.on_message(transport, msg),
            TransportEvent::Error(cause) => {
                self.fall_back(transport, FallbackReason::TransportError(cause))
            }
            TransportEvent::Closed(code) => {
                self.fall_back(transport, FallbackReason::ClosedEarly(code))
            }
            TransportEvent::DeadlineElapsed => {
                self.fall_back(transport, FallbackReason::DeadlineElapsed)
            }
            TransportEvent::JobGone => {
                self.phase = SessionPhase::Aborted;
                SessionAction::Abort
            }
        }
    }

    fn on_message(&mut self, transport: Transport, msg: StatusMessage) -> SessionAction {
        self.phase = SessionPhase::Active(transport);

        if self.last_progress.is_some_and(|last| msg.progress < last) {
            return SessionAction::Discard;
        }

        if msg.is_terminal() {
            self.phase = SessionPhase::Delivered;
            self.last_progress = Some(msg.progress);
            return if self.latch.try_claim() {
                SessionAction::Deliver(msg)
            } else {
                SessionAction::Discard
            };
        }

        self.last_progress = Some(msg.progress);
        SessionAction::Forward(msg)
    }

    fn fall_back(&mut self, transport: Transport, reason: FallbackReason) -> SessionAction {
        match transport {
            Transport::Push => {
                self.phase = SessionPhase::FallenBack;
                SessionAction::FallBack(reason)
            }
            // Polling retries on its own schedule.
            Transport::Pull => SessionAction::Discard,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
