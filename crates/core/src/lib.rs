//! Domain types and pure logic for fetchline.
//!
//! Everything in this crate is free of I/O: duration estimation, transport
//! mode selection, the job record state machine, the delivery session state
//! machine shared by the server and the client, and the clock/timer seams
//! that let tests run on virtual time.

pub mod clock;
pub mod delivery;
pub mod delivery_mode;
pub mod download;
pub mod error;
pub mod estimation;
pub mod job;
pub mod job_events;
pub mod types;
