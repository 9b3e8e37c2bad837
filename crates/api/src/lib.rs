//! fetchline API server library.
//!
//! Exposes config, state, error handling, routes, the delivery coordinator
//! and WebSocket infrastructure so integration tests and the binary
//! entrypoint share them.

pub mod background;
pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
