//! WebSocket push transport.
//!
//! Connection bookkeeping, heartbeat, and the per-job push session.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::download_ws;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
