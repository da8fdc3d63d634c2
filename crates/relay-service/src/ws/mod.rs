//! WebSocket transport: wire format and the per-socket adapter task.

pub mod handler;
pub mod protocol;

pub use handler::ws_handler;
