//! Realtime notification channel.
//!
//! Clients connect to `/websocket`, authenticate with their first frame,
//! and then receive `{"status":"success","message":"Data updated"}` pushes
//! whenever one of their arrangements changes.

mod handler;
mod heartbeat;

pub use handler::ws_handler;
pub use heartbeat::{start_heartbeat, HEARTBEAT_INTERVAL};
