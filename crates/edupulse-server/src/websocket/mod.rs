//! WebSocket module for real-time events

pub mod events;
pub mod handler;

pub use events::*;
pub use handler::*;
