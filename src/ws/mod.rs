//! WebSocket layer: the wire protocol and the per-connection socket task

pub mod handler;
pub mod protocol;
