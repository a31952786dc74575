//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams registry lifecycle events to
//! clients that subscribe to keys or key patterns, and answers status and
//! stats queries.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
