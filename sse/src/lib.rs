//! Server-Sent Events infrastructure for streaming database changes.
//!
//! This crate provides the client-facing half of the relay: a registry of live
//! stream connections, each with its own bounded delivery queue, and a manager
//! that fans every change event out to all of them.
//!
//! # Architecture
//!
//! - `connection`: `ConnectionRegistry` keyed by a server-generated `ConnectionId`
//! - `manager`: High-level fan-out and injection (delegates to ConnectionRegistry)
//! - `message`: Payload types and their wire encoding
//! - `stream`: Per-connection lifecycle (`CONNECTING -> STREAMING -> CLOSED`)
//! - `change_event_handler`: Bridges `events::EventPublisher` to the manager

pub mod change_event_handler;
pub mod connection;
pub mod manager;
pub mod message;
pub mod stream;

pub use change_event_handler::SseChangeEventHandler;
pub use manager::Manager;
pub use stream::ClientStream;
