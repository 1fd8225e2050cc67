//! SSE HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the stream endpoint.
//! The connection lifecycle (registration, queue draining, cleanup) lives in
//! the `sse` crate.

pub mod handler;
