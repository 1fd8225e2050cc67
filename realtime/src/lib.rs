//! Upstream change-feed integration.
//!
//! - `client`: WebSocket client for the managed backend's realtime service
//! - `feed`: the `ChangeFeed` seam the subscription manager depends on
//! - `dedup`: bounded cache of recently seen notification identifiers
//! - `notification`: raw notification shape and normalization to `ChangeEvent`
//! - `reconnect`: what to do when the channel is found unjoined
//! - `subscription`: the subscription manager and its liveness check

pub mod client;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod notification;
pub mod reconnect;
pub mod subscription;

pub use client::{RealtimeClient, RealtimeConfig};
pub use dedup::{DedupCache, EventId};
pub use error::Error;
pub use feed::{ChangeFeed, SubscriptionFilter};
pub use reconnect::{BackoffPolicy, ReconnectPolicy};
pub use subscription::{SubscriptionConfig, SubscriptionHandle, SubscriptionManager};
