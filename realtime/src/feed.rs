use crate::error::Error;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;

/// Which changes a subscription asks the upstream for. `"*"` is the wildcard
/// for both `table` and `event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub schema: String,
    pub table: String,
    pub event: String,
}

impl SubscriptionFilter {
    /// Every table and every operation within one schema.
    pub fn all_tables(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: "*".to_string(),
            event: "*".to_string(),
        }
    }
}

/// An upstream source of row-level change notifications.
///
/// Notifications are delivered as raw JSON values shaped
/// `{data: {...}, ids: [...]}`; normalization is left to the caller so a bad
/// notification can be rejected without disturbing the feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Register the single subscription and return the receiving end of its
    /// notification channel.
    async fn subscribe(&self, filter: SubscriptionFilter) -> Result<Receiver<Value>, Error>;

    /// Re-establish the existing subscription, feeding the same channel.
    async fn rejoin(&self) -> Result<(), Error>;

    /// Whether the subscription channel is currently joined.
    fn is_joined(&self) -> bool;
}
