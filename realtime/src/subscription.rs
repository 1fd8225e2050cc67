//! The upstream subscription manager.
//!
//! Owns the single wildcard subscription: every raw notification is
//! normalized, checked against the dedup cache and published to the event
//! handlers. A separate task checks at a fixed interval that the channel is
//! still joined and applies the configured [`ReconnectPolicy`].

use crate::dedup::DedupCache;
use crate::error::Error;
use crate::feed::{ChangeFeed, SubscriptionFilter};
use crate::notification::RawNotification;
use crate::reconnect::ReconnectPolicy;
use events::EventPublisher;
use futures_util::FutureExt;
use log::*;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

// `tokio::time::interval` rejects a zero period.
const MIN_LIVENESS_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub filter: SubscriptionFilter,
    pub liveness_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            filter: SubscriptionFilter::all_tables("public"),
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            reconnect: ReconnectPolicy::None,
        }
    }
}

/// What happened to one raw notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Duplicate,
}

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Joined,
    Unjoined,
    Rejoined,
}

pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeed>,
    dedup: Arc<DedupCache>,
    publisher: EventPublisher,
    config: SubscriptionConfig,
}

/// Handles to the tasks spawned by [`SubscriptionManager::start`].
pub struct SubscriptionHandle {
    notifications: JoinHandle<()>,
    liveness: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn abort(&self) {
        self.notifications.abort();
        self.liveness.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.notifications.is_finished()
    }
}

impl SubscriptionManager {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        dedup: Arc<DedupCache>,
        publisher: EventPublisher,
        mut config: SubscriptionConfig,
    ) -> Self {
        config.liveness_interval = config.liveness_interval.max(MIN_LIVENESS_INTERVAL);
        Self {
            feed,
            dedup,
            publisher,
            config,
        }
    }

    /// Register the subscription and spawn the notification and liveness
    /// tasks. A failed subscription is returned to the caller unretried.
    pub async fn start(self) -> Result<SubscriptionHandle, Error> {
        let notifications = self.feed.subscribe(self.config.filter.clone()).await?;
        info!(
            "Subscription registered for schema {}, liveness check every {:?}",
            self.config.filter.schema, self.config.liveness_interval
        );

        let manager = Arc::new(self);
        let notifications = tokio::spawn({
            let manager = manager.clone();
            async move { manager.process_notifications(notifications).await }
        });
        let liveness = tokio::spawn(async move { manager.check_liveness().await });

        Ok(SubscriptionHandle {
            notifications,
            liveness,
        })
    }

    async fn process_notifications(&self, mut notifications: Receiver<Value>) {
        while let Some(raw) = notifications.recv().await {
            trace!("Realtime notification received: {raw}");
            match AssertUnwindSafe(self.handle_notification(raw))
                .catch_unwind()
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Error handling realtime notification: {e}"),
                Err(_) => error!("Panic while handling realtime notification"),
            }
        }
        warn!("Upstream notification channel closed");
    }

    /// Normalize one raw notification and publish it unless its identifier
    /// has already been seen.
    pub async fn handle_notification(&self, raw: Value) -> Result<Outcome, Error> {
        let notification = RawNotification::from_value(raw)?;
        let event_id = notification.event_id();
        let event = notification.into_change_event()?;

        match &event_id {
            Some(id) if self.dedup.seen(id) => {
                debug!("Skipping duplicate event with ID: {id}");
                return Ok(Outcome::Duplicate);
            }
            Some(_) => {}
            None => debug!("Notification carries no identifier, delivering without dedup"),
        }

        self.publisher.publish(event).await;
        Ok(Outcome::Published)
    }

    async fn check_liveness(&self) {
        let mut ticker = tokio::time::interval(self.config.liveness_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.check_once().await;
        }
    }

    /// Query the channel state once, rejoining under a backoff policy.
    pub async fn check_once(&self) -> Liveness {
        if self.feed.is_joined() {
            debug!("Channel is joined and listening for events");
            return Liveness::Joined;
        }
        warn!("Realtime channel is not joined!");

        let backoff = match &self.config.reconnect {
            ReconnectPolicy::None => return Liveness::Unjoined,
            ReconnectPolicy::Backoff(backoff) => backoff,
        };

        let mut attempt = 0;
        while let Some(delay) = backoff.delay_for(attempt) {
            tokio::time::sleep(delay).await;
            attempt += 1;
            match self.feed.rejoin().await {
                Ok(()) => {
                    info!("Rejoin attempt {attempt} succeeded");
                    return Liveness::Rejoined;
                }
                Err(e) => warn!("Rejoin attempt {attempt} failed: {e}"),
            }
        }

        error!(
            "Giving up rejoin after {} attempt(s); retrying at next liveness check",
            backoff.max_retries()
        );
        Liveness::Unjoined
    }
}
