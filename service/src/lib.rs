use config::{Config, ReconnectMode};
use log::info;
use realtime::{
    BackoffPolicy, RealtimeClient, RealtimeConfig, ReconnectPolicy, SubscriptionConfig,
    SubscriptionFilter,
};
use sse::Manager;
use std::sync::Arc;
use tokio::time::Duration;

pub mod config;
pub mod logging;

/// Authenticate against the upstream change feed with the configured
/// credentials. Missing credentials and rejected keys are returned as fatal
/// `realtime` errors.
pub async fn init_realtime(config: &Config) -> Result<RealtimeClient, realtime::Error> {
    let url = config
        .supabase_project_url()
        .ok_or_else(|| realtime::error::config_error("SUPABASE_PROJECT_URL is not set"))?;
    let key = config
        .supabase_service_role_key()
        .ok_or_else(|| realtime::error::config_error("SUPABASE_SERVICE_ROLE_KEY is not set"))?;

    info!(
        "Realtime config: channel={}, schema={}, heartbeat={}s",
        config.realtime_channel, config.realtime_schema, config.heartbeat_interval_secs,
    );

    let realtime_config = RealtimeConfig::new(url, key)
        .with_channel(config.realtime_channel.clone())
        .with_heartbeat_interval(Duration::from_secs(config.heartbeat_interval_secs));

    RealtimeClient::connect(realtime_config).await
}

/// Subscription settings derived from the process configuration.
pub fn subscription_config(config: &Config) -> SubscriptionConfig {
    let reconnect = match config.reconnect_policy {
        ReconnectMode::None => ReconnectPolicy::None,
        ReconnectMode::Backoff => ReconnectPolicy::Backoff(
            BackoffPolicy::new(config.reconnect_max_retries)
                .with_base_delay(Duration::from_millis(config.reconnect_base_delay_ms))
                .with_max_delay(Duration::from_secs(config.reconnect_max_delay_secs)),
        ),
    };

    SubscriptionConfig {
        filter: SubscriptionFilter::all_tables(config.realtime_schema.clone()),
        liveness_interval: Duration::from_secs(config.liveness_interval_secs),
        reconnect,
    }
}

// Service-level state shared by every request handler
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub sse_manager: Arc<Manager>,
    pub config: Config,
}

impl AppState {
    pub fn new(app_config: Config, sse_manager: &Arc<Manager>) -> Self {
        Self {
            sse_manager: Arc::clone(sse_manager),
            config: app_config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("relay").chain(args.iter().copied()))
    }

    #[test]
    fn subscription_config_defaults_to_no_reconnect() {
        let subscription = subscription_config(&parse(&[]));

        assert_eq!(subscription.reconnect, ReconnectPolicy::None);
        assert_eq!(subscription.liveness_interval, Duration::from_secs(10));
        assert_eq!(subscription.filter, SubscriptionFilter::all_tables("public"));
    }

    #[test]
    fn backoff_mode_builds_backoff_policy() {
        let subscription = subscription_config(&parse(&[
            "--reconnect-policy",
            "backoff",
            "--reconnect-max-retries",
            "2",
            "--reconnect-base-delay-ms",
            "500",
        ]));

        match subscription.reconnect {
            ReconnectPolicy::Backoff(policy) => {
                assert_eq!(policy.max_retries(), 2);
                assert_eq!(policy.delay_for(0), Some(Duration::from_millis(500)));
                assert_eq!(policy.delay_for(2), None);
            }
            ReconnectPolicy::None => panic!("expected backoff policy"),
        }
    }

    #[tokio::test]
    async fn missing_credentials_are_fatal() {
        let err = init_realtime(&parse(&[])).await.err().unwrap();
        assert!(err.is_fatal());
    }
}
