use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use secrecy::SecretString;
use std::fmt;
use std::str::FromStr;

/// How the relay reacts when the upstream channel is found unjoined.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconnectMode {
    /// Only log; recovery is left to process supervision.
    None,
    /// Rejoin with exponential backoff.
    Backoff,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReconnectModeParseError;

impl FromStr for ReconnectMode {
    type Err = ReconnectModeParseError;
    fn from_str(mode: &str) -> Result<ReconnectMode, Self::Err> {
        match mode.to_lowercase().as_str() {
            "none" => Ok(ReconnectMode::None),
            "backoff" => Ok(ReconnectMode::Backoff),
            _ => Err(ReconnectModeParseError),
        }
    }
}

impl fmt::Display for ReconnectMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconnectMode::None => write!(f, "none"),
            ReconnectMode::Backoff => write!(f, "backoff"),
        }
    }
}

fn parse_secret(value: &str) -> Result<SecretString, String> {
    Ok(SecretString::new(value.to_string()))
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The project URL of the managed backend whose change feed is relayed
    /// (e.g. https://<project-ref>.supabase.co)
    #[arg(long, env = "SUPABASE_PROJECT_URL")]
    supabase_project_url: Option<String>,

    /// The service role key used to authenticate against the change feed
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", value_parser = parse_secret, hide_env_values = true)]
    supabase_service_role_key: Option<SecretString>,

    /// The database schema whose tables are subscribed to
    #[arg(long, env, default_value = "public")]
    pub realtime_schema: String,

    /// The upstream channel name used for the subscription
    #[arg(long, env, default_value = "any_table_events")]
    pub realtime_channel: String,

    /// Number of recent event identifiers remembered for deduplication
    #[arg(long, env, default_value_t = 1000)]
    pub dedup_capacity: usize,

    /// Maximum undelivered frames per stream client before it is dropped
    #[arg(long, env, default_value_t = 1024)]
    pub client_queue_capacity: usize,

    /// Seconds between checks that the upstream channel is still joined
    #[arg(long, env, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub liveness_interval_secs: u64,

    /// Seconds between protocol heartbeats sent to the upstream
    #[arg(long, env, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_interval_secs: u64,

    /// What to do when the upstream channel is found unjoined
    #[arg(
        long,
        env,
        default_value_t = ReconnectMode::None,
        value_parser = clap::builder::PossibleValuesParser::new(["none", "backoff", "NONE", "BACKOFF"])
            .map(|s| s.parse::<ReconnectMode>().unwrap_or(ReconnectMode::None)),
    )]
    pub reconnect_policy: ReconnectMode,

    /// Rejoin attempts per liveness check when the backoff policy is selected
    #[arg(long, env, default_value_t = 5)]
    pub reconnect_max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[arg(long, env, default_value_t = 1000)]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on a single backoff delay in seconds
    #[arg(long, env, default_value_t = 60)]
    pub reconnect_max_delay_secs: u64,

    /// Seconds between keep-alive comments on idle stream connections
    #[arg(long, env, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub sse_keep_alive_secs: u64,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 3000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn supabase_project_url(&self) -> Option<&str> {
        self.supabase_project_url.as_deref()
    }

    pub fn set_supabase_project_url(mut self, url: String) -> Self {
        self.supabase_project_url = Some(url);
        self
    }

    pub fn supabase_service_role_key(&self) -> Option<SecretString> {
        self.supabase_service_role_key.clone()
    }

    pub fn set_supabase_service_role_key(mut self, key: String) -> Self {
        self.supabase_service_role_key = Some(SecretString::new(key));
        self
    }

    pub fn listen_address(&self) -> String {
        format!(
            "{}:{}",
            self.interface.as_deref().unwrap_or("127.0.0.1"),
            self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("relay").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_match_relay_constants() {
        let config = parse(&[]);

        assert_eq!(config.dedup_capacity, 1000);
        assert_eq!(config.liveness_interval_secs, 10);
        assert_eq!(config.realtime_schema, "public");
        assert_eq!(config.reconnect_policy, ReconnectMode::None);
        assert_eq!(config.log_level_filter, LevelFilter::Info);
    }

    #[test]
    fn credentials_and_policy_parse_from_flags() {
        let config = parse(&[
            "--supabase-project-url",
            "https://abc.supabase.co",
            "--supabase-service-role-key",
            "secret",
            "--reconnect-policy",
            "BACKOFF",
            "--port",
            "8080",
        ]);

        assert_eq!(config.supabase_project_url(), Some("https://abc.supabase.co"));
        assert_eq!(
            config
                .supabase_service_role_key()
                .map(|k| k.expose_secret().clone()),
            Some("secret".to_string())
        );
        assert_eq!(config.reconnect_policy, ReconnectMode::Backoff);
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
    }

    #[test]
    fn debug_output_does_not_leak_the_key() {
        let config = parse(&[]).set_supabase_service_role_key("very-secret".to_string());
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[test]
    fn zero_intervals_are_refused() {
        for flag in [
            "--liveness-interval-secs",
            "--heartbeat-interval-secs",
            "--sse-keep-alive-secs",
        ] {
            let result = Config::try_parse_from(["relay", flag, "0"]);
            assert!(result.is_err(), "{flag} 0 should be refused");
        }

        let config = parse(&["--liveness-interval-secs", "1"]);
        assert_eq!(config.liveness_interval_secs, 1);
    }

    #[test]
    fn reconnect_mode_round_trips_through_display() {
        for mode in [ReconnectMode::None, ReconnectMode::Backoff] {
            assert_eq!(mode.to_string().parse::<ReconnectMode>(), Ok(mode));
        }
    }
}
