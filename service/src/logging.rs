use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Transport and HTTP stack modules whose records are dropped below TRACE.
const NOISY_MODULES: &[&str] = &[
    "tokio_tungstenite",
    "tungstenite",
    "rustls",
    "tower",
    "hyper",
    "axum",
];

pub struct Logger {}

impl Logger {
    /// Install the global terminal logger at the configured level.
    ///
    /// Fails if a global logger has already been installed.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;

        TermLogger::init(
            level,
            Self::build_log_config(level),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        )
    }

    /// Modules silenced at `level`. TRACE shows everything.
    fn ignored_modules(level: LevelFilter) -> &'static [&'static str] {
        if level == LevelFilter::Trace {
            &[]
        } else {
            NOISY_MODULES
        }
    }

    fn build_log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        for module in Self::ignored_modules(level) {
            builder.add_filter_ignore_str(*module);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn trace_level_ignores_no_module() {
        assert!(Logger::ignored_modules(LevelFilter::Trace).is_empty());
    }

    #[test]
    fn lower_levels_ignore_transport_modules() {
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
        ] {
            let ignored = Logger::ignored_modules(level);
            for module in ["tokio_tungstenite", "tungstenite", "hyper", "axum"] {
                assert!(ignored.contains(&module), "{module} not ignored at {level}");
            }
        }
    }

    #[test]
    fn relay_crates_are_never_ignored() {
        for module in ["realtime", "sse", "web", "service", "events"] {
            assert!(
                !Logger::ignored_modules(LevelFilter::Info).contains(&module),
                "{module} should not be ignored"
            );
        }
    }

    #[test]
    fn second_logger_install_is_refused() {
        let config = Config::parse_from(["relay"]);

        let _ = Logger::init_logger(&config);
        assert!(Logger::init_logger(&config).is_err());
    }
}
