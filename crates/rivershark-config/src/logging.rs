use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: Once = Once::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level for all Rivershark crates.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Emit logs in JSON format.
    #[serde(default)]
    pub json: bool,

    /// Write logs to stderr. When disabled, logs are discarded.
    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// `level` as `EnvFilter` directives. Bare level names are matched
    /// case-insensitively (`WARNING` is accepted for `warn`); anything else is
    /// passed through as a directive string.
    pub(crate) fn directives(level: &str) -> String {
        let level = level.trim();
        let lower = level.to_ascii_lowercase();
        match lower.as_str() {
            "" => Self::default_level(),
            "warning" => "warn".to_owned(),
            "trace" | "debug" | "info" | "warn" | "error" | "off" => lower.clone(),
            _ => level.to_owned(),
        }
    }

    /// The effective filter: the configured level with `RUST_LOG` layered on
    /// top. Invalid directives are dropped rather than failing startup.
    pub fn env_filter(&self) -> EnvFilter {
        let mut directives = Self::directives(&self.level);
        if let Some(env) = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            directives.push(',');
            directives.push_str(env.trim());
        }

        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse_lossy(directives)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Safe to call multiple times; only the first call has an effect. If another
/// subscriber was already installed (e.g. by a test harness) it is left alone.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();
        let writer = if config.stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::sink)
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer);
        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };

        if let Err(err) = result {
            tracing::debug!(
                target: "rivershark.config",
                error = %err,
                "tracing subscriber already installed"
            );
        }
    });
}
