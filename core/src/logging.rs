//! Logging context.
//!
//! The subscriber is built explicitly from [`LogSettings`] and installed as
//! the scoped default for the calling thread; the binaries keep the guard
//! alive for the whole run on a current-thread runtime.

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_LEVEL_ENV: &str = "QURL_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "QURL_LOG_FORMAT";

const DEFAULT_LEVEL: &str = "warn";
const VERBOSE_LEVEL: &str = "debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Filter directive such as `debug` or `qurl_core=trace`.
    pub level: Option<String>,
    pub format: LogFormat,
    pub verbose: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self {
            level: std::env::var(LOG_LEVEL_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            format: std::env::var(LOG_FORMAT_ENV)
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            verbose: false,
        }
    }

    /// `-v` raises the default level unless one is configured explicitly.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn directive(&self) -> &str {
        match &self.level {
            Some(level) => level,
            None if self.verbose => VERBOSE_LEVEL,
            None => DEFAULT_LEVEL,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directive()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }

    /// Installs the subscriber for the current thread; logs go to stderr.
    pub fn install(&self) -> DefaultGuard {
        let registry = tracing_subscriber::registry().with(self.filter());
        match self.format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .set_default(),
            LogFormat::Text => registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .set_default(),
        }
    }
}
