//! Logging setup for appear.
//!
//! Natively this installs a `tracing-subscriber` formatter filtered by `RUST_LOG`, falling back to the
//! configured level when the variable is unset. On `wasm32` records go to the browser console through
//! `tracing-wasm`.
//!
//! ```rust
//! use tracing::Level;
//!
//! // Fails if another subscriber is already installed, which is fine here.
//! let _ = appear_logger::init(appear_logger::LoggerConfig::new().level(Level::DEBUG));
//! tracing::debug!("watching for #comments");
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::Level;

/// The environment variable read for filter directives.
pub const LOG_ENV: &str = "RUST_LOG";

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("invalid filter directives `{directives}`: {reason}")]
    InvalidFilter { directives: String, reason: String },
}

/// Subscriber settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggerConfig {
    level: Level,
    directives: Option<String>,
    test_writer: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self {
            level: Level::INFO,
            directives: None,
            test_writer: false,
        }
    }

    /// The most verbose level recorded when no directives apply.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Filter directives (`"warn,appear_core=trace"`) used instead of `RUST_LOG`. Ignored on `wasm32`.
    pub fn directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    /// Write through the test harness so output is captured per test. Ignored on `wasm32`.
    pub fn test_writer(mut self, enabled: bool) -> Self {
        self.test_writer = enabled;
        self
    }

    pub fn get_level(&self) -> Level {
        self.level
    }
}

/// Install the global subscriber. Only the first successful call has any effect.
pub fn init(config: LoggerConfig) -> Result<(), LoggerError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(LoggerError::AlreadyInitialized);
    }

    let result = install(&config);
    if result.is_err() {
        INITIALIZED.store(false, Ordering::SeqCst);
    }
    result
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

#[cfg(not(target_arch = "wasm32"))]
fn install(config: &LoggerConfig) -> Result<(), LoggerError> {
    use tracing_subscriber::EnvFilter;

    let filter = match &config.directives {
        Some(directives) => parse_filter(directives)?,
        None => match std::env::var(LOG_ENV) {
            Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives)?,
            _ => EnvFilter::new(config.level.as_str()),
        },
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time();

    let installed = match config.test_writer {
        true => builder.with_test_writer().try_init(),
        false => builder.try_init(),
    };
    installed.map_err(|_| LoggerError::AlreadyInitialized)
}

#[cfg(not(target_arch = "wasm32"))]
fn parse_filter(directives: &str) -> Result<tracing_subscriber::EnvFilter, LoggerError> {
    tracing_subscriber::EnvFilter::try_new(directives).map_err(|err| LoggerError::InvalidFilter {
        directives: directives.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(target_arch = "wasm32")]
fn install(config: &LoggerConfig) -> Result<(), LoggerError> {
    use tracing_subscriber::layer::SubscriberExt;

    // `tracing_wasm::set_as_global_default*` panics if a subscriber is already set.
    let layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::default()
            .set_max_level(config.level)
            .build(),
    );
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| LoggerError::AlreadyInitialized)
}
