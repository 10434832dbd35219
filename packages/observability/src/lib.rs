//! # Observability
//!
//! Logging setup shared by every taskpulse binary.
//!
//! Code only emits `tracing` events. Where they end up is decided once,
//! at startup, by [`init_with_config`].
//!
//! With the `dev` feature (on by default) events are written as JSON lines
//! to `~/.taskpulse/logs/dev.jsonl`, one append-only file shared by all
//! processes:
//!
//! - `tail -f ~/.taskpulse/logs/dev.jsonl | jq` for pretty streaming
//! - `lnav ~/.taskpulse/logs/dev.jsonl` for interactive exploration
//!
//! Without it, events go to stderr in the compact `fmt` format.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "taskpulse".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```

#[cfg(feature = "dev")]
mod dev;
#[cfg(feature = "dev")]
mod json_layer;

use std::io;
use std::path::PathBuf;

#[cfg(feature = "dev")]
pub use dev::default_log_path;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default filter directive. `RUST_LOG` wins when set.
    pub default_level: String,

    /// Log file. Defaults to `~/.taskpulse/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config)
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .with_writer(io::stderr)
            .compact()
            .finish()
            .try_init()
            .map_err(io::Error::other)
    }
}
