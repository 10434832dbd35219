//! Configuration, paths and logging setup for taskpulse.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_LOG_LEVEL, DEFAULT_WS_URL, ENV_API_URL, ENV_LOG_LEVEL,
    ENV_WS_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
