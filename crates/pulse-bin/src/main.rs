//! taskpulse - realtime notification client.

mod api;
mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pulse_config_and_utils::{init_logging, Config, Paths};

#[derive(Parser)]
#[command(name = "taskpulse")]
#[command(about = "Realtime notification client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, database and logs. Defaults to ~/.taskpulse
    #[arg(long, global = true, env = "TASKPULSE_HOME")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print notifications as they arrive
    Listen {
        #[arg(long, env = "TASKPULSE_USER_ID")]
        user_id: String,
        #[arg(long, env = "TASKPULSE_TOKEN", hide_env_values = true)]
        token: String,
        /// Topic to subscribe to (repeatable)
        #[arg(long = "topic")]
        topics: Vec<String>,
    },
    /// Ingest a push payload from FILE, or stdin
    Push { file: Option<PathBuf> },
    /// Show stored notifications
    List {
        #[arg(long)]
        unread: bool,
    },
    /// Mark one notification as read
    MarkRead {
        id: String,
        /// Also send the read receipt to the server
        #[arg(long, env = "TASKPULSE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Mark every notification as read
    MarkAllRead {
        #[arg(long, env = "TASKPULSE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Register a push token so the server can notify this device offline
    RegisterPushToken {
        push_token: String,
        /// Device label stored with the token
        #[arg(long, default_value = "cli")]
        device: String,
        #[arg(long, env = "TASKPULSE_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Forget the logged-in user and clear stored notifications
    Logout,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    init_logging(&config.log_level, &paths)?;

    match cli.command {
        Commands::Listen {
            user_id,
            token,
            topics,
        } => app::run_listen(&config, &paths, user_id, token, topics).await,
        Commands::Push { file } => app::run_push(&paths, file.as_deref()),
        Commands::List { unread } => app::run_list(&paths, unread),
        Commands::MarkRead { id, token } => {
            app::run_mark_read(&config, &paths, &id, token).await
        }
        Commands::MarkAllRead { token } => app::run_mark_all_read(&config, &paths, token).await,
        Commands::RegisterPushToken {
            push_token,
            device,
            token,
        } => app::run_register_push_token(&config, &push_token, &device, token).await,
        Commands::Logout => app::run_logout(&paths),
    }
}
