pub mod config;
pub mod sessions;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ideaflow_domain::config::Config;

/// ideaflow: drive idea-to-development workflow sessions.
#[derive(Debug, Parser)]
#[command(name = "ideaflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new workflow session and print it as JSON.
    Create {
        /// The idea the workflow starts from.
        idea: String,
    },
    /// Print one session as JSON.  Counts as activity.
    Get {
        session_id: String,
    },
    /// Merge payload fields into a session and optionally advance its state.
    Update {
        session_id: String,
        #[command(flatten)]
        fields: UpdateArgs,
    },
    /// List all sessions, oldest first.
    List,
    /// Show session count, capacity and persistence health.
    Status,
    /// Remove sessions idle for longer than the timeout.
    Sweep,
    /// Delete every session.
    Reset {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
    /// Keep sweeping on the configured interval until Ctrl-C.
    Watch,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

/// Payload flags for `update`.  Values are parsed as JSON; anything that is
/// not valid JSON is stored as a plain string.
#[derive(Debug, Default, clap::Args)]
pub struct UpdateArgs {
    /// Target workflow state (e.g. "refining").
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub answers: Option<String>,
    #[arg(long)]
    pub documents: Option<String>,
    #[arg(long)]
    pub approval: Option<String>,
    #[arg(long)]
    pub plan: Option<String>,
    /// Extra field as KEY=VALUE.  Repeatable.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub extra: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `IDEAFLOW_CONFIG` (or
/// `ideaflow.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path =
        std::env::var("IDEAFLOW_CONFIG").unwrap_or_else(|_| "ideaflow.toml".into());
    let config = Config::load(std::path::Path::new(&config_path))
        .with_context(|| format!("loading {config_path}"))?;
    Ok((config, config_path))
}
