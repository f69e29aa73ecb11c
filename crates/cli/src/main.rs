use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ideaflow_cli::cli::{self, sessions, Cli, Command, ConfigCommand};
use ideaflow_domain::config::{Config, ObservabilityConfig};
use ideaflow_sessions::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config)
        }
        Command::Version => {
            println!("ideaflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Watch => {
            let config = prepare()?;
            sessions::watch(&config.sessions).await
        }
        command => {
            let config = prepare()?;
            let store = tokio::task::spawn_blocking(move || SessionStore::open(&config.sessions))
                .await
                .context("session store loader")?
                .context("opening session store")?;
            let output = tokio::task::spawn_blocking(move || run_store_command(&store, command))
                .await
                .context("session command")??;
            println!("{output}");
            Ok(())
        }
    }
}

fn run_store_command(store: &SessionStore, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Create { idea } => sessions::create(store, &idea),
        Command::Get { session_id } => sessions::get(store, &session_id),
        Command::Update { session_id, fields } => sessions::update(store, &session_id, fields),
        Command::List => sessions::list(store),
        Command::Status => sessions::status(store),
        Command::Sweep => sessions::sweep(store),
        Command::Reset { yes } => sessions::reset(store, yes),
        other => anyhow::bail!("{other:?} does not operate on the session store"),
    }
}

/// Load and validate the config, then install logging from it.
fn prepare() -> anyhow::Result<Config> {
    let (config, config_path) = cli::load_config()?;
    init_cli_tracing(&config.observability);
    config
        .ensure_valid()
        .with_context(|| format!("invalid config {config_path}"))?;
    Ok(config)
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_cli_tracing(obs: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if obs.json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
