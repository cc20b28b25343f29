use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paybridge::cli::{Cli, Commands, DbCommands, SessionCommands, TxCommands};
use paybridge::config::{Config, LogFormat, ServiceKind};
use paybridge::services::run_reconciler;
use paybridge::{cli, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let command = args.command.unwrap_or(Commands::Serve {
        service: ServiceKind::Switch,
    });
    let config = Config::from_env(command.service())?;

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match command {
        Commands::Serve { .. } => serve(config).await,
        Commands::Tx(TxCommands::Renotify { tx_id }) => cli::handle_tx_renotify(&config, tx_id).await,
        Commands::Session(SessionCommands::Renotify { session_id }) => {
            cli::handle_session_renotify(&config, session_id).await
        }
        Commands::Db(DbCommands::Migrate { .. }) => cli::handle_db_migrate(&config).await,
        Commands::Config { .. } => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let report = startup::validate_config(&config);
    for warning in &report.warnings {
        tracing::warn!("{}", warning);
    }
    if !report.is_valid() {
        report.print();
        anyhow::bail!("Configuration is invalid");
    }

    let (app, reconcilable) = startup::build_app(&config).await?;

    if let (Some(target), Some(interval)) = (reconcilable, config.reconcile_interval) {
        tokio::spawn(run_reconciler(target, interval));
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!(service = config.service.as_str(), "listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
