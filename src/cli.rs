use clap::{Parser, Subcommand};
use std::fmt::Display;
use uuid::Uuid;

use crate::config::{Config, RoleConfig, ServiceKind};
use crate::services::DeliveryOutcome;
use crate::startup;

#[derive(Parser)]
#[command(name = "paybridge")]
#[command(about = "PayBridge - merchant, switch and bank payment services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start one of the HTTP services (default: switch)
    Serve {
        #[arg(value_enum, default_value_t = ServiceKind::Switch)]
        service: ServiceKind,
    },

    /// Switch transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Bank payment session management commands
    #[command(subcommand)]
    Session(SessionCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Validate and print the configuration of a service
    Config {
        #[arg(value_enum, default_value_t = ServiceKind::Switch)]
        service: ServiceKind,
    },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Re-deliver the current transaction status to the merchant
    Renotify {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Re-deliver the current session status to the switch
    Renotify {
        /// Payment session UUID
        #[arg(value_name = "SESSION_ID")]
        session_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate {
        #[arg(value_enum)]
        service: ServiceKind,
    },
}

impl Commands {
    /// The service whose configuration the command needs.
    pub fn service(&self) -> ServiceKind {
        match self {
            Commands::Serve { service }
            | Commands::Config { service }
            | Commands::Db(DbCommands::Migrate { service }) => *service,
            Commands::Tx(_) => ServiceKind::Switch,
            Commands::Session(_) => ServiceKind::Bank,
        }
    }
}

fn require_database(config: &Config) -> anyhow::Result<()> {
    if config.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set for {} administrative commands", config.service);
    }
    Ok(())
}

fn print_outcome<S: Display>(subject: &str, id: Uuid, outcome: &DeliveryOutcome<S>) {
    match outcome {
        DeliveryOutcome::NothingPending => println!("✓ {} {} has nothing pending", subject, id),
        DeliveryOutcome::InFlight(status) => {
            println!("… {} {} delivery of {} is already in flight", subject, id, status)
        }
        DeliveryOutcome::Delivered(status) => println!("✓ {} {} delivered as {}", subject, id, status),
        DeliveryOutcome::Failed { status, error } => {
            println!("✗ {} {} delivery of {} failed: {}", subject, id, status, error)
        }
    }
}

pub async fn handle_tx_renotify(config: &Config, tx_id: Uuid) -> anyhow::Result<()> {
    require_database(config)?;
    let RoleConfig::Switch(switch) = &config.role else {
        anyhow::bail!("tx commands need the switch configuration");
    };

    let service = startup::switch_service(config, switch).await?;
    let (_, outcome) = service.renotify_merchant(tx_id).await?;
    tracing::info!(transaction_id = %tx_id, "administrative merchant re-notify finished");
    print_outcome("Transaction", tx_id, &outcome);
    Ok(())
}

pub async fn handle_session_renotify(config: &Config, session_id: Uuid) -> anyhow::Result<()> {
    require_database(config)?;
    let RoleConfig::Bank(bank) = &config.role else {
        anyhow::bail!("session commands need the bank configuration");
    };

    let service = startup::bank_service(config, bank).await?;
    let (_, outcome) = service.renotify_switch(session_id).await?;
    tracing::info!(session_id = %session_id, "administrative switch re-notify finished");
    print_outcome("Session", session_id, &outcome);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let Some(url) = &config.database_url else {
        anyhow::bail!("DATABASE_URL must be set to run migrations");
    };

    let pool = startup::create_pool(url.expose()).await?;
    tracing::info!(service = config.service.as_str(), "Running database migrations...");
    startup::run_migrations(&pool, config.service).await?;
    println!("✓ Database migrations completed for {}", config.service);

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration ({}):", config.service);
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_ref()
            .map(|url| mask_password(url.expose()))
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!("  HTTP Timeout: {}s", config.http_timeout.as_secs());
    match config.reconcile_interval {
        Some(interval) => println!("  Reconcile Interval: {}s", interval.as_secs()),
        None => println!("  Reconcile Interval: disabled"),
    }
    println!(
        "  Admin API Key: {}",
        if config.admin_api_key.is_some() { "set" } else { "not set" }
    );

    match &config.role {
        RoleConfig::Switch(switch) => {
            println!("  Bank Base URL: {}", switch.bank_base_url);
            println!("  Bank Merchant ID: {}", switch.bank_merchant_id);
            println!("  Checkout Base URL: {}", switch.checkout_base_url);
            let mut merchants: Vec<_> = switch.merchant_credentials.keys().collect();
            merchants.sort();
            println!("  Merchants: {:?}", merchants);
        }
        RoleConfig::Bank(bank) => {
            println!("  Switch Base URL: {}", bank.switch_base_url);
            println!("  Trusted Merchant ID: {}", bank.bank_merchant_id);
            println!("  Payment Base URL: {}", bank.payment_base_url);
            println!("  Session TTL: {}s", bank.session_ttl_secs);
        }
        RoleConfig::Merchant(merchant) => {
            println!("  Switch Base URL: {}", merchant.switch_base_url);
            println!("  Merchant ID: {}", merchant.merchant_id);
            println!("  Merchant Secret: ****");
            println!("  Public Base URL: {}", merchant.public_base_url);
        }
    }

    let report = startup::validate_config(config);
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
