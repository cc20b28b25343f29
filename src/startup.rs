use anyhow::{bail, Context, Result};
use axum::Router;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::adapters::{
    InMemorySessionRepository, InMemoryStore, InMemoryTransactionRepository,
    PostgresSessionRepository, PostgresTransactionRepository,
};
use crate::clients::{BankClient, MerchantCallbackClient, SwitchClient};
use crate::clock::{Clock, SystemClock};
use crate::config::{BankConfig, Config, MerchantConfig, RoleConfig, ServiceKind, SwitchConfig};
use crate::middleware::AdminKey;
use crate::ports::{SessionRepository, TransactionRepository};
use crate::services::{
    ApproveAll, BankService, BankSettings, MerchantRegistry, MerchantService, MerchantSettings,
    Reconcilable, SwitchService, SwitchSettings,
};

pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn print(&self) {
        println!("\n=== Configuration Report ===");
        for warning in &self.warnings {
            println!("  ⚠ {}", warning);
        }
        for error in &self.errors {
            println!("  ❌ {}", error);
        }
        println!("Overall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("============================\n");
    }
}

pub fn validate_config(config: &Config) -> ValidationReport {
    let mut report = ValidationReport {
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    if config.server_port == 0 {
        report.errors.push("SERVER_PORT must be greater than 0".to_string());
    }
    if config.http_timeout.is_zero() {
        report.errors.push("HTTP_TIMEOUT_SECS must be greater than 0".to_string());
    }
    if config.database_url.is_none() && config.service != ServiceKind::Merchant {
        report
            .warnings
            .push("DATABASE_URL is not set; state is kept in memory only".to_string());
    }

    let check_url = |report: &mut ValidationReport, key: &str, value: &str| {
        if let Err(e) = url::Url::parse(value).with_context(|| format!("{} is not a valid URL", key)) {
            report.errors.push(format!("{:#}", e));
        }
    };

    match &config.role {
        RoleConfig::Switch(switch) => {
            check_url(&mut report, "BANK_BASE_URL", &switch.bank_base_url);
            check_url(&mut report, "SWITCH_CHECKOUT_BASE_URL", &switch.checkout_base_url);
            if switch.merchant_credentials.is_empty() {
                report
                    .warnings
                    .push("MERCHANT_CREDENTIALS is empty; every init will be rejected".to_string());
            }
            if switch.bank_breaker_failures == 0 {
                report.errors.push("BANK_BREAKER_FAILURES must be greater than 0".to_string());
            }
        }
        RoleConfig::Bank(bank) => {
            check_url(&mut report, "SWITCH_BASE_URL", &bank.switch_base_url);
            check_url(&mut report, "BANK_PAYMENT_BASE_URL", &bank.payment_base_url);
            if bank.session_ttl_secs <= 0 {
                report.errors.push("BANK_SESSION_TTL_SECS must be greater than 0".to_string());
            }
        }
        RoleConfig::Merchant(merchant) => {
            check_url(&mut report, "SWITCH_BASE_URL", &merchant.switch_base_url);
            check_url(&mut report, "MERCHANT_PUBLIC_BASE_URL", &merchant.public_base_url);
        }
    }

    report
}

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to database")
}

/// Applies the migrations in `migrations/<service>`.
pub async fn run_migrations(pool: &PgPool, service: ServiceKind) -> Result<()> {
    let dir = match service {
        ServiceKind::Switch | ServiceKind::Bank => format!("./migrations/{}", service),
        ServiceKind::Merchant => bail!("the merchant keeps no database state"),
    };
    let migrator = Migrator::new(Path::new(&dir)).await?;
    migrator.run(pool).await?;
    tracing::info!(service = service.as_str(), "Database migrations completed");
    Ok(())
}

async fn connect(config: &Config) -> Result<Option<PgPool>> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url.expose()).await?;
            run_migrations(&pool, config.service).await?;
            Ok(Some(pool))
        }
        None => Ok(None),
    }
}

pub async fn switch_service(config: &Config, switch: &SwitchConfig) -> Result<SwitchService> {
    let transactions: Arc<dyn TransactionRepository> = match connect(config).await? {
        Some(pool) => Arc::new(PostgresTransactionRepository::new(pool)),
        None => Arc::new(InMemoryTransactionRepository::new()),
    };

    let credentials: HashMap<String, String> = switch
        .merchant_credentials
        .iter()
        .map(|(id, secret)| (id.clone(), secret.expose().to_string()))
        .collect();

    let bank = BankClient::with_circuit_breaker(
        switch.bank_base_url.clone(),
        config.http_timeout,
        switch.bank_breaker_failures,
        switch.bank_breaker_reset_secs,
    );

    Ok(SwitchService::new(
        transactions,
        Arc::new(bank),
        Arc::new(MerchantCallbackClient::new(config.http_timeout)),
        MerchantRegistry::new(credentials),
        Arc::new(SystemClock),
        SwitchSettings {
            bank_merchant_id: switch.bank_merchant_id.clone(),
            checkout_base_url: switch.checkout_base_url.clone(),
        },
    ))
}

pub async fn bank_service(config: &Config, bank: &BankConfig) -> Result<BankService> {
    let sessions: Arc<dyn SessionRepository> = match connect(config).await? {
        Some(pool) => Arc::new(PostgresSessionRepository::new(pool)),
        None => Arc::new(InMemorySessionRepository::new()),
    };

    Ok(BankService::new(
        sessions,
        Arc::new(SwitchClient::new(bank.switch_base_url.clone(), config.http_timeout)),
        Arc::new(ApproveAll),
        Arc::new(SystemClock),
        BankSettings {
            trusted_merchant_id: bank.bank_merchant_id.clone(),
            payment_base_url: bank.payment_base_url.clone(),
            session_ttl: chrono::Duration::seconds(bank.session_ttl_secs),
        },
    ))
}

pub fn merchant_service(config: &Config, merchant: &MerchantConfig) -> MerchantService {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    MerchantService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(SwitchClient::new(merchant.switch_base_url.clone(), config.http_timeout)),
        clock,
        MerchantSettings {
            merchant_id: merchant.merchant_id.clone(),
            merchant_secret: merchant.merchant_secret.expose().to_string(),
            public_base_url: merchant.public_base_url.clone(),
        },
    )
}

/// Wires the configured service into a router, plus the reconciliation target
/// when the service has one.
pub async fn build_app(config: &Config) -> Result<(Router, Option<Reconcilable>)> {
    let admin_key = AdminKey::new(config.admin_api_key.as_ref().map(|k| k.expose().to_string()));

    match &config.role {
        RoleConfig::Switch(switch) => {
            let service = switch_service(config, switch).await?;
            let app = crate::create_switch_app(service.clone(), admin_key);
            Ok((app, Some(Reconcilable::Switch(service))))
        }
        RoleConfig::Bank(bank) => {
            let service = bank_service(config, bank).await?;
            let app = crate::create_bank_app(service.clone(), admin_key);
            Ok((app, Some(Reconcilable::Bank(service))))
        }
        RoleConfig::Merchant(merchant) => {
            let service = merchant_service(config, merchant);
            Ok((crate::create_merchant_app(service), None))
        }
    }
}
