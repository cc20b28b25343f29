use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ServiceKind {
    #[default]
    Switch,
    Bank,
    Merchant,
}

impl ServiceKind {
    pub fn default_port(self) -> u16 {
        match self {
            ServiceKind::Switch => 7001,
            ServiceKind::Bank => 7002,
            ServiceKind::Merchant => 7003,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKind::Switch => "switch",
            ServiceKind::Bank => "bank",
            ServiceKind::Merchant => "merchant",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration value that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"****\"")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwitchConfig {
    pub bank_base_url: String,
    pub bank_merchant_id: String,
    pub checkout_base_url: String,
    pub merchant_credentials: HashMap<String, Secret>,
    pub bank_breaker_failures: u32,
    pub bank_breaker_reset_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BankConfig {
    pub switch_base_url: String,
    pub bank_merchant_id: String,
    pub payment_base_url: String,
    pub session_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub switch_base_url: String,
    pub merchant_id: String,
    pub merchant_secret: Secret,
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub enum RoleConfig {
    Switch(SwitchConfig),
    Bank(BankConfig),
    Merchant(MerchantConfig),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceKind,
    pub server_port: u16,
    pub database_url: Option<Secret>,
    pub http_timeout: Duration,
    pub reconcile_interval: Option<Duration>,
    pub log_format: LogFormat,
    pub admin_api_key: Option<Secret>,
    pub role: RoleConfig,
}

impl Config {
    pub fn from_env(service: ServiceKind) -> Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(service: ServiceKind, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server_port: u16 = parse_or(&get, "SERVER_PORT", service.default_port())?;
        let local_base = format!("http://localhost:{}", server_port);

        let role = match service {
            ServiceKind::Switch => RoleConfig::Switch(SwitchConfig {
                bank_base_url: get("BANK_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", ServiceKind::Bank.default_port())),
                bank_merchant_id: required(&get, "BANK_MERCHANT_ID")?,
                checkout_base_url: get("SWITCH_CHECKOUT_BASE_URL").unwrap_or_else(|| local_base.clone()),
                merchant_credentials: parse_credentials(&get("MERCHANT_CREDENTIALS").unwrap_or_default())?,
                bank_breaker_failures: parse_or(&get, "BANK_BREAKER_FAILURES", 3)?,
                bank_breaker_reset_secs: parse_or(&get, "BANK_BREAKER_RESET_SECS", 60)?,
            }),
            ServiceKind::Bank => RoleConfig::Bank(BankConfig {
                switch_base_url: get("SWITCH_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", ServiceKind::Switch.default_port())),
                bank_merchant_id: required(&get, "BANK_MERCHANT_ID")?,
                payment_base_url: get("BANK_PAYMENT_BASE_URL").unwrap_or_else(|| local_base.clone()),
                session_ttl_secs: parse_or(&get, "BANK_SESSION_TTL_SECS", 300)?,
            }),
            ServiceKind::Merchant => RoleConfig::Merchant(MerchantConfig {
                switch_base_url: get("SWITCH_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}", ServiceKind::Switch.default_port())),
                merchant_id: required(&get, "MERCHANT_ID")?,
                merchant_secret: Secret::new(required(&get, "MERCHANT_SECRET")?),
                public_base_url: get("MERCHANT_PUBLIC_BASE_URL").unwrap_or_else(|| local_base.clone()),
            }),
        };

        let reconcile_interval = match get("RECONCILE_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("RECONCILE_INTERVAL_SECS is not a number: {}", raw))?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        Ok(Config {
            service,
            server_port,
            database_url: get("DATABASE_URL").map(Secret::new),
            http_timeout: Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 5)?),
            reconcile_interval,
            log_format: get("LOG_FORMAT").unwrap_or_default().parse()?,
            admin_api_key: get("ADMIN_API_KEY").map(Secret::new),
            role,
        })
    }
}

fn required<G>(get: &G, key: &str) -> Result<String>
where
    G: Fn(&str) -> Option<String>,
{
    get(key).with_context(|| format!("{} must be set", key))
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

/// Parses `id:secret,id:secret`.
pub fn parse_credentials(raw: &str) -> Result<HashMap<String, Secret>> {
    let mut credentials = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((id, secret)) = entry.split_once(':') else {
            bail!("MERCHANT_CREDENTIALS entries must look like 'merchant_id:secret'");
        };
        let (id, secret) = (id.trim(), secret.trim());
        if id.is_empty() || secret.is_empty() {
            bail!("MERCHANT_CREDENTIALS contains an empty merchant id or secret");
        }
        credentials.insert(id.to_string(), Secret::new(secret));
    }
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_switch_defaults() {
        let config = Config::from_lookup(
            ServiceKind::Switch,
            lookup(&[
                ("BANK_MERCHANT_ID", "switch-001"),
                ("MERCHANT_CREDENTIALS", "webshop-1:s3cret, webshop-2:other"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server_port, 7001);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());
        assert!(config.reconcile_interval.is_none());
        assert_eq!(config.log_format, LogFormat::Text);

        let RoleConfig::Switch(switch) = &config.role else {
            panic!("expected switch config");
        };
        assert_eq!(switch.bank_base_url, "http://localhost:7002");
        assert_eq!(switch.checkout_base_url, "http://localhost:7001");
        assert_eq!(switch.merchant_credentials.len(), 2);
        assert_eq!(switch.merchant_credentials["webshop-1"].expose(), "s3cret");
        assert_eq!(switch.bank_breaker_failures, 3);
    }

    #[test]
    fn test_bank_overrides() {
        let config = Config::from_lookup(
            ServiceKind::Bank,
            lookup(&[
                ("BANK_MERCHANT_ID", "switch-001"),
                ("SERVER_PORT", "9002"),
                ("BANK_SESSION_TTL_SECS", "60"),
                ("RECONCILE_INTERVAL_SECS", "15"),
                ("LOG_FORMAT", "json"),
                ("DATABASE_URL", "postgres://bank:pw@localhost/bank"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server_port, 9002);
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.log_format, LogFormat::Json);
        let RoleConfig::Bank(bank) = &config.role else {
            panic!("expected bank config");
        };
        assert_eq!(bank.session_ttl_secs, 60);
        assert_eq!(bank.payment_base_url, "http://localhost:9002");
    }

    #[test]
    fn test_missing_identity_is_an_error() {
        assert!(Config::from_lookup(ServiceKind::Bank, lookup(&[])).is_err());
        assert!(Config::from_lookup(ServiceKind::Merchant, lookup(&[("MERCHANT_ID", "m")])).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let result = Config::from_lookup(
            ServiceKind::Bank,
            lookup(&[("BANK_MERCHANT_ID", "switch-001"), ("SERVER_PORT", "http")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_credentials() {
        assert!(parse_credentials("webshop-1").is_err());
        assert!(parse_credentials("webshop-1:").is_err());
        assert!(parse_credentials("").unwrap().is_empty());
    }

    #[test]
    fn test_secrets_are_redacted() {
        let config = Config::from_lookup(
            ServiceKind::Merchant,
            lookup(&[
                ("MERCHANT_ID", "webshop-1"),
                ("MERCHANT_SECRET", "s3cret"),
                ("ADMIN_API_KEY", "adm1n"),
            ]),
        )
        .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("adm1n"));
        assert!(debug.contains("webshop-1"));
    }
}
