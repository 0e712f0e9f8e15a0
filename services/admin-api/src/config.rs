//! Admin API configuration.
//!
//! # Purpose
//! Loads service settings from `ATRIUM_*` environment variables with an
//! optional YAML override file named by `ATRIUM_CONFIG`.
//!
//! # Notes
//! Secrets (database URL, signing seed) are read here but never logged.
use crate::auth::idp_registry::IdpIssuerConfig;
use crate::auth::orchestrator::ProvisioningMode;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

pub const DEFAULT_TOKEN_ISSUER: &str = "atrium-auth";
pub const DEFAULT_TOKEN_AUDIENCE: &str = "atrium-admin";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_TOKEN_LEEWAY_SECS: u64 = 30;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => bail!("unknown ATRIUM_ENV: {other}"),
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" => Ok(StorageBackend::Postgres),
            other => bail!("unknown ATRIUM_STORAGE: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub ttl_secs: u64,
    pub leeway_secs: u64,
    /// Hex Ed25519 seed for the current signing key.
    pub signing_key: Option<String>,
    /// Hex seeds still accepted for verification after rotation.
    pub previous_signing_keys: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            audience: DEFAULT_TOKEN_AUDIENCE.to_string(),
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            leeway_secs: DEFAULT_TOKEN_LEEWAY_SECS,
            signing_key: None,
            previous_signing_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub environment: Environment,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub oidc: Option<IdpIssuerConfig>,
    pub staff_organizations: Vec<String>,
    pub provisioning_mode: ProvisioningMode,
    pub token: TokenConfig,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    environment: Option<String>,
    storage: Option<String>,
    database_url: Option<String>,
    staff_organizations: Option<Vec<String>>,
    provisioning_mode: Option<String>,
    oidc: Option<IdpIssuerConfig>,
    token_issuer: Option<String>,
    token_audience: Option<String>,
    token_ttl_secs: Option<u64>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_or("ATRIUM_BIND", "0.0.0.0:8443")
            .parse()
            .with_context(|| "parse ATRIUM_BIND")?;
        let metrics_bind = env_or("ATRIUM_METRICS_BIND", "0.0.0.0:8080")
            .parse()
            .with_context(|| "parse ATRIUM_METRICS_BIND")?;
        let environment = Environment::parse(&env_or("ATRIUM_ENV", "development"))?;
        let storage = StorageBackend::parse(&env_or("ATRIUM_STORAGE", "memory"))?;
        let postgres = postgres_from_env()?;
        let oidc = oidc_from_env();
        let staff_organizations = std::env::var("ATRIUM_STAFF_ORGANIZATIONS")
            .map(|value| split_list(&value))
            .unwrap_or_default();
        let provisioning_mode = env_or("ATRIUM_PROVISIONING_MODE", "strict")
            .parse()
            .with_context(|| "parse ATRIUM_PROVISIONING_MODE")?;

        let mut token = TokenConfig::default();
        if let Ok(value) = std::env::var("ATRIUM_TOKEN_ISSUER") {
            token.issuer = value;
        }
        if let Ok(value) = std::env::var("ATRIUM_TOKEN_AUDIENCE") {
            token.audience = value;
        }
        if let Ok(value) = std::env::var("ATRIUM_TOKEN_TTL_SECS") {
            token.ttl_secs = value
                .parse()
                .with_context(|| "parse ATRIUM_TOKEN_TTL_SECS")?;
        }
        if let Ok(value) = std::env::var("ATRIUM_TOKEN_LEEWAY_SECS") {
            token.leeway_secs = value
                .parse()
                .with_context(|| "parse ATRIUM_TOKEN_LEEWAY_SECS")?;
        }
        token.signing_key = std::env::var("ATRIUM_TOKEN_SIGNING_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        token.previous_signing_keys = std::env::var("ATRIUM_TOKEN_PREVIOUS_SIGNING_KEYS")
            .map(|value| split_list(&value))
            .unwrap_or_default();

        let config = Self {
            bind_addr,
            metrics_bind,
            environment,
            storage,
            postgres,
            oidc,
            staff_organizations,
            provisioning_mode,
            token,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("ATRIUM_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read ATRIUM_CONFIG: {path}"))?;
            let override_cfg: ServiceConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse admin api config yaml")?;
            config.apply_override(override_cfg)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply_override(&mut self, override_cfg: ServiceConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.environment {
            self.environment = Environment::parse(&value)?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = StorageBackend::parse(&value)?;
        }
        if let Some(url) = override_cfg.database_url {
            match &mut self.postgres {
                Some(pg) => pg.url = url,
                None => {
                    self.postgres = Some(PostgresConfig {
                        url,
                        max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                        acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                    })
                }
            }
        }
        if let Some(value) = override_cfg.staff_organizations {
            self.staff_organizations = value;
        }
        if let Some(value) = override_cfg.provisioning_mode {
            self.provisioning_mode = value
                .parse()
                .with_context(|| "parse provisioning_mode")?;
        }
        if let Some(value) = override_cfg.oidc {
            self.oidc = Some(value);
        }
        if let Some(value) = override_cfg.token_issuer {
            self.token.issuer = value;
        }
        if let Some(value) = override_cfg.token_audience {
            self.token.audience = value;
        }
        if let Some(value) = override_cfg.token_ttl_secs {
            self.token.ttl_secs = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("ATRIUM_STORAGE=postgres requires DATABASE_URL");
        }
        if self.token.ttl_secs == 0 {
            bail!("ATRIUM_TOKEN_TTL_SECS must be positive");
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn postgres_from_env() -> Result<Option<PostgresConfig>> {
    let Ok(url) = std::env::var("DATABASE_URL").or_else(|_| std::env::var("ATRIUM_PG_URL")) else {
        return Ok(None);
    };
    let max_connections = match std::env::var("ATRIUM_PG_MAX_CONNECTIONS") {
        Ok(value) => value
            .parse()
            .with_context(|| "parse ATRIUM_PG_MAX_CONNECTIONS")?,
        Err(_) => DEFAULT_PG_MAX_CONNECTIONS,
    };
    let acquire_timeout_ms = match std::env::var("ATRIUM_PG_ACQUIRE_TIMEOUT_MS") {
        Ok(value) => value
            .parse()
            .with_context(|| "parse ATRIUM_PG_ACQUIRE_TIMEOUT_MS")?,
        Err(_) => DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
    };
    Ok(Some(PostgresConfig {
        url,
        max_connections,
        acquire_timeout_ms,
    }))
}

fn oidc_from_env() -> Option<IdpIssuerConfig> {
    let issuer = std::env::var("ATRIUM_OIDC_ISSUER").ok()?;
    Some(IdpIssuerConfig {
        issuer,
        audiences: std::env::var("ATRIUM_OIDC_AUDIENCES")
            .map(|value| split_list(&value))
            .unwrap_or_default(),
        discovery_url: std::env::var("ATRIUM_OIDC_DISCOVERY_URL").ok(),
        jwks_url: std::env::var("ATRIUM_OIDC_JWKS_URL").ok(),
    })
}
