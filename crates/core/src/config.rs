use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::PricingPolicy;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub pricing: PricingConfig,
    pub orders: OrdersConfig,
    pub auth: AuthConfig,
    pub startup: StartupConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub delivery_fee: Decimal,
}

#[derive(Clone, Debug)]
pub struct OrdersConfig {
    pub max_items: usize,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub signing_secret: SecretString,
    pub token_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StartupConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub catalog_base_url: Option<String>,
    pub auth_signing_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tacoexpress.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            catalog: CatalogConfig {
                base_url: "http://catalog-service:3000".to_string(),
                timeout_secs: 5,
            },
            pricing: PricingConfig { delivery_fee: PricingPolicy::default().delivery_fee },
            orders: OrdersConfig { max_items: 50 },
            auth: AuthConfig { signing_secret: String::new().into(), token_ttl_secs: 7 * 24 * 3600 },
            startup: StartupConfig { max_attempts: 10, initial_delay_ms: 500, max_delay_ms: 5_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("tacoexpress.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy::default().with_delivery_fee(self.pricing.delivery_fee)
    }

    pub fn startup_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.startup.max_attempts,
            Duration::from_millis(self.startup.initial_delay_ms),
            Duration::from_millis(self.startup.max_delay_ms),
        )
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(base_url) = catalog.base_url {
                self.catalog.base_url = base_url;
            }
            if let Some(timeout_secs) = catalog.timeout_secs {
                self.catalog.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(delivery_fee) = pricing.delivery_fee {
                self.pricing.delivery_fee = parse_decimal("pricing.delivery_fee", &delivery_fee)?;
            }
        }

        if let Some(orders) = patch.orders {
            if let Some(max_items) = orders.max_items {
                self.orders.max_items = max_items;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(signing_secret) = auth.signing_secret {
                self.auth.signing_secret = signing_secret.into();
            }
            if let Some(token_ttl_secs) = auth.token_ttl_secs {
                self.auth.token_ttl_secs = token_ttl_secs;
            }
        }

        if let Some(startup) = patch.startup {
            if let Some(max_attempts) = startup.max_attempts {
                self.startup.max_attempts = max_attempts;
            }
            if let Some(initial_delay_ms) = startup.initial_delay_ms {
                self.startup.initial_delay_ms = initial_delay_ms;
            }
            if let Some(max_delay_ms) = startup.max_delay_ms {
                self.startup.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TACOEXPRESS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TACOEXPRESS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("TACOEXPRESS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TACOEXPRESS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TACOEXPRESS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TACOEXPRESS_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TACOEXPRESS_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_env("TACOEXPRESS_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TACOEXPRESS_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("TACOEXPRESS_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let catalog_url =
            read_env("TACOEXPRESS_CATALOG_BASE_URL").or_else(|| read_env("CATALOG_URL"));
        if let Some(value) = catalog_url {
            self.catalog.base_url = value;
        }
        if let Some(value) = read_env("TACOEXPRESS_CATALOG_TIMEOUT_SECS") {
            self.catalog.timeout_secs = parse_env("TACOEXPRESS_CATALOG_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TACOEXPRESS_PRICING_DELIVERY_FEE") {
            self.pricing.delivery_fee = Decimal::from_str(value.trim()).map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "TACOEXPRESS_PRICING_DELIVERY_FEE".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        if let Some(value) = read_env("TACOEXPRESS_ORDERS_MAX_ITEMS") {
            self.orders.max_items = parse_env("TACOEXPRESS_ORDERS_MAX_ITEMS", &value)?;
        }

        if let Some(value) = read_env("TACOEXPRESS_AUTH_SIGNING_SECRET") {
            self.auth.signing_secret = value.into();
        }
        if let Some(value) = read_env("TACOEXPRESS_AUTH_TOKEN_TTL_SECS") {
            self.auth.token_ttl_secs = parse_env("TACOEXPRESS_AUTH_TOKEN_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("TACOEXPRESS_STARTUP_MAX_ATTEMPTS") {
            self.startup.max_attempts = parse_env("TACOEXPRESS_STARTUP_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("TACOEXPRESS_STARTUP_INITIAL_DELAY_MS") {
            self.startup.initial_delay_ms =
                parse_env("TACOEXPRESS_STARTUP_INITIAL_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("TACOEXPRESS_STARTUP_MAX_DELAY_MS") {
            self.startup.max_delay_ms = parse_env("TACOEXPRESS_STARTUP_MAX_DELAY_MS", &value)?;
        }

        let log_level =
            read_env("TACOEXPRESS_LOGGING_LEVEL").or_else(|| read_env("TACOEXPRESS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TACOEXPRESS_LOGGING_FORMAT").or_else(|| read_env("TACOEXPRESS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(base_url) = overrides.catalog_base_url {
            self.catalog.base_url = base_url;
        }
        if let Some(secret) = overrides.auth_signing_secret {
            self.auth.signing_secret = secret.into();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_catalog(&self.catalog)?;
        validate_pricing(&self.pricing)?;
        validate_orders(&self.orders)?;
        validate_auth(&self.auth)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tacoexpress.toml"), PathBuf::from("config/tacoexpress.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    // Every pooled connection to an in-memory database opens its own empty database.
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    if in_memory && database.max_connections > 1 {
        return Err(ConfigError::Validation(format!(
            "database.max_connections must be 1 for in-memory database `{url}` (got {})",
            database.max_connections
        )));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    let base_url = catalog.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "catalog.base_url must start with http:// or https://".to_string(),
        ));
    }

    if catalog.timeout_secs == 0 || catalog.timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "catalog.timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if pricing.delivery_fee.is_sign_negative() {
        return Err(ConfigError::Validation(
            "pricing.delivery_fee must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_orders(orders: &OrdersConfig) -> Result<(), ConfigError> {
    if orders.max_items == 0 {
        return Err(ConfigError::Validation(
            "orders.max_items must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.signing_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.signing_secret is required (set TACOEXPRESS_AUTH_SIGNING_SECRET)".to_string(),
        ));
    }
    if secret.len() < 16 {
        return Err(ConfigError::Validation(
            "auth.signing_secret must be at least 16 characters".to_string(),
        ));
    }
    if auth.token_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "auth.token_ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim())
        .map_err(|error| ConfigError::Validation(format!("{field} is not a decimal: {error}")))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    catalog: Option<CatalogPatch>,
    pricing: Option<PricingPatch>,
    orders: Option<OrdersPatch>,
    auth: Option<AuthPatch>,
    startup: Option<StartupPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    delivery_fee: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrdersPatch {
    max_items: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    signing_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StartupPatch {
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
