use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tacoexpress_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: Vec<(&str, String, &[&str])> = vec![
        ("database.url", config.database.url.clone(), &["TACOEXPRESS_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["TACOEXPRESS_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["TACOEXPRESS_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["TACOEXPRESS_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["TACOEXPRESS_SERVER_PORT", "PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["TACOEXPRESS_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        (
            "catalog.base_url",
            config.catalog.base_url.clone(),
            &["TACOEXPRESS_CATALOG_BASE_URL", "CATALOG_URL"],
        ),
        (
            "catalog.timeout_secs",
            config.catalog.timeout_secs.to_string(),
            &["TACOEXPRESS_CATALOG_TIMEOUT_SECS"],
        ),
        (
            "pricing.delivery_fee",
            config.pricing.delivery_fee.to_string(),
            &["TACOEXPRESS_PRICING_DELIVERY_FEE"],
        ),
        (
            "orders.max_items",
            config.orders.max_items.to_string(),
            &["TACOEXPRESS_ORDERS_MAX_ITEMS"],
        ),
        (
            "auth.signing_secret",
            redact_secret(config.auth.signing_secret.expose_secret()),
            &["TACOEXPRESS_AUTH_SIGNING_SECRET"],
        ),
        (
            "auth.token_ttl_secs",
            config.auth.token_ttl_secs.to_string(),
            &["TACOEXPRESS_AUTH_TOKEN_TTL_SECS"],
        ),
        (
            "startup.max_attempts",
            config.startup.max_attempts.to_string(),
            &["TACOEXPRESS_STARTUP_MAX_ATTEMPTS"],
        ),
        (
            "startup.initial_delay_ms",
            config.startup.initial_delay_ms.to_string(),
            &["TACOEXPRESS_STARTUP_INITIAL_DELAY_MS"],
        ),
        (
            "startup.max_delay_ms",
            config.startup.max_delay_ms.to_string(),
            &["TACOEXPRESS_STARTUP_MAX_DELAY_MS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["TACOEXPRESS_LOGGING_LEVEL", "TACOEXPRESS_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TACOEXPRESS_LOGGING_FORMAT", "TACOEXPRESS_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["tacoexpress.toml", "config/tacoexpress.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn nested_keys_resolve_through_tables() {
        let doc: toml::Value = "[catalog]\nbase_url = \"http://catalog:3000\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "catalog.base_url"));
        assert!(!contains_path(&doc, "catalog.timeout_secs"));
        assert!(!contains_path(&doc, "auth.signing_secret"));
    }

    #[test]
    fn secrets_never_render_in_clear() {
        assert_eq!(redact_secret(""), "<empty>");
        assert_eq!(redact_secret("orders-signing-secret-123"), "<redacted>");
    }
}
