use std::env;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use secrecy::SecretString;
use serde_json::Value;
use tacoexpress_cli::commands::{config, doctor, migrate, price, token};
use tacoexpress_core::domain::order::UserId;
use tacoexpress_core::identity::IdentitySigner;

const SECRET: &str = "cli-test-signing-secret";

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(
        &[
            ("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET),
            ("TACOEXPRESS_DATABASE_URL", "sqlite::memory:"),
            ("TACOEXPRESS_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 0, "expected successful migrate run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "ok");
            assert!(payload["message"].as_str().unwrap_or("").contains("1 migration(s)"));
        },
    );
}

#[test]
fn migrate_returns_config_failure_without_signing_secret() {
    with_env(
        &[
            ("TACOEXPRESS_DATABASE_URL", "sqlite::memory:"),
            ("TACOEXPRESS_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "migrate");
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
            assert!(payload["message"].as_str().unwrap_or("").contains("auth.signing_secret"));
        },
    );
}

#[test]
fn price_applies_delivery_fee_and_coupon() {
    let items = vec!["20.00x2".to_string(), "18x1".to_string()];

    let result = price::run(&items, Some("taco10"), None);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "price");
    assert_eq!(
        payload["message"],
        "subtotal=58.00 delivery_fee=40.00 discount=5.80 total=92.20 \
         applied_rules=BASE_DELIVERY_FEE,COUPON_TACO10_10_PERCENT"
    );
}

#[test]
fn price_honours_delivery_fee_override() {
    let items = vec!["10.00x1".to_string()];

    let result = price::run(&items, None, Some("0"));
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    let message = payload["message"].as_str().unwrap_or("");
    assert!(message.contains("delivery_fee=0 "), "unexpected message: {message}");
    assert!(message.contains("total=10.00"), "unexpected message: {message}");
    assert!(message.ends_with("applied_rules=BASE_DELIVERY_FEE"));
}

#[test]
fn price_uses_default_fee_regardless_of_config() {
    with_env(&[("TACOEXPRESS_PRICING_DELIVERY_FEE", "15.00")], || {
        let result = price::run(&["10.00x1".to_string()], None, None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("delivery_fee=40.00 "), "unexpected message: {message}");
    });
}

#[test]
fn price_rejects_malformed_items() {
    for items in [vec!["two tacos".to_string()], vec!["20.00x0".to_string()]] {
        let result = price::run(&items, None, None);
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    }

    let result = price::run(&["1x1".to_string()], None, Some("-5"));
    assert_eq!(result.exit_code, 6);

    let result = price::run(&["50000000000000000000000000000x2".to_string()], None, None);
    assert_eq!(result.exit_code, 6);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

#[test]
fn token_is_verifiable_with_the_configured_secret() {
    with_env(&[("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET)], || {
        let result = token::run(7, Some(600));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "token");
        let minted = payload["message"].as_str().expect("token string");

        let signer = IdentitySigner::new(SecretString::from(SECRET.to_string()));
        let identity = signer.verify(minted, Utc::now()).expect("token verifies");
        assert_eq!(identity.user_id, UserId(7));
    });
}

#[test]
fn token_rejects_invalid_requests() {
    with_env(&[("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET)], || {
        assert_eq!(token::run(0, None).exit_code, 6);
        assert_eq!(token::run(7, Some(0)).exit_code, 6);
        assert_eq!(token::run(7, Some(u64::MAX)).exit_code, 6);
    });

    with_env(&[], || {
        let result = token::run(7, None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn migrate_rejects_pooled_in_memory_database() {
    with_env(
        &[
            ("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET),
            ("TACOEXPRESS_DATABASE_URL", "sqlite::memory:"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["error_class"], "config_validation");
            assert!(payload["message"]
                .as_str()
                .unwrap_or("")
                .contains("database.max_connections"));
        },
    );
}

#[test]
fn doctor_reports_pass_with_valid_env() {
    with_env(
        &[
            ("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET),
            ("TACOEXPRESS_DATABASE_URL", "sqlite::memory:"),
            ("TACOEXPRESS_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let report = parse_payload(&doctor::run(true));
            assert_eq!(report["overall_status"], "pass");

            let names: Vec<&str> = report["checks"]
                .as_array()
                .expect("checks array")
                .iter()
                .filter_map(|check| check["name"].as_str())
                .collect();
            assert_eq!(names, ["config_validation", "identity_signing", "database_connectivity"]);
        },
    );
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[], || {
        let report = parse_payload(&doctor::run(true));
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][2]["status"], "skipped");

        let human = doctor::run(false);
        assert!(human.starts_with("doctor: one or more readiness checks failed"));
        assert!(human.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_output_attributes_sources_and_redacts_secret() {
    with_env(
        &[("TACOEXPRESS_AUTH_SIGNING_SECRET", SECRET), ("CATALOG_URL", "http://catalog:4000")],
        || {
            let output = config::run();

            assert!(output.contains(
                "- auth.signing_secret = <redacted> (source: env (TACOEXPRESS_AUTH_SIGNING_SECRET))"
            ));
            assert!(output
                .contains("- catalog.base_url = http://catalog:4000 (source: env (CATALOG_URL))"));
            assert!(output.contains("- orders.max_items = 50 (source: default)"));
            assert!(!output.contains(SECRET));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "TACOEXPRESS_DATABASE_URL",
        "TACOEXPRESS_DATABASE_MAX_CONNECTIONS",
        "TACOEXPRESS_DATABASE_TIMEOUT_SECS",
        "TACOEXPRESS_SERVER_BIND_ADDRESS",
        "TACOEXPRESS_SERVER_PORT",
        "PORT",
        "TACOEXPRESS_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "TACOEXPRESS_CATALOG_BASE_URL",
        "CATALOG_URL",
        "TACOEXPRESS_CATALOG_TIMEOUT_SECS",
        "TACOEXPRESS_PRICING_DELIVERY_FEE",
        "TACOEXPRESS_ORDERS_MAX_ITEMS",
        "TACOEXPRESS_AUTH_SIGNING_SECRET",
        "TACOEXPRESS_AUTH_TOKEN_TTL_SECS",
        "TACOEXPRESS_STARTUP_MAX_ATTEMPTS",
        "TACOEXPRESS_STARTUP_INITIAL_DELAY_MS",
        "TACOEXPRESS_STARTUP_MAX_DELAY_MS",
        "TACOEXPRESS_LOGGING_LEVEL",
        "TACOEXPRESS_LOGGING_FORMAT",
        "TACOEXPRESS_LOG_LEVEL",
        "TACOEXPRESS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
