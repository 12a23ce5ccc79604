use chrono::{Duration, Utc};
use tacoexpress_core::config::{AppConfig, LoadOptions};
use tacoexpress_core::domain::order::UserId;
use tacoexpress_core::identity::IdentitySigner;

use crate::commands::CommandResult;

/// Mints a bearer token for `user_id` signed with `auth.signing_secret`.
pub fn run(user_id: i64, ttl_secs: Option<u64>) -> CommandResult {
    if user_id <= 0 {
        return CommandResult::failure(
            "token",
            "invalid_input",
            format!("user id must be a positive integer, got {user_id}"),
            6,
        );
    }

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "token",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let ttl_secs = ttl_secs.unwrap_or(config.auth.token_ttl_secs);
    let now = Utc::now();
    let ttl = i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .filter(|ttl| ttl_secs > 0 && now.checked_add_signed(*ttl).is_some());
    let Some(ttl) = ttl else {
        return CommandResult::failure(
            "token",
            "invalid_input",
            format!("token ttl {ttl_secs}s is out of range"),
            6,
        );
    };

    let signer = IdentitySigner::new(config.auth.signing_secret);
    match signer.issue(UserId(user_id), ttl, now) {
        Ok(token) => CommandResult::success("token", token),
        Err(error) => CommandResult::failure("token", "identity", error.to_string(), 7),
    }
}
