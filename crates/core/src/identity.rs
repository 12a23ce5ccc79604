//! Caller identity tokens.
//!
//! Tokens have the shape `v1.<user_id>.<expires_unix>.<signature>` where the
//! signature is the hex HMAC-SHA256 of `v1.<user_id>.<expires_unix>` under
//! the configured signing secret. A token is verified once at the HTTP
//! boundary and the resulting [`CallerIdentity`] is passed down explicitly.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use crate::domain::order::UserId;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity token is missing")]
    Missing,
    #[error("identity token is malformed")]
    Malformed,
    #[error("identity token version `{0}` is not supported")]
    UnsupportedVersion(String),
    #[error("identity token signature is invalid")]
    BadSignature,
    #[error("identity token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("identity signing secret is not usable")]
    InvalidSecret,
}

#[derive(Clone, Debug)]
pub struct IdentitySigner {
    secret: SecretString,
}

impl IdentitySigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn issue(
        &self,
        user_id: UserId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, IdentityError> {
        let expires = (now + ttl).timestamp();
        let payload = format!("{TOKEN_VERSION}.{}.{expires}", user_id.0);
        let signature = encode_hex(&self.sign(payload.as_bytes())?);
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<CallerIdentity, IdentityError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IdentityError::Missing);
        }

        let (payload, signature_hex) = token.rsplit_once('.').ok_or(IdentityError::Malformed)?;
        let mut parts = payload.split('.');
        let (Some(version), Some(user), Some(expires), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(IdentityError::Malformed);
        };

        if version != TOKEN_VERSION {
            return Err(IdentityError::UnsupportedVersion(version.to_string()));
        }

        let signature = decode_hex(signature_hex).ok_or(IdentityError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| IdentityError::BadSignature)?;

        let user_id = user.parse::<i64>().map_err(|_| IdentityError::Malformed)?;
        if user_id <= 0 {
            return Err(IdentityError::Malformed);
        }
        let expires_unix = expires.parse::<i64>().map_err(|_| IdentityError::Malformed)?;
        let expires_at =
            Utc.timestamp_opt(expires_unix, 0).single().ok_or(IdentityError::Malformed)?;
        if expires_at <= now {
            return Err(IdentityError::Expired(expires_at));
        }

        Ok(CallerIdentity { user_id: UserId(user_id), expires_at })
    }

    fn mac(&self) -> Result<HmacSha256, IdentityError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| IdentityError::InvalidSecret)
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, IdentityError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim()).filter(|t| !t.is_empty())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 || !value.is_ascii() {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&value[index..index + 2], 16).ok())
        .collect()
}
