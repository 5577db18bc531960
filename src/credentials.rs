//! Kling API credentials
//!
//! A credential is either an access-key/secret-key pair, from which a fresh
//! bearer token is minted for every run, or a pre-built token supplied as-is.

use crate::auth;
use crate::request::RequestSpec;
use crate::transport::Transport;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

#[derive(Clone)]
pub enum Credential {
    KeyPair {
        access_key: String,
        secret_key: String,
    },
    /// Pre-built bearer token. A leading `Bearer` scheme is tolerated.
    Token(String),
}

impl Credential {
    pub fn key_pair(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Credential::KeyPair {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Bearer value to send for a run starting at `now`.
    pub fn bearer(&self, now: DateTime<Utc>) -> Result<Bearer> {
        match self {
            Credential::KeyPair {
                access_key,
                secret_key,
            } => {
                if access_key.trim().is_empty() {
                    return Err(Error::Configuration(
                        "Access key must not be empty".to_string(),
                    ));
                }
                let token = auth::issue_token(access_key, secret_key, now)?;
                tracing::debug!(
                    access_key = %mask_credential(access_key),
                    expires_at = %token.expires_at(),
                    "Minted Kling API token"
                );
                Ok(Bearer {
                    expires_at: Some(token.expires_at()),
                    value: token.into_value(),
                })
            }
            Credential::Token(raw) => {
                let value = strip_bearer_prefix(raw.trim());
                if value.is_empty() {
                    return Err(Error::Configuration(
                        "API token must not be empty".to_string(),
                    ));
                }
                Ok(Bearer {
                    value: value.to_string(),
                    expires_at: None,
                })
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::KeyPair { access_key, .. } => f
                .debug_struct("KeyPair")
                .field("access_key", &mask_credential(access_key))
                .field("secret_key", &"<redacted>")
                .finish(),
            Credential::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// The token attached to every request of one run.
#[derive(Clone)]
pub struct Bearer {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Bearer {
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Expiry of a minted token; `None` for pre-built tokens.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| at >= exp)
    }
}

impl fmt::Debug for Bearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bearer")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Drop a case-insensitive `Bearer` scheme followed by whitespace or nothing.
fn strip_bearer_prefix(value: &str) -> &str {
    const SCHEME: &str = "bearer";
    match value.get(..SCHEME.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SCHEME) => {
            let rest = &value[SCHEME.len()..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                value
            }
        }
        _ => value,
    }
}

/// Mask sensitive credential values for logging
pub fn mask_credential(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// Request used to check that a credential is accepted: account costs for
/// the 24 hours before `now`.
pub fn probe_request(now: DateTime<Utc>) -> RequestSpec {
    let end = now.timestamp_millis();
    let start = (now - Duration::hours(24)).timestamp_millis();
    RequestSpec::get("/account/costs").with_query(vec![
        ("start_time".to_string(), start.to_string()),
        ("end_time".to_string(), end.to_string()),
    ])
}

/// Verify a credential against the API without running a batch.
pub async fn test_credential(
    transport: &dyn Transport,
    credential: &Credential,
    now: DateTime<Utc>,
) -> Result<serde_json::Value> {
    let bearer = credential.bearer(now)?;
    tracing::info!("Testing Kling API credentials");
    transport.execute(probe_request(now), bearer.value()).await
}
