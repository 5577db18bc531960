//! Bearer token minting for the Kling API.
//!
//! Tokens are HS256-signed JWTs whose payload carries exactly `iss`, `exp` and
//! `nbf`. A token is valid for 30 minutes and its `nbf` is backdated five
//! seconds so a client clock that runs slightly ahead is still accepted.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifetime of a minted token, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 1800;

/// How far `nbf` is placed before the issue time, in seconds.
pub const NOT_BEFORE_SKEW_SECS: i64 = 5;

/// JWT payload accepted by the Kling API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
}

/// A signed token together with the instants it was minted for.
#[derive(Clone)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
    not_before: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("not_before", &self.not_before)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Configuration(format!("Timestamp {} is out of range", secs)))
}

/// Mint a token for `access_key`, signed with `secret_key`, as of `now`.
///
/// Sub-second precision of `now` is discarded; the claims use whole Unix
/// seconds. No I/O happens here.
pub fn issue_token(access_key: &str, secret_key: &str, now: DateTime<Utc>) -> Result<Token> {
    if secret_key.is_empty() {
        return Err(Error::Configuration(
            "Secret key must not be empty".to_string(),
        ));
    }

    let now_secs = now.timestamp();
    let claims = Claims {
        iss: access_key.to_string(),
        exp: now_secs + TOKEN_LIFETIME_SECS,
        nbf: now_secs - NOT_BEFORE_SKEW_SECS,
    };

    let value = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret_key.as_bytes()),
    )?;

    Ok(Token {
        value,
        issued_at: timestamp(now_secs)?,
        not_before: timestamp(claims.nbf)?,
        expires_at: timestamp(claims.exp)?,
    })
}

/// Check a token's signature against `secret_key` and its validity window at `at`.
///
/// The window is `[nbf, exp)` with no extra leeway.
pub fn verify_token(value: &str, secret_key: &str, at: DateTime<Utc>) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.set_required_spec_claims(&["iss", "exp", "nbf"]);

    let data = decode::<Claims>(
        value,
        &DecodingKey::from_secret(secret_key.as_bytes()),
        &validation,
    )?;

    let at = at.timestamp();
    if at < data.claims.nbf {
        return Err(Error::Configuration("Token is not yet valid".to_string()));
    }
    if at >= data.claims.exp {
        return Err(Error::Configuration("Token has expired".to_string()));
    }

    Ok(data.claims)
}
