//! Data models and configuration
//!
//! Defines batch items, per-item results and the environment-driven
//! configuration used by the binary.

use crate::credentials::Credential;
use crate::error::ErrorKind;
use crate::{Error, Result};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.klingai.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// One input item of a batch.
///
/// `resource` and `operation` select the API call; every other key is a
/// parameter for it. Missing selectors deserialize as empty strings and are
/// rejected per item during resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub operation: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
    /// Set when the input element could not be read as an item; resolving
    /// such an item always fails.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl Item {
    pub fn new(resource: &str, operation: &str, params: Value) -> Self {
        Self {
            resource: resource.to_string(),
            operation: operation.to_string(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            malformed: None,
        }
    }

    /// Read one batch element, keeping a malformed element as a failing item
    /// so the rest of the batch is unaffected.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e: serde_json::Error| Self {
            resource: String::new(),
            operation: String::new(),
            params: Map::new(),
            malformed: Some(e.to_string()),
        })
    }
}

/// Why a single item failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ItemError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one item, tagged with its position in the input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub item_index: usize,
    pub outcome: std::result::Result<Value, ItemError>,
}

impl ItemResult {
    pub fn success(item_index: usize, json: Value) -> Self {
        Self {
            item_index,
            outcome: Ok(json),
        }
    }

    pub fn failure(item_index: usize, err: &Error) -> Self {
        Self {
            item_index,
            outcome: Err(ItemError::from(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.outcome.as_ref().err()
    }

    /// Response body, or `{"error": <message>}` for a failed item.
    pub fn json(&self) -> Value {
        match &self.outcome {
            Ok(json) => json.clone(),
            Err(err) => json!({ "error": err.message }),
        }
    }
}

impl Serialize for ItemResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ItemResult", 2)?;
        state.serialize_field("json", &self.json())?;
        state.serialize_field("itemIndex", &self.item_index)?;
        state.end()
    }
}

/// Parse a batch from JSON: an array of items, or a single item object.
pub fn load_items<R: Read>(reader: R) -> Result<Vec<Item>> {
    let value: Value = serde_json::from_reader(reader)?;
    match value {
        Value::Array(elements) => Ok(elements.into_iter().map(Item::from_value).collect()),
        Value::Object(_) => Ok(vec![Item::from_value(value)]),
        _ => Err(Error::Configuration(
            "Batch input must be a JSON array of items or a single item object".to_string(),
        )),
    }
}

pub fn load_items_from_path(path: &Path) -> Result<Vec<Item>> {
    let file = std::fs::File::open(path)?;
    load_items(std::io::BufReader::new(file))
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub credential: Credential,
    pub base_url: String,
    pub timeout: Duration,
    pub continue_on_fail: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credential = match (
            get("KLING_ACCESS_KEY"),
            get("KLING_SECRET_KEY"),
            get("KLING_API_TOKEN"),
        ) {
            (Some(access_key), Some(secret_key), _) => Credential::KeyPair {
                access_key,
                secret_key,
            },
            (None, None, Some(token)) => Credential::Token(token),
            (Some(_), None, _) => {
                return Err(Error::Configuration(
                    "KLING_SECRET_KEY not set".to_string(),
                ))
            }
            (None, Some(_), _) => {
                return Err(Error::Configuration(
                    "KLING_ACCESS_KEY not set".to_string(),
                ))
            }
            (None, None, None) => {
                return Err(Error::Configuration(
                    "Set KLING_ACCESS_KEY and KLING_SECRET_KEY (or KLING_API_TOKEN)".to_string(),
                ))
            }
        };

        let timeout_secs = match get("KLING_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Configuration(format!("KLING_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let continue_on_fail = get("KLING_CONTINUE_ON_FAIL")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            credential,
            base_url: get("KLING_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            continue_on_fail,
        })
    }
}
