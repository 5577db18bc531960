//! Request resolution
//!
//! Turns a batch item (resource, operation and loosely typed parameters) into
//! the method, path, query and body of exactly one Kling API call. This is the
//! only place where parameter names are translated into wire names.

pub mod operation;
pub mod params;

pub use operation::{Operation, Resource, VideoType};
pub use params::ParamMap;

use crate::models::Item;
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// One resolved API call. Built once per item and handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Resolve an item into its request.
pub fn resolve(item: &Item) -> Result<RequestSpec> {
    if let Some(reason) = &item.malformed {
        return Err(Error::invalid("item", reason.clone()));
    }
    let params = ParamMap::new(&item.params);
    Operation::parse(&item.resource, &item.operation, &params)?.to_request()
}
