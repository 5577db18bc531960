//! HTTP transport for resolved requests
//!
//! The dispatcher talks to the Kling API only through [`Transport`], so tests
//! can swap the real reqwest client for [`MockTransport`].

pub mod client;
pub mod mock;

pub use client::KlingHttpClient;
pub use mock::{MockTransport, RecordedCall};

use crate::request::RequestSpec;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request with `Authorization: Bearer <bearer>` and return the
    /// decoded JSON body. Non-2xx responses are errors.
    async fn execute(&self, request: RequestSpec, bearer: &str) -> Result<serde_json::Value>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: RequestSpec, bearer: &str) -> Result<serde_json::Value> {
        (**self).execute(request, bearer).await
    }
}
