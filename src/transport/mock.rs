use super::Transport;
use crate::request::RequestSpec;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub request: RequestSpec,
    pub bearer: String,
}

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Fail(String),
}

/// In-memory transport that records every call.
///
/// Scripted replies are used in order and cycle; without any, each call is
/// answered with `{"method": .., "path": ..}` echoing the request.
pub struct MockTransport {
    replies: Arc<Mutex<Vec<Reply>>>,
    failures: Arc<Mutex<HashMap<usize, String>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(self, response: Value) -> Self {
        self.replies.lock().unwrap().push(Reply::Json(response));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push(Reply::Fail(message.to_string()));
        self
    }

    /// Fail the `call_index`-th call (zero based) regardless of scripted replies.
    pub fn with_failure_on_call(self, call_index: usize, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(call_index, message.to_string());
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: RequestSpec, bearer: &str) -> Result<Value> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                request: request.clone(),
                bearer: bearer.to_string(),
            });
            calls.len() - 1
        };

        if let Some(message) = self.failures.lock().unwrap().get(&index) {
            return Err(Error::Transport(message.clone()));
        }

        let replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(json!({
                "method": request.method.as_str(),
                "path": request.path,
            }));
        }

        match &replies[index % replies.len()] {
            Reply::Json(value) => Ok(value.clone()),
            Reply::Fail(message) => Err(Error::Transport(message.clone())),
        }
    }
}
