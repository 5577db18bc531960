//! Batch execution against the Kling API.
//!
//! Items run strictly in input order, one request at a time, all sharing a
//! single bearer token minted before the first item. Whether one item's
//! failure aborts the batch is decided by [`DispatchOptions`].

use crate::credentials::{Bearer, Credential};
use crate::models::{Item, ItemResult};
use crate::request;
use crate::transport::Transport;
use crate::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Record a failed item as `{"error": ..}` and keep going instead of
    /// failing the whole batch.
    pub continue_on_fail: bool,
}

/// Executes batches of items through a [`Transport`].
pub struct Dispatcher {
    transport: Box<dyn Transport>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(transport: Box<dyn Transport>, options: DispatchOptions) -> Self {
        Self { transport, options }
    }

    /// Mint one bearer for `credential` and run every item with it.
    ///
    /// A credential that cannot produce a bearer fails the batch before any
    /// request is sent, even in continue-on-fail mode.
    pub async fn run(&self, credential: &Credential, items: &[Item]) -> Result<Vec<ItemResult>> {
        let bearer = credential.bearer(Utc::now())?;
        self.run_with_bearer(&bearer, items).await
    }

    /// Run every item with an already minted bearer.
    ///
    /// The bearer is never refreshed, even if it expires mid-batch.
    pub async fn run_with_bearer(
        &self,
        bearer: &Bearer,
        items: &[Item],
    ) -> Result<Vec<ItemResult>> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("batch", %run_id, items = items.len());

        async move {
            info!("Dispatching {} item(s)", items.len());

            let mut results = Vec::with_capacity(items.len());
            let mut warned_expired = false;

            for (index, item) in items.iter().enumerate() {
                if !warned_expired && bearer.is_expired_at(Utc::now()) {
                    warn!(
                        item = index,
                        "Bearer token expired mid-batch; remaining requests will likely be rejected"
                    );
                    warned_expired = true;
                }

                match self.execute_item(item, bearer).await {
                    Ok(json) => {
                        debug!(item = index, "Item succeeded");
                        results.push(ItemResult::success(index, json));
                    }
                    Err(e) if self.options.continue_on_fail => {
                        warn!(item = index, "Item failed, continuing: {}", e);
                        results.push(ItemResult::failure(index, &e));
                    }
                    Err(e) => {
                        error!(item = index, "Item failed, aborting batch: {}", e);
                        return Err(e);
                    }
                }
            }

            let failed = results.iter().filter(|r| !r.is_success()).count();
            info!(succeeded = results.len() - failed, failed, "Batch complete");
            Ok(results)
        }
        .instrument(span)
        .await
    }

    async fn execute_item(&self, item: &Item, bearer: &Bearer) -> Result<serde_json::Value> {
        let request = request::resolve(item)?;
        debug!(
            resource = %item.resource,
            operation = %item.operation,
            method = %request.method,
            path = %request.path,
            "Resolved item"
        );
        self.transport.execute(request, bearer.value()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth;
    use crate::error::ErrorKind;
    use crate::transport::MockTransport;
    use crate::Error;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn dispatcher(
        transport: MockTransport,
        continue_on_fail: bool,
    ) -> (Dispatcher, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let dispatcher = Dispatcher::new(
            Box::new(transport.clone()),
            DispatchOptions { continue_on_fail },
        );
        (dispatcher, transport)
    }

    fn image_get(task_id: &str) -> Item {
        Item::new("image", "get", json!({ "taskId": task_id }))
    }

    fn bearer() -> Bearer {
        Bearer::new("test-token", None)
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let results = dispatcher.run_with_bearer(&bearer(), &[]).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(transport.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let items: Vec<Item> = (0..5).map(|i| image_get(&format!("t{}", i))).collect();

        let results = dispatcher.run_with_bearer(&bearer(), &items).await.unwrap();

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.item_index, i);
            assert_eq!(
                result.json()["path"],
                format!("/v1/images/generations/t{}", i)
            );
        }
        assert_eq!(transport.get_call_count(), 5);
    }

    #[tokio::test]
    async fn test_same_bearer_for_every_item() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let items = vec![image_get("a"), image_get("b"), image_get("c")];

        dispatcher.run_with_bearer(&bearer(), &items).await.unwrap();

        assert!(transport
            .calls()
            .iter()
            .all(|call| call.bearer == "test-token"));
    }

    #[tokio::test]
    async fn test_resolution_failure_is_isolated_when_continuing() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), true);
        let items = vec![
            image_get("a"),
            Item::new("video", "get", json!({ "taskId": "", "externalTaskId": "" })),
            image_get("c"),
        ];

        let results = dispatcher.run_with_bearer(&bearer(), &items).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_success());
        assert!(results[2].is_success());

        let failed = &results[1];
        assert_eq!(failed.item_index, 1);
        assert_eq!(
            failed.error().unwrap().kind,
            ErrorKind::InvalidParameterCombination
        );
        assert_eq!(
            failed.json()["error"],
            "Either Task ID or External Task ID must be provided"
        );

        // The failing item never reached the transport.
        assert_eq!(transport.get_call_count(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_isolated_when_continuing() {
        let (dispatcher, _transport) =
            dispatcher(MockTransport::new().with_failure_on_call(0, "gateway timeout"), true);
        let items = vec![image_get("a"), image_get("b")];

        let results = dispatcher.run_with_bearer(&bearer(), &items).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0]
            .json()["error"]
            .as_str()
            .unwrap()
            .contains("gateway timeout"));
        assert_eq!(results[0].error().unwrap().kind, ErrorKind::Transport);
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_after_k_plus_one_calls() {
        let k = 2;
        let (dispatcher, transport) =
            dispatcher(MockTransport::new().with_failure_on_call(k, "server error"), false);
        let items: Vec<Item> = (0..6).map(|i| image_get(&format!("t{}", i))).collect();

        let err = dispatcher
            .run_with_bearer(&bearer(), &items)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(ref m) if m == "server error"));
        assert_eq!(transport.get_call_count(), k + 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_later_items() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let items = vec![
            image_get("a"),
            Item::new("tryOn", "create", json!({ "humanImage": "H" })),
            image_get("c"),
        ];

        let err = dispatcher
            .run_with_bearer(&bearer(), &items)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingRequiredParameter(ref name) if name == "clothImage"));
        assert_eq!(transport.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_operation_is_an_item_failure() {
        let (dispatcher, _transport) = dispatcher(MockTransport::new(), true);
        let items = vec![Item::new("image", "delete", json!({}))];

        let results = dispatcher.run_with_bearer(&bearer(), &items).await.unwrap();
        assert_eq!(
            results[0].error().unwrap().kind,
            ErrorKind::UnsupportedOperation
        );
    }

    #[tokio::test]
    async fn test_run_mints_one_token_from_key_pair() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let credential = Credential::key_pair("ak-123", "sk-456");
        let items = vec![image_get("a"), image_get("b")];

        dispatcher.run(&credential, &items).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bearer, calls[1].bearer);

        let claims = auth::verify_token(&calls[0].bearer, "sk-456", Utc::now()).unwrap();
        assert_eq!(claims.iss, "ak-123");
    }

    #[tokio::test]
    async fn test_token_failure_is_fatal_even_when_continuing() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), true);
        let credential = Credential::key_pair("ak", "");

        let err = dispatcher
            .run(&credential, &[image_get("a")])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(transport.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_bearer_is_still_used() {
        let (dispatcher, transport) = dispatcher(MockTransport::new(), false);
        let expired = Bearer::new("old", Some(Utc::now() - Duration::minutes(1)));

        let results = dispatcher
            .run_with_bearer(&expired, &[image_get("a"), image_get("b")])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(transport.calls().iter().all(|c| c.bearer == "old"));
    }
}
