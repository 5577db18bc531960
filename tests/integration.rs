use chrono::Utc;
use kling_dispatch::{
    auth,
    credentials::{test_credential, Credential},
    dispatcher::{DispatchOptions, Dispatcher},
    models::{load_items, Item},
    transport::KlingHttpClient,
    Error, ErrorKind,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCESS_KEY: &str = "ak-integration";
const SECRET_KEY: &str = "sk-integration";

fn http_client(server: &MockServer) -> KlingHttpClient {
    KlingHttpClient::new(Duration::from_secs(5))
        .unwrap()
        .with_base_url(server.uri())
}

fn dispatcher(server: &MockServer, continue_on_fail: bool) -> Dispatcher {
    Dispatcher::new(
        Box::new(http_client(server)),
        DispatchOptions { continue_on_fail },
    )
}

fn bearer_of(request: &wiremock::Request) -> String {
    let value = request
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    value.strip_prefix("Bearer ").unwrap().to_string()
}

#[tokio::test]
async fn test_full_batch_against_mock_server() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images/kolors-virtual-try-on"))
        .and(body_json(json!({
            "model_name": "kolors-virtual-try-on-v1",
            "human_image": "H",
            "cloth_image": "C"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "task_id": "tryon-1", "task_status": "submitted" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/videos/text2video/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "task_id": "abc123", "task_status": "succeed" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account/costs"))
        .and(query_param("start_time", "1000"))
        .and(query_param("end_time", "2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": { "resource_pack_subscribe_infos": [] }
        })))
        .mount(&server)
        .await;

    let items = vec![
        Item::new(
            "tryOn",
            "create",
            json!({ "humanImage": "H", "clothImage": "C" }),
        ),
        Item::new("video", "get", json!({ "taskId": "abc123" })),
        Item::new(
            "account",
            "getResourcePackages",
            json!({ "startTime": 1000, "endTime": 2000 }),
        ),
    ];

    let credential = Credential::key_pair(ACCESS_KEY, SECRET_KEY);
    let results = dispatcher(&server, false)
        .run(&credential, &items)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].json()["data"]["task_id"], "tryon-1");
    assert_eq!(results[1].json()["data"]["task_status"], "succeed");
    assert_eq!(results[2].item_index, 2);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);

    let bearers: Vec<String> = received.iter().map(bearer_of).collect();
    assert!(bearers.iter().all(|b| b == &bearers[0]));

    let claims = auth::verify_token(&bearers[0], SECRET_KEY, Utc::now()).unwrap();
    assert_eq!(claims.iss, ACCESS_KEY);
    assert_eq!(claims.exp - claims.nbf, 1805);
}

#[tokio::test]
async fn test_continue_on_fail_records_http_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/images/generations/bad"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/images/generations/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let items = vec![
        Item::new("image", "get", json!({ "taskId": "bad" })),
        Item::new("image", "get", json!({ "taskId": "good" })),
        Item::new("tryOn", "create", json!({ "clothImage": "C" })),
    ];

    let results = dispatcher(&server, true)
        .run(&Credential::Token("prebuilt".to_string()), &items)
        .await
        .unwrap();

    assert_eq!(results.len(), 3);

    let first = results[0].error().unwrap();
    assert_eq!(first.kind, ErrorKind::Transport);
    assert!(first.message.contains("500"));

    assert_eq!(results[1].json(), json!({ "code": 0 }));

    assert_eq!(
        results[2].json(),
        json!({ "error": "Missing required parameter: humanImage" })
    );

    let output = serde_json::to_value(&results).unwrap();
    assert_eq!(output[1], json!({ "json": { "code": 0 }, "itemIndex": 1 }));
}

#[tokio::test]
async fn test_abort_on_first_http_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/images/generations/t1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let items: Vec<Item> = (0..4)
        .map(|i| Item::new("image", "get", json!({ "taskId": format!("t{}", i) })))
        .collect();

    let err = dispatcher(&server, false)
        .run(&Credential::Token("prebuilt".to_string()), &items)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(err.to_string().contains("401"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_task_id_stays_inside_its_endpoint() {
    let server = MockServer::start().await;

    Mock::given(path("/account/costs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hit": "account" })))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/images/generations/..%2F..%2F..%2Faccount%2Fcosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let items = vec![Item::new(
        "image",
        "get",
        json!({ "taskId": "../../../account/costs" }),
    )];

    let results = dispatcher(&server, false)
        .run(&Credential::Token("prebuilt".to_string()), &items)
        .await
        .unwrap();

    assert_eq!(results[0].json(), json!({ "code": 0 }));
}

#[tokio::test]
async fn test_malformed_element_fails_only_its_item() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/images/generations/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .mount(&server)
        .await;

    let items = load_items(
        r#"[null, {"resource": 7, "operation": "get"}, {"resource": "image", "operation": "get", "taskId": "ok"}]"#
            .as_bytes(),
    )
    .unwrap();
    assert_eq!(items.len(), 3);

    let results = dispatcher(&server, true)
        .run(&Credential::Token("prebuilt".to_string()), &items)
        .await
        .unwrap();

    assert_eq!(results[0].error().unwrap().kind, ErrorKind::InvalidParameter);
    assert_eq!(results[1].error().unwrap().kind, ErrorKind::InvalidParameter);
    assert_eq!(results[2].json(), json!({ "code": 0 }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_batch_loaded_from_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/videos/lip-sync"))
        .and(query_param("pageNum", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let items = load_items(
        r#"[{
            "resource": "video",
            "operation": "list",
            "videoType": "lipSync",
            "additionalOptions": { "pageNum": 3 }
        }]"#
        .as_bytes(),
    )
    .unwrap();

    let results = dispatcher(&server, false)
        .run(&Credential::Token("Bearer prebuilt".to_string()), &items)
        .await
        .unwrap();

    assert_eq!(results[0].json(), json!({ "data": [] }));

    let received = server.received_requests().await.unwrap();
    assert_eq!(bearer_of(&received[0]), "prebuilt");
}

#[tokio::test]
async fn test_credential_probe_against_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/account/costs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let now = Utc::now();
    let response = test_credential(
        &http_client(&server),
        &Credential::key_pair(ACCESS_KEY, SECRET_KEY),
        now,
    )
    .await
    .unwrap();
    assert_eq!(response["code"], 0);

    let received = server.received_requests().await.unwrap();
    let pairs: Vec<(String, String)> = received[0]
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let end: i64 = pairs.iter().find(|(k, _)| k == "end_time").unwrap().1.parse().unwrap();
    let start: i64 = pairs.iter().find(|(k, _)| k == "start_time").unwrap().1.parse().unwrap();
    assert_eq!(end, now.timestamp_millis());
    assert_eq!(end - start, 24 * 60 * 60 * 1000);
}
