//! Tests for the gateway's expiry recovery: refresh-and-replay on 401,
//! single-flight coordination under concurrency, and fail-closed teardown
//! when refresh is impossible.

use std::sync::Arc;
use std::time::Duration;

use lms_client::auth::{Role, SessionStatus};
use lms_client::config::ClientOptions;
use lms_client::error::Error;
use lms_client::guard::Decision;
use lms_client::store::{MemoryTokenStore, TokenKind, TokenStore};
use lms_client::LmsClient;
use reqwest::Method;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn seeded_store(access: &str, refresh: &str) -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store.set(TokenKind::Access, access).unwrap();
    store.set(TokenKind::Refresh, refresh).unwrap();
    store
}

fn client_over(server: &MockServer, store: Arc<MemoryTokenStore>) -> LmsClient {
    LmsClient::with_store(&server.uri(), store, ClientOptions::default()).unwrap()
}

async fn mount_refresh(server: &MockServer, new_access: &str, delay: Option<Duration>) {
    let mut template = ResponseTemplate::new(200)
        .set_body_json(serde_json::json!({ "access": new_access }));
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .and(body_json(serde_json::json!({ "refresh": "r1" })))
        .respond_with(template)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_call_replayed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": 1, "title": "Systems Programming" }
        ])))
        .mount(&server)
        .await;
    mount_refresh(&server, "fresh", None).await;

    let store = seeded_store("stale", "r1");
    let client = client_over(&server, store.clone());

    let courses: serde_json::Value = client.gateway().get("/courses").execute().await.unwrap();
    assert_eq!(courses[0]["title"], "Systems Programming");
    assert_eq!(
        store.get(TokenKind::Access).unwrap(),
        Some("fresh".to_string())
    );
}

#[tokio::test]
async fn test_concurrent_expiries_collapse_to_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    // The expect(1) on the refresh mock is the heart of this test: three
    // callers discover expiry together, the endpoint is hit once.
    mount_refresh(&server, "fresh", Some(Duration::from_millis(50))).await;

    let client = client_over(&server, seeded_store("stale", "r1"));
    let gateway = client.gateway();

    let (a, b, c) = tokio::join!(
        gateway.get("/courses").execute::<serde_json::Value>(),
        gateway.get("/courses").execute::<serde_json::Value>(),
        gateway.get("/courses").execute::<serde_json::Value>(),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
}

#[tokio::test]
async fn test_failed_refresh_fails_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store("stale", "r1");
    let client = client_over(&server, store.clone());

    let result = client
        .gateway()
        .get("/courses")
        .execute::<serde_json::Value>()
        .await;
    assert!(matches!(result, Err(Error::SessionExpired)));

    // Fail closed: tokens gone, session anonymous, routing goes to login
    assert_eq!(store.get(TokenKind::Access).unwrap(), None);
    assert_eq!(store.get(TokenKind::Refresh).unwrap(), None);
    assert_eq!(client.auth().status(), SessionStatus::Anonymous);
    assert_eq!(
        client.guard().decide(&[Role::Teacher]),
        Decision::RedirectLogin
    );
}

#[tokio::test]
async fn test_forbidden_passes_through_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/submissions"))
        .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = seeded_store("a1", "r1");
    let client = client_over(&server, store.clone());

    let result = client
        .gateway()
        .get("/submissions")
        .execute::<serde_json::Value>()
        .await;
    assert!(matches!(result, Err(Error::Forbidden)));

    // A role problem is not a session problem: tokens stay put
    assert_eq!(store.get(TokenKind::Access).unwrap(), Some("a1".to_string()));
}

#[tokio::test]
async fn test_server_error_passes_through_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_over(&server, seeded_store("a1", "r1"));
    let result = client
        .gateway()
        .get("/courses")
        .execute::<serde_json::Value>()
        .await;

    match result {
        Err(Error::Server { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected server error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_second_401_propagates_without_second_refresh() {
    let server = MockServer::start().await;
    // The resource rejects every token, fresh or not
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .mount(&server)
        .await;
    mount_refresh(&server, "fresh", None).await;

    let store = seeded_store("stale", "r1");
    let client = client_over(&server, store.clone());

    let result = client
        .gateway()
        .get("/courses")
        .execute::<serde_json::Value>()
        .await;

    // One refresh, one replay, then the 401 comes back untouched
    assert!(matches!(result, Err(Error::Api { status: 401, .. })));
    assert_eq!(
        store.get(TokenKind::Access).unwrap(),
        Some("fresh".to_string())
    );
}

#[tokio::test]
async fn test_anonymous_401_fails_without_touching_refresh_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_over(&server, Arc::new(MemoryTokenStore::new()));
    let result = client
        .gateway()
        .get("/courses")
        .execute::<serde_json::Value>()
        .await;

    assert!(matches!(result, Err(Error::SessionExpired)));
}

#[tokio::test]
async fn test_anonymous_call_reaches_public_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let client = client_over(&server, Arc::new(MemoryTokenStore::new()));
    let courses: serde_json::Value = client.gateway().get("/courses").execute().await.unwrap();
    assert!(courses.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_query_parameters_and_call_form() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assignments"))
        .and(query_param("course", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": 3, "title": "Ownership exercises" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/courses"))
        .and(body_json(serde_json::json!({ "title": "Rust 101" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 9, "title": "Rust 101"
        })))
        .mount(&server)
        .await;

    let client = client_over(&server, seeded_store("a1", "r1"));

    let assignments: serde_json::Value = client
        .gateway()
        .get("/assignments")
        .query("course", "7")
        .execute()
        .await
        .unwrap();
    assert_eq!(assignments[0]["id"], 3);

    let body = serde_json::json!({ "title": "Rust 101" });
    let response = client
        .gateway()
        .call(Method::POST, "/courses", Some(&body))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}
