//! Integration tests: the session layer over a real HTTP transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::join_all;
use serde_json::{json, Value};
use storedesk_core::api::{ApiBaseUrl, ReqwestTransport, RequestOptions, TimeoutPolicy};
use storedesk_core::auth::{CredentialStore, LoginRedirect, MemoryCredentialStore, Navigator};
use storedesk_core::ApiClient;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn jwt_expiring_in(minutes: i64) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::minutes(minutes)).timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp }).to_string());
    format!("{header}.{payload}.sig")
}

#[derive(Default)]
struct Redirects(Mutex<Vec<LoginRedirect>>);

impl Navigator for Redirects {
    fn to_login(&self, redirect: LoginRedirect) {
        self.0.lock().unwrap().push(redirect);
    }
}

fn client(base_url: &str, store: Arc<MemoryCredentialStore>) -> ApiClient {
    ApiClient::new(
        Arc::new(ReqwestTransport::new().unwrap()),
        store,
        Arc::new(ApiBaseUrl::new(base_url)),
        TimeoutPolicy::default(),
    )
}

#[tokio::test]
async fn test_slow_response_surfaces_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/reports/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let api = client(&format!("{}/api", server.uri()), Arc::new(MemoryCredentialStore::new()));
    let err = api
        .get_with::<Value>(
            "/reports/",
            RequestOptions::default().timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.is_network_error());
    assert!(err.to_string().contains("GET /reports/"));
}

#[tokio::test]
async fn test_unreachable_server_surfaces_network_error() {
    // Nothing listens on port 1
    let api = client("http://127.0.0.1:1/api", Arc::new(MemoryCredentialStore::new()));
    let err = api.get::<Value>("/orders/").await.unwrap_err();

    assert!(err.is_network_error());
    assert!(!err.is_timeout());
}

#[tokio::test]
async fn test_401_recovers_with_single_refresh() {
    let server = MockServer::start().await;
    let stale = jwt_expiring_in(30);

    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .and(body_json(json!({ "refresh": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(&stale, "refresh-1"));
    let api = client(&format!("{}/api", server.uri()), store.clone());

    let orders: Value = api.get("/orders/").await.unwrap();

    assert_eq!(orders, json!([{ "id": 1 }]));
    assert_eq!(store.get_access_token().await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_concurrent_expiring_requests_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "fresh" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/products/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
        .expect(5)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(&jwt_expiring_in(1), "refresh-1"));
    let api = client(&format!("{}/api", server.uri()), store);

    let results = join_all((0..5).map(|_| api.get::<Value>("/products/"))).await;

    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn test_rejected_refresh_signs_out_and_redirects() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token is blacklisted" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(&jwt_expiring_in(30), "refresh-1"));
    let api = client(&format!("{}/api", server.uri()), store.clone());
    let redirects = Arc::new(Redirects::default());
    api.set_navigator(redirects.clone());

    let err = api.get::<Value>("/orders/12/").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(store.get_access_token().await.unwrap(), None);
    assert_eq!(store.get_refresh_token().await.unwrap(), None);
    assert_eq!(
        *redirects.0.lock().unwrap(),
        vec![LoginRedirect::expired("/orders/12/")]
    );
}

#[tokio::test]
async fn test_check_connection_against_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let api = client("http://127.0.0.1:1/api", Arc::new(MemoryCredentialStore::new()));
    let result = api
        .check_connection(Some(&format!("{}/api/", server.uri())))
        .await;

    assert!(result.connected);
    assert_eq!(result.status, 200);
}
