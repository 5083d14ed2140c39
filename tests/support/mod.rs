#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cellar::auth::MemoryCredentialStore;
use cellar::config::CellarConfig;
use cellar::http::HttpTransport;
use cellar::util::retry::RetryPolicy;
use cellar::Cellar;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER_ID: &str = "5b0f6d6e-9d43-4d5e-8a3c-0c7f3c1a9e11";
pub const NORTE_ID: &str = "7f1c1d3e-2222-4a55-9b38-000000000002";
pub const SUR_ID: &str = "7f1c1d3e-3333-4a55-9b38-000000000003";
pub const TANKS: &str = "/equipment/tanks/";

pub fn user_json(email: &str) -> Value {
    json!({
        "id": USER_ID,
        "email": email,
        "full_name": "Ana Pérez",
        "is_active": true,
        "is_superuser": false,
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-01T10:00:00Z"
    })
}

pub fn membership_json(membership_id: &str, winery_id: &str, name: &str, role: &str) -> Value {
    json!({
        "id": membership_id,
        "winery": {
            "id": winery_id,
            "name": name,
            "code": "",
            "country": "AR",
            "region": "Mendoza",
            "address": "",
            "timezone": "America/Argentina/Mendoza",
            "member_count": 3,
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        },
        "role": role,
        "is_active": true
    })
}

pub fn page_json(results: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "count": results.len(),
        "next": next,
        "previous": null,
        "results": results
    })
}

pub fn rejected() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "detail": "Given token not valid for any token type",
        "code": "token_not_valid"
    }))
}

pub fn config(server: &MockServer) -> CellarConfig {
    CellarConfig::builder()
        .api_base_url(server.uri())
        .request_timeout(Duration::from_secs(5))
        .refresh_retry(RetryPolicy::none())
        .build()
}

pub fn connect(server: &MockServer, store: Arc<MemoryCredentialStore>) -> Cellar {
    let config = config(server);
    let transport = HttpTransport::new(config.api_base_url.clone(), config.request_timeout)
        .expect("http transport");
    Cellar::with_parts(config, Arc::new(transport), store)
}

/// `GET /users/me/` succeeding for `access`.
pub async fn mount_me(server: &MockServer, access: &str) {
    Mock::given(method("GET"))
        .and(path("/users/me/"))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("ana@bodega.test")))
        .mount(server)
        .await;
}

/// An empty membership list so login and bootstrap stay quiet.
pub async fn mount_no_wineries(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/wineries/my-wineries/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_json(vec![], None)))
        .mount(server)
        .await;
}

/// Requests received for `request_path`, in arrival order.
pub async fn received(server: &MockServer, request_path: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == request_path)
        .collect()
}

pub fn bearer(request: &wiremock::Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(String::from)
}
