//! Session lifecycle against a mock backend: bootstrap, login, logout, gating.

mod support;

use std::sync::Arc;
use std::time::Duration;

use cellar::auth::{MemoryCredentialStore, StoreKey};
use cellar::gate::NavigationDecision;
use cellar::session::{SessionEvent, SessionState};
use cellar::types::LoginCredentials;
use cellar::CellarError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{bearer, connect, mount_me, mount_no_wineries, received, rejected, TANKS};

#[tokio::test]
async fn refresh_only_bootstrap_restores_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "r1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a2", "refresh": "r2"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "a2").await;
    mount_no_wineries(&server).await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(None, Some("r1")));
    let cellar = connect(&server, store.clone());

    let state = cellar.initialize().await;

    match state {
        SessionState::Authenticated(user) => assert_eq!(user.email, "ana@bodega.test"),
        other => panic!("expected Authenticated, got {other:?}"),
    }
    assert!(cellar.is_ready());
    assert_eq!(store.get(StoreKey::AccessToken).as_deref(), Some("a2"));
    assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("r2"));
    let lookups = received(&server, "/users/me/").await;
    assert_eq!(lookups.len(), 1);
    assert_eq!(bearer(&lookups[0]).as_deref(), Some("a2"));
}

#[tokio::test]
async fn unrecoverable_bootstrap_ends_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/"))
        .respond_with(rejected())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(rejected())
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(Some("a0"), Some("r0")));
    let cellar = connect(&server, store.clone());

    assert_eq!(cellar.initialize().await, SessionState::Unauthenticated);
    assert!(cellar.is_ready());
    assert_eq!(store.get(StoreKey::AccessToken), None);
    assert_eq!(store.get(StoreKey::RefreshToken), None);
}

#[tokio::test]
async fn login_then_protected_call_carries_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .and(body_json(json!({"email": "ana@bodega.test", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "a1", "refresh": "r1"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "a1").await;
    mount_no_wineries(&server).await;
    Mock::given(method("GET"))
        .and(path(TANKS))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "T-01"}])))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let cellar = connect(&server, store.clone());
    cellar.initialize().await;
    let mut events = cellar.subscribe();

    let user = cellar
        .login(&LoginCredentials::new("ana@bodega.test", "secret"))
        .await
        .expect("login");
    let tanks: serde_json::Value = cellar.api().get_json(TANKS).await.expect("tanks");

    assert_eq!(tanks[0]["name"], "T-01");
    assert!(cellar.is_authenticated());
    assert_eq!(events.recv().await.ok(), Some(SessionEvent::LoggedIn(user)));
    assert_eq!(store.get(StoreKey::RefreshToken).as_deref(), Some("r1"));
}

#[tokio::test]
async fn rejected_login_is_user_visible_and_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "No active account found with the given credentials"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let cellar = connect(&server, store.clone());
    cellar.initialize().await;

    let err = cellar
        .login(&LoginCredentials::new("ana@bodega.test", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, CellarError::Authentication(_)));
    assert!(err.is_user_visible());
    assert_eq!(cellar.state(), SessionState::Unauthenticated);
    assert_eq!(store.get(StoreKey::AccessToken), None);
    assert!(received(&server, "/users/me/").await.is_empty());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let server = MockServer::start().await;
    mount_me(&server, "a1").await;
    mount_no_wineries(&server).await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(Some("a1"), Some("r1")));
    store.seed(StoreKey::ActiveWinery, support::NORTE_ID);
    let cellar = connect(&server, store.clone());
    assert!(cellar.initialize().await.is_authenticated());
    let mut events = cellar.subscribe();

    cellar.logout();
    cellar.logout();

    assert_eq!(cellar.state(), SessionState::Unauthenticated);
    assert_eq!(store.get(StoreKey::AccessToken), None);
    assert_eq!(store.get(StoreKey::RefreshToken), None);
    assert_eq!(store.get(StoreKey::ActiveWinery), None);
    assert_eq!(events.try_recv().ok(), Some(SessionEvent::LoggedOut));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn logout_on_fresh_store_does_not_error() {
    let server = MockServer::start().await;
    let cellar = connect(&server, Arc::new(MemoryCredentialStore::new()));
    cellar.initialize().await;

    cellar.logout();

    assert_eq!(cellar.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn navigation_waits_until_session_is_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(support::user_json("ana@bodega.test"))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    mount_no_wineries(&server).await;

    let store = Arc::new(MemoryCredentialStore::with_tokens(Some("a1"), Some("r1")));
    let cellar = connect(&server, store);

    let pending = {
        let cellar = cellar.clone();
        tokio::spawn(async move { cellar.guard("/production/batches").await })
    };
    let init = {
        let cellar = cellar.clone();
        tokio::spawn(async move { cellar.initialize().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());
    assert_eq!(cellar.gate().try_check("/production/batches"), None);

    init.await.unwrap();
    assert_eq!(pending.await.unwrap(), NavigationDecision::Allow);
    assert_eq!(
        cellar.gate().try_check("/auth/login"),
        Some(NavigationDecision::Redirect {
            to: "/dashboard".to_string()
        })
    );
}

#[tokio::test]
async fn signed_out_navigation_redirects_to_login_with_return_url() {
    let server = MockServer::start().await;
    let cellar = connect(&server, Arc::new(MemoryCredentialStore::new()));
    cellar.initialize().await;

    assert_eq!(
        cellar.guard("/production/batches/12").await,
        NavigationDecision::Redirect {
            to: "/auth/login?returnUrl=%2Fproduction%2Fbatches%2F12".to_string()
        }
    );
    assert_eq!(cellar.guard("/auth/register").await, NavigationDecision::Allow);
}
