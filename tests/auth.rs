use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http::HeaderMap;
use sider_relay::auth::{authenticate, build_allowed_key_set};
use sider_relay::config::{AppConfig, ClientAuthConfig};
use sider_relay::error::RelayError;
use sider_relay::routing::dispatch::dispatch_request;
use sider_relay::state::AppState;

fn config_with_keys(enabled: bool, keys: Vec<&str>) -> AppConfig {
    AppConfig {
        client_authentication: ClientAuthConfig {
            enabled,
            allowed_keys: keys.into_iter().map(ToString::to_string).collect(),
        },
        ..AppConfig::default()
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        format!("Bearer {token}").parse().expect("header"),
    );
    headers
}

#[test]
fn test_auth_success() {
    let allowed = build_allowed_key_set(&config_with_keys(true, vec!["client-key"]));
    assert!(authenticate(&bearer("client-key"), &allowed).is_ok());
}

#[test]
fn test_auth_missing_key_is_error() {
    let allowed = build_allowed_key_set(&config_with_keys(true, vec!["client-key"]));
    let err = authenticate(&HeaderMap::new(), &allowed).expect_err("must reject");
    assert!(matches!(err, RelayError::Auth(_)));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_auth_one_of_many_keys() {
    let allowed = build_allowed_key_set(&config_with_keys(true, vec!["a", "b", "c"]));
    assert!(authenticate(&bearer("c"), &allowed).is_ok());
    assert!(authenticate(&bearer("d"), &allowed).is_err());
}

#[test]
fn test_auth_disabled_allows_anonymous() {
    let allowed = build_allowed_key_set(&config_with_keys(false, vec![]));
    assert!(authenticate(&HeaderMap::new(), &allowed).is_ok());
}

#[tokio::test]
async fn test_dispatch_rejects_bad_key_with_openai_error() {
    let state = Arc::new(
        AppState::from_config(config_with_keys(true, vec!["client-key"])).expect("state"),
    );
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", "Bearer wrong")
        .body(Body::from(r#"{"messages":[]}"#))
        .expect("request");
    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let payload: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(payload["error"]["type"], "authentication_error");
    assert!(payload["error"]["message"]
        .as_str()
        .expect("message")
        .contains("Invalid authorization token"));
}

#[tokio::test]
async fn test_preflight_skips_auth() {
    let state = Arc::new(
        AppState::from_config(config_with_keys(true, vec!["client-key"])).expect("state"),
    );
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("request");
    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
}
