//! Plugin protocol round trips through the axum router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use base64::Engine as _;
use serde_json::{json, Value};
use tower::ServiceExt;

use warden::server::{router, PLUGIN_CONTENT_TYPE};

use crate::support::{container, engine, FakeInspector, ALICE, BOB};

async fn call(path: &str, body: impl Into<Body>) -> (StatusCode, Option<String>, Value) {
    let inventory = FakeInspector::new().with_container("web", container("host", ALICE));
    let app = router(Arc::new(engine(inventory)));
    let response = app
        .oneshot(
            Request::post(path)
                .header(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)
                .body(body.into())
                .expect("request"),
        )
        .await
        .expect("router is infallible");

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).expect("json response");
    (status, content_type, value)
}

fn authz(user: &str, method: &str, uri: &str, body: Option<&Value>) -> String {
    let mut payload = json!({
        "User": user,
        "RequestMethod": method,
        "RequestURI": uri,
    });
    if let Some(body) = body {
        payload["RequestBody"] =
            json!(base64::engine::general_purpose::STANDARD.encode(body.to_string()));
    }
    payload.to_string()
}

#[tokio::test]
async fn activate_advertises_authz() {
    let (status, content_type, value) = call("/Plugin.Activate", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(PLUGIN_CONTENT_TYPE));
    assert_eq!(value, json!({"Implements": ["authz"]}));
}

#[tokio::test]
async fn allowed_request_has_no_message() {
    let payload = authz(ALICE, "POST", "/v1.41/containers/web/start", None);
    let (status, _, value) = call("/AuthZPlugin.AuthZReq", payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!({"Allow": true}));
}

#[tokio::test]
async fn policy_denial_is_a_message() {
    let payload = authz(BOB, "DELETE", "/v1.41/containers/web", None);
    let (_, _, value) = call("/AuthZPlugin.AuthZReq", payload).await;
    assert_eq!(value["Allow"], json!(false));
    assert!(value["Msg"].is_string());
    assert!(value.get("Err").is_none());
}

#[tokio::test]
async fn invalid_request_is_an_error() {
    let body = json!({"HostConfig": {"Binds": "oops", "UsernsMode": ""}});
    let payload = authz(ALICE, "POST", "/v1.41/containers/create", Some(&body));
    let (_, _, value) = call("/AuthZPlugin.AuthZReq", payload).await;
    assert_eq!(value, json!({"Allow": false, "Err": "bad Binds flag"}));
}

#[tokio::test]
async fn request_uri_accepts_both_spellings() {
    let payload = json!({
        "User": BOB,
        "RequestMethod": "POST",
        "RequestUri": "/v1.41/networks/create",
    })
    .to_string();
    let (_, _, value) = call("/AuthZPlugin.AuthZReq", payload).await;
    assert_eq!(
        value,
        json!({"Allow": false, "Msg": "command allowed for root only"})
    );
}

#[tokio::test]
async fn undecodable_body_is_an_error() {
    let payload = json!({
        "User": ALICE,
        "RequestMethod": "POST",
        "RequestURI": "/v1.41/containers/create",
        "RequestBody": "***not base64***",
    })
    .to_string();
    let (_, _, value) = call("/AuthZPlugin.AuthZReq", payload).await;
    assert_eq!(value, json!({"Allow": false, "Err": "bad request body"}));
}

#[tokio::test]
async fn garbage_payload_is_an_error() {
    let (status, _, value) = call("/AuthZPlugin.AuthZReq", "not json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["Allow"], json!(false));
    assert!(value["Err"].is_string());
}

#[tokio::test]
async fn responses_are_always_allowed() {
    let payload = authz(BOB, "DELETE", "/v1.41/containers/web", None);
    let (_, content_type, value) = call("/AuthZPlugin.AuthZRes", payload).await;
    assert_eq!(content_type.as_deref(), Some(PLUGIN_CONTENT_TYPE));
    assert_eq!(value, json!({"Allow": true}));
}
