//! Root bypass, read-only and fail-closed routing tests.

use serde_json::json;

use warden::config::Config;
use warden::request::{AuthzRequest, Decision};
use warden::router::ROOT_ONLY;

use crate::support::{engine, engine_with, FakeDigests, FakeInspector, ALICE, BOB, ROOT};

#[tokio::test]
async fn root_bypasses_every_rule() {
    let engine = engine(FakeInspector::new());
    for (method, uri) in [
        ("POST", "/v1.41/images/create?fromImage=ubuntu"),
        ("DELETE", "/v1.41/containers/ghost"),
        ("POST", "/v1.41/containers/ghost/exec"),
        ("HEAD", "/_ping"),
    ] {
        let req = AuthzRequest::new(method, uri, ROOT).with_body("garbage");
        assert_eq!(engine.authorize(&req).await, Decision::Allow, "{method} {uri}");
    }
}

#[tokio::test]
async fn reads_are_always_allowed() {
    let engine = engine(FakeInspector::new());
    let req = AuthzRequest::new("GET", "/v1.41/containers/ghost/json", BOB);
    assert_eq!(engine.authorize(&req).await, Decision::Allow);
}

#[tokio::test]
async fn unclassified_calls_are_root_only() {
    let engine = engine(FakeInspector::new());
    for (method, uri) in [
        ("POST", "/v1.41/images/create?fromImage=ubuntu"),
        ("POST", "/v1.41/networks/create"),
        ("DELETE", "/v1.41/volumes/data"),
        ("PUT", "/v1.41/containers/web/archive?path=/"),
    ] {
        let req = AuthzRequest::new(method, uri, ALICE).with_body(json!({}).to_string());
        assert_eq!(
            engine.authorize(&req).await,
            Decision::deny(ROOT_ONLY),
            "{method} {uri}"
        );
    }
}

#[tokio::test]
async fn root_identity_comes_from_config() {
    let mut config = Config::default();
    config.policy.root_identity = "1001:1001".to_owned();
    let engine = engine_with(FakeInspector::new(), FakeDigests::default(), &config);

    let req = AuthzRequest::new("POST", "/v1.41/images/create", BOB);
    assert_eq!(engine.authorize(&req).await, Decision::Allow);

    let req = AuthzRequest::new("POST", "/v1.41/images/create", ROOT);
    assert_eq!(engine.authorize(&req).await, Decision::deny(ROOT_ONLY));
}
