//! Lifecycle (start/stop/remove) policy tests.

use serde_json::json;

use warden::inspect::ContainerFacts;
use warden::request::{AuthzRequest, Decision};

use crate::support::{container, engine, FakeInspector, ALICE, BOB, IMAGE_ID};

const NOT_ALLOWED: &str = "command not allowed for this user or resource does not exist";

fn inventory() -> FakeInspector {
    FakeInspector::new()
        .with_container("remapped", container("", ""))
        .with_container("private", container("private", BOB))
        .with_container("alice-host", container("host", "alice:alice"))
        .with_container("open-host", container("host", ""))
        .with_container(
            "no-config",
            ContainerFacts {
                image: Some(IMAGE_ID.to_owned()),
                userns_mode: Some("host".to_owned()),
                run_as_user: None,
            },
        )
}

async fn decide(method: &str, uri: &str, caller: &str) -> Decision {
    let req = AuthzRequest::new(method, uri, caller).with_body(json!({}).to_string());
    engine(inventory()).authorize(&req).await
}

#[tokio::test]
async fn untracked_containers_admit_anyone() {
    assert_eq!(decide("DELETE", "/v1.41/containers/remapped", BOB).await, Decision::Allow);
    assert_eq!(
        decide("POST", "/v1.41/containers/private/stop", ALICE).await,
        Decision::Allow
    );
}

#[tokio::test]
async fn unclaimed_host_container_admits_anyone() {
    assert_eq!(
        decide("DELETE", "/v1.41/containers/open-host?force=1", BOB).await,
        Decision::Allow
    );
}

#[tokio::test]
async fn owner_may_delete() {
    assert_eq!(
        decide("DELETE", "/v1.41/containers/alice-host", "alice:alice").await,
        Decision::Allow
    );
}

#[tokio::test]
async fn owner_matches_by_resolution_not_text() {
    assert_eq!(
        decide("POST", "/v1.41/containers/alice-host/start", ALICE).await,
        Decision::Allow
    );
}

#[tokio::test]
async fn other_users_are_soft_denied() {
    assert_eq!(
        decide("DELETE", "/v1.41/containers/alice-host", "bob:bob").await,
        Decision::deny(NOT_ALLOWED)
    );
    assert_eq!(
        decide("POST", "/v1.41/containers/alice-host/kill", BOB).await,
        Decision::deny(NOT_ALLOWED)
    );
}

#[tokio::test]
async fn unresolvable_caller_is_denied() {
    assert_eq!(
        decide("POST", "/v1.41/containers/alice-host/stop", "mallory:mallory").await,
        Decision::deny(NOT_ALLOWED)
    );
}

#[tokio::test]
async fn unknown_container_fails_closed() {
    assert_eq!(
        decide("DELETE", "/v1.41/containers/ghost", ALICE).await,
        Decision::deny(NOT_ALLOWED)
    );
}

#[tokio::test]
async fn incomplete_inspection_fails_closed() {
    assert_eq!(
        decide("POST", "/v1.41/containers/no-config/start", ALICE).await,
        Decision::deny(NOT_ALLOWED)
    );
}
