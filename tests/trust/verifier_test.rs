//! Image provenance verification against a trusted registry.

use std::sync::Arc;

use warden::inspect::ImageFacts;
use warden::trust::{ImageTrustVerifier, TrustError};

use crate::support::{FakeDigests, FakeInspector};

const REGISTRY: &str = "registry.local:5000";
const REFERENCE: &str = "registry.local:5000/centos_mpi:7";
const DIGEST: &str = "sha256:feedface";

fn pulled(digest: &str) -> FakeInspector {
    FakeInspector::new().with_image(
        REFERENCE,
        ImageFacts {
            repo_tags: vec![REFERENCE.to_owned()],
            repo_digests: vec![format!("{REGISTRY}/centos_mpi@{digest}")],
        },
    )
}

fn verifier(inspector: FakeInspector, digests: FakeDigests) -> ImageTrustVerifier {
    ImageTrustVerifier::new(
        Some(REGISTRY.to_owned()),
        Arc::new(inspector),
        Arc::new(digests),
    )
}

fn published(digest: &str) -> FakeDigests {
    FakeDigests::default().with(&format!("{REGISTRY}/centos_mpi:7"), digest)
}

#[tokio::test]
async fn matching_digests_verify() {
    let verifier = verifier(pulled(DIGEST), published(DIGEST));
    let record = verifier.verify(REFERENCE).await.expect("verifies");
    assert_eq!(record.local_digest, DIGEST);
    assert_eq!(record.remote_digest, DIGEST);
    assert!(record.is_valid());
    assert!(verifier.is_verified(REFERENCE).await);
}

#[tokio::test]
async fn stale_local_image_is_not_verified() {
    let verifier = verifier(pulled("sha256:0ld"), published(DIGEST));
    let record = verifier.verify(REFERENCE).await.expect("both digests present");
    assert!(!record.is_valid());
    assert!(!verifier.is_verified(REFERENCE).await);
}

#[tokio::test]
async fn foreign_registry_is_refused() {
    let verifier = verifier(pulled(DIGEST), published(DIGEST));
    assert!(!verifier.from_trusted_registry("docker.io/library/busybox:latest"));
    assert!(!verifier.from_trusted_registry("busybox"));
    assert!(verifier.from_trusted_registry(REFERENCE));
    assert!(matches!(
        verifier.verify("docker.io/busybox:latest").await,
        Err(TrustError::ForeignRegistry(_))
    ));
}

#[tokio::test]
async fn unconfigured_registry_verifies_nothing() {
    let verifier = ImageTrustVerifier::new(
        None,
        Arc::new(pulled(DIGEST)),
        Arc::new(published(DIGEST)),
    );
    assert!(matches!(
        verifier.verify(REFERENCE).await,
        Err(TrustError::NotConfigured)
    ));
    assert!(!verifier.is_verified(REFERENCE).await);
}

#[tokio::test]
async fn image_without_repo_digest_is_refused() {
    let inspector = FakeInspector::new().with_image(REFERENCE, ImageFacts::default());
    let verifier = verifier(inspector, published(DIGEST));
    assert!(matches!(
        verifier.local_digest(REFERENCE).await,
        Err(TrustError::NoLocalDigest(_))
    ));
}

#[tokio::test]
async fn unpublished_tag_is_refused() {
    let verifier = verifier(pulled(DIGEST), FakeDigests::default());
    assert!(matches!(
        verifier.verify(REFERENCE).await,
        Err(TrustError::Digest(_))
    ));
}

#[tokio::test]
async fn missing_local_image_is_an_inspect_error() {
    let verifier = verifier(FakeInspector::new(), published(DIGEST));
    assert!(matches!(
        verifier.verify(REFERENCE).await,
        Err(TrustError::Inspect(_))
    ));
}
