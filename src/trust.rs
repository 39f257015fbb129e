//! Image provenance checks against a trusted registry.
//!
//! An image is trusted when it was pulled from the configured registry and
//! its local content digest still matches the digest the registry publishes
//! for the same tag. No policy consults this yet; it is exposed through the
//! `verify-image` subcommand.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RegistryConfig;
use crate::inspect::{ContainerInspector, InspectError};

/// Accept header for registry v2 schema-2 manifests.
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Response header carrying the manifest digest.
pub const CONTENT_DIGEST_HEADER: &str = "Docker-Content-Digest";

/// Image reference split into registry, repository and tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageName {
    /// Registry address (`host[:port]`).
    pub registry: String,
    /// Repository path within the registry.
    pub image: String,
    /// Tag, `latest` when omitted.
    pub tag: String,
}

/// Split `registry/image[:tag]`.
///
/// References without a `/` carry no registry and yield empty parts.
pub fn split_image_name(reference: &str) -> ImageName {
    let reference = reference.trim();
    let Some((registry, rest)) = reference.split_once('/') else {
        return ImageName::default();
    };
    let (image, tag) = match rest.split_once(':') {
        Some((image, tag)) => (image, tag),
        None => (rest, "latest"),
    };
    ImageName {
        registry: registry.to_owned(),
        image: image.to_owned(),
        tag: tag.to_owned(),
    }
}

/// Local and remote digests for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    /// Reference that was checked.
    pub reference: String,
    /// Digest from the local image's `RepoDigests`.
    pub local_digest: String,
    /// Digest published by the registry.
    pub remote_digest: String,
}

impl TrustRecord {
    /// Both digests present and equal.
    pub fn is_valid(&self) -> bool {
        !self.local_digest.is_empty()
            && !self.remote_digest.is_empty()
            && self.local_digest == self.remote_digest
    }
}

/// Errors from digest retrieval.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Registry unreachable or request failed.
    #[error("registry request failed: {0}")]
    Request(String),
    /// Registry answered without a usable digest.
    #[error("registry returned no digest (status {status})")]
    Missing {
        /// HTTP status code.
        status: u16,
    },
}

/// Errors from trust verification.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// No trusted registry is configured.
    #[error("no trusted registry configured")]
    NotConfigured,
    /// The reference names another registry.
    #[error("image {0} is not from the trusted registry")]
    ForeignRegistry(String),
    /// The local image could not be inspected.
    #[error(transparent)]
    Inspect(#[from] InspectError),
    /// The local image has no repo digest.
    #[error("image {0} has no local digest")]
    NoLocalDigest(String),
    /// The registry digest could not be fetched.
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// Source of registry-published manifest digests.
#[async_trait]
pub trait DigestSource: Send + Sync {
    /// Digest of `image:tag` as published by `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] when the registry is unavailable or returns no
    /// digest.
    async fn head_manifest(
        &self,
        registry: &str,
        image: &str,
        tag: &str,
    ) -> Result<String, DigestError>;
}

/// [`DigestSource`] that issues `HEAD /v2/<image>/manifests/<tag>`.
#[derive(Debug, Clone)]
pub struct RegistryDigestSource {
    client: reqwest::Client,
    scheme: String,
}

impl RegistryDigestSource {
    /// Build a source from the `[registry]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Request`] when the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig) -> Result<Self, DigestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DigestError::Request(e.to_string()))?;
        Ok(Self {
            client,
            scheme: config.scheme.clone(),
        })
    }
}

#[async_trait]
impl DigestSource for RegistryDigestSource {
    async fn head_manifest(
        &self,
        registry: &str,
        image: &str,
        tag: &str,
    ) -> Result<String, DigestError> {
        let url = format!("{}://{registry}/v2/{image}/manifests/{tag}", self.scheme);
        let response = self
            .client
            .head(&url)
            .header(reqwest::header::ACCEPT, MANIFEST_V2_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| DigestError::Request(e.to_string()))?;

        let status = response.status();
        let digest = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|_| status.is_success())
            .map(str::to_owned);
        digest.ok_or(DigestError::Missing {
            status: status.as_u16(),
        })
    }
}

/// Compares local image digests with the trusted registry.
#[derive(Clone)]
pub struct ImageTrustVerifier {
    trusted_registry: Option<String>,
    inspector: Arc<dyn ContainerInspector>,
    digests: Arc<dyn DigestSource>,
}

impl std::fmt::Debug for ImageTrustVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTrustVerifier")
            .field("trusted_registry", &self.trusted_registry)
            .finish_non_exhaustive()
    }
}

impl ImageTrustVerifier {
    /// Create a verifier for the given trusted registry address.
    pub fn new(
        trusted_registry: Option<String>,
        inspector: Arc<dyn ContainerInspector>,
        digests: Arc<dyn DigestSource>,
    ) -> Self {
        Self {
            trusted_registry,
            inspector,
            digests,
        }
    }

    /// Whether the reference names the trusted registry.
    pub fn from_trusted_registry(&self, reference: &str) -> bool {
        let name = split_image_name(reference);
        self.trusted_registry
            .as_deref()
            .is_some_and(|trusted| !name.registry.is_empty() && name.registry == trusted)
    }

    /// Digest part of the first local `RepoDigests` entry (after `@`).
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when the image is unknown or carries no digest.
    pub async fn local_digest(&self, reference: &str) -> Result<String, TrustError> {
        let reference = reference.trim();
        let facts = self.inspector.inspect_image(reference).await?;
        facts
            .repo_digests
            .first()
            .and_then(|entry| entry.split_once('@'))
            .map(|(_, digest)| digest.to_owned())
            .filter(|digest| !digest.is_empty())
            .ok_or_else(|| TrustError::NoLocalDigest(reference.to_owned()))
    }

    /// Digest the registry currently publishes for the reference.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::Digest`] when the registry cannot be queried.
    pub async fn remote_digest(&self, reference: &str) -> Result<String, TrustError> {
        let name = split_image_name(reference);
        Ok(self
            .digests
            .head_manifest(&name.registry, &name.image, &name.tag)
            .await?)
    }

    /// Collect both digests for a reference from the trusted registry.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when the reference is foreign or either digest
    /// is unavailable.
    pub async fn verify(&self, reference: &str) -> Result<TrustRecord, TrustError> {
        if self.trusted_registry.is_none() {
            return Err(TrustError::NotConfigured);
        }
        if !self.from_trusted_registry(reference) {
            return Err(TrustError::ForeignRegistry(reference.trim().to_owned()));
        }
        let remote_digest = self.remote_digest(reference).await?;
        let local_digest = self.local_digest(reference).await?;
        Ok(TrustRecord {
            reference: reference.trim().to_owned(),
            local_digest,
            remote_digest,
        })
    }

    /// Whether the local image matches its registry-published digest.
    pub async fn is_verified(&self, reference: &str) -> bool {
        match self.verify(reference).await {
            Ok(record) => record.is_valid(),
            Err(e) => {
                tracing::debug!(reference, error = %e, "image not verified");
                false
            }
        }
    }
}
