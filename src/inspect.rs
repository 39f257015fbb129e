//! Container and image inspection against the Docker daemon.
//!
//! Policies only need a handful of facts about a container (its image, the
//! user-namespace mode it was created with, and the user it was configured to
//! run as). [`ContainerInspector`] narrows the Docker API to exactly those so
//! tests can substitute a fixed inventory.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::InspectContainerOptions;
use bollard::errors::Error as BollardError;
use bollard::Docker;

use crate::config::DockerConfig;

/// Facts about a container recorded at creation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFacts {
    /// Image id or reference the container was created from.
    pub image: Option<String>,
    /// `HostConfig.UsernsMode`; `None` when the host config is missing.
    pub userns_mode: Option<String>,
    /// `Config.User`; `None` when the container config is missing.
    pub run_as_user: Option<String>,
}

/// Facts about a locally cached image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFacts {
    /// `repo:tag` names pointing at the image.
    pub repo_tags: Vec<String>,
    /// `repo@digest` entries for the image.
    pub repo_digests: Vec<String>,
}

/// Errors from inspection calls.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// The daemon does not know the object.
    #[error("no such object: {0}")]
    NotFound(String),
    /// The daemon could not be reached or returned an error.
    #[error("inspection failed: {0}")]
    Runtime(String),
}

/// Read-only view of the container runtime.
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    /// Inspect a container by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::NotFound`] for unknown containers and
    /// [`InspectError::Runtime`] for daemon failures.
    async fn inspect_container(&self, id: &str) -> Result<ContainerFacts, InspectError>;

    /// Inspect an image by id or reference.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::NotFound`] for unknown images and
    /// [`InspectError::Runtime`] for daemon failures.
    async fn inspect_image(&self, reference: &str) -> Result<ImageFacts, InspectError>;
}

/// Resolve the first repo tag of the image a container runs.
///
/// # Errors
///
/// Returns [`InspectError::NotFound`] when the container has no image or the
/// image carries no tags.
pub async fn container_image_tag(
    inspector: &dyn ContainerInspector,
    id: &str,
) -> Result<String, InspectError> {
    let container = inspector.inspect_container(id.trim()).await?;
    let image = container
        .image
        .ok_or_else(|| InspectError::NotFound(format!("image of container {id}")))?;
    let facts = inspector.inspect_image(&image).await?;
    facts
        .repo_tags
        .into_iter()
        .next()
        .ok_or_else(|| InspectError::NotFound(format!("tags of image {image}")))
}

// ---------------------------------------------------------------------------
// Docker
// ---------------------------------------------------------------------------

/// [`ContainerInspector`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerInspector {
    docker: Docker,
}

impl DockerInspector {
    /// Connect according to the `[docker]` config section.
    ///
    /// An empty host uses the local defaults (`DOCKER_HOST` or the standard
    /// socket). `tcp://` hosts use TLS when a `[docker.tls]` section is given.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError::Runtime`] when the client cannot be built.
    pub fn connect(config: &DockerConfig) -> Result<Self, InspectError> {
        let timeout = config.timeout_secs;
        let host = config.host.trim();
        let version = bollard::API_DEFAULT_VERSION;

        let connected = if host.is_empty() {
            Docker::connect_with_local_defaults()
                .map(|d| d.with_timeout(Duration::from_secs(timeout)))
        } else if host.starts_with("unix://") {
            Docker::connect_with_unix(host, timeout, version)
        } else if let Some(tls) = &config.tls {
            Docker::connect_with_ssl(
                host,
                Path::new(&tls.key),
                Path::new(&tls.cert),
                Path::new(&tls.ca),
                timeout,
                version,
            )
        } else {
            Docker::connect_with_http(host, timeout, version)
        };
        let docker = connected.map_err(|e| InspectError::Runtime(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Wrap an existing client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_bollard(what: &str, err: BollardError) -> InspectError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => InspectError::NotFound(what.to_owned()),
        other => InspectError::Runtime(other.to_string()),
    }
}

#[async_trait]
impl ContainerInspector for DockerInspector {
    async fn inspect_container(&self, id: &str) -> Result<ContainerFacts, InspectError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_bollard(id, e))?;

        Ok(ContainerFacts {
            image: inspect.image,
            userns_mode: inspect
                .host_config
                .map(|hc| hc.userns_mode.unwrap_or_default()),
            run_as_user: inspect.config.map(|c| c.user.unwrap_or_default()),
        })
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageFacts, InspectError> {
        let image = self
            .docker
            .inspect_image(reference)
            .await
            .map_err(|e| map_bollard(reference, e))?;

        Ok(ImageFacts {
            repo_tags: image.repo_tags.unwrap_or_default(),
            repo_digests: image.repo_digests.unwrap_or_default(),
        })
    }
}
