//! Container ownership derived from runtime configuration.
//!
//! Ownership is only tracked for containers created with user-namespace
//! remapping disabled (`UsernsMode=host`). For those, the creator is the
//! run-as user recorded in the container config. Remapped containers cannot
//! touch host resources, so anyone may act on them.
//!
//! Nothing is cached; every query inspects the container again.

use std::sync::Arc;

use crate::identity::IdentityResolver;
use crate::inspect::{ContainerInspector, InspectError};

/// `HostConfig.UsernsMode` value that disables namespace remapping.
pub const HOST_USERNS_MODE: &str = "host";

/// Namespace isolation of a container, as far as it can be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Remapped user namespace.
    Isolated,
    /// Created with `UsernsMode=host`.
    HostShared,
    /// Inspection failed or returned no host config.
    Unknown,
}

/// Who owns a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// Namespace remapping is active; ownership is not enforced.
    Untracked,
    /// Host mode, but no user was recorded at creation.
    Unclaimed,
    /// Host mode with the recorded creator descriptor.
    Owned(String),
}

/// Errors from ownership lookups.
#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    /// The container could not be inspected.
    #[error(transparent)]
    Inspect(#[from] InspectError),
    /// Inspection succeeded but the needed config section is missing.
    #[error("container {container} has no {section}")]
    Incomplete {
        /// Container id.
        container: String,
        /// Missing section name.
        section: &'static str,
    },
}

/// Answers isolation and ownership questions for containers.
#[derive(Clone)]
pub struct OwnershipTracker {
    inspector: Arc<dyn ContainerInspector>,
    resolver: IdentityResolver,
}

impl std::fmt::Debug for OwnershipTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipTracker").finish_non_exhaustive()
    }
}

impl OwnershipTracker {
    /// Build a tracker over the given inspector and resolver.
    pub fn new(inspector: Arc<dyn ContainerInspector>, resolver: IdentityResolver) -> Self {
        Self {
            inspector,
            resolver,
        }
    }

    /// Isolation of the container. Failures map to [`Isolation::Unknown`].
    pub async fn isolation(&self, id: &str) -> Isolation {
        match self.inspector.inspect_container(id.trim()).await {
            Ok(facts) => match facts.userns_mode.as_deref() {
                Some(HOST_USERNS_MODE) => Isolation::HostShared,
                Some(_) => Isolation::Isolated,
                None => Isolation::Unknown,
            },
            Err(e) => {
                tracing::warn!(container = id, error = %e, "isolation lookup failed");
                Isolation::Unknown
            }
        }
    }

    /// Recorded owner of the container.
    ///
    /// # Errors
    ///
    /// Returns [`OwnershipError`] when the container cannot be inspected or
    /// its host/container config is missing.
    pub async fn ownership(&self, id: &str) -> Result<Ownership, OwnershipError> {
        let facts = self.inspector.inspect_container(id.trim()).await?;

        let mode = facts.userns_mode.ok_or_else(|| OwnershipError::Incomplete {
            container: id.to_owned(),
            section: "host config",
        })?;
        if mode != HOST_USERNS_MODE {
            return Ok(Ownership::Untracked);
        }

        let user = facts.run_as_user.ok_or_else(|| OwnershipError::Incomplete {
            container: id.to_owned(),
            section: "container config",
        })?;
        if user.is_empty() {
            Ok(Ownership::Unclaimed)
        } else {
            Ok(Ownership::Owned(user))
        }
    }

    /// Whether `descriptor` may act as the creator of the container.
    ///
    /// Untracked and unclaimed containers admit anyone; lookup failures
    /// admit no one.
    pub async fn is_creator(&self, id: &str, descriptor: &str) -> bool {
        match self.ownership(id).await {
            Ok(Ownership::Untracked | Ownership::Unclaimed) => true,
            Ok(Ownership::Owned(creator)) => self.resolver.equal(&creator, descriptor),
            Err(e) => {
                tracing::warn!(container = id, error = %e, "ownership lookup failed");
                false
            }
        }
    }
}
