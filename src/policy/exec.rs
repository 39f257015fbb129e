//! `POST /containers/{id}/exec` policy.

use std::sync::Arc;

use crate::identity::IdentityResolver;
use crate::inspect::{container_image_tag, ContainerInspector};
use crate::ownership::{Isolation, OwnershipTracker};
use crate::request::{AuthzRequest, Decision};

use super::body::{BodyError, ExecSpec, Field};
use super::{user_mismatch, BAD_BODY, USER_NOT_SPECIFIED};

const BAD_CONTAINER: &str = "bad container name";
const BAD_USER: &str = "bad User field";

/// Decides exec-into-container requests.
///
/// Exec into a remapped container is always permitted. For containers running
/// in the host user namespace the exec user must be the caller and the
/// container's creator.
#[derive(Clone)]
pub struct ExecPolicy {
    inspector: Arc<dyn ContainerInspector>,
    ownership: OwnershipTracker,
    resolver: IdentityResolver,
}

impl std::fmt::Debug for ExecPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecPolicy").finish_non_exhaustive()
    }
}

impl ExecPolicy {
    /// Build the policy from its collaborators.
    pub fn new(
        inspector: Arc<dyn ContainerInspector>,
        ownership: OwnershipTracker,
        resolver: IdentityResolver,
    ) -> Self {
        Self {
            inspector,
            ownership,
            resolver,
        }
    }

    /// Evaluate an exec request against container `id`.
    pub async fn evaluate(&self, req: &AuthzRequest, id: &str) -> Decision {
        let spec = match ExecSpec::parse(&req.body) {
            Ok(spec) => spec,
            Err(BodyError::WrongType { .. }) => return Decision::reject(BAD_USER),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable exec body");
                return Decision::reject(BAD_BODY);
            }
        };

        if let Err(e) = container_image_tag(self.inspector.as_ref(), id).await {
            tracing::debug!(container = id, error = %e, "exec target has no resolvable image");
            return Decision::deny(BAD_CONTAINER);
        }

        match self.ownership.isolation(id).await {
            Isolation::Isolated | Isolation::Unknown => return Decision::Allow,
            Isolation::HostShared => {}
        }

        let user = match spec.user {
            Field::Present(user) if !user.is_empty() => user,
            _ => return Decision::reject(USER_NOT_SPECIFIED),
        };

        if !self.resolver.equal(&user, &req.caller) {
            return Decision::reject(user_mismatch(&user));
        }

        if !self.ownership.is_creator(id, &user).await {
            return Decision::deny(format!("user {user} is not allowed for this container {id}"));
        }

        Decision::Allow
    }
}
