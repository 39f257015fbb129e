//! Per-container lifecycle policy (start, stop, kill, remove, ...).

use crate::identity::IdentityResolver;
use crate::ownership::{Ownership, OwnershipTracker};
use crate::request::{AuthzRequest, Decision};

const NOT_ALLOWED: &str = "command not allowed for this user or resource does not exist";

/// Lets callers act only on containers they created.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    ownership: OwnershipTracker,
    resolver: IdentityResolver,
}

impl LifecyclePolicy {
    /// Build the policy from its collaborators.
    pub fn new(ownership: OwnershipTracker, resolver: IdentityResolver) -> Self {
        Self {
            ownership,
            resolver,
        }
    }

    /// Evaluate a lifecycle request against container `id`.
    pub async fn evaluate(&self, req: &AuthzRequest, id: &str) -> Decision {
        match self.ownership.ownership(id).await {
            Ok(Ownership::Untracked | Ownership::Unclaimed) => Decision::Allow,
            Ok(Ownership::Owned(creator)) if self.resolver.equal(&creator, &req.caller) => {
                Decision::Allow
            }
            Ok(Ownership::Owned(_)) => Decision::deny(NOT_ALLOWED),
            Err(e) => {
                tracing::warn!(container = id, error = %e, "ownership lookup failed");
                Decision::deny(NOT_ALLOWED)
            }
        }
    }
}
