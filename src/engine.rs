//! Engine assembly: collaborators plus configuration in, decisions out.

use std::sync::Arc;

use crate::config::Config;
use crate::identity::{IdentityResolver, IdentityStore};
use crate::inspect::ContainerInspector;
use crate::ownership::OwnershipTracker;
use crate::policy::{CreatePolicy, ExecPolicy, FederatedGroups, LifecyclePolicy, PathProbe};
use crate::request::{AuthzRequest, Decision};
use crate::router::RequestRouter;
use crate::trust::{DigestSource, ImageTrustVerifier};

/// External systems the engine consults.
#[derive(Clone)]
pub struct Collaborators {
    /// Container runtime inspection.
    pub inspector: Arc<dyn ContainerInspector>,
    /// Account and group directory.
    pub identities: Arc<dyn IdentityStore>,
    /// Host filesystem probe for bind mounts.
    pub paths: Arc<dyn PathProbe>,
    /// Registry digest lookups.
    pub digests: Arc<dyn DigestSource>,
}

/// Stateless authorization engine.
///
/// Holds no per-call state; share it behind an `Arc` and call
/// [`Engine::authorize`] concurrently.
#[derive(Debug, Clone)]
pub struct Engine {
    router: RequestRouter,
    trust: ImageTrustVerifier,
}

impl Engine {
    /// Wire policies from config and collaborators.
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            inspector,
            identities,
            paths,
            digests,
        } = collaborators;

        let resolver = IdentityResolver::new(identities);
        let ownership = OwnershipTracker::new(Arc::clone(&inspector), resolver.clone());
        let federated = FederatedGroups::new(
            config.policy.federated_group_prefix.clone(),
            config.policy.federated_group_len,
        );

        let router = RequestRouter::new(
            config.policy.root_identity.clone(),
            CreatePolicy::new(resolver.clone(), paths, federated),
            ExecPolicy::new(Arc::clone(&inspector), ownership.clone(), resolver.clone()),
            LifecyclePolicy::new(ownership, resolver),
        );
        let trust = ImageTrustVerifier::new(config.registry.trusted.clone(), inspector, digests);

        Self { router, trust }
    }

    /// Decide one request.
    pub async fn authorize(&self, req: &AuthzRequest) -> Decision {
        self.router.route(req).await
    }

    /// Image provenance checker.
    ///
    /// Not consulted by any policy.
    pub fn trust(&self) -> &ImageTrustVerifier {
        &self.trust
    }
}
