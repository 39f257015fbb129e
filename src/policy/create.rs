//! `POST /containers/create` policy.
//!
//! Rules are evaluated in a fixed order and the first terminal branch wins:
//! host config, bind mounts, user-namespace mode, run-as user, supplementary
//! groups, security options.
//!
//! An empty `UsernsMode` allows the container immediately. The daemon then
//! applies its default remapping, so the container cannot reach host
//! resources as the caller, and the user/group/security-option checks only
//! apply once remapping is switched off.

use std::path::Path;
use std::sync::Arc;

use crate::identity::IdentityResolver;
use crate::request::{AuthzRequest, Decision};

use super::body::{BodyError, CreateSpec, Field};
use super::{user_mismatch, FederatedGroups, PathProbe, BAD_BODY, USER_NOT_SPECIFIED};

/// Security option that must be present when remapping is disabled.
pub const NO_NEW_PRIVILEGES: &str = "no-new-privileges";

const BAD_HOST_OPTIONS: &str = "bad host options";
const BAD_BINDS: &str = "bad Binds flag";
const BAD_USERNS_MODE: &str = "bad UsernsMode flag";
const BAD_USER: &str = "bad User field";
const BAD_GROUP_ADD: &str = "bad GroupAdd flag";
const BAD_SECURITY_OPT: &str = "bad SecurityOpt flag";
const USE_NO_NEW_PRIVILEGES: &str = "use --security-opt no-new-privileges flag";

/// Decides container creation requests.
#[derive(Clone)]
pub struct CreatePolicy {
    resolver: IdentityResolver,
    paths: Arc<dyn PathProbe>,
    federated: FederatedGroups,
}

impl std::fmt::Debug for CreatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatePolicy")
            .field("federated", &self.federated)
            .finish_non_exhaustive()
    }
}

impl CreatePolicy {
    /// Build the policy from its collaborators.
    pub fn new(
        resolver: IdentityResolver,
        paths: Arc<dyn PathProbe>,
        federated: FederatedGroups,
    ) -> Self {
        Self {
            resolver,
            paths,
            federated,
        }
    }

    /// Evaluate a create request.
    pub fn evaluate(&self, req: &AuthzRequest) -> Decision {
        let spec = match CreateSpec::parse(&req.body) {
            Ok(spec) => spec,
            Err(BodyError::HostConfig) => return Decision::reject(BAD_HOST_OPTIONS),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable create body");
                return Decision::reject(BAD_BODY);
            }
        };

        if let Err(decision) = self.check_binds(&spec) {
            return decision;
        }

        let mode = match spec.userns_mode {
            Ok(Field::Present(mode)) => mode,
            Ok(Field::Absent | Field::Null) | Err(_) => {
                return Decision::reject(BAD_USERNS_MODE)
            }
        };
        if mode.is_empty() {
            return Decision::Allow;
        }

        let user = match spec.user {
            Ok(Field::Present(user)) if !user.is_empty() => user,
            Ok(_) => return Decision::reject(USER_NOT_SPECIFIED),
            Err(_) => return Decision::reject(BAD_USER),
        };

        if !self.resolver.equal(&user, &req.caller) {
            return Decision::reject(user_mismatch(&user));
        }

        let groups = match spec.group_add {
            Ok(field) => field.present().unwrap_or_default(),
            Err(_) => return Decision::reject(BAD_GROUP_ADD),
        };
        for group in &groups {
            if self.federated.matches(group) {
                continue;
            }
            if !self.resolver.is_member(&user, group) {
                return Decision::reject(format!("wrong user group {group}"));
            }
        }

        let options = match spec.security_opt {
            Ok(Field::Present(options)) => options,
            Ok(Field::Absent | Field::Null) | Err(_) => {
                return Decision::reject(BAD_SECURITY_OPT)
            }
        };
        if options.iter().any(|opt| opt == NO_NEW_PRIVILEGES) {
            return Decision::Allow;
        }

        Decision::deny(USE_NO_NEW_PRIVILEGES)
    }

    /// Every absolute host path in `Binds` must exist. Named volumes pass.
    fn check_binds(&self, spec: &CreateSpec) -> Result<(), Decision> {
        let binds: &[String] = match &spec.binds {
            Ok(Field::Present(binds)) => binds.as_slice(),
            Ok(Field::Absent | Field::Null) => &[],
            Err(_) => return Err(Decision::reject(BAD_BINDS)),
        };

        for bind in binds {
            let Some((host, _)) = bind.split_once(':') else {
                continue;
            };
            if !host.starts_with('/') {
                continue;
            }
            if !self.paths.exists(Path::new(host)) {
                return Err(Decision::reject(format!("path does not exist: {host}")));
            }
        }
        Ok(())
    }
}
