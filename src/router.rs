//! Request classification and dispatch.
//!
//! Classification is purely syntactic: the URI path (minus query string and
//! API version prefix) is matched segment by segment, and the container id is
//! lifted out where the path carries one. Whether that container exists is for
//! the policies to find out.

use crate::policy::{CreatePolicy, ExecPolicy, LifecyclePolicy};
use crate::request::{AuthzRequest, Decision};

/// Denial for anything outside the classified actions.
pub const ROOT_ONLY: &str = "command allowed for root only";

/// Action kind of an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `POST /containers/create`.
    Create,
    /// `POST /containers/{id}/exec`.
    Exec {
        /// Target container id or name.
        id: String,
    },
    /// `POST /containers/{id}/{action}` or `DELETE /containers/{id}`.
    Lifecycle {
        /// Target container id or name.
        id: String,
    },
    /// Any `GET`.
    ReadOnly,
    /// Everything else.
    Unclassified,
}

/// Path segments after stripping the query string and `/vX.Y` prefix.
fn path_segments(uri: &str) -> Vec<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let versioned = segments.first().is_some_and(|first| {
        first
            .strip_prefix('v')
            .is_some_and(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit() || b == b'.'))
    });
    if versioned {
        segments.remove(0);
    }
    segments
}

/// Classify a call by method and URI.
pub fn classify(method: &str, uri: &str) -> Action {
    let segments = path_segments(uri);
    let method = method.to_ascii_uppercase();

    match (method.as_str(), segments.as_slice()) {
        ("GET", _) => Action::ReadOnly,
        ("POST", ["containers", "create"]) => Action::Create,
        ("POST", ["containers", id, "exec"]) => Action::Exec {
            id: (*id).to_owned(),
        },
        ("POST", ["containers", id, _action]) => Action::Lifecycle {
            id: (*id).to_owned(),
        },
        ("DELETE", ["containers", id]) => Action::Lifecycle {
            id: (*id).to_owned(),
        },
        _ => Action::Unclassified,
    }
}

/// Root short-circuit, classification and policy dispatch.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    root_identity: String,
    create: CreatePolicy,
    exec: ExecPolicy,
    lifecycle: LifecyclePolicy,
}

impl RequestRouter {
    /// Build a router over the three policies.
    pub fn new(
        root_identity: impl Into<String>,
        create: CreatePolicy,
        exec: ExecPolicy,
        lifecycle: LifecyclePolicy,
    ) -> Self {
        Self {
            root_identity: root_identity.into(),
            create,
            exec,
            lifecycle,
        }
    }

    /// Decide one request.
    pub async fn route(&self, req: &AuthzRequest) -> Decision {
        if req.caller == self.root_identity {
            return Decision::Allow;
        }

        let action = classify(&req.method, &req.uri);
        tracing::debug!(method = %req.method, uri = %req.uri, ?action, "classified request");

        let decision = match &action {
            Action::Create => self.create.evaluate(req),
            Action::Exec { id } => self.exec.evaluate(req, id).await,
            Action::Lifecycle { id } => self.lifecycle.evaluate(req, id).await,
            Action::ReadOnly => Decision::Allow,
            Action::Unclassified => Decision::deny(ROOT_ONLY),
        };
        tracing::debug!(caller = %req.caller, ?action, ?decision, "request decided");
        decision
    }
}
