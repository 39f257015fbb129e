//! Per-action authorization policies.
//!
//! Each policy turns one classified request into a [`Decision`]. None of them
//! has an implicit allow: every path that lets a call through returns
//! [`Decision::Allow`] explicitly, and collaborator failures end in a denial
//! unless the rule for that call site says otherwise.
//!
//! [`Decision`]: crate::request::Decision
//! [`Decision::Allow`]: crate::request::Decision::Allow

use std::path::Path;

pub mod body;
pub mod create;
pub mod exec;
pub mod lifecycle;

pub use create::CreatePolicy;
pub use exec::ExecPolicy;
pub use lifecycle::LifecyclePolicy;

/// Hard error for bodies that fail to parse.
pub const BAD_BODY: &str = "bad request body";
/// Hard error when the run-as user is missing.
pub const USER_NOT_SPECIFIED: &str = "user not specified. Use -u flag.";

/// Hard error for a run-as user that does not match the caller.
pub fn user_mismatch(user: &str) -> String {
    format!("not allowed for user {user}. Did you set group id?")
}

/// Host filesystem existence check.
pub trait PathProbe: Send + Sync {
    /// Whether `path` exists on the host.
    fn exists(&self, path: &Path) -> bool;
}

/// [`PathProbe`] over the local filesystem.
///
/// Symlinks are followed, so a link whose target is gone does not exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl PathProbe for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        std::fs::metadata(path).is_ok()
    }
}

/// Reserved numeric group ids used by the federated filesystem.
///
/// These ids are not in the local group database, so membership cannot be
/// checked and they are accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedGroups {
    prefix: String,
    len: usize,
}

impl FederatedGroups {
    /// Ids of exactly `len` ASCII digits starting with `prefix`.
    pub fn new(prefix: impl Into<String>, len: usize) -> Self {
        Self {
            prefix: prefix.into(),
            len,
        }
    }

    /// Whether `group` is a federated group id.
    pub fn matches(&self, group: &str) -> bool {
        group.len() == self.len
            && group.starts_with(&self.prefix)
            && group.bytes().all(|b| b.is_ascii_digit())
    }
}

impl Default for FederatedGroups {
    fn default() -> Self {
        Self::new("109", 10)
    }
}
