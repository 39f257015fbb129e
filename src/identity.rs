//! Caller identity resolution against the OS account directory.
//!
//! Docker hands the plugin a textual descriptor (`account[:group]`). Policies
//! never compare descriptors as strings: both sides are resolved through an
//! [`IdentityStore`] and compared as canonical records, so `alice:staff` and
//! `1000:50` are the same caller when they resolve to the same account and
//! group.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::Arc;

use nix::unistd::{Gid, Group, Uid, User};

/// Canonical account record as returned by the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// GECOS / display field.
    pub gecos: String,
    /// Home directory.
    pub home: PathBuf,
    /// Login shell.
    pub shell: PathBuf,
}

/// Canonical group record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// Group name.
    pub name: String,
    /// Numeric group id.
    pub gid: u32,
}

/// A fully resolved caller: account plus a group the account belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Resolved account.
    pub account: AccountRecord,
    /// Requested group, validated against the account's memberships.
    pub group: GroupRecord,
}

impl Identity {
    /// Structural equality: same account record and same resolved group id.
    pub fn same_as(&self, other: &Identity) -> bool {
        self.account == other.account && self.group.gid == other.group.gid
    }
}

/// Errors from identity resolution.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The descriptor was empty after trimming.
    #[error("empty identity descriptor")]
    Empty,
    /// No account matches the name or numeric id.
    #[error("unknown account: {0}")]
    UnknownAccount(String),
    /// No group matches the name or numeric id.
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    /// The descriptor carries no group component.
    #[error("group not set for {0}")]
    GroupNotSet(String),
    /// The account is not a member of the requested group.
    #[error("account {account} is not a member of group {group}")]
    NotMember {
        /// Account name.
        account: String,
        /// Group name.
        group: String,
    },
    /// The identity store itself failed.
    #[error("identity store lookup failed: {0}")]
    Store(String),
}

/// Queryable account/group directory.
pub trait IdentityStore: Send + Sync {
    /// Look up an account by login name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Store`] when the directory cannot be queried.
    fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, IdentityError>;

    /// Look up an account by numeric uid.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Store`] when the directory cannot be queried.
    fn account_by_id(&self, uid: u32) -> Result<Option<AccountRecord>, IdentityError>;

    /// Look up a group by name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Store`] when the directory cannot be queried.
    fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>, IdentityError>;

    /// Look up a group by numeric gid.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Store`] when the directory cannot be queried.
    fn group_by_id(&self, gid: u32) -> Result<Option<GroupRecord>, IdentityError>;

    /// All group ids the account belongs to, primary group included.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Store`] when the directory cannot be queried.
    fn group_ids(&self, account: &AccountRecord) -> Result<Vec<u32>, IdentityError>;
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves descriptors and compares identities through an [`IdentityStore`].
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl IdentityResolver {
    /// Create a resolver backed by the given store.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Resolve an `account:group` descriptor.
    ///
    /// The account is looked up by name, then by numeric uid. The group is
    /// looked up the same way and must be one the account belongs to. A bare
    /// account without a group does not resolve.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when any lookup fails or membership is missing.
    pub fn resolve(&self, descriptor: &str) -> Result<Identity, IdentityError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(IdentityError::Empty);
        }
        let (account_part, group_part) = match descriptor.split_once(':') {
            Some((account, group)) => (account, group),
            None => (descriptor, ""),
        };

        let account = self.lookup_account(account_part)?;
        if group_part.is_empty() {
            return Err(IdentityError::GroupNotSet(account.name));
        }

        let group = self.lookup_group(group_part)?;
        if !self.store.group_ids(&account)?.contains(&group.gid) {
            return Err(IdentityError::NotMember {
                account: account.name,
                group: group.name,
            });
        }

        Ok(Identity { account, group })
    }

    /// Whether two descriptors resolve to the same identity.
    ///
    /// Fails closed: if either side does not resolve, they are not equal.
    pub fn equal(&self, left: &str, right: &str) -> bool {
        match (self.resolve(left), self.resolve(right)) {
            (Ok(l), Ok(r)) => l.same_as(&r),
            (Err(e), _) | (_, Err(e)) => {
                tracing::debug!(left, right, error = %e, "identity comparison failed");
                false
            }
        }
    }

    /// Whether the account behind `descriptor` belongs to `group` (name or gid).
    pub fn is_member(&self, descriptor: &str, group: &str) -> bool {
        let result = self.resolve(descriptor).and_then(|identity| {
            let group = self.lookup_group(group.trim())?;
            let ids = self.store.group_ids(&identity.account)?;
            Ok(ids.contains(&group.gid))
        });
        match result {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(descriptor, group, error = %e, "group membership check failed");
                false
            }
        }
    }

    fn lookup_account(&self, name: &str) -> Result<AccountRecord, IdentityError> {
        if let Some(account) = self.store.account_by_name(name)? {
            return Ok(account);
        }
        if let Ok(uid) = name.parse::<u32>() {
            if let Some(account) = self.store.account_by_id(uid)? {
                return Ok(account);
            }
        }
        Err(IdentityError::UnknownAccount(name.to_owned()))
    }

    fn lookup_group(&self, name: &str) -> Result<GroupRecord, IdentityError> {
        if let Some(group) = self.store.group_by_name(name)? {
            return Ok(group);
        }
        if let Ok(gid) = name.parse::<u32>() {
            if let Some(group) = self.store.group_by_id(gid)? {
                return Ok(group);
            }
        }
        Err(IdentityError::UnknownGroup(name.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// System store (passwd / group databases)
// ---------------------------------------------------------------------------

/// [`IdentityStore`] backed by the host's passwd and group databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentityStore;

fn account_from_user(user: User) -> AccountRecord {
    AccountRecord {
        name: user.name,
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
        gecos: user.gecos.to_string_lossy().into_owned(),
        home: user.dir,
        shell: user.shell,
    }
}

fn group_from_nix(group: Group) -> GroupRecord {
    GroupRecord {
        name: group.name,
        gid: group.gid.as_raw(),
    }
}

fn store_err(e: nix::Error) -> IdentityError {
    IdentityError::Store(e.to_string())
}

impl IdentityStore for SystemIdentityStore {
    fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, IdentityError> {
        User::from_name(name)
            .map(|u| u.map(account_from_user))
            .map_err(store_err)
    }

    fn account_by_id(&self, uid: u32) -> Result<Option<AccountRecord>, IdentityError> {
        User::from_uid(Uid::from_raw(uid))
            .map(|u| u.map(account_from_user))
            .map_err(store_err)
    }

    fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>, IdentityError> {
        Group::from_name(name)
            .map(|g| g.map(group_from_nix))
            .map_err(store_err)
    }

    fn group_by_id(&self, gid: u32) -> Result<Option<GroupRecord>, IdentityError> {
        Group::from_gid(Gid::from_raw(gid))
            .map(|g| g.map(group_from_nix))
            .map_err(store_err)
    }

    fn group_ids(&self, account: &AccountRecord) -> Result<Vec<u32>, IdentityError> {
        let name = CString::new(account.name.as_str())
            .map_err(|e| IdentityError::Store(format!("invalid account name: {e}")))?;
        let groups = nix::unistd::getgrouplist(&name, Gid::from_raw(account.gid))
            .map_err(store_err)?;
        Ok(groups.into_iter().map(Gid::as_raw).collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Fixed identity directory, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityStore {
    accounts: HashMap<String, AccountRecord>,
    groups: HashMap<String, GroupRecord>,
    memberships: HashMap<u32, Vec<u32>>,
}

impl InMemoryIdentityStore {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with its supplementary group ids.
    ///
    /// The primary group is always counted as a membership.
    #[must_use]
    pub fn with_account(mut self, account: AccountRecord, supplementary: &[u32]) -> Self {
        let mut ids = vec![account.gid];
        ids.extend(supplementary.iter().copied().filter(|g| *g != account.gid));
        self.memberships.insert(account.uid, ids);
        self.accounts.insert(account.name.clone(), account);
        self
    }

    /// Add a group.
    #[must_use]
    pub fn with_group(mut self, group: GroupRecord) -> Self {
        self.groups.insert(group.name.clone(), group);
        self
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn account_by_name(&self, name: &str) -> Result<Option<AccountRecord>, IdentityError> {
        Ok(self.accounts.get(name).cloned())
    }

    fn account_by_id(&self, uid: u32) -> Result<Option<AccountRecord>, IdentityError> {
        Ok(self.accounts.values().find(|a| a.uid == uid).cloned())
    }

    fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>, IdentityError> {
        Ok(self.groups.get(name).cloned())
    }

    fn group_by_id(&self, gid: u32) -> Result<Option<GroupRecord>, IdentityError> {
        Ok(self.groups.values().find(|g| g.gid == gid).cloned())
    }

    fn group_ids(&self, account: &AccountRecord) -> Result<Vec<u32>, IdentityError> {
        Ok(self
            .memberships
            .get(&account.uid)
            .cloned()
            .unwrap_or_default())
    }
}
