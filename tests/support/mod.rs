//! Fake collaborators shared by the integration suites.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use warden::config::Config;
use warden::engine::{Collaborators, Engine};
use warden::identity::{AccountRecord, GroupRecord, InMemoryIdentityStore};
use warden::inspect::{ContainerFacts, ContainerInspector, ImageFacts, InspectError};
use warden::policy::PathProbe;
use warden::request::AuthzRequest;
use warden::trust::{DigestError, DigestSource};

/// Image id every fake container runs.
pub const IMAGE_ID: &str = "sha256:0123456789ab";

/// Host path the fake filesystem reports as existing.
pub const EXISTING_PATH: &str = "/srv/data";

pub const ALICE: &str = "1000:1000";
pub const BOB: &str = "1001:1001";
pub const ROOT: &str = "0:0";

// ---------------------------------------------------------------------------
// Inspector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakeInspector {
    containers: HashMap<String, ContainerFacts>,
    images: HashMap<String, ImageFacts>,
}

impl FakeInspector {
    /// Inventory with one tagged image and no containers.
    pub fn new() -> Self {
        Self::default().with_image(
            IMAGE_ID,
            ImageFacts {
                repo_tags: vec!["busybox:latest".to_owned()],
                repo_digests: Vec::new(),
            },
        )
    }

    pub fn with_container(mut self, id: &str, facts: ContainerFacts) -> Self {
        self.containers.insert(id.to_owned(), facts);
        self
    }

    pub fn with_image(mut self, reference: &str, facts: ImageFacts) -> Self {
        self.images.insert(reference.to_owned(), facts);
        self
    }
}

#[async_trait]
impl ContainerInspector for FakeInspector {
    async fn inspect_container(&self, id: &str) -> Result<ContainerFacts, InspectError> {
        self.containers
            .get(id)
            .cloned()
            .ok_or_else(|| InspectError::NotFound(id.to_owned()))
    }

    async fn inspect_image(&self, reference: &str) -> Result<ImageFacts, InspectError> {
        self.images
            .get(reference)
            .cloned()
            .ok_or_else(|| InspectError::NotFound(reference.to_owned()))
    }
}

/// Container created with the given namespace mode and run-as user.
pub fn container(userns_mode: &str, user: &str) -> ContainerFacts {
    ContainerFacts {
        image: Some(IMAGE_ID.to_owned()),
        userns_mode: Some(userns_mode.to_owned()),
        run_as_user: Some(user.to_owned()),
    }
}

// ---------------------------------------------------------------------------
// Filesystem, registry, identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakePaths(HashSet<PathBuf>);

impl FakePaths {
    pub fn with(paths: &[&str]) -> Self {
        Self(paths.iter().map(PathBuf::from).collect())
    }
}

impl PathProbe for FakePaths {
    fn exists(&self, path: &Path) -> bool {
        self.0.contains(path)
    }
}

/// Registry digests keyed by `registry/image:tag`.
#[derive(Debug, Clone, Default)]
pub struct FakeDigests(HashMap<String, String>);

impl FakeDigests {
    pub fn with(mut self, key: &str, digest: &str) -> Self {
        self.0.insert(key.to_owned(), digest.to_owned());
        self
    }
}

#[async_trait]
impl DigestSource for FakeDigests {
    async fn head_manifest(
        &self,
        registry: &str,
        image: &str,
        tag: &str,
    ) -> Result<String, DigestError> {
        self.0
            .get(&format!("{registry}/{image}:{tag}"))
            .cloned()
            .ok_or(DigestError::Missing { status: 404 })
    }
}

fn account(name: &str, uid: u32, gid: u32) -> AccountRecord {
    AccountRecord {
        name: name.to_owned(),
        uid,
        gid,
        gecos: name.to_owned(),
        home: PathBuf::from(format!("/home/{name}")),
        shell: PathBuf::from("/bin/bash"),
    }
}

fn group(name: &str, gid: u32) -> GroupRecord {
    GroupRecord {
        name: name.to_owned(),
        gid,
    }
}

/// alice (1000, member of sudo), bob (1001), root (0).
pub fn identities() -> InMemoryIdentityStore {
    InMemoryIdentityStore::new()
        .with_account(account("alice", 1000, 1000), &[27])
        .with_account(account("bob", 1001, 1001), &[])
        .with_account(account("root", 0, 0), &[])
        .with_group(group("alice", 1000))
        .with_group(group("bob", 1001))
        .with_group(group("sudo", 27))
        .with_group(group("wheel", 10))
        .with_group(group("root", 0))
}

// ---------------------------------------------------------------------------
// Engine and requests
// ---------------------------------------------------------------------------

pub fn engine_with(inspector: FakeInspector, digests: FakeDigests, config: &Config) -> Engine {
    Engine::new(
        config,
        Collaborators {
            inspector: Arc::new(inspector),
            identities: Arc::new(identities()),
            paths: Arc::new(FakePaths::with(&[EXISTING_PATH])),
            digests: Arc::new(digests),
        },
    )
}

pub fn engine(inspector: FakeInspector) -> Engine {
    engine_with(inspector, FakeDigests::default(), &Config::default())
}

pub fn request(method: &str, uri: &str, caller: &str, body: &Value) -> AuthzRequest {
    AuthzRequest::new(method, uri, caller).with_body(body.to_string())
}

pub fn create(caller: &str, body: &Value) -> AuthzRequest {
    request("POST", "/v1.41/containers/create", caller, body)
}
