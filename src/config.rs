//! Configuration loading and validation.
//!
//! Loads `config.toml` from `--config`, `$WARDEN_CONFIG_PATH`, or
//! `~/.warden/config.toml`. Every section has defaults, so a missing or
//! empty file is valid. Environment variables override file values.
//!
//! Precedence: env vars > config file > defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Plugin HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Docker daemon used for inspection.
    #[serde(default)]
    pub docker: DockerConfig,

    /// Policy knobs.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Trusted registry for image verification.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Plugin HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Unix socket the plugin serves on. Empty switches to TCP on `listen`.
    #[serde(default = "default_socket")]
    pub socket: String,

    /// TCP address used when `socket` is empty.
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            listen: default_listen(),
        }
    }
}

/// Where the plugin accepts daemon connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// TCP socket address.
    Tcp(SocketAddr),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Docker client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    /// Daemon address (`unix://...` or `tcp://host:port`). Empty uses local defaults.
    #[serde(default)]
    pub host: String,

    /// Request timeout in seconds.
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,

    /// Client certificates for `tcp://` hosts.
    #[serde(default)]
    pub tls: Option<DockerTlsConfig>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            timeout_secs: default_docker_timeout_secs(),
            tls: None,
        }
    }
}

/// TLS material for the Docker client.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DockerTlsConfig {
    /// CA certificate path.
    pub ca: String,
    /// Client certificate path.
    pub cert: String,
    /// Client key path.
    pub key: String,
}

/// Policy settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Caller descriptor granted unconditional access.
    #[serde(default = "default_root_identity")]
    pub root_identity: String,

    /// Numeric prefix of federated filesystem group ids.
    #[serde(default = "default_federated_group_prefix")]
    pub federated_group_prefix: String,

    /// Exact length of federated filesystem group ids.
    #[serde(default = "default_federated_group_len")]
    pub federated_group_len: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            root_identity: default_root_identity(),
            federated_group_prefix: default_federated_group_prefix(),
            federated_group_len: default_federated_group_len(),
        }
    }
}

/// Trusted registry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Registry address (`host[:port]`) whose images count as trusted.
    #[serde(default)]
    pub trusted: Option<String>,

    /// URL scheme used to reach the registry.
    #[serde(default = "default_registry_scheme")]
    pub scheme: String,

    /// Request timeout in seconds.
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            trusted: None,
            scheme: default_registry_scheme(),
            timeout_secs: default_registry_timeout_secs(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory for rotated JSON logs. Console only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions for serde

fn default_socket() -> String {
    "/var/run/docker/plugins/warden.sock".to_owned()
}
fn default_listen() -> String {
    "127.0.0.1:9876".to_owned()
}
fn default_docker_timeout_secs() -> u64 {
    120
}
fn default_root_identity() -> String {
    "0:0".to_owned()
}
fn default_federated_group_prefix() -> String {
    "109".to_owned()
}
fn default_federated_group_len() -> usize {
    10
}
fn default_registry_scheme() -> String {
    "http".to_owned()
}
fn default_registry_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Parse a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML, unknown keys, or invalid values.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests can inject values without touching
    /// the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("WARDEN_SOCKET") {
            self.server.socket = v;
        }
        if let Some(v) = env("WARDEN_LISTEN") {
            match v.parse::<SocketAddr>() {
                Ok(_) => self.server.listen = v,
                Err(_) => tracing::warn!(
                    var = "WARDEN_LISTEN",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("WARDEN_DOCKER_HOST") {
            self.docker.host = v;
        }
        if let Some(v) = env("WARDEN_ROOT_IDENTITY") {
            if v.trim().is_empty() {
                tracing::warn!(var = "WARDEN_ROOT_IDENTITY", "ignoring empty env override");
            } else {
                self.policy.root_identity = v;
            }
        }
        if let Some(v) = env("WARDEN_TRUSTED_REGISTRY") {
            self.registry.trusted = Some(v).filter(|s| !s.trim().is_empty());
        }
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("server.listen is not a socket address: {}", self.server.listen))?;

        if self.policy.root_identity.trim().is_empty() {
            anyhow::bail!("policy.root_identity must not be empty");
        }
        let prefix = &self.policy.federated_group_prefix;
        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            anyhow::bail!("policy.federated_group_prefix must be a non-empty digit string");
        }
        if self.policy.federated_group_len < prefix.len() {
            anyhow::bail!("policy.federated_group_len must not be shorter than the prefix");
        }
        if !matches!(self.registry.scheme.as_str(), "http" | "https") {
            anyhow::bail!("registry.scheme must be http or https");
        }
        Ok(())
    }

    /// Parsed TCP listener address.
    ///
    /// # Errors
    ///
    /// Returns an error if `server.listen` does not parse.
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .listen
            .parse()
            .with_context(|| format!("invalid server.listen: {}", self.server.listen))
    }

    /// Endpoint to serve on: the Unix socket unless it is empty, else TCP.
    ///
    /// # Errors
    ///
    /// Returns an error if TCP is selected and `server.listen` does not parse.
    pub fn endpoint(&self) -> anyhow::Result<Endpoint> {
        let socket = self.server.socket.trim();
        if socket.is_empty() {
            self.listen_addr().map(Endpoint::Tcp)
        } else {
            Ok(Endpoint::Unix(PathBuf::from(socket)))
        }
    }
}

/// Load config from a TOML file, falling back to defaults when it is absent,
/// then apply process env overrides and validate.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or validated.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            tracing::info!(path = %path.display(), "loading config from file");
            toml::from_str::<Config>(&contents)
                .with_context(|| format!("failed to parse config at {}", path.display()))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            ))
        }
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Resolve the config file path.
///
/// An explicit path wins, then `$WARDEN_CONFIG_PATH`, then
/// `~/.warden/config.toml`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(p) = env("WARDEN_CONFIG_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve the default config directory (`~/.warden/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".warden"))
}
