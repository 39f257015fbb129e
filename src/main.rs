//! Warden CLI entry point.
//!
//! `serve` runs the authorization plugin, `check-config` validates the
//! configuration, and `verify-image` compares a local image with its
//! trusted-registry digest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use warden::config::{self, Config};
use warden::engine::{Collaborators, Engine};
use warden::identity::SystemIdentityStore;
use warden::inspect::DockerInspector;
use warden::policy::LocalFilesystem;
use warden::trust::RegistryDigestSource;

/// Warden: Docker authorization plugin for shared hosts.
#[derive(Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// Config file (defaults to $WARDEN_CONFIG_PATH or ~/.warden/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the authorization plugin server.
    Serve,
    /// Load and validate the configuration, then print it.
    CheckConfig,
    /// Check a local image against its trusted-registry digest.
    VerifyImage {
        /// Image reference (`registry/image[:tag]`).
        reference: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let path = config::config_path(cli.config.as_deref(), |key| std::env::var(key).ok())?;

    match cli.command {
        Command::Serve => handle_serve(&path).await,
        Command::CheckConfig => handle_check_config(&path),
        Command::VerifyImage { reference } => handle_verify_image(&path, &reference).await,
    }
}

fn build_engine(config: &Config) -> anyhow::Result<Engine> {
    let inspector =
        DockerInspector::connect(&config.docker).context("failed to create docker client")?;
    let digests =
        RegistryDigestSource::new(&config.registry).context("failed to create registry client")?;

    Ok(Engine::new(
        config,
        Collaborators {
            inspector: Arc::new(inspector),
            identities: Arc::new(SystemIdentityStore),
            paths: Arc::new(LocalFilesystem),
            digests: Arc::new(digests),
        },
    ))
}

/// Run the plugin until interrupted.
async fn handle_serve(path: &std::path::Path) -> anyhow::Result<ExitCode> {
    let config = config::load_config(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let _logging_guard = warden::logging::init_server(&config.logging)?;

    let endpoint = config.endpoint()?;
    let engine = Arc::new(build_engine(&config)?);

    info!(
        config = %path.display(),
        %endpoint,
        root = %config.policy.root_identity,
        docker = %config.docker.host,
        "warden starting"
    );
    warden::server::serve(engine, &endpoint).await?;
    Ok(ExitCode::SUCCESS)
}

fn handle_check_config(path: &std::path::Path) -> anyhow::Result<ExitCode> {
    warden::logging::init_cli();
    let config = config::load_config(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    println!("{config:#?}");
    Ok(ExitCode::SUCCESS)
}

async fn handle_verify_image(path: &std::path::Path, reference: &str) -> anyhow::Result<ExitCode> {
    warden::logging::init_cli();
    let config = config::load_config(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let engine = build_engine(&config)?;

    match engine.trust().verify(reference).await {
        Ok(record) if record.is_valid() => {
            println!("verified {} ({})", record.reference, record.local_digest);
            Ok(ExitCode::SUCCESS)
        }
        Ok(record) => {
            println!(
                "digest mismatch for {}: local {} remote {}",
                record.reference, record.local_digest, record.remote_digest
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            println!("not verified: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
