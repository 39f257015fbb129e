//! Docker authorization-plugin HTTP endpoint.
//!
//! Implements the three calls the daemon makes against an `authz` plugin:
//! activation, request authorization and response authorization. Bodies are
//! read as raw bytes because the daemon sends its own plugin media type rather
//! than `application/json`.
//!
//! The daemon discovers plugins by socket name under
//! `/var/run/docker/plugins/`, so a Unix socket is the default transport.
//! TCP is available for setups that register the plugin with a spec file.

use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine as _;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;

use crate::config::Endpoint;
use crate::engine::Engine;
use crate::request::{AuthzRequest, AuthzResponse, Decision};

/// Media type of plugin protocol v1.2 responses.
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

/// `AuthZReq` payload sent by the daemon.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginRequest {
    /// Authenticated caller descriptor.
    #[serde(default)]
    pub user: String,
    /// HTTP method of the intercepted call.
    #[serde(default)]
    pub request_method: String,
    /// URI of the intercepted call.
    #[serde(default, alias = "RequestURI")]
    pub request_uri: String,
    /// Base64-encoded body of the intercepted call.
    #[serde(default)]
    pub request_body: Option<String>,
}

impl PluginRequest {
    /// Decode into an engine request.
    ///
    /// # Errors
    ///
    /// Returns the base64 error when the body does not decode.
    pub fn into_authz(self) -> Result<AuthzRequest, base64::DecodeError> {
        let body = match self.request_body.as_deref() {
            None | Some("") => Vec::new(),
            Some(encoded) => base64::engine::general_purpose::STANDARD.decode(encoded)?,
        };
        Ok(AuthzRequest {
            method: self.request_method,
            uri: self.request_uri,
            caller: self.user,
            body,
        })
    }
}

/// `Plugin.Activate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    /// Plugin subsystems implemented.
    pub implements: Vec<String>,
}

/// Build the plugin router.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/AuthZPlugin.AuthZReq", post(authz_request))
        .route("/AuthZPlugin.AuthZRes", post(authz_response))
        .with_state(engine)
}

fn plugin_json<T: Serialize>(value: T) -> impl IntoResponse {
    ([(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], Json(value))
}

async fn activate() -> impl IntoResponse {
    plugin_json(ActivateResponse {
        implements: vec!["authz".to_owned()],
    })
}

async fn authz_request(State(engine): State<Arc<Engine>>, body: Bytes) -> impl IntoResponse {
    let decision = match decode_request(&body) {
        Ok(req) => engine.authorize(&req).await,
        Err(decision) => decision,
    };
    plugin_json(AuthzResponse::from(&decision))
}

async fn authz_response() -> impl IntoResponse {
    plugin_json(AuthzResponse::from(&Decision::Allow))
}

fn decode_request(body: &[u8]) -> Result<AuthzRequest, Decision> {
    let wire: PluginRequest = serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "undecodable AuthZReq payload");
        Decision::reject("bad plugin request")
    })?;
    wire.into_authz().map_err(|e| {
        tracing::warn!(error = %e, "undecodable request body encoding");
        Decision::reject("bad request body")
    })
}

/// Serve the plugin on `endpoint` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(engine: Arc<Engine>, endpoint: &Endpoint) -> anyhow::Result<()> {
    match endpoint {
        Endpoint::Tcp(addr) => serve_tcp(engine, *addr, shutdown_signal()).await,
        Endpoint::Unix(path) => serve_unix(engine, path, shutdown_signal()).await,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Serve over TCP until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve_tcp<F>(engine: Arc<Engine>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "authorization plugin listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await
        .context("plugin server failed")?;

    tracing::info!("authorization plugin stopped");
    Ok(())
}

/// Serve over a Unix domain socket until `shutdown` resolves.
///
/// A stale socket file at `path` is replaced. The socket is created with mode
/// `0660` and removed again on shutdown. Connections still in flight when
/// `shutdown` resolves run to completion on their own tasks.
///
/// # Errors
///
/// Returns an error if the socket cannot be created or bound.
pub async fn serve_unix<F>(engine: Arc<Engine>, path: &Path, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale plugin socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to remove stale {}", path.display()))
        }
    }

    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("failed to bind {}", path.display()))?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))
        .await
        .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    tracing::info!(path = %path.display(), "authorization plugin listening");

    let app = router(engine);
    tokio::pin!(shutdown);
    loop {
        let stream = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept plugin connection");
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let app = app.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| app.clone().oneshot(req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(error = %e, "plugin connection closed with error");
            }
        });
    }

    drop(listener);
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove plugin socket");
    }
    tracing::info!("authorization plugin stopped");
    Ok(())
}
