//! Authorization request and decision types.

use serde::{Deserialize, Serialize};

/// One intercepted Docker API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzRequest {
    /// HTTP method (`GET`, `POST`, `DELETE`, ...).
    pub method: String,
    /// Request URI including any version prefix and query string.
    pub uri: String,
    /// Caller descriptor (`account[:group]`) as reported by the daemon.
    pub caller: String,
    /// Raw request body; empty when the call carries none.
    pub body: Vec<u8>,
}

impl AuthzRequest {
    /// Build a request with an empty body.
    pub fn new(method: impl Into<String>, uri: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            caller: caller.into(),
            body: Vec::new(),
        }
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Outcome of evaluating a request.
///
/// `Deny` carries an operator-facing policy message. `Reject` marks the
/// request itself as malformed or invalid. Both refuse the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The call may proceed.
    Allow,
    /// Policy refusal.
    Deny(String),
    /// Malformed or invalid request.
    Reject(String),
}

impl Decision {
    /// Soft denial with a message.
    pub fn deny(msg: impl Into<String>) -> Self {
        Self::Deny(msg.into())
    }

    /// Hard error with a message.
    pub fn reject(msg: impl Into<String>) -> Self {
        Self::Reject(msg.into())
    }

    /// Whether the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Policy message, for soft denials.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Deny(msg) => Some(msg),
            _ => None,
        }
    }

    /// Error text, for hard errors.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Reject(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Plugin-protocol response body (`AuthZReq` / `AuthZRes`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthzResponse {
    /// Whether the daemon should proceed.
    pub allow: bool,
    /// Informational denial message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Error text for malformed requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl From<&Decision> for AuthzResponse {
    fn from(decision: &Decision) -> Self {
        Self {
            allow: decision.is_allowed(),
            msg: decision.message().map(str::to_owned),
            err: decision.error().map(str::to_owned),
        }
    }
}
