//! Warden: a Docker authorization plugin for shared hosts.
//!
//! Every Docker API call passes through [`engine::Engine::authorize`] before
//! the daemon acts on it. Non-root callers may only create containers that
//! keep user-namespace remapping, or that run as themselves with
//! `no-new-privileges` and without missing host paths. They may only exec into
//! or manage containers they created.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod identity;
pub mod inspect;
pub mod logging;
pub mod ownership;
pub mod policy;
pub mod request;
pub mod router;
pub mod server;
pub mod trust;
