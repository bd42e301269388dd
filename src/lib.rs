//! # Techfeed (article aggregation backend)
//!
//! `techfeed` is the backend for a technology-article aggregation site. Users
//! register, authenticate, browse and bookmark articles, and comment on them.
//! Every operation is offered over a schema-typed RPC surface (`tonic`) and a
//! REST/JSON gateway (`axum`).
//!
//! ## Authentication core
//!
//! - **Credentials:** passwords are stored as Argon2id PHC strings; plaintext is
//!   never persisted or logged.
//! - **Tokens:** HS256 bearer tokens. Access tokens are short-lived and refresh
//!   tokens long-lived; each kind has its own lifetime and session namespace.
//! - **Revocation:** every token carries a unique identity (`jti`). The session
//!   store maps a principal to the single live identity per token kind, so a new
//!   sign-in silently invalidates the previous token and sign-out removes both.
//! - **Federated sign-in:** Google authorization-code flow; the first sign-in for
//!   an unknown email creates a federated-only account without a password.
//!
//! ## Authorization
//!
//! Every protected RPC method and HTTP route goes through a request authorizer.
//! Both transports share one [`auth::TokenVerifier`]; they only differ in how a
//! request is matched against their table (fully-qualified method vs. method and
//! path regex). Unknown methods and paths are rejected rather than forwarded.

pub mod api;
pub mod auth;
pub mod cli;
pub mod rpc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
