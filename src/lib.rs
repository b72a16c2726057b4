//! # Fiszki gate
//!
//! `fiszki` sits in front of the 10xDevFiszki site and decides, per request,
//! whether the visitor may see the page they asked for. Sessions are owned by
//! a hosted auth service; this crate only asks it one question per request:
//! "is there a valid session behind these headers?".
//!
//! ## Request flow
//!
//! 1. The request path is canonicalised (`guard::path`).
//! 2. The session oracle is queried exactly once, bounded by a timeout. Any
//!    failure counts as "no session".
//! 3. The policy (`guard::policy`) walks its ordered stages and picks one of
//!    three outcomes:
//!    - protected path without a session: `303` to the sign-in page;
//!    - sign-in/sign-up path with a session: `303` to the landing page;
//!    - anything else: the request continues, carrying the resolved
//!      [`session::Identity`] as a request extension.
//!
//! Redirect targets are fixed at startup and never derived from the request.

pub mod api;
pub mod cli;
pub mod guard;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
