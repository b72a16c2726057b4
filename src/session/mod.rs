//! Session lookup against the hosted auth service.
//!
//! The guard only needs a yes/no answer plus, when yes, who the visitor is.
//! [`SessionOracle`] is that seam; [`AuthServiceOracle`] answers it over HTTP.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::{future::Future, pin::Pin};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub mod cookie;
mod remote;

pub use remote::{AuthServiceOracle, default_cookie_name};

/// Visitor resolved from a valid session.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("malformed session cookie: {0}")]
    MalformedCookie(String),
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth service answered with unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("auth service returned an unreadable user: {0}")]
    Decode(String),
}

pub type LookupResult = Result<Option<Identity>, LookupError>;

/// "Is there a valid session behind these headers?"
///
/// `Ok(None)` means the visitor is anonymous; `Err` means the question could
/// not be answered. Callers decide how to treat errors.
pub trait SessionOracle: Send + Sync {
    fn lookup<'a>(
        &'a self,
        headers: &'a HeaderMap,
    ) -> Pin<Box<dyn Future<Output = LookupResult> + Send + 'a>>;
}
