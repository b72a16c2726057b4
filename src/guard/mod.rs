//! Session-gated route access.
//!
//! [`RouteGuard`] glues a [`Policy`] to a [`SessionOracle`]: it asks the oracle
//! once per request, bounded by a timeout, and turns the answer into one
//! [`Outcome`]. [`route_guard`] is the axum middleware that applies it.

use crate::session::{Identity, SessionOracle};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::CACHE_CONTROL},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, warn};

pub mod path;
pub mod policy;

pub use policy::{Outcome, Policy, PolicyError, PrefixSet, Protection};

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(2000);

/// Everything decided about one request. Dropped once the outcome is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub path: String,
    pub identity: Option<Identity>,
    pub outcome: Outcome,
}

impl RequestContext {
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.identity.is_some()
    }
}

pub struct RouteGuard {
    policy: Policy,
    oracle: Arc<dyn SessionOracle>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for RouteGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuard")
            .field("policy", &self.policy)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new(policy: Policy, oracle: Arc<dyn SessionOracle>, lookup_timeout: Duration) -> Self {
        Self {
            policy,
            oracle,
            lookup_timeout,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Ask the oracle once. Errors and timeouts count as "no session".
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        match timeout(self.lookup_timeout, self.oracle.lookup(headers)).await {
            Ok(Ok(identity)) => identity,
            Ok(Err(err)) => {
                warn!("Session lookup failed, treating request as anonymous: {err}");
                None
            }
            Err(_) => {
                warn!(
                    "Session lookup timed out after {}ms, treating request as anonymous",
                    self.lookup_timeout.as_millis()
                );
                None
            }
        }
    }

    /// Classify a request path against the session behind `headers`.
    pub async fn check(&self, raw_path: &str, headers: &HeaderMap) -> RequestContext {
        let canonical = path::canonicalize(raw_path);
        let path = path::page_path(&canonical).to_string();
        let identity = self.resolve(headers).await;
        let outcome = self.policy.decide(&path, identity.is_some());
        RequestContext {
            path,
            identity,
            outcome,
        }
    }
}

/// axum middleware: redirect or pass the request on with its [`Identity`].
pub async fn route_guard(
    State(guard): State<Arc<RouteGuard>>,
    request: Request,
    next: Next,
) -> Response {
    // The body is not `Sync`; only borrow the parts across the lookup.
    let (mut parts, body) = request.into_parts();
    let context = guard.check(parts.uri.path(), &parts.headers).await;

    debug!(
        path = %context.path,
        session = context.has_session(),
        outcome = context.outcome.as_str(),
        "route guard decision"
    );

    match guard.policy().target(context.outcome) {
        Some(target) => redirect(target),
        None => {
            if let Some(identity) = context.identity {
                parts.extensions.insert(identity);
            }
            next.run(Request::from_parts(parts, body)).await
        }
    }
}

fn redirect(target: &str) -> Response {
    let mut response = Redirect::to(target).into_response();
    // Redirect depends on the session; never let a shared cache replay it.
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
