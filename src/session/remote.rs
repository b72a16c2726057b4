use super::{Identity, LookupError, LookupResult, SessionOracle, cookie};
use axum::http::HeaderMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{future::Future, pin::Pin, time::Duration};
use tracing::{Instrument, debug, info_span};
use url::Url;
use uuid::Uuid;

const USER_ENDPOINT: &str = "auth/v1/user";

/// User object as returned by the auth service; only the fields we keep.
#[derive(Deserialize)]
struct RemoteUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

/// Session oracle backed by the hosted auth service's `GET /auth/v1/user`.
#[derive(Clone)]
pub struct AuthServiceOracle {
    client: Client,
    user_url: Url,
    api_key: SecretString,
    cookie_name: String,
}

impl std::fmt::Debug for AuthServiceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServiceOracle")
            .field("user_url", &self.user_url.as_str())
            .field("api_key", &"***")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl AuthServiceOracle {
    /// # Errors
    /// Returns an error if the base URL cannot be joined or the HTTP client cannot be built.
    pub fn new(
        auth_url: &Url,
        api_key: SecretString,
        cookie_name: String,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            user_url: user_url(auth_url)?,
            api_key,
            cookie_name,
        })
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    async fn fetch_user(&self, headers: &HeaderMap) -> LookupResult {
        // No token means no session; skip the round trip.
        let Some(token) = cookie::access_token(headers, &self.cookie_name)? else {
            return Ok(None);
        };

        let span = info_span!("auth.user", http.url = %self.user_url);
        let response = self
            .client
            .get(self.user_url.clone())
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(token)
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        match classify_status(status) {
            Verdict::Valid => {
                let user: RemoteUser = response
                    .json()
                    .await
                    .map_err(|err| LookupError::Decode(err.to_string()))?;
                Ok(Some(Identity {
                    user_id: user.id,
                    email: user.email,
                }))
            }
            Verdict::Rejected => {
                debug!("auth service rejected the session token ({status})");
                Ok(None)
            }
            Verdict::Unknown => Err(LookupError::UnexpectedStatus(status.as_u16())),
        }
    }
}

impl SessionOracle for AuthServiceOracle {
    fn lookup<'a>(
        &'a self,
        headers: &'a HeaderMap,
    ) -> Pin<Box<dyn Future<Output = LookupResult> + Send + 'a>> {
        Box::pin(self.fetch_user(headers))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Valid,
    Rejected,
    Unknown,
}

// Expired, revoked or forged tokens come back as 401/403; everything
// non-2xx else is the service failing, not the visitor.
fn classify_status(status: StatusCode) -> Verdict {
    if status.is_success() {
        Verdict::Valid
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        Verdict::Rejected
    } else {
        Verdict::Unknown
    }
}

fn user_url(auth_url: &Url) -> anyhow::Result<Url> {
    // `join` replaces the last segment unless the base ends with `/`.
    let mut base = auth_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(USER_ENDPOINT)?)
}

/// Cookie name the auth service's browser client uses for a project URL:
/// `sb-<first host label>-auth-token`.
#[must_use]
pub fn default_cookie_name(auth_url: &Url) -> String {
    let project = auth_url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local");
    format!("sb-{project}-auth-token")
}
