use crate::session::cookie::{cookie_pairs, is_session_cookie};
use axum::{
    Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, LOCATION, SET_COOKIE},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::debug;

/// Where the session lives in the browser and where to send visitors after.
#[derive(Clone, Debug)]
pub struct SignOutConfig {
    cookie_name: String,
    cookie_secure: bool,
    cookie_domain: Option<String>,
    redirect_to: String,
}

impl SignOutConfig {
    #[must_use]
    pub fn new(cookie_name: String, redirect_to: String) -> Self {
        Self {
            cookie_name,
            cookie_secure: false,
            cookie_domain: None,
            redirect_to,
        }
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Also expire cookies scoped to `domain`; a host-only expiry does not
    /// reach a cookie the auth client set with `Domain`.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn expired_cookie(&self, name: &str, domain: Option<&str>) -> Option<HeaderValue> {
        let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if let Some(domain) = domain {
            cookie.push_str(&format!("; Domain={domain}"));
        }
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).ok()
    }
}

#[utoipa::path(
    post,
    path = "/auth/sign-out",
    responses(
        (status = 303, description = "Session cookies cleared, redirecting to sign-in")
    ),
    tag = "session"
)]
/// Drop every session cookie the browser sent and send it to sign-in.
///
/// The remote session is left to expire on its own; without the cookie the
/// gate no longer sees it.
pub async fn sign_out(
    headers: HeaderMap,
    config: Extension<Arc<SignOutConfig>>,
) -> impl IntoResponse {
    let mut response_headers = HeaderMap::new();

    // Always clear the base name, plus whatever chunks are present.
    let mut names = vec![config.cookie_name.clone()];
    for (name, _) in cookie_pairs(&headers) {
        if is_session_cookie(&name, &config.cookie_name) && !names.contains(&name) {
            names.push(name);
        }
    }
    let domains = std::iter::once(None).chain(config.cookie_domain.as_deref().map(Some));
    for domain in domains {
        for name in &names {
            if let Some(cookie) = config.expired_cookie(name, domain) {
                response_headers.append(SET_COOKIE, cookie);
            }
        }
    }
    debug!("Cleared {} session cookie(s)", names.len());

    if let Ok(location) = HeaderValue::from_str(&config.redirect_to) {
        response_headers.insert(LOCATION, location);
    }
    response_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    (StatusCode::SEE_OTHER, response_headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use axum::response::IntoResponse;

    const NAME: &str = "sb-fiszki-auth-token";

    fn config() -> Extension<Arc<SignOutConfig>> {
        Extension(Arc::new(SignOutConfig::new(
            NAME.to_string(),
            "/auth/sign-in".to_string(),
        )))
    }

    fn set_cookies(response: &axum::response::Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(ToString::to_string))
            .collect()
    }

    #[tokio::test]
    async fn clears_base_cookie_and_redirects() {
        let response = sign_out(HeaderMap::new(), config()).await.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(LOCATION),
            Some(&HeaderValue::from_static("/auth/sign-in"))
        );
        assert_eq!(
            set_cookies(&response),
            vec![format!("{NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")]
        );
    }

    #[tokio::test]
    async fn clears_every_chunk_but_not_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static(
                "theme=dark; sb-fiszki-auth-token.0=a; sb-fiszki-auth-token.1=b",
            ),
        );
        let response = sign_out(headers, config()).await.into_response();
        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 3);
        assert!(cookies.iter().any(|c| c.starts_with(&format!("{NAME}=;"))));
        assert!(cookies.iter().any(|c| c.starts_with(&format!("{NAME}.0=;"))));
        assert!(cookies.iter().any(|c| c.starts_with(&format!("{NAME}.1=;"))));
        assert!(!cookies.iter().any(|c| c.starts_with("theme=")));
    }

    #[tokio::test]
    async fn domain_scoped_cookies_are_cleared_too() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sb-fiszki-auth-token.0=a"));
        let config = Extension(Arc::new(
            SignOutConfig::new(NAME.to_string(), "/auth/sign-in".to_string())
                .with_cookie_domain(Some("fiszki.dev".to_string())),
        ));
        let cookies = set_cookies(&sign_out(headers, config).await.into_response());
        assert_eq!(
            cookies,
            vec![
                format!("{NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
                format!("{NAME}.0=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
                format!("{NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Domain=fiszki.dev"),
                format!("{NAME}.0=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Domain=fiszki.dev"),
            ]
        );
    }

    #[tokio::test]
    async fn secure_flag_is_appended() {
        let config = Extension(Arc::new(
            SignOutConfig::new(NAME.to_string(), "/auth/sign-in".to_string())
                .with_cookie_secure(true),
        ));
        let response = sign_out(HeaderMap::new(), config).await.into_response();
        assert!(set_cookies(&response).iter().all(|c| c.ends_with("; Secure")));
        assert_eq!(
            response.headers().get(CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
    }
}
