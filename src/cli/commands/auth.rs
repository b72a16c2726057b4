//! Hosted auth service connection and session cookie settings.

use crate::guard::DEFAULT_LOOKUP_TIMEOUT;
use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const ARG_AUTH_URL: &str = "auth-url";
pub const ARG_AUTH_API_KEY: &str = "auth-api-key";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_SESSION_COOKIE_DOMAIN: &str = "session-cookie-domain";
pub const ARG_SESSION_LOOKUP_TIMEOUT_MS: &str = "session-lookup-timeout-ms";

#[derive(Debug, Clone)]
pub struct Options {
    pub auth_url: Url,
    pub api_key: SecretString,
    pub cookie_name: Option<String>,
    pub cookie_secure: bool,
    /// `Domain` the auth client scopes its cookie to, if any.
    pub cookie_domain: Option<String>,
    pub lookup_timeout: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error if the URL is invalid or a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let raw_url = matches
            .get_one::<String>(ARG_AUTH_URL)
            .context("missing required argument: --auth-url")?;
        let auth_url =
            Url::parse(raw_url).with_context(|| format!("invalid FISZKI_AUTH_URL: {raw_url}"))?;
        if !matches!(auth_url.scheme(), "http" | "https") {
            return Err(anyhow!("auth URL must be http or https: {raw_url}"));
        }

        let api_key = matches
            .get_one::<String>(ARG_AUTH_API_KEY)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()))
            .context("missing required argument: --auth-api-key")?;

        let cookie_name = matches
            .get_one::<String>(ARG_SESSION_COOKIE)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let cookie_domain = matches
            .get_one::<String>(ARG_SESSION_COOKIE_DOMAIN)
            .map(|v| v.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        if let Some(domain) = &cookie_domain
            && !domain
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(anyhow!("invalid session cookie domain: {domain}"));
        }

        let timeout_ms = matches
            .get_one::<u64>(ARG_SESSION_LOOKUP_TIMEOUT_MS)
            .copied()
            .unwrap_or_else(|| {
                u64::try_from(DEFAULT_LOOKUP_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
            });

        Ok(Self {
            auth_url,
            api_key,
            cookie_name,
            cookie_secure: matches.get_flag(ARG_SESSION_COOKIE_SECURE),
            cookie_domain,
            lookup_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTH_URL)
                .long(ARG_AUTH_URL)
                .help("Base URL of the hosted auth service, example: https://<project>.supabase.co")
                .env("FISZKI_AUTH_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTH_API_KEY)
                .long(ARG_AUTH_API_KEY)
                .help("Public (anon) API key sent as the `apikey` header")
                .env("FISZKI_AUTH_API_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Session cookie name (default: sb-<project>-auth-token)")
                .env("FISZKI_SESSION_COOKIE"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark cleared session cookies as Secure (site served over HTTPS)")
                .env("FISZKI_SESSION_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_DOMAIN)
                .long(ARG_SESSION_COOKIE_DOMAIN)
                .help("Domain the session cookie is scoped to, when the auth client sets one (example: fiszki.dev)")
                .env("FISZKI_SESSION_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_SESSION_LOOKUP_TIMEOUT_MS)
                .long(ARG_SESSION_LOOKUP_TIMEOUT_MS)
                .help("Give up on the session lookup after this many milliseconds and treat the visitor as anonymous")
                .env("FISZKI_SESSION_LOOKUP_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
