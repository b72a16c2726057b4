use crate::{
    api::{self, SignOutConfig},
    cli::commands::{auth, guard},
    guard::{Policy, RouteGuard},
    session::{AuthServiceOracle, default_cookie_name},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

// The HTTP client gets a little slack over the guard's timeout so the guard,
// not reqwest, is what gives up first.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub site_dir: Option<PathBuf>,
    pub auth: auth::Options,
    pub guard: guard::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the policy is invalid, the client cannot be built, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let policy = args.guard.policy()?;

    let cookie_name = args
        .auth
        .cookie_name
        .clone()
        .unwrap_or_else(|| default_cookie_name(&args.auth.auth_url));

    log_startup_args(&args, &policy, &cookie_name);

    let oracle = AuthServiceOracle::new(
        &args.auth.auth_url,
        args.auth.api_key.clone(),
        cookie_name.clone(),
        args.auth.lookup_timeout + CLIENT_TIMEOUT_SLACK,
    )
    .context("Failed to build auth service client")?;

    let sign_out = SignOutConfig::new(cookie_name, policy.sign_in_path().to_string())
        .with_cookie_secure(args.auth.cookie_secure)
        .with_cookie_domain(args.auth.cookie_domain.clone());

    let guard = Arc::new(RouteGuard::new(
        policy,
        Arc::new(oracle),
        args.auth.lookup_timeout,
    ));

    api::new(args.port, guard, sign_out, args.site_dir).await
}

fn log_startup_args(args: &Args, policy: &Policy, cookie_name: &str) {
    let mut entries = vec![
        ("listen", format!("tcp:{}", args.port)),
        (
            "site_dir",
            args.site_dir
                .as_ref()
                .map_or_else(|| "none".to_string(), |dir| dir.display().to_string()),
        ),
        ("auth_url", args.auth.auth_url.to_string()),
        ("session_cookie", cookie_name.to_string()),
        ("cookie_secure", args.auth.cookie_secure.to_string()),
        (
            "cookie_domain",
            args.auth.cookie_domain.clone().unwrap_or_else(|| "host-only".to_string()),
        ),
        (
            "lookup_timeout",
            format!("{}ms", args.auth.lookup_timeout.as_millis()),
        ),
    ];
    // Prefixes as the guard sees them, after canonicalisation.
    entries.extend(
        policy
            .stages()
            .iter()
            .map(|stage| (stage.name(), stage.matcher().to_string())),
    );
    entries.push(("sign_in", policy.sign_in_path().to_string()));
    entries.push(("landing", policy.landing_path().to_string()));

    info!("{}", startup_message(&entries));
}

fn startup_message(entries: &[(&str, String)]) -> String {
    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\nStartup configuration:", banner());
    for (key, value) in entries {
        let key = format!("{key}:");
        message.push_str(&format!("\n  {key:<width$} {value}", width = width + 1));
    }
    message
}

fn banner() -> String {
    let commit = crate::GIT_COMMIT_HASH.trim();
    let short = commit.get(..7).unwrap_or(commit);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short),
    )
}

const BANNER: &str = r"
  +---------+
  | F I S Z |  10xDevFiszki gate{VERSION}
  |  K I    |
  +---------+";
