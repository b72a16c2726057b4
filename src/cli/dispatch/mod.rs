use crate::cli::{
    actions::{Action, server::Args},
    commands::{ARG_PORT, ARG_SITE_DIR, auth, guard},
};
use anyhow::Result;
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let site_dir = matches.get_one::<PathBuf>(ARG_SITE_DIR).cloned();
    let auth = auth::Options::parse(matches)?;
    let guard = guard::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        site_dir,
        auth,
        guard,
    }))
}
