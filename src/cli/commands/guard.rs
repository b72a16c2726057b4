//! Route policy settings: which paths need a session and where to redirect.

use crate::guard::{
    Policy, PrefixSet, Protection,
    policy::{
        DEFAULT_AUTH_PREFIXES, DEFAULT_LANDING_PATH, DEFAULT_PROTECTED_PREFIXES,
        DEFAULT_SIGN_IN_PATH,
    },
};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_PROTECTED_PREFIXES: &str = "protected-prefixes";
pub const ARG_PUBLIC_PREFIXES: &str = "public-prefixes";
pub const ARG_AUTH_PREFIXES: &str = "auth-prefixes";
pub const ARG_SIGN_IN_PATH: &str = "sign-in-path";
pub const ARG_LANDING_PATH: &str = "landing-path";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub protected_prefixes: Vec<String>,
    /// When set, everything outside these prefixes is protected.
    pub public_prefixes: Option<Vec<String>>,
    pub auth_prefixes: Vec<String>,
    pub sign_in_path: String,
    pub landing_path: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let many = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };
        let one = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        Ok(Self {
            protected_prefixes: many(ARG_PROTECTED_PREFIXES),
            public_prefixes: matches
                .contains_id(ARG_PUBLIC_PREFIXES)
                .then(|| many(ARG_PUBLIC_PREFIXES)),
            auth_prefixes: many(ARG_AUTH_PREFIXES),
            sign_in_path: one(ARG_SIGN_IN_PATH)?,
            landing_path: one(ARG_LANDING_PATH)?,
        })
    }

    /// # Errors
    /// Returns an error if the prefixes or redirect targets are rejected.
    pub fn policy(&self) -> Result<Policy> {
        let protection = match &self.public_prefixes {
            Some(public) => Protection::AllExcept(PrefixSet::new(public)?),
            None => Protection::Prefixes(PrefixSet::new(&self.protected_prefixes)?),
        };
        let policy = Policy::new(
            protection,
            PrefixSet::new(&self.auth_prefixes)?,
            &self.sign_in_path,
            &self.landing_path,
        )
        .context("invalid route policy")?;
        Ok(policy)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROTECTED_PREFIXES)
                .long(ARG_PROTECTED_PREFIXES)
                .help("Comma separated path prefixes that require a session")
                .env("FISZKI_PROTECTED_PREFIXES")
                .value_delimiter(',')
                .num_args(1..)
                .default_values(DEFAULT_PROTECTED_PREFIXES),
        )
        .arg(
            Arg::new(ARG_PUBLIC_PREFIXES)
                .long(ARG_PUBLIC_PREFIXES)
                .help("Comma separated allow-list; when set, every other path requires a session")
                .env("FISZKI_PUBLIC_PREFIXES")
                .value_delimiter(',')
                .num_args(1..)
                .conflicts_with(ARG_PROTECTED_PREFIXES),
        )
        .arg(
            Arg::new(ARG_AUTH_PREFIXES)
                .long(ARG_AUTH_PREFIXES)
                .help("Comma separated sign-in/sign-up prefixes hidden from signed-in visitors")
                .env("FISZKI_AUTH_PREFIXES")
                .value_delimiter(',')
                .num_args(1..)
                .default_values(DEFAULT_AUTH_PREFIXES),
        )
        .arg(
            Arg::new(ARG_SIGN_IN_PATH)
                .long(ARG_SIGN_IN_PATH)
                .help("Where anonymous visitors of protected paths are sent")
                .env("FISZKI_SIGN_IN_PATH")
                .default_value(DEFAULT_SIGN_IN_PATH),
        )
        .arg(
            Arg::new(ARG_LANDING_PATH)
                .long(ARG_LANDING_PATH)
                .help("Where signed-in visitors of auth pages are sent")
                .env("FISZKI_LANDING_PATH")
                .default_value(DEFAULT_LANDING_PATH),
        )
}
