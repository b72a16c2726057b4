//! Route classification as an ordered chain of stages.
//!
//! Each [`Stage`] pairs a path matcher with a session requirement. The
//! [`Policy`] walks its stages in order; the first stage that matches the path
//! and whose requirement is not met decides the outcome. If no stage objects,
//! the request continues.
//!
//! The default chain is two stages long:
//!
//! 1. protected area, requires a session, otherwise redirect to sign-in;
//! 2. auth pages, require no session, otherwise redirect to the landing page.

use super::path::{canonicalize, is_under};
use percent_encoding::percent_decode_str;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_SIGN_IN_PATH: &str = "/auth/sign-in";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";
pub const DEFAULT_PROTECTED_PREFIXES: [&str; 4] = ["/dashboard", "/study", "/flashcards", "/generate"];
pub const DEFAULT_AUTH_PREFIXES: [&str; 3] =
    ["/auth/sign-in", "/auth/sign-up", "/auth/forgot-password"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("prefix must be an absolute path: {0:?}")]
    RelativePrefix(String),
    #[error("redirect target must be a local absolute path in printable ASCII (percent-encode the rest): {0:?}")]
    UnsafeTarget(String),
    #[error("sign-in path {0} is itself protected; anonymous visitors would loop")]
    SignInProtected(String),
    #[error("landing path {0} is an auth page; signed-in visitors would loop")]
    LandingIsAuthPage(String),
}

/// Canonicalised list of path prefixes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefixSet {
    prefixes: Vec<String>,
}

impl PrefixSet {
    /// # Errors
    /// Returns [`PolicyError::RelativePrefix`] if a prefix does not start with `/`.
    pub fn new<I, S>(prefixes: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut canonical = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.as_ref().trim();
            if prefix.is_empty() {
                continue;
            }
            if !prefix.starts_with('/') {
                return Err(PolicyError::RelativePrefix(prefix.to_string()));
            }
            let prefix = canonicalize(prefix);
            if !canonical.contains(&prefix) {
                canonical.push(prefix);
            }
        }
        Ok(Self {
            prefixes: canonical,
        })
    }

    /// `path` must already be canonical.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| is_under(prefix, path))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }
}

/// Which paths a stage applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Paths under any of the prefixes.
    Within(PrefixSet),
    /// Paths under none of the prefixes (allow-list mode).
    Outside(PrefixSet),
}

impl Matcher {
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Within(set) => set.matches(path),
            Self::Outside(set) => !set.matches(path),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lead, set) = match self {
            Self::Within(set) if set.is_empty() => return f.write_str("nothing"),
            Self::Outside(set) if set.is_empty() => return f.write_str("everything"),
            Self::Within(set) => ("", set),
            Self::Outside(set) => ("all except ", set),
        };
        write!(f, "{lead}{}", set.iter().collect::<Vec<_>>().join(","))
    }
}

/// What a stage demands of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    /// A session must exist; otherwise send the visitor to sign in.
    Authenticated,
    /// No session may exist; otherwise send the visitor to the landing page.
    Anonymous,
}

impl Requirement {
    fn violation(self, has_session: bool) -> Option<Outcome> {
        match (self, has_session) {
            (Self::Authenticated, false) => Some(Outcome::RedirectToSignIn),
            (Self::Anonymous, true) => Some(Outcome::RedirectToLanding),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    RedirectToSignIn,
    RedirectToLanding,
}

impl Outcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::RedirectToSignIn => "redirect-to-sign-in",
            Self::RedirectToLanding => "redirect-to-landing",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    name: &'static str,
    matcher: Matcher,
    requirement: Requirement,
}

impl Stage {
    #[must_use]
    pub fn new(name: &'static str, matcher: Matcher, requirement: Requirement) -> Self {
        Self {
            name,
            matcher,
            requirement,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn decide(&self, path: &str, has_session: bool) -> Option<Outcome> {
        if self.matcher.matches(path) {
            self.requirement.violation(has_session)
        } else {
            None
        }
    }
}

/// Protected area definition, either explicit prefixes or "everything but".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protection {
    Prefixes(PrefixSet),
    AllExcept(PrefixSet),
}

#[derive(Clone, Debug)]
pub struct Policy {
    stages: Vec<Stage>,
    sign_in_path: String,
    landing_path: String,
}

impl Policy {
    /// Build the two-stage chain and reject configurations that can only loop
    /// or point off-site.
    ///
    /// # Errors
    /// Returns a [`PolicyError`] describing the first problem found.
    pub fn new(
        protection: Protection,
        auth: PrefixSet,
        sign_in_path: &str,
        landing_path: &str,
    ) -> Result<Self, PolicyError> {
        let sign_in = redirect_target(sign_in_path)?;
        let landing = redirect_target(landing_path)?;

        let protected = match protection {
            Protection::Prefixes(set) => Matcher::Within(set),
            Protection::AllExcept(set) => Matcher::Outside(set),
        };

        if protected.matches(&canonicalize(&sign_in)) {
            return Err(PolicyError::SignInProtected(sign_in));
        }
        if auth.matches(&canonicalize(&landing)) {
            return Err(PolicyError::LandingIsAuthPage(landing));
        }

        let stages = vec![
            Stage::new("protected", protected, Requirement::Authenticated),
            Stage::new("auth", Matcher::Within(auth), Requirement::Anonymous),
        ];

        Ok(Self {
            stages,
            sign_in_path: sign_in,
            landing_path: landing,
        })
    }

    /// # Errors
    /// Never fails for the built-in lists; kept fallible to share `new`'s checks.
    pub fn canonical() -> Result<Self, PolicyError> {
        Self::new(
            Protection::Prefixes(PrefixSet::new(DEFAULT_PROTECTED_PREFIXES)?),
            PrefixSet::new(DEFAULT_AUTH_PREFIXES)?,
            DEFAULT_SIGN_IN_PATH,
            DEFAULT_LANDING_PATH,
        )
    }

    /// Classify a canonical path given whether a valid session exists.
    #[must_use]
    pub fn decide(&self, path: &str, has_session: bool) -> Outcome {
        self.stages
            .iter()
            .find_map(|stage| stage.decide(path, has_session))
            .unwrap_or(Outcome::Continue)
    }

    /// Fixed redirect location for an outcome, `None` for `Continue`.
    #[must_use]
    pub fn target(&self, outcome: Outcome) -> Option<&str> {
        match outcome {
            Outcome::Continue => None,
            Outcome::RedirectToSignIn => Some(&self.sign_in_path),
            Outcome::RedirectToLanding => Some(&self.landing_path),
        }
    }

    #[must_use]
    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    #[must_use]
    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }
}

// Location headers are only ever built from these, so reject anything a
// browser could resolve to another origin, in raw or decoded form. The value
// is kept as configured; escapes stay escaped on the wire.
fn redirect_target(raw: &str) -> Result<String, PolicyError> {
    let trimmed = raw.trim();
    let decoded = percent_decode_str(trimmed).decode_utf8_lossy();
    let off_site = |form: &str| {
        !form.starts_with('/')
            || form.starts_with("//")
            || form.contains('\\')
            || form.contains("://")
            || form.chars().any(char::is_control)
    };
    if !trimmed.bytes().all(|b| b.is_ascii_graphic()) || off_site(trimmed) || off_site(&decoded) {
        return Err(PolicyError::UnsafeTarget(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
