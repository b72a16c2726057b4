//! Path canonicalisation used before prefix matching.
//!
//! The static file service and most frameworks behind the gate decode
//! percent-escapes and resolve dot segments, so classification has to see the
//! same path they will, otherwise `/%64ashboard` or `/about/../dashboard`
//! would slip past a `/dashboard` prefix.

use percent_encoding::percent_decode_str;

/// Canonical form of a request path: decoded, leading `/`, no empty, `.` or
/// `..` segments, no trailing slash. The root is `/`.
#[must_use]
pub fn canonicalize(raw: &str) -> String {
    // Query strings never reach us from `Uri::path`, but config values might carry one.
    let raw = raw.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(raw).decode_utf8_lossy();

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    segments.iter().fold(String::new(), |mut acc, segment| {
        acc.push('/');
        acc.push_str(segment);
        acc
    })
}

/// The page a canonical path names once the static file service's lookups
/// are undone: `/dashboard.html` and `/dashboard/index.html` are both served
/// for `/dashboard`, so they are classified as `/dashboard`.
#[must_use]
pub fn page_path(path: &str) -> &str {
    let page = strip_suffix_ignore_case(path, "/index.html")
        .or_else(|| strip_suffix_ignore_case(path, ".html"))
        .unwrap_or(path);
    if page.is_empty() { "/" } else { page }
}

fn strip_suffix_ignore_case<'a>(path: &'a str, suffix: &str) -> Option<&'a str> {
    let split = path.len().checked_sub(suffix.len())?;
    let (head, tail) = (path.get(..split)?, path.get(split..)?);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Segment-aware prefix test on canonical paths.
///
/// `/dashboard` covers `/dashboard` and `/dashboard/settings`, not `/dashboards`.
#[must_use]
pub fn is_under(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_variants_collapse_to_slash() {
        assert_eq!(canonicalize(""), "/");
        assert_eq!(canonicalize("/"), "/");
        assert_eq!(canonicalize("//"), "/");
        assert_eq!(canonicalize("/./"), "/");
        assert_eq!(canonicalize("/.."), "/");
    }

    #[test]
    fn trailing_and_repeated_slashes_are_dropped() {
        assert_eq!(canonicalize("/dashboard/"), "/dashboard");
        assert_eq!(canonicalize("//dashboard//settings"), "/dashboard/settings");
        assert_eq!(canonicalize("dashboard"), "/dashboard");
    }

    #[test]
    fn dot_segments_are_resolved() {
        assert_eq!(canonicalize("/about/../dashboard"), "/dashboard");
        assert_eq!(canonicalize("/study/./42"), "/study/42");
        assert_eq!(canonicalize("/../../study"), "/study");
    }

    #[test]
    fn percent_escapes_are_decoded() {
        assert_eq!(canonicalize("/%64ashboard"), "/dashboard");
        assert_eq!(canonicalize("/about/%2e%2e/study"), "/study");
        assert_eq!(canonicalize("/study%2F42"), "/study/42");
        assert_eq!(canonicalize("/fiszki/%C5%BC%C3%B3%C5%82w"), "/fiszki/żółw");
    }

    #[test]
    fn backslashes_count_as_separators() {
        assert_eq!(canonicalize("/about\\..\\dashboard"), "/dashboard");
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        assert_eq!(canonicalize("/dashboard?tab=1"), "/dashboard");
        assert_eq!(canonicalize("/auth/sign-in#form"), "/auth/sign-in");
    }

    #[test]
    fn html_lookups_name_the_page() {
        assert_eq!(page_path("/dashboard.html"), "/dashboard");
        assert_eq!(page_path("/dashboard/index.html"), "/dashboard");
        assert_eq!(page_path("/study/42.HTML"), "/study/42");
        assert_eq!(page_path("/index.html"), "/");
        assert_eq!(page_path("/dashboard"), "/dashboard");
        assert_eq!(page_path("/about.htm"), "/about.htm");
        assert_eq!(page_path("/"), "/");
    }

    #[test]
    fn prefix_matching_respects_segments() {
        assert!(is_under("/dashboard", "/dashboard"));
        assert!(is_under("/dashboard", "/dashboard/settings"));
        assert!(!is_under("/dashboard", "/dashboards"));
        assert!(!is_under("/dashboard", "/"));
        assert!(is_under("/", "/anything/at/all"));
        assert!(is_under("/auth/sign-in", "/auth/sign-in"));
        assert!(!is_under("/auth/sign-in", "/auth/sign-out"));
    }
}
