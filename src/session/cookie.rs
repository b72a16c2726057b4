//! Access-token extraction from request headers.
//!
//! A bearer header wins over cookies. The session cookie set by the auth
//! service's browser client comes in a few shapes, all handled here:
//!
//! - `name=<jwt>`
//! - `name=<percent-encoded JSON session>`
//! - `name=base64-<base64url JSON session>`
//! - any of the above split across `name.0`, `name.1`, … when it outgrows the
//!   per-cookie size limit.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use super::LookupError;

const BASE64_PREFIX: &str = "base64-";

#[derive(Deserialize)]
struct StoredSession {
    access_token: String,
}

/// Access token carried by the request, if any.
///
/// # Errors
/// Returns [`LookupError::MalformedCookie`] when the session cookie is present
/// but cannot be decoded.
pub fn access_token(headers: &HeaderMap, cookie_name: &str) -> Result<Option<String>, LookupError> {
    if let Some(token) = bearer_token(headers) {
        return Ok(Some(token));
    }
    match session_cookie(headers, cookie_name) {
        Some(raw) => decode_session_value(&raw).map(Some),
        None => Ok(None),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// All `name=value` pairs across every `Cookie` header.
pub fn cookie_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            Some((key.trim().to_string(), val.trim().to_string()))
        })
        .collect()
}

/// Whether a cookie name belongs to the session, whole or chunked.
#[must_use]
pub fn is_session_cookie(name: &str, cookie_name: &str) -> bool {
    name == cookie_name || chunk_index(name, cookie_name).is_some()
}

// Plain decimal only: `.+1` or `.01` are someone else's cookie.
fn chunk_index(name: &str, cookie_name: &str) -> Option<usize> {
    let suffix = name.strip_prefix(cookie_name)?.strip_prefix('.')?;
    let canonical = suffix == "0" || !suffix.starts_with('0');
    if suffix.is_empty() || !canonical || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

// Reassembled raw cookie value; a whole cookie takes precedence over chunks.
fn session_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let pairs = cookie_pairs(headers);

    if let Some((_, value)) = pairs.iter().find(|(key, _)| key == cookie_name) {
        return Some(value.clone());
    }

    let mut chunks: Vec<(usize, &str)> = pairs
        .iter()
        .filter_map(|(key, value)| Some((chunk_index(key, cookie_name)?, value.as_str())))
        .collect();
    chunks.sort_by_key(|(index, _)| *index);

    // Chunks must run 0, 1, 2, … without gaps; anything else is a stale mix.
    let contiguous = chunks
        .iter()
        .enumerate()
        .all(|(expected, (index, _))| expected == *index);
    if chunks.is_empty() || !contiguous {
        return None;
    }

    Some(chunks.into_iter().map(|(_, value)| value).collect())
}

fn decode_session_value(raw: &str) -> Result<String, LookupError> {
    let value = if let Some(encoded) = raw.strip_prefix(BASE64_PREFIX) {
        let bytes = Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('='))
            .map_err(|err| LookupError::MalformedCookie(format!("base64: {err}")))?;
        String::from_utf8(bytes)
            .map_err(|err| LookupError::MalformedCookie(format!("utf-8: {err}")))?
    } else {
        percent_decode_str(raw)
            .decode_utf8()
            .map_err(|err| LookupError::MalformedCookie(format!("utf-8: {err}")))?
            .into_owned()
    };

    let value = value.trim();
    if value.starts_with('{') {
        let session: StoredSession = serde_json::from_str(value)
            .map_err(|err| LookupError::MalformedCookie(format!("json: {err}")))?;
        return non_empty(session.access_token);
    }
    if value.starts_with('[') {
        // Older clients stored `[access_token, refresh_token, …]`.
        let parts: Vec<Option<String>> = serde_json::from_str(value)
            .map_err(|err| LookupError::MalformedCookie(format!("json: {err}")))?;
        let token = parts.into_iter().next().flatten().unwrap_or_default();
        return non_empty(token);
    }
    non_empty(value.to_string())
}

fn non_empty(token: String) -> Result<String, LookupError> {
    if token.trim().is_empty() {
        Err(LookupError::MalformedCookie("empty access token".to_string()))
    } else {
        Ok(token)
    }
}
