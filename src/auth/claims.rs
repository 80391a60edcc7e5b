//! Non-verifying bearer token claim extraction.
//!
//! The launchpad gateway in front of this service has already authenticated
//! the user; tokens arriving here are trusted transport for identity data,
//! not proof of it. Only the payload segment is decoded and no signature is
//! checked. Anything malformed degrades to an empty claim set instead of an
//! error.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::HeaderMap;
use serde_json::Value;
use tracing::debug;

/// Decoded token claims: claim name to JSON value.
///
/// Values may be strings, lists, or nested objects (provider-specific claim
/// structures). An empty map is the normal result for an absent or
/// unparseable token.
pub type ClaimSet = serde_json::Map<String, Value>;

/// Header carrying a forwarded access token (gateway deployments).
const FORWARDED_TOKEN_HEADER: &str = "x-forwarded-access-token";

/// Header carrying a token assertion (web-dispatcher deployments).
const ASSERTION_HEADER: &str = "x-jwt-assertion";

/// Locate a bearer-style token in the request headers.
///
/// Discovery order, first non-blank match wins:
/// 1. `Authorization: Bearer <token>` (case-insensitive scheme)
/// 2. `X-Forwarded-Access-Token`
/// 3. `X-JWT-Assertion`
pub fn resolve_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(auth) = header_str(headers, http::header::AUTHORIZATION.as_str()) {
        let (scheme, rest) = auth.split_at_checked(7).unwrap_or(("", ""));
        if scheme.eq_ignore_ascii_case("bearer ") && !rest.trim().is_empty() {
            return Some(rest.trim());
        }
    }

    header_str(headers, FORWARDED_TOKEN_HEADER)
        .or_else(|| header_str(headers, ASSERTION_HEADER))
}

/// Decode the payload segment of a token into a [`ClaimSet`].
///
/// Malformed input never fails: a token without a payload segment, with
/// invalid base64url, or with a non-object JSON payload yields an empty map.
pub fn decode(token: &str) -> ClaimSet {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) => payload,
        _ => {
            debug!("token has no payload segment");
            return ClaimSet::new();
        }
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("token payload is not base64url: {}", e);
            return ClaimSet::new();
        }
    };

    match serde_json::from_slice::<ClaimSet>(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("token payload is not a JSON object: {}", e);
            ClaimSet::new()
        }
    }
}

/// Resolve and decode in one step.
///
/// Absent token and undecodable token are indistinguishable to callers:
/// both come back as an empty claim set.
pub fn from_headers(headers: &HeaderMap) -> ClaimSet {
    match resolve_token(headers) {
        Some(token) => decode(token),
        None => ClaimSet::new(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
