//! Identity resolution from launchpad trust signals.
//!
//! The launchpad environment injects identity through headers (approuter /
//! web-dispatcher deployments) or through a forwarded token. Each field is
//! resolved by an ordered fallback chain: a fixed list of header names
//! first, then a fixed list of token claims. The first non-blank candidate
//! wins; later candidates are never consulted.
//!
//! Header lookups go through [`http::HeaderMap`], which is case-insensitive,
//! so one canonical spelling per header is enough.

use http::HeaderMap;
use serde_json::Value;

use crate::auth::claims::{self, ClaimSet};
use crate::types::{OriginRole, Username};

/// Headers consulted for the username, in order.
const USERNAME_HEADERS: &[&str] = &[
    "x-sap-user",
    "x-authenticated-user",
    "x-user",
    "x-forwarded-user",
];

/// Claims consulted for the username when no header matched.
const USERNAME_CLAIMS: &[&str] = &["preferred_username", "user_name", "email", "sub"];

const DISPLAY_NAME_HEADERS: &[&str] = &["x-user-name", "x-display-name"];
const DISPLAY_NAME_CLAIMS: &[&str] = &["name", "given_name", "family_name"];

const EMAIL_HEADERS: &[&str] = &["x-user-email", "x-email"];
const EMAIL_CLAIMS: &[&str] = &["email"];

/// Headers carrying a comma-separated role list, in order.
const ROLE_HEADERS: &[&str] = &["x-sap-roles", "x-sap-groups", "x-user-roles", "x-groups"];

/// Flat claims that may carry roles as a list or a delimited string.
const ROLE_CLAIMS: &[&str] = &["groups", "roles", "authorities"];

/// Provider-specific nested claim: `xs.system.attributes` is an object whose
/// `xs.rolecollections` entry lists the user's role collections.
const XS_ATTRIBUTES_CLAIM: &str = "xs.system.attributes";
const XS_ROLE_COLLECTIONS: &str = "xs.rolecollections";

/// Identity resolved once per request. Immutable after creation.
///
/// `username` is the only required field; a request with no resolvable
/// username has no identity at all, which is not an error: the caller
/// simply skips authentication.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub username: Username,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Origin roles in arrival order, trimmed and deduplicated.
    pub raw_roles: Vec<OriginRole>,
}

/// Resolve the full identity from a request's headers.
///
/// The token is decoded at most once, and only when some field misses all
/// of its header candidates. Returns `None` when no username resolves.
pub fn resolve(headers: &HeaderMap) -> Option<RequestIdentity> {
    let mut claims: Option<ClaimSet> = None;
    let mut lazy_claims = |headers: &HeaderMap| -> ClaimSet {
        claims
            .get_or_insert_with(|| claims::from_headers(headers))
            .clone()
    };

    let username = match first_header(headers, USERNAME_HEADERS) {
        Some(v) => Some(v),
        None => first_string_claim(&lazy_claims(headers), USERNAME_CLAIMS),
    }?;

    let display_name = match first_header(headers, DISPLAY_NAME_HEADERS) {
        Some(v) => Some(v),
        None => first_string_claim(&lazy_claims(headers), DISPLAY_NAME_CLAIMS),
    };

    let email = match first_header(headers, EMAIL_HEADERS) {
        Some(v) => Some(v),
        None => first_string_claim(&lazy_claims(headers), EMAIL_CLAIMS),
    };

    let raw_roles = match roles_from_headers(headers) {
        Some(roles) => roles,
        None => roles_from_claims(&lazy_claims(headers)),
    };

    Some(RequestIdentity {
        username: Username::new(username),
        display_name,
        email,
        raw_roles: raw_roles.into_iter().map(OriginRole::new).collect(),
    })
}

/// Resolve only the username (environment-detection endpoint).
pub fn username(headers: &HeaderMap, claims: &ClaimSet) -> Option<String> {
    first_header(headers, USERNAME_HEADERS)
        .or_else(|| first_string_claim(claims, USERNAME_CLAIMS))
}

/// Resolve only the display name.
pub fn display_name(headers: &HeaderMap, claims: &ClaimSet) -> Option<String> {
    first_header(headers, DISPLAY_NAME_HEADERS)
        .or_else(|| first_string_claim(claims, DISPLAY_NAME_CLAIMS))
}

/// Resolve only the email address.
pub fn email(headers: &HeaderMap, claims: &ClaimSet) -> Option<String> {
    first_header(headers, EMAIL_HEADERS).or_else(|| first_string_claim(claims, EMAIL_CLAIMS))
}

/// Resolve the raw role list from headers, then claims.
pub fn raw_roles(headers: &HeaderMap, claims: &ClaimSet) -> Vec<String> {
    roles_from_headers(headers).unwrap_or_else(|| roles_from_claims(claims))
}

/// All header names this resolver recognizes, for the debug endpoint.
pub fn recognized_headers() -> Vec<&'static str> {
    let mut names = Vec::new();
    names.extend_from_slice(USERNAME_HEADERS);
    names.extend_from_slice(DISPLAY_NAME_HEADERS);
    names.extend_from_slice(EMAIL_HEADERS);
    names.extend_from_slice(ROLE_HEADERS);
    names
}

fn first_header(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn first_string_claim(claims: &ClaimSet, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        claims
            .get(*name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn roles_from_headers(headers: &HeaderMap) -> Option<Vec<String>> {
    first_header(headers, ROLE_HEADERS).map(|csv| split_list(&csv, ','))
}

/// Role extraction from claims, tried in fixed order: the nested
/// provider-specific claim, then flat list/scalar claims, then `scope`.
/// The first non-empty result wins.
fn roles_from_claims(claims: &ClaimSet) -> Vec<String> {
    if let Some(Value::Object(attrs)) = claims.get(XS_ATTRIBUTES_CLAIM) {
        let collections = as_string_list(attrs.get(XS_ROLE_COLLECTIONS));
        if !collections.is_empty() {
            return collections;
        }
    }

    for name in ROLE_CLAIMS {
        let roles = as_string_list(claims.get(*name));
        if !roles.is_empty() {
            return roles;
        }
    }

    // scope is always space-delimited ("read write admin"), never CSV.
    if let Some(scope) = claims.get("scope").and_then(Value::as_str) {
        let scopes = dedup_trimmed(scope.split_whitespace().map(str::to_string));
        if !scopes.is_empty() {
            return scopes;
        }
    }

    Vec::new()
}

/// Coerce a claim value into a role list.
///
/// Lists are flattened element-wise; scalar strings are split on comma if
/// one is present, else on whitespace, else kept as a single entry.
fn as_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => dedup_trimmed(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .into_iter(),
        ),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Vec::new()
            } else if s.contains(',') {
                split_list(s, ',')
            } else if s.contains(char::is_whitespace) {
                dedup_trimmed(s.split_whitespace().map(str::to_string))
            } else {
                vec![s.to_string()]
            }
        }
        _ => Vec::new(),
    }
}

fn split_list(input: &str, separator: char) -> Vec<String> {
    dedup_trimmed(input.split(separator).map(str::to_string))
}

/// Trim every entry, drop blanks, remove duplicates, keep first-seen order.
fn dedup_trimmed(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}
