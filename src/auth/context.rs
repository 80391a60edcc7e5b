//! Request-scoped authorization context.

use serde::Serialize;
use std::collections::HashSet;

use crate::auth::permissions::{AuthOrigin, PermissionRecord};
use crate::types::Username;

/// Prefix marking an authority granted by this system.
pub const TARGET_AUTHORITY_PREFIX: &str = "ROLE_";

/// Prefix marking an origin-system role carried for audit. These grant no
/// capability here; they record what the launchpad asserted.
pub const ORIGIN_AUTHORITY_PREFIX: &str = "SAP_";

/// The authentication installed on a request: a principal plus its granted
/// authorities. Built fresh on every request, cache hit or not, and handed
/// to downstream authorization via request extensions.
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    pub principal: Username,
    pub authorities: HashSet<String>,
    pub origin: AuthOrigin,
}

impl AuthContext {
    /// Synthesize the authority set from a permission record.
    ///
    /// Mapped roles become `ROLE_*` authorities; source roles are included
    /// as `SAP_*` for traceability.
    pub fn from_record(record: &PermissionRecord) -> Self {
        let mut authorities: HashSet<String> = record
            .mapped_roles
            .iter()
            .map(|r| format!("{}{}", TARGET_AUTHORITY_PREFIX, r))
            .collect();

        authorities.extend(
            record
                .source_roles
                .iter()
                .map(|r| format!("{}{}", ORIGIN_AUTHORITY_PREFIX, r)),
        );

        Self {
            principal: record.username.clone(),
            authorities,
            origin: record.origin,
        }
    }

    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}
