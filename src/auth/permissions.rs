//! Resolved permission records.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{OriginRole, TargetRole, Username};

/// How a permission record was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthOrigin {
    /// Resolved from launchpad trust signals (headers or forwarded token).
    Sso,
    /// Established through the explicit mock-login endpoint.
    Local,
}

/// The resolved permissions for one user.
///
/// This is the unit stored in the [`PermissionCache`](crate::auth::cache::PermissionCache)
/// and returned to callers. It is never mutated after construction; a cache
/// refresh replaces the record wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub username: Username,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Origin roles exactly as asserted: original casing, arrival order.
    pub source_roles: Vec<OriginRole>,
    /// Mapped roles, deduplicated and unordered.
    pub mapped_roles: HashSet<TargetRole>,
    pub origin: AuthOrigin,
}

impl PermissionRecord {
    /// Whether any mapped role's bare name matches, tenant segment ignored.
    pub fn has_mapped_role(&self, role: &str) -> bool {
        self.mapped_roles.iter().any(|r| r.role_name() == role)
    }
}
