//! Translation of origin-system roles into this system's role vocabulary.
//!
//! Two interchangeable strategies sit behind the [`RoleMapper`] trait:
//! a table-driven mapper fed from a deployment-provided file, and a
//! heuristic fallback for deployments that ship no table. Both are pure
//! functions of the input set's contents: ordering and duplicates in the
//! input never change the result.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::types::{OriginRole, TargetRole};

/// Administrative target role produced by the heuristic strategy.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Baseline target role; the heuristic strategy never returns less.
pub const BASELINE_ROLE: &str = "USER";

/// Origin super-user role that always maps to [`ADMIN_ROLE`].
const SUPER_USER_ROLE: &str = "sap_all";

/// Maps origin roles to target roles.
///
/// Implementations must be idempotent and order-independent.
pub trait RoleMapper: Send + Sync {
    fn map(&self, raw_roles: &[OriginRole]) -> HashSet<TargetRole>;

    /// Strategy name for logging and the debug surface.
    fn strategy(&self) -> &'static str;
}

/// Table-driven strategy: a static `origin → target` lookup loaded once at
/// startup. Origin roles without a table entry are silently dropped.
///
/// Target values may be compound (`"<tenant>:<role>"`). When an expected
/// tenant is configured, compound targets scoped to a different tenant are
/// dropped; matching ones keep their compound form so downstream IAM
/// scoping still sees the tenant.
pub struct TableRoleMapper {
    table: HashMap<String, String>,
    expected_tenant: Option<String>,
}

impl TableRoleMapper {
    pub fn new(table: HashMap<String, String>, expected_tenant: Option<String>) -> Self {
        Self {
            table,
            expected_tenant,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn accept(&self, target: &TargetRole) -> bool {
        match (&self.expected_tenant, target.split_tenant()) {
            (Some(expected), Some((tenant, _))) => tenant == expected,
            // Plain targets are not tenant-scoped and always pass.
            _ => true,
        }
    }
}

impl RoleMapper for TableRoleMapper {
    fn map(&self, raw_roles: &[OriginRole]) -> HashSet<TargetRole> {
        raw_roles
            .iter()
            .filter_map(|raw| {
                let target = self.table.get(raw.as_str()).map(TargetRole::new);
                if target.is_none() {
                    debug!(role = %raw, "origin role has no mapping entry, dropped");
                }
                target
            })
            .filter(|t| self.accept(t))
            .collect()
    }

    fn strategy(&self) -> &'static str {
        "table"
    }
}

/// Heuristic fallback used when no mapping table is configured.
///
/// Case-insensitive rules: the exact super-user role, or any role name
/// containing "admin", grants [`ADMIN_ROLE`]; every other non-empty role
/// grants [`BASELINE_ROLE`]. An empty input yields exactly the baseline
/// role, so the result is never empty.
#[derive(Default)]
pub struct HeuristicRoleMapper;

impl RoleMapper for HeuristicRoleMapper {
    fn map(&self, raw_roles: &[OriginRole]) -> HashSet<TargetRole> {
        let mut mapped = HashSet::new();

        for raw in raw_roles {
            let lower = raw.as_str().to_ascii_lowercase();
            if lower == SUPER_USER_ROLE || lower.contains("admin") {
                mapped.insert(TargetRole::new(ADMIN_ROLE));
            } else if !lower.is_empty() {
                mapped.insert(TargetRole::new(BASELINE_ROLE));
            }
        }

        if mapped.is_empty() {
            mapped.insert(TargetRole::new(BASELINE_ROLE));
        }

        mapped
    }

    fn strategy(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(roles: &[&str]) -> Vec<OriginRole> {
        roles.iter().map(|r| OriginRole::new(*r)).collect()
    }

    #[test]
    fn test_table_maps_known_roles() {
        let table = HashMap::from([
            ("ZSD_SALES".to_string(), "SALES".to_string()),
            ("ZMM_BUYER".to_string(), "PURCHASING".to_string()),
        ]);
        let mapper = TableRoleMapper::new(table, None);

        let mapped = mapper.map(&origin(&["ZSD_SALES", "ZMM_BUYER", "UNKNOWN"]));
        assert_eq!(mapped.len(), 2);
        assert!(mapped.contains("SALES"));
        assert!(mapped.contains("PURCHASING"));
    }

    #[test]
    fn test_table_drops_unmapped_silently() {
        let mapper = TableRoleMapper::new(HashMap::new(), None);
        assert!(mapper.map(&origin(&["anything"])).is_empty());
    }

    #[test]
    fn test_table_tenant_scoping() {
        let table = HashMap::from([
            ("SapEstag".to_string(), "domicilio_certo:estag".to_string()),
            ("SapOther".to_string(), "other_tenant:dono".to_string()),
            ("SapPlain".to_string(), "AUDITOR".to_string()),
        ]);
        let mapper = TableRoleMapper::new(table, Some("domicilio_certo".to_string()));

        let mapped = mapper.map(&origin(&["SapEstag", "SapOther", "SapPlain"]));

        // The matching tenant keeps its compound form; the foreign tenant
        // is dropped; plain targets are untouched by scoping.
        assert!(mapped.contains("domicilio_certo:estag"));
        assert!(!mapped.contains("other_tenant:dono"));
        assert!(mapped.contains("AUDITOR"));
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn test_table_order_independent() {
        let table = HashMap::from([
            ("A".to_string(), "X".to_string()),
            ("B".to_string(), "Y".to_string()),
        ]);
        let mapper = TableRoleMapper::new(table, None);

        assert_eq!(mapper.map(&origin(&["A", "B"])), mapper.map(&origin(&["B", "A", "A"])));
    }

    #[test]
    fn test_heuristic_admin_sounding_role() {
        let mapper = HeuristicRoleMapper;
        let mapped = mapper.map(&origin(&["RevvoAdmin"]));

        assert_eq!(mapped.len(), 1);
        assert!(mapped.contains("ADMIN"));
    }

    #[test]
    fn test_heuristic_super_user_role() {
        let mapper = HeuristicRoleMapper;
        let mapped = mapper.map(&origin(&["SAP_ALL"]));
        assert!(mapped.contains("ADMIN"));
    }

    #[test]
    fn test_heuristic_baseline_for_other_roles() {
        let mapper = HeuristicRoleMapper;
        let mapped = mapper.map(&origin(&["ZSD_SALES", "ZMM_BUYER"]));

        assert_eq!(mapped.len(), 1);
        assert!(mapped.contains("USER"));
    }

    #[test]
    fn test_heuristic_mixed_roles() {
        let mapper = HeuristicRoleMapper;
        let mapped = mapper.map(&origin(&["ZSD_SALES", "SystemAdministrator"]));

        assert!(mapped.contains("USER"));
        assert!(mapped.contains("ADMIN"));
        assert_eq!(mapped.len(), 2);
    }

    #[test]
    fn test_heuristic_never_empty() {
        let mapper = HeuristicRoleMapper;
        let mapped = mapper.map(&[]);

        assert_eq!(mapped.len(), 1);
        assert!(mapped.contains("USER"));
    }

    #[test]
    fn test_heuristic_idempotent() {
        let mapper = HeuristicRoleMapper;
        let once = mapper.map(&origin(&["RevvoAdmin", "Viewer"]));
        let again = mapper.map(&origin(&["Viewer", "RevvoAdmin", "RevvoAdmin"]));
        assert_eq!(once, again);
    }
}
