// Warden
// Copyright (C) 2025 Wardenlabs

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Permission catalog: seeded permission definitions, risk levels, the
//! static dependency relation, and role templates
//!
//! Permission rows are immutable after seeding. Resource, action, and the
//! human-readable name all derive from the permission code
//! (`USER_DELETE` -> resource `user`, action `delete`, name `User Delete`).

use crate::error::{RbacError, RbacResult};
use crate::model::RoleTemplate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Permission risk level classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Whether grants at this level require an admin-ranked granter
    pub fn requires_admin_granter(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    /// Canonical string form
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Permission categories for organizational structure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionCategory {
    System,
    UserManagement,
    RoleManagement,
    Inventory,
    Sales,
    Financial,
    Reporting,
    Audit,
}

impl PermissionCategory {
    /// All categories, in display order
    pub fn all() -> [PermissionCategory; 8] {
        [
            PermissionCategory::System,
            PermissionCategory::UserManagement,
            PermissionCategory::RoleManagement,
            PermissionCategory::Inventory,
            PermissionCategory::Sales,
            PermissionCategory::Financial,
            PermissionCategory::Reporting,
            PermissionCategory::Audit,
        ]
    }
}

/// A permission row: immutable after seeding, fully specified by its fields
/// so a cache round-trip reconstructs it exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    /// Unique permission identifier
    pub id: Uuid,

    /// Unique permission code (e.g. `USER_DELETE`)
    pub code: String,

    /// Human-readable name
    pub name: String,

    /// Description of what the permission allows
    pub description: String,

    /// Resource the permission applies to
    pub resource: String,

    /// Action the permission allows on the resource
    pub action: String,

    /// Category for organizational grouping
    pub category: PermissionCategory,

    /// Risk level gating who may grant it
    pub risk_level: RiskLevel,

    /// Whether grants of this permission require approval
    pub requires_approval: bool,

    /// Whether this is a seeded system permission
    pub is_system: bool,
}

/// Permission code constants
pub mod codes {
    // System
    pub const SYSTEM_CONFIG_READ: &str = "SYSTEM_CONFIG_READ";
    pub const SYSTEM_CONFIG_WRITE: &str = "SYSTEM_CONFIG_WRITE";
    pub const SYSTEM_HEALTH_CHECK: &str = "SYSTEM_HEALTH_CHECK";
    pub const SYSTEM_BACKUP: &str = "SYSTEM_BACKUP";
    pub const SYSTEM_RESTORE: &str = "SYSTEM_RESTORE";
    pub const SYSTEM_MAINTENANCE: &str = "SYSTEM_MAINTENANCE";
    pub const SYSTEM_SHUTDOWN: &str = "SYSTEM_SHUTDOWN";

    // User management
    pub const USER_CREATE: &str = "USER_CREATE";
    pub const USER_READ: &str = "USER_READ";
    pub const USER_UPDATE: &str = "USER_UPDATE";
    pub const USER_DELETE: &str = "USER_DELETE";
    pub const USER_LIST: &str = "USER_LIST";
    pub const USER_ACTIVATE: &str = "USER_ACTIVATE";
    pub const USER_DEACTIVATE: &str = "USER_DEACTIVATE";
    pub const USER_LOCK: &str = "USER_LOCK";
    pub const USER_UNLOCK: &str = "USER_UNLOCK";
    pub const USER_RESET_PASSWORD: &str = "USER_RESET_PASSWORD";
    pub const USER_CHANGE_PASSWORD: &str = "USER_CHANGE_PASSWORD";
    pub const USER_IMPERSONATE: &str = "USER_IMPERSONATE";
    pub const USER_VIEW_PROFILE: &str = "USER_VIEW_PROFILE";
    pub const USER_EDIT_PROFILE: &str = "USER_EDIT_PROFILE";

    // Role and permission management
    pub const ROLE_CREATE: &str = "ROLE_CREATE";
    pub const ROLE_READ: &str = "ROLE_READ";
    pub const ROLE_UPDATE: &str = "ROLE_UPDATE";
    pub const ROLE_DELETE: &str = "ROLE_DELETE";
    pub const ROLE_LIST: &str = "ROLE_LIST";
    pub const ROLE_ASSIGN: &str = "ROLE_ASSIGN";
    pub const ROLE_REVOKE: &str = "ROLE_REVOKE";
    pub const ROLE_MANAGE_PERMISSIONS: &str = "ROLE_MANAGE_PERMISSIONS";
    pub const PERMISSION_CREATE: &str = "PERMISSION_CREATE";
    pub const PERMISSION_READ: &str = "PERMISSION_READ";
    pub const PERMISSION_UPDATE: &str = "PERMISSION_UPDATE";
    pub const PERMISSION_DELETE: &str = "PERMISSION_DELETE";
    pub const PERMISSION_LIST: &str = "PERMISSION_LIST";
    pub const PERMISSION_ASSIGN: &str = "PERMISSION_ASSIGN";
    pub const PERMISSION_REVOKE: &str = "PERMISSION_REVOKE";

    // Inventory
    pub const INVENTORY_CREATE: &str = "INVENTORY_CREATE";
    pub const INVENTORY_READ: &str = "INVENTORY_READ";
    pub const INVENTORY_UPDATE: &str = "INVENTORY_UPDATE";
    pub const INVENTORY_DELETE: &str = "INVENTORY_DELETE";
    pub const INVENTORY_LIST: &str = "INVENTORY_LIST";
    pub const INVENTORY_ADJUST: &str = "INVENTORY_ADJUST";
    pub const INVENTORY_TRANSFER: &str = "INVENTORY_TRANSFER";
    pub const INVENTORY_COUNT: &str = "INVENTORY_COUNT";
    pub const INVENTORY_VALUATION: &str = "INVENTORY_VALUATION";
    pub const INVENTORY_REPORT: &str = "INVENTORY_REPORT";

    // Sales
    pub const SALE_CREATE: &str = "SALE_CREATE";
    pub const SALE_READ: &str = "SALE_READ";
    pub const SALE_UPDATE: &str = "SALE_UPDATE";
    pub const SALE_DELETE: &str = "SALE_DELETE";
    pub const SALE_LIST: &str = "SALE_LIST";
    pub const SALE_APPROVE: &str = "SALE_APPROVE";
    pub const SALE_CANCEL: &str = "SALE_CANCEL";
    pub const SALE_REFUND: &str = "SALE_REFUND";
    pub const SALE_DISCOUNT: &str = "SALE_DISCOUNT";
    pub const SALE_REPORT: &str = "SALE_REPORT";

    // Financial
    pub const FINANCIAL_VIEW: &str = "FINANCIAL_VIEW";
    pub const FINANCIAL_CREATE: &str = "FINANCIAL_CREATE";
    pub const FINANCIAL_UPDATE: &str = "FINANCIAL_UPDATE";
    pub const FINANCIAL_DELETE: &str = "FINANCIAL_DELETE";
    pub const FINANCIAL_APPROVE: &str = "FINANCIAL_APPROVE";
    pub const FINANCIAL_RECONCILE: &str = "FINANCIAL_RECONCILE";
    pub const FINANCIAL_REPORT: &str = "FINANCIAL_REPORT";
    pub const FINANCIAL_BUDGET: &str = "FINANCIAL_BUDGET";
    pub const FINANCIAL_FORECAST: &str = "FINANCIAL_FORECAST";
    pub const FINANCIAL_AUDIT: &str = "FINANCIAL_AUDIT";

    // Reporting
    pub const REPORT_VIEW: &str = "REPORT_VIEW";
    pub const REPORT_CREATE: &str = "REPORT_CREATE";
    pub const REPORT_EDIT: &str = "REPORT_EDIT";
    pub const REPORT_DELETE: &str = "REPORT_DELETE";
    pub const REPORT_EXPORT: &str = "REPORT_EXPORT";
    pub const REPORT_SCHEDULE: &str = "REPORT_SCHEDULE";
    pub const REPORT_SHARE: &str = "REPORT_SHARE";
    pub const REPORT_DASHBOARD: &str = "REPORT_DASHBOARD";

    // Audit
    pub const AUDIT_VIEW: &str = "AUDIT_VIEW";
    pub const AUDIT_EXPORT: &str = "AUDIT_EXPORT";
    pub const AUDIT_REPORT: &str = "AUDIT_REPORT";
    pub const AUDIT_TRAIL: &str = "AUDIT_TRAIL";
}

use codes::*;

/// Permission codes per category
const CATEGORY_PERMISSIONS: &[(PermissionCategory, &[&str])] = &[
    (
        PermissionCategory::System,
        &[
            SYSTEM_CONFIG_READ,
            SYSTEM_CONFIG_WRITE,
            SYSTEM_HEALTH_CHECK,
            SYSTEM_BACKUP,
            SYSTEM_RESTORE,
            SYSTEM_MAINTENANCE,
            SYSTEM_SHUTDOWN,
        ],
    ),
    (
        PermissionCategory::UserManagement,
        &[
            USER_CREATE,
            USER_READ,
            USER_UPDATE,
            USER_DELETE,
            USER_LIST,
            USER_ACTIVATE,
            USER_DEACTIVATE,
            USER_LOCK,
            USER_UNLOCK,
            USER_RESET_PASSWORD,
            USER_CHANGE_PASSWORD,
            USER_IMPERSONATE,
            USER_VIEW_PROFILE,
            USER_EDIT_PROFILE,
        ],
    ),
    (
        PermissionCategory::RoleManagement,
        &[
            ROLE_CREATE,
            ROLE_READ,
            ROLE_UPDATE,
            ROLE_DELETE,
            ROLE_LIST,
            ROLE_ASSIGN,
            ROLE_REVOKE,
            ROLE_MANAGE_PERMISSIONS,
            PERMISSION_CREATE,
            PERMISSION_READ,
            PERMISSION_UPDATE,
            PERMISSION_DELETE,
            PERMISSION_LIST,
            PERMISSION_ASSIGN,
            PERMISSION_REVOKE,
        ],
    ),
    (
        PermissionCategory::Inventory,
        &[
            INVENTORY_CREATE,
            INVENTORY_READ,
            INVENTORY_UPDATE,
            INVENTORY_DELETE,
            INVENTORY_LIST,
            INVENTORY_ADJUST,
            INVENTORY_TRANSFER,
            INVENTORY_COUNT,
            INVENTORY_VALUATION,
            INVENTORY_REPORT,
        ],
    ),
    (
        PermissionCategory::Sales,
        &[
            SALE_CREATE,
            SALE_READ,
            SALE_UPDATE,
            SALE_DELETE,
            SALE_LIST,
            SALE_APPROVE,
            SALE_CANCEL,
            SALE_REFUND,
            SALE_DISCOUNT,
            SALE_REPORT,
        ],
    ),
    (
        PermissionCategory::Financial,
        &[
            FINANCIAL_VIEW,
            FINANCIAL_CREATE,
            FINANCIAL_UPDATE,
            FINANCIAL_DELETE,
            FINANCIAL_APPROVE,
            FINANCIAL_RECONCILE,
            FINANCIAL_REPORT,
            FINANCIAL_BUDGET,
            FINANCIAL_FORECAST,
            FINANCIAL_AUDIT,
        ],
    ),
    (
        PermissionCategory::Reporting,
        &[REPORT_VIEW, REPORT_CREATE, REPORT_EDIT, REPORT_DELETE, REPORT_EXPORT, REPORT_SCHEDULE, REPORT_SHARE, REPORT_DASHBOARD],
    ),
    (PermissionCategory::Audit, &[AUDIT_VIEW, AUDIT_EXPORT, AUDIT_REPORT, AUDIT_TRAIL]),
];

/// Risk levels for permissions not defaulting to LOW
const RISK_LEVELS: &[(&str, RiskLevel)] = &[
    // Critical
    (SYSTEM_SHUTDOWN, RiskLevel::Critical),
    (SYSTEM_BACKUP, RiskLevel::Critical),
    (SYSTEM_RESTORE, RiskLevel::Critical),
    (USER_DELETE, RiskLevel::Critical),
    (USER_IMPERSONATE, RiskLevel::Critical),
    (ROLE_DELETE, RiskLevel::Critical),
    (PERMISSION_DELETE, RiskLevel::Critical),
    // High
    (SYSTEM_CONFIG_WRITE, RiskLevel::High),
    (SYSTEM_MAINTENANCE, RiskLevel::High),
    (USER_CREATE, RiskLevel::High),
    (USER_RESET_PASSWORD, RiskLevel::High),
    (ROLE_CREATE, RiskLevel::High),
    (ROLE_MANAGE_PERMISSIONS, RiskLevel::High),
    (PERMISSION_CREATE, RiskLevel::High),
    (FINANCIAL_DELETE, RiskLevel::High),
    (FINANCIAL_APPROVE, RiskLevel::High),
    // Medium
    (USER_UPDATE, RiskLevel::Medium),
    (USER_LOCK, RiskLevel::Medium),
    (USER_UNLOCK, RiskLevel::Medium),
    (ROLE_UPDATE, RiskLevel::Medium),
    (PERMISSION_UPDATE, RiskLevel::Medium),
    (INVENTORY_DELETE, RiskLevel::Medium),
    (SALE_DELETE, RiskLevel::Medium),
    (FINANCIAL_UPDATE, RiskLevel::Medium),
];

/// Direct permission dependencies: holding the left code meaningfully
/// requires also holding every code on the right.
const DEPENDENCIES: &[(&str, &[&str])] = &[
    (USER_DELETE, &[USER_READ, USER_UPDATE]),
    (USER_UPDATE, &[USER_READ]),
    (USER_LOCK, &[USER_READ]),
    (USER_UNLOCK, &[USER_READ]),
    (USER_RESET_PASSWORD, &[USER_READ]),
    (ROLE_DELETE, &[ROLE_READ, ROLE_UPDATE]),
    (ROLE_UPDATE, &[ROLE_READ]),
    (ROLE_MANAGE_PERMISSIONS, &[ROLE_READ, PERMISSION_READ]),
    (PERMISSION_DELETE, &[PERMISSION_READ, PERMISSION_UPDATE]),
    (PERMISSION_UPDATE, &[PERMISSION_READ]),
    (SALE_CREATE, &[SALE_READ, INVENTORY_READ]),
    (SALE_DELETE, &[SALE_READ, SALE_UPDATE]),
    (SALE_UPDATE, &[SALE_READ]),
    (INVENTORY_ADJUST, &[INVENTORY_READ, INVENTORY_UPDATE]),
    (INVENTORY_TRANSFER, &[INVENTORY_READ, INVENTORY_UPDATE]),
    (INVENTORY_DELETE, &[INVENTORY_READ, INVENTORY_UPDATE]),
    (FINANCIAL_DELETE, &[FINANCIAL_VIEW, FINANCIAL_UPDATE]),
    (FINANCIAL_UPDATE, &[FINANCIAL_VIEW]),
    (FINANCIAL_APPROVE, &[FINANCIAL_VIEW]),
];

/// Default permission sets per role template
const TEMPLATE_PERMISSIONS: &[(RoleTemplate, &[&str])] = &[
    // Superadmin gets every catalog permission; resolved in code.
    (RoleTemplate::Superadmin, &[]),
    (
        RoleTemplate::Admin,
        &[
            SYSTEM_CONFIG_READ,
            SYSTEM_HEALTH_CHECK,
            SYSTEM_BACKUP,
            USER_CREATE,
            USER_READ,
            USER_UPDATE,
            USER_DELETE,
            USER_LIST,
            USER_ACTIVATE,
            USER_DEACTIVATE,
            USER_LOCK,
            USER_UNLOCK,
            USER_RESET_PASSWORD,
            ROLE_CREATE,
            ROLE_READ,
            ROLE_UPDATE,
            ROLE_DELETE,
            ROLE_LIST,
            ROLE_ASSIGN,
            ROLE_REVOKE,
            ROLE_MANAGE_PERMISSIONS,
            PERMISSION_CREATE,
            PERMISSION_READ,
            PERMISSION_UPDATE,
            PERMISSION_DELETE,
            PERMISSION_LIST,
            PERMISSION_ASSIGN,
            PERMISSION_REVOKE,
            INVENTORY_CREATE,
            INVENTORY_READ,
            INVENTORY_UPDATE,
            INVENTORY_DELETE,
            INVENTORY_LIST,
            SALE_CREATE,
            SALE_READ,
            SALE_UPDATE,
            SALE_DELETE,
            SALE_LIST,
            FINANCIAL_VIEW,
            FINANCIAL_CREATE,
            FINANCIAL_UPDATE,
            FINANCIAL_DELETE,
            FINANCIAL_APPROVE,
            FINANCIAL_RECONCILE,
            FINANCIAL_REPORT,
            REPORT_VIEW,
            REPORT_CREATE,
            REPORT_EDIT,
            REPORT_DELETE,
            REPORT_EXPORT,
            REPORT_SCHEDULE,
            REPORT_SHARE,
            REPORT_DASHBOARD,
            AUDIT_VIEW,
            AUDIT_EXPORT,
            AUDIT_REPORT,
            AUDIT_TRAIL,
        ],
    ),
    (
        RoleTemplate::Manager,
        &[
            USER_READ,
            USER_UPDATE,
            USER_LIST,
            USER_ACTIVATE,
            USER_DEACTIVATE,
            USER_LOCK,
            USER_UNLOCK,
            ROLE_READ,
            ROLE_LIST,
            ROLE_ASSIGN,
            ROLE_REVOKE,
            INVENTORY_CREATE,
            INVENTORY_READ,
            INVENTORY_UPDATE,
            INVENTORY_LIST,
            INVENTORY_ADJUST,
            INVENTORY_TRANSFER,
            SALE_CREATE,
            SALE_READ,
            SALE_UPDATE,
            SALE_LIST,
            SALE_APPROVE,
            FINANCIAL_VIEW,
            FINANCIAL_CREATE,
            FINANCIAL_UPDATE,
            FINANCIAL_APPROVE,
            FINANCIAL_REPORT,
            REPORT_VIEW,
            REPORT_CREATE,
            REPORT_EDIT,
            REPORT_EXPORT,
            REPORT_DASHBOARD,
        ],
    ),
    (
        RoleTemplate::Staff,
        &[
            USER_VIEW_PROFILE,
            USER_EDIT_PROFILE,
            USER_CHANGE_PASSWORD,
            INVENTORY_READ,
            INVENTORY_LIST,
            INVENTORY_COUNT,
            SALE_CREATE,
            SALE_READ,
            SALE_UPDATE,
            SALE_LIST,
            REPORT_VIEW,
            REPORT_EXPORT,
            REPORT_DASHBOARD,
        ],
    ),
    (
        RoleTemplate::Auditor,
        &[
            USER_READ,
            USER_LIST,
            ROLE_READ,
            ROLE_LIST,
            PERMISSION_READ,
            PERMISSION_LIST,
            INVENTORY_READ,
            INVENTORY_LIST,
            INVENTORY_REPORT,
            SALE_READ,
            SALE_LIST,
            SALE_REPORT,
            FINANCIAL_VIEW,
            FINANCIAL_REPORT,
            FINANCIAL_AUDIT,
            AUDIT_VIEW,
            AUDIT_EXPORT,
            AUDIT_REPORT,
            AUDIT_TRAIL,
            REPORT_VIEW,
            REPORT_CREATE,
            REPORT_EDIT,
            REPORT_EXPORT,
            REPORT_DASHBOARD,
        ],
    ),
];

/// Get the risk level for a permission code (unlisted codes are LOW)
pub fn risk_level_of(code: &str) -> RiskLevel {
    RISK_LEVELS.iter().find(|(c, _)| *c == code).map(|(_, level)| *level).unwrap_or(RiskLevel::Low)
}

/// Directed graph over permission codes (`A depends_on B`)
///
/// Dependencies are direct only, never transitive. The relation is declared
/// statically and proven acyclic at construction time; a cyclic relation
/// would make "has all dependencies" unsatisfiable for every user.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    dependencies: HashMap<&'static str, &'static [&'static str]>,
    dependents: HashMap<&'static str, Vec<&'static str>>,
}

impl DependencyGraph {
    fn new(edges: &'static [(&'static str, &'static [&'static str])]) -> RbacResult<Self> {
        let mut dependencies = HashMap::new();
        let mut dependents: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

        for (code, deps) in edges {
            dependencies.insert(*code, *deps);
            for dep in *deps {
                dependents.entry(*dep).or_default().push(*code);
            }
        }

        let graph = Self { dependencies, dependents };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Direct dependencies of a permission code
    pub fn dependencies_of(&self, code: &str) -> BTreeSet<String> {
        self.dependencies.get(code).map(|deps| deps.iter().map(|d| d.to_string()).collect()).unwrap_or_default()
    }

    /// Permission codes that directly depend on the given code
    pub fn dependents_of(&self, code: &str) -> BTreeSet<String> {
        self.dependents.get(code).map(|deps| deps.iter().map(|d| d.to_string()).collect()).unwrap_or_default()
    }

    /// Report the direct dependencies of `requested` codes that are absent
    /// from an effective permission set.
    pub fn missing_for(&self, effective: &HashSet<String>, requested: &[&str]) -> BTreeSet<String> {
        let mut missing = BTreeSet::new();

        for code in requested {
            if let Some(deps) = self.dependencies.get(*code) {
                for dep in *deps {
                    if !effective.contains(*dep) {
                        missing.insert(dep.to_string());
                    }
                }
            }
        }

        missing
    }

    /// Verify the dependency relation contains no cycle.
    ///
    /// Iterative three-color depth-first search; the relation is small but
    /// seeded data must never be trusted to stay that way.
    fn check_acyclic(&self) -> RbacResult<()> {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        let mut colors: HashMap<&str, u8> = HashMap::new();

        for start in self.dependencies.keys().copied() {
            if colors.get(start).copied().unwrap_or(WHITE) != WHITE {
                continue;
            }

            // (node, entered) pairs; a node is pushed again after its
            // dependencies so it can be blackened on the way out.
            let mut stack: Vec<(&str, bool)> = vec![(start, false)];

            while let Some((node, entered)) = stack.pop() {
                if entered {
                    colors.insert(node, BLACK);
                    continue;
                }

                match colors.get(node).copied().unwrap_or(WHITE) {
                    BLACK => continue,
                    GRAY => {
                        return Err(RbacError::validation(format!("Permission dependency cycle involving {node}")));
                    }
                    _ => {}
                }

                colors.insert(node, GRAY);
                stack.push((node, true));

                if let Some(deps) = self.dependencies.get(node) {
                    for dep in deps.iter().copied() {
                        match colors.get(dep).copied().unwrap_or(WHITE) {
                            GRAY => {
                                return Err(RbacError::validation(format!("Permission dependency cycle involving {dep}")));
                            }
                            WHITE => stack.push((dep, false)),
                            _ => {}
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// The seeded permission catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    dependency_graph: DependencyGraph,
}

impl Catalog {
    /// Build the built-in catalog, validating the dependency relation.
    pub fn builtin() -> RbacResult<Self> {
        let dependency_graph = DependencyGraph::new(DEPENDENCIES)?;
        Ok(Self { dependency_graph })
    }

    /// The permission dependency graph
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }

    /// All catalog permission codes with their category
    pub fn all_codes(&self) -> Vec<(&'static str, PermissionCategory)> {
        CATEGORY_PERMISSIONS.iter().flat_map(|(category, perms)| perms.iter().map(|code| (*code, *category))).collect()
    }

    /// Whether a code is part of the catalog
    pub fn contains(&self, code: &str) -> bool {
        CATEGORY_PERMISSIONS.iter().any(|(_, perms)| perms.contains(&code))
    }

    /// Default permission codes for a role template
    pub fn template_permissions(&self, template: RoleTemplate) -> Vec<&'static str> {
        if template == RoleTemplate::Superadmin {
            // Superadmin holds the entire catalog.
            return self.all_codes().into_iter().map(|(code, _)| code).collect();
        }

        TEMPLATE_PERMISSIONS
            .iter()
            .find(|(t, _)| *t == template)
            .map(|(_, perms)| perms.to_vec())
            .unwrap_or_default()
    }

    /// Materialize a permission row from a catalog code
    pub fn permission_row(&self, code: &str, category: PermissionCategory) -> Permission {
        let (resource, action) = split_code(code);
        let risk_level = risk_level_of(code);

        Permission {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: title_case(code),
            description: describe(code, &resource, &action),
            resource,
            action,
            category,
            risk_level,
            requires_approval: risk_level.requires_admin_granter(),
            is_system: true,
        }
    }
}

/// Split a permission code into (resource, action)
fn split_code(code: &str) -> (String, String) {
    match code.split_once('_') {
        Some((resource, action)) => (resource.to_lowercase(), action.to_lowercase()),
        None => (code.to_lowercase(), "access".to_string()),
    }
}

/// `USER_RESET_PASSWORD` -> `User Reset Password`
fn title_case(code: &str) -> String {
    code.split('_')
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe(code: &str, resource: &str, action: &str) -> String {
    match action {
        "create" => format!("Create new {resource} entries"),
        "read" | "view" => format!("View {resource} information"),
        "update" => format!("Modify {resource} information"),
        "delete" => format!("Delete {resource} entries"),
        "list" => format!("List all {resource} entries"),
        "export" => format!("Export {resource} data"),
        "approve" => format!("Approve {resource} operations"),
        "cancel" => format!("Cancel {resource} operations"),
        "assign" => format!("Assign {resource} to users"),
        "revoke" => format!("Revoke {resource} from users"),
        _ => format!("Permission {}", title_case(code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_acyclic() {
        assert!(Catalog::builtin().is_ok());
    }

    #[test]
    fn test_cycle_detection() {
        static CYCLIC: &[(&str, &[&str])] = &[("A", &["B"]), ("B", &["C"]), ("C", &["A"])];

        let err = DependencyGraph::new(CYCLIC).unwrap_err();
        assert!(matches!(err, RbacError::Validation { .. }));
    }

    #[test]
    fn test_direct_dependencies_only() {
        let catalog = Catalog::builtin().unwrap();
        let deps = catalog.dependency_graph().dependencies_of(codes::USER_DELETE);

        // USER_DELETE depends on USER_UPDATE which depends on USER_READ,
        // but the relation is never transitively expanded.
        assert_eq!(deps.len(), 2);
        assert!(deps.contains(codes::USER_READ));
        assert!(deps.contains(codes::USER_UPDATE));
    }

    #[test]
    fn test_missing_dependencies() {
        let catalog = Catalog::builtin().unwrap();
        let effective: HashSet<String> = [codes::INVENTORY_READ.to_string()].into_iter().collect();

        let missing = catalog.dependency_graph().missing_for(&effective, &[codes::INVENTORY_ADJUST]);

        assert_eq!(missing.len(), 1);
        assert!(missing.contains(codes::INVENTORY_UPDATE));
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(risk_level_of(codes::USER_DELETE), RiskLevel::Critical);
        assert_eq!(risk_level_of(codes::USER_UPDATE), RiskLevel::Medium);
        assert_eq!(risk_level_of(codes::USER_READ), RiskLevel::Low);
        assert!(RiskLevel::High.requires_admin_granter());
        assert!(!RiskLevel::Medium.requires_admin_granter());
    }

    #[test]
    fn test_permission_row_derivation() {
        let catalog = Catalog::builtin().unwrap();
        let row = catalog.permission_row(codes::USER_RESET_PASSWORD, PermissionCategory::UserManagement);

        assert_eq!(row.resource, "user");
        assert_eq!(row.action, "reset_password");
        assert_eq!(row.name, "User Reset Password");
        assert_eq!(row.risk_level, RiskLevel::High);
        assert!(row.requires_approval);
        assert!(row.is_system);
    }

    #[test]
    fn test_superadmin_template_covers_catalog() {
        let catalog = Catalog::builtin().unwrap();
        let all = catalog.all_codes();
        let superadmin = catalog.template_permissions(RoleTemplate::Superadmin);

        assert_eq!(superadmin.len(), all.len());
    }

    #[test]
    fn test_template_permissions_are_catalog_codes() {
        let catalog = Catalog::builtin().unwrap();

        for template in RoleTemplate::all() {
            for code in catalog.template_permissions(template) {
                assert!(catalog.contains(code), "{code} not in catalog");
            }
        }
    }

    #[test]
    fn test_dependents_lookup() {
        let catalog = Catalog::builtin().unwrap();
        let dependents = catalog.dependency_graph().dependents_of(codes::USER_READ);

        assert!(dependents.contains(codes::USER_DELETE));
        assert!(dependents.contains(codes::USER_UPDATE));
        assert!(dependents.contains(codes::USER_LOCK));
    }
}
