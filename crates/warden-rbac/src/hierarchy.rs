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

//! Role hierarchy graph with cycle-safe edge management and permission
//! inheritance
//!
//! Cycle prevention runs before insertion. The traversals still carry a
//! visited set: inheritance resolution must terminate even if a cycle ever
//! reached the store despite the check. All traversals are explicit
//! worklists, never recursion.

use crate::audit::{AuditAction, AuditChange, AuditEntityType, AuditEntry, AuditLog};
use crate::cache::RbacCache;
use crate::catalog::Permission;
use crate::error::{RbacError, RbacResult};
use crate::model::HierarchyEdge;
use crate::store::GrantStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Role hierarchy operations over the grant store
#[derive(Clone)]
pub struct RoleHierarchy {
    store: Arc<dyn GrantStore>,
    cache: Arc<RbacCache>,
    audit: AuditLog,
}

impl RoleHierarchy {
    /// Create the hierarchy component
    pub fn new(store: Arc<dyn GrantStore>, cache: Arc<RbacCache>, audit: AuditLog) -> Self {
        Self { store, cache, audit }
    }

    /// Add a parent -> child edge.
    ///
    /// Fails with `Conflict` if the edge exists and `Cycle` if the child can
    /// already reach the parent through existing edges.
    pub async fn add_edge(&self, actor: Option<Uuid>, parent_role_id: Uuid, child_role_id: Uuid, inherit_permissions: bool) -> RbacResult<()> {
        let result = self.add_edge_inner(parent_role_id, child_role_id, inherit_permissions).await;

        let change = AuditChange::HierarchyChange {
            parent_role_id,
            child_role_id,
            inherit_permissions: Some(inherit_permissions),
        };
        self.record_audit(AuditAction::AddRoleHierarchy, actor, child_role_id, change, &result).await?;

        result
    }

    async fn add_edge_inner(&self, parent_role_id: Uuid, child_role_id: Uuid, inherit_permissions: bool) -> RbacResult<()> {
        if self.store.role(parent_role_id).await?.is_none() {
            return Err(RbacError::not_found(format!("Parent role {parent_role_id} not found")));
        }
        if self.store.role(child_role_id).await?.is_none() {
            return Err(RbacError::not_found(format!("Child role {child_role_id} not found")));
        }

        if parent_role_id == child_role_id || self.reaches(child_role_id, parent_role_id).await? {
            return Err(RbacError::cycle("Role hierarchy edge would create a cycle"));
        }

        self.store
            .insert_edge(HierarchyEdge {
                parent_role_id,
                child_role_id,
                inherit_permissions,
            })
            .await?;

        self.invalidate_subtree(child_role_id).await?;

        debug!(parent = %parent_role_id, child = %child_role_id, inherit = inherit_permissions, "Role hierarchy edge added");
        Ok(())
    }

    /// Remove a parent -> child edge; `NotFound` if absent.
    pub async fn remove_edge(&self, actor: Option<Uuid>, parent_role_id: Uuid, child_role_id: Uuid) -> RbacResult<()> {
        let result = self.remove_edge_inner(parent_role_id, child_role_id).await;

        let change = AuditChange::HierarchyChange {
            parent_role_id,
            child_role_id,
            inherit_permissions: None,
        };
        self.record_audit(AuditAction::RemoveRoleHierarchy, actor, child_role_id, change, &result).await?;

        result
    }

    async fn remove_edge_inner(&self, parent_role_id: Uuid, child_role_id: Uuid) -> RbacResult<()> {
        if !self.store.delete_edge(parent_role_id, child_role_id).await? {
            return Err(RbacError::not_found("Role hierarchy relationship not found"));
        }

        self.invalidate_subtree(child_role_id).await?;

        debug!(parent = %parent_role_id, child = %child_role_id, "Role hierarchy edge removed");
        Ok(())
    }

    /// All roles reachable upward from `role_id`, nearest first
    pub async fn ancestors(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        if let Some(cached) = self.cache.get_role_hierarchy(role_id).await {
            return Ok(cached);
        }

        let mut visited: HashSet<Uuid> = HashSet::from([role_id]);
        let mut ancestors = Vec::new();
        let mut worklist = vec![role_id];

        while let Some(current) = worklist.pop() {
            for edge in self.store.parent_edges(current).await? {
                if visited.insert(edge.parent_role_id) {
                    ancestors.push(edge.parent_role_id);
                    worklist.push(edge.parent_role_id);
                }
            }
        }

        self.cache.set_role_hierarchy(role_id, &ancestors).await;
        Ok(ancestors)
    }

    /// All roles reachable downward from `role_id`
    pub async fn descendants(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        let mut visited: HashSet<Uuid> = HashSet::from([role_id]);
        let mut descendants = Vec::new();
        let mut worklist = vec![role_id];

        while let Some(current) = worklist.pop() {
            for edge in self.store.child_edges(current).await? {
                if visited.insert(edge.child_role_id) {
                    descendants.push(edge.child_role_id);
                    worklist.push(edge.child_role_id);
                }
            }
        }

        Ok(descendants)
    }

    /// Effective permission set of a role: its direct permissions unioned
    /// with the direct permissions of every ancestor reachable over
    /// `inherit_permissions = true` edges.
    pub async fn inherited_permissions(&self, role_id: Uuid) -> RbacResult<Vec<Permission>> {
        if let Some(cached) = self.cache.get_role_permissions(role_id).await {
            return Ok(cached);
        }

        let mut collected: HashMap<Uuid, Permission> = HashMap::new();
        self.collect_direct_permissions(role_id, &mut collected).await?;

        let mut visited: HashSet<Uuid> = HashSet::from([role_id]);
        let mut worklist: Vec<Uuid> = self.inheriting_parents(role_id).await?;

        while let Some(parent) = worklist.pop() {
            if !visited.insert(parent) {
                continue;
            }

            self.collect_direct_permissions(parent, &mut collected).await?;
            worklist.extend(self.inheriting_parents(parent).await?);
        }

        let mut permissions: Vec<Permission> = collected.into_values().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));

        self.cache.set_role_permissions(role_id, &permissions).await;
        Ok(permissions)
    }

    /// Drop cached state for a role and everything below it.
    ///
    /// A role's derived permission set changes for its whole subtree, and
    /// the affected users cannot be enumerated, so every cached user set
    /// goes too.
    pub(crate) async fn invalidate_subtree(&self, role_id: Uuid) -> RbacResult<()> {
        self.cache.invalidate_role_hierarchy(role_id).await;
        self.cache.invalidate_role_permissions(role_id).await;

        for descendant in self.descendants(role_id).await? {
            self.cache.invalidate_role_hierarchy(descendant).await;
            self.cache.invalidate_role_permissions(descendant).await;
        }

        self.cache.invalidate_all_user_permissions().await;
        Ok(())
    }

    /// Whether `target` is reachable from `start` following parent -> child
    /// edges downward
    async fn reaches(&self, start: Uuid, target: Uuid) -> RbacResult<bool> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut worklist = vec![start];

        while let Some(current) = worklist.pop() {
            if current == target {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }

            for edge in self.store.child_edges(current).await? {
                worklist.push(edge.child_role_id);
            }
        }

        Ok(false)
    }

    async fn inheriting_parents(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        Ok(self
            .store
            .parent_edges(role_id)
            .await?
            .into_iter()
            .filter(|edge| edge.inherit_permissions)
            .map(|edge| edge.parent_role_id)
            .collect())
    }

    async fn collect_direct_permissions(&self, role_id: Uuid, collected: &mut HashMap<Uuid, Permission>) -> RbacResult<()> {
        for permission_id in self.store.role_permission_ids(role_id).await? {
            if let Some(permission) = self.store.permission(permission_id).await? {
                collected.insert(permission.id, permission);
            }
        }
        Ok(())
    }

    async fn record_audit(&self, action: AuditAction, actor: Option<Uuid>, entity_id: Uuid, change: AuditChange, result: &RbacResult<()>) -> RbacResult<()> {
        let entry = AuditEntry::new(action, AuditEntityType::RoleHierarchy, actor).with_entity(entity_id).with_change(change);

        match result {
            Ok(()) => self.audit.record(entry).await,
            Err(e) => {
                // The original failure is what the caller needs to see.
                if let Err(audit_err) = self.audit.record(entry.failed(e.to_string())).await {
                    error!(error = %audit_err, "Failed to record audit entry for refused hierarchy change");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, PermissionCategory, codes};
    use crate::config::RbacConfig;
    use crate::memory::MemoryStore;
    use crate::model::Role;

    struct Fixture {
        store: Arc<MemoryStore>,
        hierarchy: RoleHierarchy,
        catalog: Catalog,
    }

    async fn fixture() -> Fixture {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(RbacCache::new(None, &RbacConfig::default()));
        let audit = AuditLog::new(store.clone());

        Fixture {
            hierarchy: RoleHierarchy::new(store.clone(), cache, audit),
            store,
            catalog: Catalog::builtin().unwrap(),
        }
    }

    impl Fixture {
        async fn role(&self, name: &str) -> Uuid {
            let role = Role::new(name);
            let id = role.id;
            self.store.insert_role(role).await.unwrap();
            id
        }

        async fn give_permission(&self, role_id: Uuid, code: &str) -> Uuid {
            let permission = self.catalog.permission_row(code, PermissionCategory::Reporting);
            let id = permission.id;
            self.store.insert_permission(permission).await.unwrap();
            self.store.add_role_permission(role_id, id).await.unwrap();
            id
        }
    }

    #[tokio::test]
    async fn test_reverse_edge_is_a_cycle() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;

        f.hierarchy.add_edge(None, admin, manager, true).await.unwrap();

        let err = f.hierarchy.add_edge(None, manager, admin, true).await.unwrap_err();
        assert!(matches!(err, RbacError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_self_edge_is_a_cycle() {
        let f = fixture().await;
        let admin = f.role("Admin").await;

        let err = f.hierarchy.add_edge(None, admin, admin, true).await.unwrap_err();
        assert!(matches!(err, RbacError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_transitive_cycle_rejected() {
        let f = fixture().await;
        let a = f.role("A").await;
        let b = f.role("B").await;
        let c = f.role("C").await;

        f.hierarchy.add_edge(None, a, b, true).await.unwrap();
        f.hierarchy.add_edge(None, b, c, true).await.unwrap();

        let err = f.hierarchy.add_edge(None, c, a, true).await.unwrap_err();
        assert!(matches!(err, RbacError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_edge_conflicts() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;

        f.hierarchy.add_edge(None, admin, manager, true).await.unwrap();

        let err = f.hierarchy.add_edge(None, admin, manager, false).await.unwrap_err();
        assert!(matches!(err, RbacError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_remove_missing_edge() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;

        let err = f.hierarchy.remove_edge(None, admin, manager).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let f = fixture().await;
        let admin = f.role("Admin").await;

        let err = f.hierarchy.add_edge(None, admin, Uuid::new_v4(), true).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_inheritance_follows_flag() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;
        let intern = f.role("Intern").await;

        f.give_permission(admin, codes::REPORT_VIEW).await;
        f.hierarchy.add_edge(None, admin, manager, true).await.unwrap();
        f.hierarchy.add_edge(None, admin, intern, false).await.unwrap();

        let manager_perms = f.hierarchy.inherited_permissions(manager).await.unwrap();
        assert!(manager_perms.iter().any(|p| p.code == codes::REPORT_VIEW));

        let intern_perms = f.hierarchy.inherited_permissions(intern).await.unwrap();
        assert!(intern_perms.is_empty());
    }

    #[tokio::test]
    async fn test_inherited_is_superset_of_direct() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;

        f.give_permission(admin, codes::REPORT_VIEW).await;
        f.give_permission(manager, codes::REPORT_EXPORT).await;
        f.hierarchy.add_edge(None, admin, manager, true).await.unwrap();

        let perms = f.hierarchy.inherited_permissions(manager).await.unwrap();
        let codes_held: Vec<&str> = perms.iter().map(|p| p.code.as_str()).collect();

        assert!(codes_held.contains(&codes::REPORT_EXPORT));
        assert!(codes_held.contains(&codes::REPORT_VIEW));
    }

    #[tokio::test]
    async fn test_traversal_terminates_on_corrupt_cycle() {
        let f = fixture().await;
        let a = f.role("A").await;
        let b = f.role("B").await;

        f.give_permission(a, codes::REPORT_VIEW).await;

        // Bypass add_edge validation to simulate a cycle that slipped into
        // the store.
        f.store
            .insert_edge(HierarchyEdge {
                parent_role_id: a,
                child_role_id: b,
                inherit_permissions: true,
            })
            .await
            .unwrap();
        f.store
            .insert_edge(HierarchyEdge {
                parent_role_id: b,
                child_role_id: a,
                inherit_permissions: true,
            })
            .await
            .unwrap();

        let perms = f.hierarchy.inherited_permissions(b).await.unwrap();
        assert!(perms.iter().any(|p| p.code == codes::REPORT_VIEW));

        let ancestors = f.hierarchy.ancestors(b).await.unwrap();
        assert!(ancestors.contains(&a));
    }

    #[tokio::test]
    async fn test_ancestors_and_descendants() {
        let f = fixture().await;
        let a = f.role("A").await;
        let b = f.role("B").await;
        let c = f.role("C").await;

        f.hierarchy.add_edge(None, a, b, true).await.unwrap();
        f.hierarchy.add_edge(None, b, c, true).await.unwrap();

        let ancestors = f.hierarchy.ancestors(c).await.unwrap();
        assert_eq!(ancestors.len(), 2);
        assert!(ancestors.contains(&a));
        assert!(ancestors.contains(&b));

        let descendants = f.hierarchy.descendants(a).await.unwrap();
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains(&b));
        assert!(descendants.contains(&c));
    }

    #[tokio::test]
    async fn test_edge_mutations_are_audited() {
        let f = fixture().await;
        let admin = f.role("Admin").await;
        let manager = f.role("Manager").await;
        let actor = Uuid::new_v4();

        f.hierarchy.add_edge(Some(actor), admin, manager, true).await.unwrap();
        let _ = f.hierarchy.add_edge(Some(actor), manager, admin, true).await;

        let entries = f.store.query_audit(&Default::default()).await.unwrap();
        assert_eq!(entries.len(), 2);

        // Newest first: the refused reverse edge, then the successful add.
        assert!(!entries[0].success);
        assert_eq!(entries[0].action, AuditAction::AddRoleHierarchy);
        assert!(entries[1].success);
    }
}
