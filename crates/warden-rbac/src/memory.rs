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

//! In-memory reference implementation of the grant store
//!
//! Entry-level atomicity on the keyed maps provides the per-pair
//! serialization the store contract requires. A relational implementation
//! gets the same guarantee from unique constraints and transactions.

use crate::audit::{AuditEntry, AuditQuery, AuditStatistics};
use crate::catalog::Permission;
use crate::error::{RbacError, RbacResult};
use crate::model::{HierarchyEdge, PermissionGrant, Role, User, UserType};
use crate::store::GrantStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

/// DashMap-backed grant store
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    usernames: DashMap<String, Uuid>,
    roles: DashMap<Uuid, Role>,
    role_names: DashMap<String, Uuid>,
    permissions: DashMap<Uuid, Permission>,
    permission_codes: DashMap<String, Uuid>,
    role_permissions: DashMap<Uuid, HashSet<Uuid>>,
    user_roles: DashMap<Uuid, HashSet<Uuid>>,
    grants: DashMap<(Uuid, Uuid), PermissionGrant>,
    edges: DashMap<(Uuid, Uuid), HierarchyEdge>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn user(&self, user_id: Uuid) -> RbacResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn insert_user(&self, user: User) -> RbacResult<()> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => {
                return Err(RbacError::conflict(format!("Username '{}' already exists", user.username)));
            }
            Entry::Vacant(entry) => {
                entry.insert(user.id);
            }
        }

        if self.users.insert(user.id, user.clone()).is_some() {
            return Err(RbacError::conflict(format!("User {} already exists", user.id)));
        }

        Ok(())
    }

    async fn set_user_type(&self, user_id: Uuid, user_type: UserType) -> RbacResult<()> {
        match self.users.get_mut(&user_id) {
            Some(mut user) => {
                user.user_type = user_type;
                Ok(())
            }
            None => Err(RbacError::not_found(format!("User {user_id} not found"))),
        }
    }

    async fn role(&self, role_id: Uuid) -> RbacResult<Option<Role>> {
        Ok(self.roles.get(&role_id).map(|r| r.value().clone()))
    }

    async fn role_by_name(&self, name: &str) -> RbacResult<Option<Role>> {
        let id = match self.role_names.get(name) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.roles.get(&id).map(|r| r.value().clone()))
    }

    async fn insert_role(&self, role: Role) -> RbacResult<()> {
        match self.role_names.entry(role.name.clone()) {
            Entry::Occupied(_) => {
                return Err(RbacError::conflict(format!("Role '{}' already exists", role.name)));
            }
            Entry::Vacant(entry) => {
                entry.insert(role.id);
            }
        }

        self.roles.insert(role.id, role);
        Ok(())
    }

    async fn all_roles(&self) -> RbacResult<Vec<Role>> {
        Ok(self.roles.iter().map(|r| r.value().clone()).collect())
    }

    async fn permission(&self, permission_id: Uuid) -> RbacResult<Option<Permission>> {
        Ok(self.permissions.get(&permission_id).map(|p| p.value().clone()))
    }

    async fn permission_by_code(&self, code: &str) -> RbacResult<Option<Permission>> {
        let id = match self.permission_codes.get(code) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.permissions.get(&id).map(|p| p.value().clone()))
    }

    async fn insert_permission(&self, permission: Permission) -> RbacResult<()> {
        match self.permission_codes.entry(permission.code.clone()) {
            Entry::Occupied(_) => {
                return Err(RbacError::conflict(format!("Permission '{}' already exists", permission.code)));
            }
            Entry::Vacant(entry) => {
                entry.insert(permission.id);
            }
        }

        self.permissions.insert(permission.id, permission);
        Ok(())
    }

    async fn permission_count(&self) -> RbacResult<usize> {
        Ok(self.permissions.len())
    }

    async fn role_permission_ids(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        Ok(self.role_permissions.get(&role_id).map(|set| set.iter().copied().collect()).unwrap_or_default())
    }

    async fn add_role_permission(&self, role_id: Uuid, permission_id: Uuid) -> RbacResult<bool> {
        Ok(self.role_permissions.entry(role_id).or_default().insert(permission_id))
    }

    async fn user_role_ids(&self, user_id: Uuid) -> RbacResult<Vec<Uuid>> {
        Ok(self.user_roles.get(&user_id).map(|set| set.iter().copied().collect()).unwrap_or_default())
    }

    async fn add_user_role(&self, user_id: Uuid, role_id: Uuid) -> RbacResult<bool> {
        Ok(self.user_roles.entry(user_id).or_default().insert(role_id))
    }

    async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> RbacResult<bool> {
        Ok(self.user_roles.get_mut(&user_id).map(|mut set| set.remove(&role_id)).unwrap_or(false))
    }

    async fn grant(&self, user_id: Uuid, permission_id: Uuid) -> RbacResult<Option<PermissionGrant>> {
        Ok(self.grants.get(&(user_id, permission_id)).map(|g| g.value().clone()))
    }

    async fn insert_grant(&self, grant: PermissionGrant) -> RbacResult<()> {
        match self.grants.entry((grant.user_id, grant.permission_id)) {
            Entry::Occupied(_) => Err(RbacError::conflict("Grant already exists for this user and permission")),
            Entry::Vacant(entry) => {
                entry.insert(grant);
                Ok(())
            }
        }
    }

    async fn update_grant_expiry(&self, user_id: Uuid, permission_id: Uuid, expires_at: Option<DateTime<Utc>>) -> RbacResult<()> {
        match self.grants.get_mut(&(user_id, permission_id)) {
            Some(mut grant) => {
                grant.expires_at = expires_at;
                Ok(())
            }
            None => Err(RbacError::not_found("No grant for this user and permission")),
        }
    }

    async fn delete_grant(&self, user_id: Uuid, permission_id: Uuid) -> RbacResult<bool> {
        Ok(self.grants.remove(&(user_id, permission_id)).is_some())
    }

    async fn grants_for_user(&self, user_id: Uuid) -> RbacResult<Vec<PermissionGrant>> {
        Ok(self.grants.iter().filter(|g| g.user_id == user_id).map(|g| g.value().clone()).collect())
    }

    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> RbacResult<usize> {
        let mut removed = 0;

        self.grants.retain(|_, grant| {
            if grant.is_expired_at(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        Ok(removed)
    }

    async fn parent_edges(&self, child_role_id: Uuid) -> RbacResult<Vec<HierarchyEdge>> {
        Ok(self.edges.iter().filter(|e| e.child_role_id == child_role_id).map(|e| e.value().clone()).collect())
    }

    async fn child_edges(&self, parent_role_id: Uuid) -> RbacResult<Vec<HierarchyEdge>> {
        Ok(self.edges.iter().filter(|e| e.parent_role_id == parent_role_id).map(|e| e.value().clone()).collect())
    }

    async fn insert_edge(&self, edge: HierarchyEdge) -> RbacResult<()> {
        match self.edges.entry((edge.parent_role_id, edge.child_role_id)) {
            Entry::Occupied(_) => Err(RbacError::conflict("Role hierarchy relationship already exists")),
            Entry::Vacant(entry) => {
                entry.insert(edge);
                Ok(())
            }
        }
    }

    async fn delete_edge(&self, parent_role_id: Uuid, child_role_id: Uuid) -> RbacResult<bool> {
        Ok(self.edges.remove(&(parent_role_id, child_role_id)).is_some())
    }

    async fn append_audit(&self, entry: AuditEntry) -> RbacResult<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn query_audit(&self, query: &AuditQuery) -> RbacResult<Vec<AuditEntry>> {
        let entries = self.audit.read().await;
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };

        Ok(entries.iter().rev().filter(|e| query.matches(e)).skip(query.offset).take(limit).cloned().collect())
    }

    async fn audit_statistics(&self) -> RbacResult<AuditStatistics> {
        let entries = self.audit.read().await;

        let mut stats = AuditStatistics {
            total_entries: entries.len(),
            ..Default::default()
        };

        for entry in entries.iter() {
            if entry.success {
                stats.successful_entries += 1;
            } else {
                stats.failed_entries += 1;
            }
            *stats.entries_by_action.entry(entry.action).or_insert(0) += 1;
        }

        Ok(stats)
    }
}
