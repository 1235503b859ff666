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

//! Persistence collaborator for the RBAC engine
//!
//! The store is the single source of truth; the cache layer is a derived
//! projection. Implementations back onto a transactional store. The contract
//! methods that create grants and hierarchy edges are atomic check-and-insert
//! per key pair, which is what serializes concurrent grant/revoke of the same
//! `(user, permission)` pair and concurrent edge insertion for the same
//! `(parent, child)` pair.

use crate::audit::{AuditEntry, AuditQuery, AuditStatistics};
use crate::catalog::Permission;
use crate::error::RbacResult;
use crate::model::{HierarchyEdge, PermissionGrant, Role, User, UserType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Transactional CRUD over RBAC entities
#[async_trait]
pub trait GrantStore: Send + Sync {
    // Users

    /// Fetch a user by id
    async fn user(&self, user_id: Uuid) -> RbacResult<Option<User>>;

    /// Insert a user; `Conflict` on duplicate id or username
    async fn insert_user(&self, user: User) -> RbacResult<()>;

    /// Update a user's type; `NotFound` if absent
    async fn set_user_type(&self, user_id: Uuid, user_type: UserType) -> RbacResult<()>;

    // Roles

    /// Fetch a role by id
    async fn role(&self, role_id: Uuid) -> RbacResult<Option<Role>>;

    /// Fetch a role by its unique name
    async fn role_by_name(&self, name: &str) -> RbacResult<Option<Role>>;

    /// Insert a role; `Conflict` on duplicate name
    async fn insert_role(&self, role: Role) -> RbacResult<()>;

    /// All roles
    async fn all_roles(&self) -> RbacResult<Vec<Role>>;

    // Permissions

    /// Fetch a permission by id
    async fn permission(&self, permission_id: Uuid) -> RbacResult<Option<Permission>>;

    /// Fetch a permission by its unique code
    async fn permission_by_code(&self, code: &str) -> RbacResult<Option<Permission>>;

    /// Insert a permission; `Conflict` on duplicate code
    async fn insert_permission(&self, permission: Permission) -> RbacResult<()>;

    /// Number of permissions in the store
    async fn permission_count(&self) -> RbacResult<usize>;

    // Role permissions

    /// Direct permission ids of a role
    async fn role_permission_ids(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>>;

    /// Add a permission to a role; returns false if already present
    async fn add_role_permission(&self, role_id: Uuid, permission_id: Uuid) -> RbacResult<bool>;

    // User roles

    /// Role ids assigned to a user
    async fn user_role_ids(&self, user_id: Uuid) -> RbacResult<Vec<Uuid>>;

    /// Assign a role to a user; returns false if already assigned
    async fn add_user_role(&self, user_id: Uuid, role_id: Uuid) -> RbacResult<bool>;

    /// Remove a role from a user; returns false if not assigned
    async fn remove_user_role(&self, user_id: Uuid, role_id: Uuid) -> RbacResult<bool>;

    // Direct grants

    /// Fetch the grant row for a `(user, permission)` pair
    async fn grant(&self, user_id: Uuid, permission_id: Uuid) -> RbacResult<Option<PermissionGrant>>;

    /// Insert a grant; `Conflict` if the pair already has a row. Atomic.
    async fn insert_grant(&self, grant: PermissionGrant) -> RbacResult<()>;

    /// Update a grant's expiry; `NotFound` if the pair has no row
    async fn update_grant_expiry(&self, user_id: Uuid, permission_id: Uuid, expires_at: Option<DateTime<Utc>>) -> RbacResult<()>;

    /// Delete a grant; returns false if the pair had no row
    async fn delete_grant(&self, user_id: Uuid, permission_id: Uuid) -> RbacResult<bool>;

    /// All grant rows for a user, expired rows included
    async fn grants_for_user(&self, user_id: Uuid) -> RbacResult<Vec<PermissionGrant>>;

    /// Delete every grant with `expires_at <= now` in one sweep; returns the
    /// number of rows removed
    async fn delete_expired_grants(&self, now: DateTime<Utc>) -> RbacResult<usize>;

    // Role hierarchy

    /// Edges where the given role is the child
    async fn parent_edges(&self, child_role_id: Uuid) -> RbacResult<Vec<HierarchyEdge>>;

    /// Edges where the given role is the parent
    async fn child_edges(&self, parent_role_id: Uuid) -> RbacResult<Vec<HierarchyEdge>>;

    /// Insert an edge; `Conflict` if the pair already exists. Atomic.
    async fn insert_edge(&self, edge: HierarchyEdge) -> RbacResult<()>;

    /// Delete an edge; returns false if absent
    async fn delete_edge(&self, parent_role_id: Uuid, child_role_id: Uuid) -> RbacResult<bool>;

    // Audit log

    /// Append an audit entry
    async fn append_audit(&self, entry: AuditEntry) -> RbacResult<()>;

    /// Query audit entries newest-first with filtering and pagination
    async fn query_audit(&self, query: &AuditQuery) -> RbacResult<Vec<AuditEntry>>;

    /// Aggregate statistics over the audit log
    async fn audit_statistics(&self) -> RbacResult<AuditStatistics>;
}
