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

//! RBAC engine facade wiring all components
//!
//! The engine owns no global state: the persistence and cache collaborators
//! are injected at construction and the embedding application owns the
//! lifecycle. A missing cache backend is a supported deployment mode, not a
//! degradation.

use crate::audit::{AuditEntry, AuditLog, AuditQuery, AuditStatistics};
use crate::cache::{CacheBackend, CacheHealth, CacheStats, MemoryCache, RbacCache};
use crate::catalog::{Catalog, Permission};
use crate::config::RbacConfig;
use crate::error::RbacResult;
use crate::gate::{
    AuthorizationGate, BulkOutcome, CleanupOutcome, ElevationOutcome, ExtensionOutcome, GrantDecision, GrantOutcome, OperationOutcome, TemporaryPermissions,
};
use crate::hierarchy::RoleHierarchy;
use crate::memory::MemoryStore;
use crate::model::{Role, User, UserType};
use crate::resolver::{EffectivePermissions, PermissionCheck, Resolver};
use crate::store::GrantStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Result of a catalog seeding pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct SeedSummary {
    /// Permissions inserted (already-present codes are skipped)
    pub permissions_seeded: usize,

    /// Template roles inserted (already-present names are skipped)
    pub roles_seeded: usize,
}

/// Engine health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    /// Cache probe and statistics
    pub cache: CacheHealth,

    /// Audit log statistics
    pub audit: AuditStatistics,

    /// Roles in the store
    pub roles_count: usize,

    /// Permissions in the store
    pub permissions_count: usize,

    /// Snapshot timestamp
    pub checked_at: DateTime<Utc>,
}

/// The RBAC resolution engine
#[derive(Clone)]
pub struct RbacEngine {
    store: Arc<dyn GrantStore>,
    cache: Arc<RbacCache>,
    catalog: Arc<Catalog>,
    hierarchy: RoleHierarchy,
    resolver: Resolver,
    gate: AuthorizationGate,
    audit: AuditLog,
    config: RbacConfig,
}

impl RbacEngine {
    /// Create an engine over injected collaborators.
    ///
    /// Validates the catalog's dependency relation; a cyclic relation is a
    /// configuration error and construction fails.
    pub fn new(store: Arc<dyn GrantStore>, cache_backend: Option<Arc<dyn CacheBackend>>, config: RbacConfig) -> RbacResult<Self> {
        let catalog = Arc::new(Catalog::builtin()?);
        let cache = Arc::new(RbacCache::new(cache_backend, &config));
        let audit = AuditLog::new(store.clone());
        let hierarchy = RoleHierarchy::new(store.clone(), cache.clone(), audit.clone());
        let resolver = Resolver::new(store.clone(), cache.clone(), hierarchy.clone(), catalog.clone());
        let gate = AuthorizationGate::new(store.clone(), cache.clone(), resolver.clone(), hierarchy.clone(), audit.clone(), catalog.clone());

        info!(cache_enabled = cache.is_enabled(), "RBAC engine constructed");

        Ok(Self {
            store,
            cache,
            catalog,
            hierarchy,
            resolver,
            gate,
            audit,
            config,
        })
    }

    /// Build a fully in-memory engine and seed the catalog.
    pub async fn initialize() -> RbacResult<Self> {
        let engine = Self::new(Arc::new(MemoryStore::new()), Some(Arc::new(MemoryCache::new())), RbacConfig::default())?;
        engine.seed().await?;
        Ok(engine)
    }

    /// Seed catalog permissions and template roles. Idempotent: existing
    /// rows are left untouched.
    pub async fn seed(&self) -> RbacResult<SeedSummary> {
        let mut summary = SeedSummary::default();

        for (code, category) in self.catalog.all_codes() {
            if self.store.permission_by_code(code).await?.is_none() {
                self.store.insert_permission(self.catalog.permission_row(code, category)).await?;
                summary.permissions_seeded += 1;
            }
        }

        for template in crate::model::RoleTemplate::all() {
            if self.store.role_by_name(template.role_name()).await?.is_some() {
                continue;
            }

            let role = Role::from_template(template, format!("{} role", template.role_name()));
            let role_id = role.id;
            self.store.insert_role(role).await?;
            summary.roles_seeded += 1;

            for code in self.catalog.template_permissions(template) {
                if let Some(permission) = self.store.permission_by_code(code).await? {
                    self.store.add_role_permission(role_id, permission.id).await?;
                }
            }
        }

        info!(
            permissions = summary.permissions_seeded,
            roles = summary.roles_seeded,
            "RBAC catalog seeded"
        );

        Ok(summary)
    }

    // Identity and role management

    /// Register a user supplied by the identity boundary
    pub async fn register_user(&self, user: User) -> RbacResult<()> {
        self.store.insert_user(user).await
    }

    /// Fetch a user
    pub async fn user(&self, user_id: Uuid) -> RbacResult<Option<User>> {
        self.store.user(user_id).await
    }

    /// Create a role; `Conflict` on duplicate name
    pub async fn create_role(&self, role: Role) -> RbacResult<()> {
        self.store.insert_role(role).await
    }

    /// Fetch a role by name
    pub async fn role_by_name(&self, name: &str) -> RbacResult<Option<Role>> {
        self.store.role_by_name(name).await
    }

    /// All roles
    pub async fn roles(&self) -> RbacResult<Vec<Role>> {
        self.store.all_roles().await
    }

    // Resolution

    /// A user's effective permissions with source attribution
    pub async fn effective_permissions(&self, user_id: Uuid) -> RbacResult<EffectivePermissions> {
        self.resolver.effective_permissions(user_id).await
    }

    /// Whether a user holds a permission, with risk metadata
    pub async fn check_permission_with_risk(&self, user_id: Uuid, code: &str, require_dependencies: bool) -> RbacResult<PermissionCheck> {
        self.resolver.check_permission_with_risk(user_id, code, require_dependencies).await
    }

    /// Look up a permission row by code
    pub async fn permission_by_code(&self, code: &str) -> RbacResult<Option<Permission>> {
        self.resolver.permission_by_code(code).await
    }

    /// A permission's direct dependencies as full rows
    pub async fn permission_dependencies(&self, code: &str) -> RbacResult<Vec<Permission>> {
        self.resolver.permission_dependencies(code).await
    }

    /// Permissions that directly depend on the given code
    pub async fn permission_dependents(&self, code: &str) -> RbacResult<Vec<Permission>> {
        self.resolver.permission_dependents(code).await
    }

    // Authorization gate

    /// Decide whether a grant would be allowed
    pub async fn can_grant(&self, granter_id: Uuid, grantee_id: Uuid, code: &str) -> RbacResult<GrantDecision> {
        self.gate.can_grant(granter_id, grantee_id, code).await
    }

    /// Grant a permission
    pub async fn grant(&self, granter_id: Uuid, grantee_id: Uuid, code: &str, expires_at: Option<DateTime<Utc>>) -> RbacResult<GrantOutcome> {
        self.gate.grant(granter_id, grantee_id, code, expires_at).await
    }

    /// Grant a temporary permission with a mandatory expiry
    pub async fn grant_temporary(&self, granter_id: Uuid, grantee_id: Uuid, code: &str, expires_at: DateTime<Utc>, reason: Option<String>) -> RbacResult<GrantOutcome> {
        self.gate.grant_temporary(granter_id, grantee_id, code, expires_at, reason).await
    }

    /// Extend a temporary grant's expiry
    pub async fn extend_temporary(&self, extender_id: Uuid, user_id: Uuid, code: &str, new_expires_at: DateTime<Utc>) -> RbacResult<ExtensionOutcome> {
        self.gate.extend_temporary(extender_id, user_id, code, new_expires_at).await
    }

    /// List a user's temporary grants
    pub async fn temporary_permissions(&self, user_id: Uuid) -> RbacResult<TemporaryPermissions> {
        self.gate.temporary_permissions(user_id).await
    }

    /// Revoke a direct permission grant
    pub async fn revoke(&self, revoker_id: Uuid, user_id: Uuid, code: &str) -> RbacResult<OperationOutcome> {
        self.gate.revoke(revoker_id, user_id, code).await
    }

    /// Change a user's type
    pub async fn elevate_user_type(&self, elevator_id: Uuid, target_id: Uuid, new_type: UserType) -> RbacResult<ElevationOutcome> {
        self.gate.elevate_user_type(elevator_id, target_id, new_type).await
    }

    /// Whether a user may manage a given user type
    pub async fn can_manage_user_type(&self, manager_id: Uuid, target_type: UserType) -> RbacResult<bool> {
        self.gate.can_manage_user_type(manager_id, target_type).await
    }

    /// Assign a role to a user
    pub async fn assign_role(&self, assigner_id: Uuid, user_id: Uuid, role_id: Uuid) -> RbacResult<OperationOutcome> {
        self.gate.assign_role(assigner_id, user_id, role_id).await
    }

    /// Remove a role from a user
    pub async fn remove_role(&self, remover_id: Uuid, user_id: Uuid, role_id: Uuid) -> RbacResult<OperationOutcome> {
        self.gate.remove_role(remover_id, user_id, role_id).await
    }

    /// Delete every expired grant
    pub async fn cleanup_expired(&self) -> RbacResult<CleanupOutcome> {
        self.gate.cleanup_expired().await
    }

    // Bulk operations

    /// Grant several permissions; partial success is preserved
    pub async fn bulk_grant(&self, granter_id: Uuid, grantee_id: Uuid, codes: &[&str], expires_at: Option<DateTime<Utc>>) -> RbacResult<BulkOutcome> {
        self.gate.bulk_grant(granter_id, grantee_id, codes, expires_at).await
    }

    /// Revoke several permissions; partial success is preserved
    pub async fn bulk_revoke(&self, revoker_id: Uuid, user_id: Uuid, codes: &[&str]) -> RbacResult<BulkOutcome> {
        self.gate.bulk_revoke(revoker_id, user_id, codes).await
    }

    /// Assign several roles; partial success is preserved
    pub async fn bulk_assign_roles(&self, assigner_id: Uuid, user_id: Uuid, role_ids: &[Uuid]) -> RbacResult<BulkOutcome> {
        self.gate.bulk_assign_roles(assigner_id, user_id, role_ids).await
    }

    /// Remove several roles; partial success is preserved
    pub async fn bulk_remove_roles(&self, remover_id: Uuid, user_id: Uuid, role_ids: &[Uuid]) -> RbacResult<BulkOutcome> {
        self.gate.bulk_remove_roles(remover_id, user_id, role_ids).await
    }

    /// Add several permissions to a role's direct set
    pub async fn bulk_assign_permissions_to_role(&self, assigner_id: Uuid, role_id: Uuid, codes: &[&str]) -> RbacResult<BulkOutcome> {
        self.gate.bulk_assign_permissions_to_role(assigner_id, role_id, codes).await
    }

    // Role hierarchy

    /// Add a parent -> child hierarchy edge
    pub async fn add_hierarchy_edge(&self, actor: Option<Uuid>, parent_role_id: Uuid, child_role_id: Uuid, inherit_permissions: bool) -> RbacResult<()> {
        self.hierarchy.add_edge(actor, parent_role_id, child_role_id, inherit_permissions).await
    }

    /// Remove a hierarchy edge
    pub async fn remove_hierarchy_edge(&self, actor: Option<Uuid>, parent_role_id: Uuid, child_role_id: Uuid) -> RbacResult<()> {
        self.hierarchy.remove_edge(actor, parent_role_id, child_role_id).await
    }

    /// A role's ancestors
    pub async fn role_ancestors(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        self.hierarchy.ancestors(role_id).await
    }

    /// A role's descendants
    pub async fn role_descendants(&self, role_id: Uuid) -> RbacResult<Vec<Uuid>> {
        self.hierarchy.descendants(role_id).await
    }

    /// A role's effective permission set, inheritance included
    pub async fn role_inherited_permissions(&self, role_id: Uuid) -> RbacResult<Vec<Permission>> {
        self.hierarchy.inherited_permissions(role_id).await
    }

    // Audit and administration

    /// Query the audit log. The configured page cap bounds the result.
    pub async fn query_audit(&self, mut query: AuditQuery) -> RbacResult<Vec<AuditEntry>> {
        let cap = self.config.audit_query_limit;
        if query.limit == 0 || query.limit > cap {
            query.limit = cap;
        }
        self.audit.query(&query).await
    }

    /// Aggregate audit statistics
    pub async fn audit_statistics(&self) -> RbacResult<AuditStatistics> {
        self.audit.statistics().await
    }

    /// Cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached engine entry; returns the count removed
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear_all().await
    }

    /// Engine health snapshot
    pub async fn health_status(&self) -> RbacResult<EngineHealth> {
        Ok(EngineHealth {
            cache: self.cache.health_check().await,
            audit: self.audit.statistics().await?,
            roles_count: self.store.all_roles().await?.len(),
            permissions_count: self.store.permission_count().await?,
            checked_at: Utc::now(),
        })
    }

    /// Spawn the periodic maintenance tasks: the expired-grant cleanup sweep
    /// and cache statistics logging. Both are safe alongside live traffic.
    pub fn start_maintenance_tasks(engine: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();

        {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(engine.config.cleanup_interval);

                loop {
                    interval.tick().await;
                    // A failed sweep is retried next tick.
                    if let Err(e) = engine.cleanup_expired().await {
                        tracing::warn!(error = %e, "Expired grant cleanup failed");
                    }
                }
            }));
        }

        {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(300));

                loop {
                    interval.tick().await;
                    let stats = engine.cache_stats();
                    info!(
                        cache_hits = stats.hits,
                        cache_misses = stats.misses,
                        hit_ratio = format!("{:.2}%", stats.hit_ratio() * 100.0),
                        degraded_reads = stats.degraded_reads,
                        "RBAC cache statistics"
                    );
                }
            }));
        }

        info!("RBAC maintenance tasks started");
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::codes;
    use crate::model::RoleTemplate;

    #[tokio::test]
    async fn test_initialize_seeds_catalog() {
        let engine = RbacEngine::initialize().await.unwrap();

        let roles = engine.roles().await.unwrap();
        assert_eq!(roles.len(), RoleTemplate::all().len());

        let health = engine.health_status().await.unwrap();
        assert!(health.permissions_count > 0);
        assert_eq!(health.cache.healthy, Some(true));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let engine = RbacEngine::initialize().await.unwrap();

        let second = engine.seed().await.unwrap();
        assert_eq!(second.permissions_seeded, 0);
        assert_eq!(second.roles_seeded, 0);
    }

    #[tokio::test]
    async fn test_superadmin_role_holds_whole_catalog() {
        let engine = RbacEngine::initialize().await.unwrap();

        let superadmin = engine.role_by_name("Superadmin").await.unwrap().unwrap();
        let permissions = engine.role_inherited_permissions(superadmin.id).await.unwrap();

        assert_eq!(permissions.len(), engine.catalog.all_codes().len());
    }

    #[tokio::test]
    async fn test_audit_query_cap() {
        let engine = RbacEngine::initialize().await.unwrap();

        let admin = User::new("admin", "admin@example.com", UserType::Superadmin);
        let admin_id = admin.id;
        engine.register_user(admin).await.unwrap();

        let user = User::new("worker", "worker@example.com", UserType::User);
        let user_id = user.id;
        engine.register_user(user).await.unwrap();

        let superadmin_role = engine.role_by_name("Superadmin").await.unwrap().unwrap();
        engine.assign_role(admin_id, admin_id, superadmin_role.id).await.unwrap();

        for code in [codes::REPORT_VIEW, codes::AUDIT_VIEW, codes::SALE_READ] {
            engine.grant(admin_id, user_id, code, None).await.unwrap();
        }

        let page = engine
            .query_audit(AuditQuery {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
