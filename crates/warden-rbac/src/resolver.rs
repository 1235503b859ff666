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

//! Effective permission resolution
//!
//! A user's effective set is the union of their non-expired direct grants
//! and the inherited permission sets of their assigned roles. Point queries
//! run against the cached flat set; the explainable form records every
//! contributing source.

use crate::cache::RbacCache;
use crate::catalog::{Catalog, Permission, RiskLevel};
use crate::error::{RbacError, RbacResult};
use crate::hierarchy::RoleHierarchy;
use crate::store::GrantStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Where an effective permission came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PermissionSource {
    /// Held as a direct grant
    Direct,

    /// Inherited through one or more assigned roles
    Role {
        /// Every role contributing the permission
        roles: Vec<String>,
    },
}

/// An effective permission with its provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcedPermission {
    /// The permission
    pub permission: Permission,

    /// How the user holds it
    pub source: PermissionSource,
}

/// A user's effective permission set in explainable form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectivePermissions {
    /// The user
    pub user_id: Uuid,

    /// Non-expired direct grants
    pub direct: Vec<Permission>,

    /// Per-role effective sets, keyed by role name
    pub role_permissions: HashMap<String, Vec<Permission>>,

    /// Deduplicated union with per-entry provenance
    pub all: Vec<SourcedPermission>,
}

/// Result of a risk-aware permission check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionCheck {
    /// Whether the user effectively holds the permission
    pub has_permission: bool,

    /// Risk level of the permission (None for unknown codes)
    pub risk_level: Option<RiskLevel>,

    /// Whether grants of this permission require approval
    pub requires_approval: bool,

    /// Direct dependencies the user is missing
    pub missing_dependencies: Vec<String>,
}

impl PermissionCheck {
    fn unknown() -> Self {
        Self {
            has_permission: false,
            risk_level: None,
            requires_approval: false,
            missing_dependencies: Vec::new(),
        }
    }
}

/// Computes effective permission sets and answers point queries
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn GrantStore>,
    cache: Arc<RbacCache>,
    hierarchy: RoleHierarchy,
    catalog: Arc<Catalog>,
}

impl Resolver {
    /// Create the resolver
    pub fn new(store: Arc<dyn GrantStore>, cache: Arc<RbacCache>, hierarchy: RoleHierarchy, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            cache,
            hierarchy,
            catalog,
        }
    }

    /// Look up a permission row by code, cache-first
    pub async fn permission_by_code(&self, code: &str) -> RbacResult<Option<Permission>> {
        if let Some(cached) = self.cache.get_permission_by_code(code).await {
            return Ok(Some(cached));
        }

        let permission = self.store.permission_by_code(code).await?;
        if let Some(permission) = &permission {
            self.cache.set_permission_by_code(permission).await;
        }

        Ok(permission)
    }

    /// A user's deduplicated effective permission list, cache-first
    pub async fn effective_permission_list(&self, user_id: Uuid) -> RbacResult<Vec<Permission>> {
        if let Some(cached) = self.cache.get_user_permissions(user_id).await {
            debug!(user_id = %user_id, "Effective permissions served from cache");
            return Ok(cached);
        }

        let mut collected: HashMap<Uuid, Permission> = HashMap::new();

        for permission in self.direct_permissions(user_id).await? {
            collected.insert(permission.id, permission);
        }

        for role_id in self.store.user_role_ids(user_id).await? {
            for permission in self.hierarchy.inherited_permissions(role_id).await? {
                collected.insert(permission.id, permission);
            }
        }

        let mut permissions: Vec<Permission> = collected.into_values().collect();
        permissions.sort_by(|a, b| a.code.cmp(&b.code));

        self.cache.set_user_permissions(user_id, &permissions).await;

        debug!(user_id = %user_id, count = permissions.len(), "Effective permissions computed");
        Ok(permissions)
    }

    /// A user's effective permission codes
    pub async fn effective_codes(&self, user_id: Uuid) -> RbacResult<HashSet<String>> {
        Ok(self.effective_permission_list(user_id).await?.into_iter().map(|p| p.code).collect())
    }

    /// A user's effective permissions with full source attribution
    pub async fn effective_permissions(&self, user_id: Uuid) -> RbacResult<EffectivePermissions> {
        let direct = self.direct_permissions(user_id).await?;

        let mut role_permissions: HashMap<String, Vec<Permission>> = HashMap::new();
        for role_id in self.store.user_role_ids(user_id).await? {
            let Some(role) = self.store.role(role_id).await? else {
                continue;
            };
            role_permissions.insert(role.name, self.hierarchy.inherited_permissions(role_id).await?);
        }

        let mut all: Vec<SourcedPermission> = Vec::new();
        let mut index: HashMap<Uuid, usize> = HashMap::new();

        for permission in &direct {
            index.insert(permission.id, all.len());
            all.push(SourcedPermission {
                permission: permission.clone(),
                source: PermissionSource::Direct,
            });
        }

        let mut role_names: Vec<&String> = role_permissions.keys().collect();
        role_names.sort();

        for role_name in role_names {
            for permission in &role_permissions[role_name] {
                match index.get(&permission.id) {
                    Some(&i) => {
                        // A direct grant keeps its direct provenance; a
                        // role-sourced entry accumulates contributing roles.
                        if let PermissionSource::Role { roles } = &mut all[i].source {
                            roles.push(role_name.clone());
                        }
                    }
                    None => {
                        index.insert(permission.id, all.len());
                        all.push(SourcedPermission {
                            permission: permission.clone(),
                            source: PermissionSource::Role { roles: vec![role_name.clone()] },
                        });
                    }
                }
            }
        }

        Ok(EffectivePermissions {
            user_id,
            direct,
            role_permissions,
            all,
        })
    }

    /// Direct dependencies of `codes` missing from the user's effective set
    pub async fn validate_dependencies(&self, user_id: Uuid, codes: &[&str]) -> RbacResult<BTreeSet<String>> {
        let effective = self.effective_codes(user_id).await?;
        Ok(self.catalog.dependency_graph().missing_for(&effective, codes))
    }

    /// Check whether a user holds a permission, with risk metadata.
    ///
    /// With `require_dependencies`, a held permission whose direct
    /// dependencies are not all held is reported as not held.
    pub async fn check_permission_with_risk(&self, user_id: Uuid, code: &str, require_dependencies: bool) -> RbacResult<PermissionCheck> {
        let Some(permission) = self.permission_by_code(code).await? else {
            return Ok(PermissionCheck::unknown());
        };

        let effective = self.effective_codes(user_id).await?;
        let mut has_permission = effective.contains(code);
        let mut missing_dependencies = Vec::new();

        if require_dependencies && has_permission {
            let missing = self.catalog.dependency_graph().missing_for(&effective, &[code]);
            if !missing.is_empty() {
                has_permission = false;
                missing_dependencies = missing.into_iter().collect();
            }
        }

        Ok(PermissionCheck {
            has_permission,
            risk_level: Some(permission.risk_level),
            requires_approval: permission.requires_approval,
            missing_dependencies,
        })
    }

    /// Resolve a permission's direct dependencies to full rows, cache-first
    pub async fn permission_dependencies(&self, code: &str) -> RbacResult<Vec<Permission>> {
        let permission = self
            .permission_by_code(code)
            .await?
            .ok_or_else(|| RbacError::not_found(format!("Permission {code} not found")))?;

        if let Some(cached) = self.cache.get_permission_dependencies(permission.id).await {
            return Ok(cached);
        }

        let mut dependencies = Vec::new();
        for dep_code in self.catalog.dependency_graph().dependencies_of(code) {
            if let Some(row) = self.store.permission_by_code(&dep_code).await? {
                dependencies.push(row);
            }
        }

        self.cache.set_permission_dependencies(permission.id, &dependencies).await;
        Ok(dependencies)
    }

    /// Permissions that directly depend on the given code
    pub async fn permission_dependents(&self, code: &str) -> RbacResult<Vec<Permission>> {
        let mut dependents = Vec::new();
        for dependent_code in self.catalog.dependency_graph().dependents_of(code) {
            if let Some(row) = self.store.permission_by_code(&dependent_code).await? {
                dependents.push(row);
            }
        }
        Ok(dependents)
    }

    async fn direct_permissions(&self, user_id: Uuid) -> RbacResult<Vec<Permission>> {
        let now = Utc::now();
        let mut permissions = Vec::new();

        for grant in self.store.grants_for_user(user_id).await? {
            if grant.is_expired_at(now) {
                continue;
            }
            if let Some(permission) = self.store.permission(grant.permission_id).await? {
                permissions.push(permission);
            }
        }

        permissions.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(permissions)
    }
}
