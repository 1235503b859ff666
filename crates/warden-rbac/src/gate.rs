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

//! Authorization gate: who may grant, revoke, and elevate what
//!
//! Refusals are structured results, never errors; callers render the
//! specific cause to an admin UI. Every mutation writes exactly one audit
//! entry and invalidates the affected cache entries before returning.
//! Bulk operations process items independently and preserve partial
//! success.

use crate::audit::{AuditAction, AuditChange, AuditEntityType, AuditEntry, AuditLog};
use crate::cache::RbacCache;
use crate::catalog::{Catalog, Permission, risk_level_of};
use crate::error::{RbacError, RbacResult};
use crate::hierarchy::RoleHierarchy;
use crate::model::{PermissionGrant, UserType};
use crate::resolver::Resolver;
use crate::store::GrantStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a `can_grant` evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantDecision {
    /// Whether the grant is allowed
    pub can_grant: bool,

    /// Human-readable cause
    pub reason: String,

    /// Dependency codes the grantee is missing
    pub missing_dependencies: Vec<String>,
}

impl GrantDecision {
    fn approved() -> Self {
        Self {
            can_grant: true,
            reason: "Grant approved".to_string(),
            missing_dependencies: Vec::new(),
        }
    }

    fn refused(reason: impl Into<String>) -> Self {
        Self {
            can_grant: false,
            reason: reason.into(),
            missing_dependencies: Vec::new(),
        }
    }

    fn refused_missing(reason: impl Into<String>, missing: BTreeSet<String>) -> Self {
        Self {
            can_grant: false,
            reason: reason.into(),
            missing_dependencies: missing.into_iter().collect(),
        }
    }
}

/// Outcome of a grant operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantOutcome {
    /// Whether the grant was persisted
    pub success: bool,

    /// Human-readable cause
    pub message: String,

    /// Id of the granted permission when successful
    pub permission_id: Option<Uuid>,
}

/// Outcome of a revoke, role assignment, or role removal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Whether the operation was persisted
    pub success: bool,

    /// Human-readable cause
    pub message: String,
}

/// Outcome of a user type elevation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElevationOutcome {
    /// Whether the elevation was persisted
    pub success: bool,

    /// Human-readable cause
    pub message: String,

    /// The target's type before the operation
    pub previous_type: Option<UserType>,
}

/// Outcome of a temporary grant extension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionOutcome {
    /// Whether the extension was persisted
    pub success: bool,

    /// Human-readable cause
    pub message: String,

    /// Previous expiry when successful
    pub old_expires_at: Option<DateTime<Utc>>,

    /// New expiry when successful
    pub new_expires_at: Option<DateTime<Utc>>,
}

/// Outcome of an expired-grant cleanup sweep
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Number of grant rows removed
    pub cleaned_count: usize,
}

/// A user's temporary grant with liveness
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemporaryGrant {
    /// The granted permission
    pub permission: Permission,

    /// Who granted it
    pub granted_by: Option<Uuid>,

    /// When it was granted
    pub granted_at: DateTime<Utc>,

    /// When it expires
    pub expires_at: DateTime<Utc>,

    /// Whether it is still live
    pub is_active: bool,
}

/// All temporary grants of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporaryPermissions {
    /// The user
    pub user_id: Uuid,

    /// Temporary grants, soonest expiry first
    pub grants: Vec<TemporaryGrant>,

    /// Grants still live
    pub active_count: usize,

    /// Grants past their expiry but not yet cleaned up
    pub expired_count: usize,
}

/// A successful item within a bulk operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkItem {
    /// Permission code or role id
    pub item: String,

    /// Human-readable result
    pub message: String,
}

/// A failed item within a bulk operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkFailure {
    /// Permission code or role id
    pub item: String,

    /// Human-readable cause
    pub error: String,
}

/// Aggregate outcome of a bulk operation.
///
/// `success` is false if any item failed, but successful items stay
/// persisted: one item's failure never rolls back another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Whether every item succeeded
    pub success: bool,

    /// Items attempted
    pub total: usize,

    /// Items persisted
    pub success_count: usize,

    /// Items refused or errored
    pub failed_count: usize,

    /// Per-item successes
    pub successful_items: Vec<BulkItem>,

    /// Per-item failures
    pub failed_items: Vec<BulkFailure>,
}

impl BulkOutcome {
    fn new(total: usize) -> Self {
        Self {
            success: true,
            total,
            success_count: 0,
            failed_count: 0,
            successful_items: Vec::new(),
            failed_items: Vec::new(),
        }
    }

    fn succeed(&mut self, item: impl Into<String>, message: impl Into<String>) {
        self.successful_items.push(BulkItem {
            item: item.into(),
            message: message.into(),
        });
        self.success_count += 1;
    }

    fn fail(&mut self, item: impl Into<String>, error: impl Into<String>) {
        self.failed_items.push(BulkFailure {
            item: item.into(),
            error: error.into(),
        });
        self.failed_count += 1;
        self.success = false;
    }
}

/// Enforces grant/revoke/elevation authorization rules
#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn GrantStore>,
    cache: Arc<RbacCache>,
    resolver: Resolver,
    hierarchy: RoleHierarchy,
    audit: AuditLog,
    catalog: Arc<Catalog>,
}

impl AuthorizationGate {
    /// Create the gate
    pub fn new(store: Arc<dyn GrantStore>, cache: Arc<RbacCache>, resolver: Resolver, hierarchy: RoleHierarchy, audit: AuditLog, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            cache,
            resolver,
            hierarchy,
            audit,
            catalog,
        }
    }

    /// Decide whether `granter` may grant `code` to `grantee`.
    ///
    /// First failing check wins: users exist, granter outranks grantee,
    /// risk gate, granter holds the code, grantee satisfies the code's
    /// direct dependencies. The risk gate precedes the possession check so
    /// a non-admin granter of a HIGH/CRITICAL permission is always refused
    /// for the risk reason.
    pub async fn can_grant(&self, granter_id: Uuid, grantee_id: Uuid, code: &str) -> RbacResult<GrantDecision> {
        let (Some(granter), Some(grantee)) = (self.store.user(granter_id).await?, self.store.user(grantee_id).await?) else {
            return Ok(GrantDecision::refused("User not found"));
        };

        if !granter.user_type.can_manage(grantee.user_type) {
            return Ok(GrantDecision::refused(format!(
                "Insufficient user type level. {} cannot manage {}",
                granter.user_type, grantee.user_type
            )));
        }

        let risk_level = risk_level_of(code);
        if risk_level.requires_admin_granter() && !granter.user_type.is_admin() {
            return Ok(GrantDecision::refused(format!(
                "Permission {code} has {} risk level and requires admin approval",
                risk_level.as_str()
            )));
        }

        let granter_codes = self.resolver.effective_codes(granter_id).await?;
        if !granter_codes.contains(code) {
            return Ok(GrantDecision::refused(format!("Granter does not have permission {code}")));
        }

        let missing = self.resolver.validate_dependencies(grantee_id, &[code]).await?;
        if !missing.is_empty() {
            return Ok(GrantDecision::refused_missing("Grantee is missing required dependencies", missing));
        }

        Ok(GrantDecision::approved())
    }

    /// Grant a permission, permanent unless `expires_at` is set
    pub async fn grant(&self, granter_id: Uuid, grantee_id: Uuid, code: &str, expires_at: Option<DateTime<Utc>>) -> RbacResult<GrantOutcome> {
        self.grant_one(granter_id, grantee_id, code, expires_at, None, AuditAction::GrantPermission, true).await
    }

    /// Grant a temporary permission with a mandatory expiry and a reason
    /// persisted to the audit trail
    pub async fn grant_temporary(&self, granter_id: Uuid, grantee_id: Uuid, code: &str, expires_at: DateTime<Utc>, reason: Option<String>) -> RbacResult<GrantOutcome> {
        self.grant_one(granter_id, grantee_id, code, Some(expires_at), reason, AuditAction::GrantTemporaryPermission, true).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn grant_one(
        &self,
        granter_id: Uuid,
        grantee_id: Uuid,
        code: &str,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<String>,
        action: AuditAction,
        record_audit: bool,
    ) -> RbacResult<GrantOutcome> {
        let change = AuditChange::PermissionGrant {
            permission_code: code.to_string(),
            expires_at,
            reason: reason.clone(),
        };

        let decision = self.can_grant(granter_id, grantee_id, code).await?;
        if !decision.can_grant {
            if record_audit {
                self.record_refusal(action, granter_id, grantee_id, change, &decision.reason).await?;
            }
            return Ok(GrantOutcome {
                success: false,
                message: decision.reason,
                permission_id: None,
            });
        }

        let Some(permission) = self.resolver.permission_by_code(code).await? else {
            let message = format!("Permission {code} not found");
            if record_audit {
                self.record_refusal(action, granter_id, grantee_id, change, &message).await?;
            }
            return Ok(GrantOutcome {
                success: false,
                message,
                permission_id: None,
            });
        };

        let grant = match expires_at {
            Some(expires_at) => PermissionGrant::temporary(grantee_id, permission.id, Some(granter_id), expires_at),
            None => PermissionGrant::new(grantee_id, permission.id, Some(granter_id)),
        };

        match self.store.insert_grant(grant).await {
            Ok(()) => {}
            Err(RbacError::Conflict { .. }) => {
                let message = format!("User already has permission {code}");
                if record_audit {
                    self.record_refusal(action, granter_id, grantee_id, change, &message).await?;
                }
                return Ok(GrantOutcome {
                    success: false,
                    message,
                    permission_id: Some(permission.id),
                });
            }
            Err(e) => {
                self.record_refusal(action, granter_id, grantee_id, change, &e.to_string()).await?;
                return Err(e);
            }
        }

        self.cache.invalidate_user_permissions(grantee_id).await;

        if record_audit {
            self.audit
                .record(AuditEntry::new(action, AuditEntityType::UserPermission, Some(granter_id)).with_entity(grantee_id).with_change(change))
                .await?;
        }

        info!(granter = %granter_id, grantee = %grantee_id, code = %code, expires = ?expires_at, "Permission granted");

        Ok(GrantOutcome {
            success: true,
            message: format!("Permission {code} granted successfully"),
            permission_id: Some(permission.id),
        })
    }

    /// Revoke a direct permission grant.
    ///
    /// Role-derived permissions cannot be revoked here, only by removing
    /// the role or editing the role's permission set.
    pub async fn revoke(&self, revoker_id: Uuid, user_id: Uuid, code: &str) -> RbacResult<OperationOutcome> {
        self.revoke_one(revoker_id, user_id, code, true).await
    }

    async fn revoke_one(&self, revoker_id: Uuid, user_id: Uuid, code: &str, record_audit: bool) -> RbacResult<OperationOutcome> {
        let change = AuditChange::PermissionRevoke {
            permission_code: code.to_string(),
        };

        let refusal = |message: String| OperationOutcome { success: false, message };

        let (Some(revoker), Some(target)) = (self.store.user(revoker_id).await?, self.store.user(user_id).await?) else {
            let message = "User not found".to_string();
            if record_audit {
                self.record_refusal(AuditAction::RevokePermission, revoker_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        };

        if !revoker.user_type.can_manage(target.user_type) {
            let message = format!("Insufficient user type level. {} cannot manage {}", revoker.user_type, target.user_type);
            if record_audit {
                self.record_refusal(AuditAction::RevokePermission, revoker_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        }

        let Some(permission) = self.resolver.permission_by_code(code).await? else {
            let message = format!("Permission {code} not found");
            if record_audit {
                self.record_refusal(AuditAction::RevokePermission, revoker_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        };

        if !self.store.delete_grant(user_id, permission.id).await? {
            let message = format!("User does not have direct permission {code}");
            if record_audit {
                self.record_refusal(AuditAction::RevokePermission, revoker_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        }

        self.cache.invalidate_user_permissions(user_id).await;

        if record_audit {
            self.audit
                .record(
                    AuditEntry::new(AuditAction::RevokePermission, AuditEntityType::UserPermission, Some(revoker_id))
                        .with_entity(user_id)
                        .with_change(change),
                )
                .await?;
        }

        info!(revoker = %revoker_id, user = %user_id, code = %code, "Permission revoked");

        Ok(OperationOutcome {
            success: true,
            message: format!("Permission {code} revoked successfully"),
        })
    }

    /// Change a user's type; requires the elevator to manage the new type
    pub async fn elevate_user_type(&self, elevator_id: Uuid, target_id: Uuid, new_type: UserType) -> RbacResult<ElevationOutcome> {
        let (Some(elevator), Some(target)) = (self.store.user(elevator_id).await?, self.store.user(target_id).await?) else {
            return Ok(ElevationOutcome {
                success: false,
                message: "User not found".to_string(),
                previous_type: None,
            });
        };

        let previous_type = target.user_type;
        let change = AuditChange::UserTypeChange {
            previous_type,
            new_type,
        };

        if !elevator.user_type.can_manage(new_type) {
            let message = format!("Insufficient user type level. {} cannot elevate to {}", elevator.user_type, new_type);
            self.record_refusal(AuditAction::ElevateUserType, elevator_id, target_id, change, &message).await?;
            return Ok(ElevationOutcome {
                success: false,
                message,
                previous_type: Some(previous_type),
            });
        }

        self.store.set_user_type(target_id, new_type).await?;

        self.audit
            .record(
                AuditEntry::new(AuditAction::ElevateUserType, AuditEntityType::User, Some(elevator_id))
                    .with_entity(target_id)
                    .with_change(change),
            )
            .await?;

        info!(elevator = %elevator_id, target = %target_id, from = %previous_type, to = %new_type, "User type elevated");

        Ok(ElevationOutcome {
            success: true,
            message: format!("User type elevated from {previous_type} to {new_type}"),
            previous_type: Some(previous_type),
        })
    }

    /// Move a temporary grant's expiry
    pub async fn extend_temporary(&self, extender_id: Uuid, user_id: Uuid, code: &str, new_expires_at: DateTime<Utc>) -> RbacResult<ExtensionOutcome> {
        let refusal = |message: String| ExtensionOutcome {
            success: false,
            message,
            old_expires_at: None,
            new_expires_at: None,
        };

        let Some(permission) = self.resolver.permission_by_code(code).await? else {
            return Ok(refusal(format!("Permission {code} not found")));
        };

        let old_expires_at = match self.store.grant(user_id, permission.id).await? {
            Some(grant) => match grant.expires_at {
                Some(expires_at) => expires_at,
                None => return Ok(refusal(format!("User does not have temporary permission {code}"))),
            },
            None => return Ok(refusal(format!("User does not have temporary permission {code}"))),
        };

        let (Some(extender), Some(target)) = (self.store.user(extender_id).await?, self.store.user(user_id).await?) else {
            return Ok(refusal("User not found".to_string()));
        };

        if !extender.user_type.can_manage(target.user_type) {
            return Ok(refusal(format!(
                "Insufficient user type level. {} cannot manage {}",
                extender.user_type, target.user_type
            )));
        }

        self.store.update_grant_expiry(user_id, permission.id, Some(new_expires_at)).await?;
        self.cache.invalidate_user_permissions(user_id).await;

        self.audit
            .record(
                AuditEntry::new(AuditAction::ExtendTemporaryPermission, AuditEntityType::UserPermission, Some(extender_id))
                    .with_entity(user_id)
                    .with_change(AuditChange::TemporaryExtension {
                        permission_code: code.to_string(),
                        old_expires_at,
                        new_expires_at,
                    }),
            )
            .await?;

        Ok(ExtensionOutcome {
            success: true,
            message: format!("Extended temporary permission {code} until {new_expires_at}"),
            old_expires_at: Some(old_expires_at),
            new_expires_at: Some(new_expires_at),
        })
    }

    /// List a user's temporary grants, soonest expiry first
    pub async fn temporary_permissions(&self, user_id: Uuid) -> RbacResult<TemporaryPermissions> {
        let now = Utc::now();
        let mut grants = Vec::new();

        for grant in self.store.grants_for_user(user_id).await? {
            let Some(expires_at) = grant.expires_at else {
                continue;
            };
            let Some(permission) = self.store.permission(grant.permission_id).await? else {
                continue;
            };

            grants.push(TemporaryGrant {
                permission,
                granted_by: grant.granted_by,
                granted_at: grant.granted_at,
                expires_at,
                is_active: expires_at > now,
            });
        }

        grants.sort_by_key(|g| g.expires_at);

        let active_count = grants.iter().filter(|g| g.is_active).count();
        let expired_count = grants.len() - active_count;

        Ok(TemporaryPermissions {
            user_id,
            grants,
            active_count,
            expired_count,
        })
    }

    /// Delete every expired grant in one sweep.
    ///
    /// Idempotent; writes a single summary audit entry when anything was
    /// removed.
    pub async fn cleanup_expired(&self) -> RbacResult<CleanupOutcome> {
        let now = Utc::now();
        let cleaned_count = self.store.delete_expired_grants(now).await?;

        if cleaned_count > 0 {
            self.audit
                .record(
                    AuditEntry::new(AuditAction::CleanupExpiredPermissions, AuditEntityType::System, None)
                        .with_change(AuditChange::Cleanup { cleaned_count }),
                )
                .await?;

            info!(cleaned = cleaned_count, "Expired permission grants cleaned up");
        } else {
            debug!("No expired permission grants to clean up");
        }

        Ok(CleanupOutcome { cleaned_count })
    }

    /// Assign a role to a user
    pub async fn assign_role(&self, assigner_id: Uuid, user_id: Uuid, role_id: Uuid) -> RbacResult<OperationOutcome> {
        self.role_change(assigner_id, user_id, role_id, true, true).await
    }

    /// Remove a role from a user
    pub async fn remove_role(&self, remover_id: Uuid, user_id: Uuid, role_id: Uuid) -> RbacResult<OperationOutcome> {
        self.role_change(remover_id, user_id, role_id, false, true).await
    }

    async fn role_change(&self, actor_id: Uuid, user_id: Uuid, role_id: Uuid, assign: bool, record_audit: bool) -> RbacResult<OperationOutcome> {
        let action = if assign { AuditAction::AssignRole } else { AuditAction::RemoveRole };
        let refusal = |message: String| OperationOutcome { success: false, message };

        let role_name = self.store.role(role_id).await?.map(|r| r.name);
        let change = AuditChange::RoleAssignment {
            role_id,
            role_name: role_name.clone(),
        };

        let (Some(actor), Some(target)) = (self.store.user(actor_id).await?, self.store.user(user_id).await?) else {
            let message = "User not found".to_string();
            if record_audit {
                self.record_refusal(action, actor_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        };

        if !actor.user_type.can_manage(target.user_type) {
            let message = format!("Insufficient user type level. {} cannot manage {}", actor.user_type, target.user_type);
            if record_audit {
                self.record_refusal(action, actor_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        }

        let Some(role_name) = role_name else {
            let message = format!("Role {role_id} not found");
            if record_audit {
                self.record_refusal(action, actor_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        };

        let changed = if assign {
            self.store.add_user_role(user_id, role_id).await?
        } else {
            self.store.remove_user_role(user_id, role_id).await?
        };

        if !changed {
            let message = if assign {
                format!("User already has role {role_name}")
            } else {
                format!("User does not have role {role_name}")
            };
            if record_audit {
                self.record_refusal(action, actor_id, user_id, change, &message).await?;
            }
            return Ok(refusal(message));
        }

        self.cache.invalidate_user_permissions(user_id).await;

        if record_audit {
            self.audit
                .record(AuditEntry::new(action, AuditEntityType::UserRole, Some(actor_id)).with_entity(user_id).with_change(change))
                .await?;
        }

        let verb = if assign { "assigned" } else { "removed" };
        info!(actor = %actor_id, user = %user_id, role = %role_name, "Role {}", verb);

        Ok(OperationOutcome {
            success: true,
            message: format!("Role {role_name} {verb} successfully"),
        })
    }

    /// Grant several permissions to a user; items are independent
    pub async fn bulk_grant(&self, granter_id: Uuid, grantee_id: Uuid, codes: &[&str], expires_at: Option<DateTime<Utc>>) -> RbacResult<BulkOutcome> {
        let mut outcome = BulkOutcome::new(codes.len());

        for code in codes {
            match self
                .grant_one(granter_id, grantee_id, code, expires_at, None, AuditAction::GrantPermission, false)
                .await
            {
                Ok(result) if result.success => outcome.succeed(*code, result.message),
                Ok(result) => outcome.fail(*code, result.message),
                Err(e) => outcome.fail(*code, e.to_string()),
            }
        }

        self.record_bulk(
            AuditAction::BulkGrantPermissions,
            AuditEntityType::UserPermission,
            granter_id,
            grantee_id,
            codes.iter().map(|c| c.to_string()).collect(),
            &outcome,
        )
        .await?;

        Ok(outcome)
    }

    /// Revoke several permissions from a user; items are independent
    pub async fn bulk_revoke(&self, revoker_id: Uuid, user_id: Uuid, codes: &[&str]) -> RbacResult<BulkOutcome> {
        let mut outcome = BulkOutcome::new(codes.len());

        for code in codes {
            match self.revoke_one(revoker_id, user_id, code, false).await {
                Ok(result) if result.success => outcome.succeed(*code, result.message),
                Ok(result) => outcome.fail(*code, result.message),
                Err(e) => outcome.fail(*code, e.to_string()),
            }
        }

        self.record_bulk(
            AuditAction::BulkRevokePermissions,
            AuditEntityType::UserPermission,
            revoker_id,
            user_id,
            codes.iter().map(|c| c.to_string()).collect(),
            &outcome,
        )
        .await?;

        Ok(outcome)
    }

    /// Assign several roles to a user; items are independent
    pub async fn bulk_assign_roles(&self, assigner_id: Uuid, user_id: Uuid, role_ids: &[Uuid]) -> RbacResult<BulkOutcome> {
        let mut outcome = BulkOutcome::new(role_ids.len());

        for role_id in role_ids {
            match self.role_change(assigner_id, user_id, *role_id, true, false).await {
                Ok(result) if result.success => outcome.succeed(role_id.to_string(), result.message),
                Ok(result) => outcome.fail(role_id.to_string(), result.message),
                Err(e) => outcome.fail(role_id.to_string(), e.to_string()),
            }
        }

        self.record_bulk(
            AuditAction::BulkAssignRoles,
            AuditEntityType::UserRole,
            assigner_id,
            user_id,
            role_ids.iter().map(|r| r.to_string()).collect(),
            &outcome,
        )
        .await?;

        Ok(outcome)
    }

    /// Remove several roles from a user; items are independent
    pub async fn bulk_remove_roles(&self, remover_id: Uuid, user_id: Uuid, role_ids: &[Uuid]) -> RbacResult<BulkOutcome> {
        let mut outcome = BulkOutcome::new(role_ids.len());

        for role_id in role_ids {
            match self.role_change(remover_id, user_id, *role_id, false, false).await {
                Ok(result) if result.success => outcome.succeed(role_id.to_string(), result.message),
                Ok(result) => outcome.fail(role_id.to_string(), result.message),
                Err(e) => outcome.fail(role_id.to_string(), e.to_string()),
            }
        }

        self.record_bulk(
            AuditAction::BulkRemoveRoles,
            AuditEntityType::UserRole,
            remover_id,
            user_id,
            role_ids.iter().map(|r| r.to_string()).collect(),
            &outcome,
        )
        .await?;

        Ok(outcome)
    }

    /// Add several permissions to a role's direct set; items are independent
    pub async fn bulk_assign_permissions_to_role(&self, assigner_id: Uuid, role_id: Uuid, codes: &[&str]) -> RbacResult<BulkOutcome> {
        let Some(role) = self.store.role(role_id).await? else {
            return Err(RbacError::not_found(format!("Role {role_id} not found")));
        };

        let mut outcome = BulkOutcome::new(codes.len());

        for code in codes {
            match self.resolver.permission_by_code(code).await {
                Ok(Some(permission)) => match self.store.add_role_permission(role_id, permission.id).await {
                    Ok(true) => outcome.succeed(*code, format!("Permission {code} assigned successfully")),
                    Ok(false) => outcome.fail(*code, format!("Role already has permission {code}")),
                    Err(e) => outcome.fail(*code, e.to_string()),
                },
                Ok(None) => outcome.fail(*code, format!("Permission {code} not found")),
                Err(e) => outcome.fail(*code, e.to_string()),
            }
        }

        // The role's derived sets changed for its whole subtree.
        self.hierarchy.invalidate_subtree(role_id).await?;

        self.record_bulk(
            AuditAction::BulkAssignPermissionsToRole,
            AuditEntityType::RolePermission,
            assigner_id,
            role_id,
            codes.iter().map(|c| c.to_string()).collect(),
            &outcome,
        )
        .await?;

        debug!(role = %role.name, assigned = outcome.success_count, failed = outcome.failed_count, "Bulk role permission assignment");

        Ok(outcome)
    }

    async fn record_refusal(&self, action: AuditAction, actor_id: Uuid, entity_id: Uuid, change: AuditChange, message: &str) -> RbacResult<()> {
        let entity_type = match action {
            AuditAction::AssignRole | AuditAction::RemoveRole => AuditEntityType::UserRole,
            AuditAction::ElevateUserType => AuditEntityType::User,
            _ => AuditEntityType::UserPermission,
        };

        self.audit
            .record(
                AuditEntry::new(action, entity_type, Some(actor_id))
                    .with_entity(entity_id)
                    .with_change(change)
                    .failed(message),
            )
            .await
    }

    async fn record_bulk(&self, action: AuditAction, entity_type: AuditEntityType, actor_id: Uuid, entity_id: Uuid, attempted: Vec<String>, outcome: &BulkOutcome) -> RbacResult<()> {
        let entry = AuditEntry::new(action, entity_type, Some(actor_id)).with_entity(entity_id).with_change(AuditChange::BulkSummary {
            attempted,
            success_count: outcome.success_count,
            failed_count: outcome.failed_count,
        });

        let entry = if outcome.success {
            entry
        } else {
            entry.failed(format!("{} of {} items failed", outcome.failed_count, outcome.total))
        };

        self.audit.record(entry).await
    }

    /// Access to the permission catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Check whether a user may manage a given user type
    pub async fn can_manage_user_type(&self, manager_id: Uuid, target_type: UserType) -> RbacResult<bool> {
        Ok(match self.store.user(manager_id).await? {
            Some(manager) => manager.user_type.can_manage(target_type),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::codes;
    use crate::config::RbacConfig;
    use crate::memory::MemoryStore;
    use crate::model::User;
    use crate::store::GrantStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        gate: AuthorizationGate,
        resolver: Resolver,
    }

    async fn fixture() -> Fixture {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let cache = Arc::new(RbacCache::new(None, &RbacConfig::default()));
        let catalog = Arc::new(Catalog::builtin().unwrap());
        let audit = AuditLog::new(store.clone());
        let hierarchy = RoleHierarchy::new(store.clone(), cache.clone(), audit.clone());
        let resolver = Resolver::new(store.clone(), cache.clone(), hierarchy.clone(), catalog.clone());

        // Seed the full catalog so any code resolves to a row.
        for (code, category) in catalog.all_codes() {
            store.insert_permission(catalog.permission_row(code, category)).await.unwrap();
        }

        let gate = AuthorizationGate::new(store.clone(), cache, resolver.clone(), hierarchy, audit, catalog);

        Fixture { store, gate, resolver }
    }

    impl Fixture {
        async fn user(&self, user_type: UserType) -> Uuid {
            let user = User::new(Uuid::new_v4().to_string(), "u@example.com", user_type);
            let id = user.id;
            self.store.insert_user(user).await.unwrap();
            id
        }

        async fn give(&self, user_id: Uuid, code: &str) {
            let permission = self.store.permission_by_code(code).await.unwrap().unwrap();
            self.store.insert_grant(PermissionGrant::new(user_id, permission.id, None)).await.unwrap();
        }

        async fn audit_entries(&self) -> Vec<AuditEntry> {
            self.store.query_audit(&Default::default()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_risk_gate_refuses_non_admin_regardless_of_holdings() {
        let f = fixture().await;
        let granter = f.user(UserType::User).await;
        let grantee = f.user(UserType::Customer).await;

        // Even holding the permission does not clear the risk gate.
        f.give(granter, codes::USER_DELETE).await;

        let decision = f.gate.can_grant(granter, grantee, codes::USER_DELETE).await.unwrap();
        assert!(!decision.can_grant);
        assert!(decision.reason.contains("CRITICAL"), "unexpected reason: {}", decision.reason);
        assert!(decision.missing_dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_rank_check_precedes_everything_else() {
        let f = fixture().await;
        let granter = f.user(UserType::User).await;
        let grantee = f.user(UserType::Admin).await;

        let decision = f.gate.can_grant(granter, grantee, codes::REPORT_VIEW).await.unwrap();
        assert!(!decision.can_grant);
        assert!(decision.reason.contains("cannot manage"));
    }

    #[tokio::test]
    async fn test_granter_must_hold_permission() {
        let f = fixture().await;
        let granter = f.user(UserType::Admin).await;
        let grantee = f.user(UserType::User).await;

        let decision = f.gate.can_grant(granter, grantee, codes::REPORT_VIEW).await.unwrap();
        assert!(!decision.can_grant);
        assert!(decision.reason.contains("Granter does not have permission"));
    }

    #[tokio::test]
    async fn test_grant_refused_on_missing_dependencies() {
        let f = fixture().await;
        let granter = f.user(UserType::Admin).await;
        let grantee = f.user(UserType::User).await;

        f.give(granter, codes::INVENTORY_ADJUST).await;
        f.give(grantee, codes::INVENTORY_READ).await;
        // Grantee lacks INVENTORY_UPDATE.

        let outcome = f.gate.grant(granter, grantee, codes::INVENTORY_ADJUST, None).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.permission_id.is_none());

        let decision = f.gate.can_grant(granter, grantee, codes::INVENTORY_ADJUST).await.unwrap();
        assert_eq!(decision.missing_dependencies, vec![codes::INVENTORY_UPDATE.to_string()]);

        // No row was inserted and the refusal was audited.
        let grantee_codes = f.resolver.effective_codes(grantee).await.unwrap();
        assert!(!grantee_codes.contains(codes::INVENTORY_ADJUST));

        let entries = f.audit_entries().await;
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].action, AuditAction::GrantPermission);
    }

    #[tokio::test]
    async fn test_grant_revoke_round_trip() {
        let f = fixture().await;
        let granter = f.user(UserType::Admin).await;
        let grantee = f.user(UserType::User).await;

        f.give(granter, codes::REPORT_VIEW).await;

        let before = f.resolver.effective_codes(grantee).await.unwrap();

        let granted = f.gate.grant(granter, grantee, codes::REPORT_VIEW, None).await.unwrap();
        assert!(granted.success);
        assert!(f.resolver.effective_codes(grantee).await.unwrap().contains(codes::REPORT_VIEW));

        let revoked = f.gate.revoke(granter, grantee, codes::REPORT_VIEW).await.unwrap();
        assert!(revoked.success);

        let after = f.resolver.effective_codes(grantee).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_duplicate_grant_refused() {
        let f = fixture().await;
        let granter = f.user(UserType::Admin).await;
        let grantee = f.user(UserType::User).await;

        f.give(granter, codes::REPORT_VIEW).await;

        assert!(f.gate.grant(granter, grantee, codes::REPORT_VIEW, None).await.unwrap().success);

        let duplicate = f.gate.grant(granter, grantee, codes::REPORT_VIEW, None).await.unwrap();
        assert!(!duplicate.success);
        assert!(duplicate.message.contains("already has permission"));
    }

    #[tokio::test]
    async fn test_role_derived_permission_cannot_be_revoked_directly() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;
        let user = f.user(UserType::User).await;

        let role = crate::model::Role::new("Viewer");
        let role_id = role.id;
        f.store.insert_role(role).await.unwrap();
        let permission = f.store.permission_by_code(codes::REPORT_VIEW).await.unwrap().unwrap();
        f.store.add_role_permission(role_id, permission.id).await.unwrap();
        f.store.add_user_role(user, role_id).await.unwrap();

        assert!(f.resolver.effective_codes(user).await.unwrap().contains(codes::REPORT_VIEW));

        let outcome = f.gate.revoke(admin, user, codes::REPORT_VIEW).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("does not have direct permission"));
    }

    #[tokio::test]
    async fn test_elevation() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;
        let customer = f.user(UserType::Customer).await;

        let outcome = f.gate.elevate_user_type(admin, customer, UserType::User).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.previous_type, Some(UserType::Customer));
        assert_eq!(f.store.user(customer).await.unwrap().unwrap().user_type, UserType::User);

        // An admin cannot mint another admin.
        let refused = f.gate.elevate_user_type(admin, customer, UserType::Admin).await.unwrap();
        assert!(!refused.success);
        assert_eq!(f.store.user(customer).await.unwrap().unwrap().user_type, UserType::User);
    }

    #[tokio::test]
    async fn test_temporary_grant_and_cleanup_idempotence() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;
        let user = f.user(UserType::User).await;

        f.give(admin, codes::REPORT_VIEW).await;

        let expired = Utc::now() - chrono::Duration::minutes(1);
        let permission = f.store.permission_by_code(codes::REPORT_VIEW).await.unwrap().unwrap();
        f.store
            .insert_grant(PermissionGrant::temporary(user, permission.id, Some(admin), expired))
            .await
            .unwrap();

        let listing = f.gate.temporary_permissions(user).await.unwrap();
        assert_eq!(listing.expired_count, 1);
        assert_eq!(listing.active_count, 0);

        let first = f.gate.cleanup_expired().await.unwrap();
        assert_eq!(first.cleaned_count, 1);

        let second = f.gate.cleanup_expired().await.unwrap();
        assert_eq!(second.cleaned_count, 0);

        // Exactly one summary audit entry for the sweep that removed rows.
        let sweeps: Vec<_> = f
            .audit_entries()
            .await
            .into_iter()
            .filter(|e| e.action == AuditAction::CleanupExpiredPermissions)
            .collect();
        assert_eq!(sweeps.len(), 1);
        assert_eq!(
            sweeps[0].change,
            Some(AuditChange::Cleanup { cleaned_count: 1 })
        );
        assert_eq!(sweeps[0].actor, None);
    }

    #[tokio::test]
    async fn test_extend_temporary() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;
        let user = f.user(UserType::User).await;

        f.give(admin, codes::REPORT_VIEW).await;

        let expires = Utc::now() + chrono::Duration::hours(1);
        let granted = f
            .gate
            .grant_temporary(admin, user, codes::REPORT_VIEW, expires, Some("incident response".to_string()))
            .await
            .unwrap();
        assert!(granted.success);

        let new_expires = expires + chrono::Duration::hours(4);
        let extended = f.gate.extend_temporary(admin, user, codes::REPORT_VIEW, new_expires).await.unwrap();
        assert!(extended.success);
        assert_eq!(extended.old_expires_at, Some(expires));
        assert_eq!(extended.new_expires_at, Some(new_expires));

        // A permanent grant cannot be extended.
        f.give(user, codes::AUDIT_VIEW).await;
        let refused = f.gate.extend_temporary(admin, user, codes::AUDIT_VIEW, new_expires).await.unwrap();
        assert!(!refused.success);
        assert!(refused.message.contains("temporary"));
    }

    #[tokio::test]
    async fn test_bulk_grant_partial_success() {
        let f = fixture().await;
        let granter = f.user(UserType::Admin).await;
        let grantee = f.user(UserType::User).await;

        for code in [codes::REPORT_VIEW, codes::REPORT_EXPORT, codes::AUDIT_VIEW, codes::SALE_READ] {
            f.give(granter, code).await;
        }

        let attempted = [codes::REPORT_VIEW, codes::REPORT_EXPORT, codes::AUDIT_VIEW, codes::SALE_READ, "NO_SUCH_PERMISSION"];
        let outcome = f.gate.bulk_grant(granter, grantee, &attempted, None).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.total, 5);
        assert_eq!(outcome.success_count, 4);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.failed_items[0].item, "NO_SUCH_PERMISSION");

        // The four valid grants persisted despite the failure.
        let held = f.resolver.effective_codes(grantee).await.unwrap();
        assert!(held.contains(codes::REPORT_VIEW));
        assert!(held.contains(codes::SALE_READ));

        // One summary entry, not one per item.
        let entries = f.audit_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::BulkGrantPermissions);
        assert!(!entries[0].success);
        match &entries[0].change {
            Some(AuditChange::BulkSummary {
                attempted,
                success_count,
                failed_count,
            }) => {
                assert_eq!(attempted.len(), 5);
                assert_eq!(*success_count, 4);
                assert_eq!(*failed_count, 1);
            }
            other => panic!("unexpected change payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bulk_role_assignment() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;
        let user = f.user(UserType::User).await;

        let viewer = crate::model::Role::new("Viewer");
        let viewer_id = viewer.id;
        f.store.insert_role(viewer).await.unwrap();

        let missing = Uuid::new_v4();
        let outcome = f.gate.bulk_assign_roles(admin, user, &[viewer_id, missing]).await.unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(f.store.user_role_ids(user).await.unwrap(), vec![viewer_id]);
    }

    #[tokio::test]
    async fn test_bulk_assign_permissions_to_role() {
        let f = fixture().await;
        let admin = f.user(UserType::Admin).await;

        let role = crate::model::Role::new("Analyst");
        let role_id = role.id;
        f.store.insert_role(role).await.unwrap();

        let outcome = f
            .gate
            .bulk_assign_permissions_to_role(admin, role_id, &[codes::REPORT_VIEW, codes::REPORT_VIEW, "BOGUS"])
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 2);

        let err = f.gate.bulk_assign_permissions_to_role(admin, Uuid::new_v4(), &[codes::REPORT_VIEW]).await.unwrap_err();
        assert!(matches!(err, RbacError::NotFound { .. }));
    }
}
