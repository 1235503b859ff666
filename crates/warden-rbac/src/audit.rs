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

//! Audit logging for RBAC operations
//!
//! Every state-changing operation writes exactly one entry per logical
//! operation; batches write one summary entry, not one per sub-item.
//! Entries are append-only and immutable once written.

use crate::error::RbacResult;
use crate::model::UserType;
use crate::store::GrantStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Audited RBAC actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    GrantPermission,
    GrantTemporaryPermission,
    ExtendTemporaryPermission,
    RevokePermission,
    ElevateUserType,
    AssignRole,
    RemoveRole,
    AddRoleHierarchy,
    RemoveRoleHierarchy,
    BulkGrantPermissions,
    BulkRevokePermissions,
    BulkAssignRoles,
    BulkRemoveRoles,
    BulkAssignPermissionsToRole,
    CleanupExpiredPermissions,
}

/// Entity kinds an audit entry can reference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    User,
    UserPermission,
    UserRole,
    RolePermission,
    RoleHierarchy,
    System,
}

/// Structured diff payload, discriminated per action kind.
///
/// Serialized as an opaque JSON blob at the storage boundary; in memory each
/// action's expected fields are statically known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditChange {
    /// A permission grant (permanent or temporary)
    PermissionGrant {
        permission_code: String,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    },

    /// A direct permission revocation
    PermissionRevoke { permission_code: String },

    /// An expiry change on a temporary grant
    TemporaryExtension {
        permission_code: String,
        old_expires_at: DateTime<Utc>,
        new_expires_at: DateTime<Utc>,
    },

    /// A user type elevation
    UserTypeChange { previous_type: UserType, new_type: UserType },

    /// A role assignment or removal
    RoleAssignment { role_id: Uuid, role_name: Option<String> },

    /// A role hierarchy edge addition or removal
    HierarchyChange {
        parent_role_id: Uuid,
        child_role_id: Uuid,
        inherit_permissions: Option<bool>,
    },

    /// Summary of a bulk operation
    BulkSummary {
        attempted: Vec<String>,
        success_count: usize,
        failed_count: usize,
    },

    /// Summary of an expired-grant cleanup sweep
    Cleanup { cleaned_count: usize },
}

/// An append-only audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    /// Unique entry identifier
    pub id: Uuid,

    /// Acting user (None for system actions such as scheduled cleanup)
    pub actor: Option<Uuid>,

    /// Action performed
    pub action: AuditAction,

    /// Entity kind the action applied to
    pub entity_type: AuditEntityType,

    /// Entity the action applied to
    pub entity_id: Option<Uuid>,

    /// Structured change payload
    pub change: Option<AuditChange>,

    /// Whether the operation succeeded
    pub success: bool,

    /// Refusal reason or error detail when the operation failed
    pub error_message: Option<String>,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a successful audit entry
    pub fn new(action: AuditAction, entity_type: AuditEntityType, actor: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            action,
            entity_type,
            entity_id: None,
            change: None,
            success: true,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the target entity
    pub fn with_entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    /// Attach a change payload
    pub fn with_change(mut self, change: AuditChange) -> Self {
        self.change = Some(change);
        self
    }

    /// Mark the entry failed with a reason
    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error_message.into());
        self
    }
}

/// Filter for audit log queries. Results are ordered newest-first.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Filter by acting user
    pub actor: Option<Uuid>,

    /// Filter by action
    pub action: Option<AuditAction>,

    /// Filter by entity kind
    pub entity_type: Option<AuditEntityType>,

    /// Only entries at or after this time
    pub since: Option<DateTime<Utc>>,

    /// Only entries at or before this time
    pub until: Option<DateTime<Utc>>,

    /// Filter by outcome
    pub success: Option<bool>,

    /// Page size (0 means the store default)
    pub limit: usize,

    /// Entries to skip
    pub offset: usize,
}

impl AuditQuery {
    /// Whether an entry matches every set filter
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = self.actor {
            if entry.actor != Some(actor) {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(entity_type) = self.entity_type {
            if entry.entity_type != entity_type {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        true
    }
}

/// Aggregate audit statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    /// Total number of entries
    pub total_entries: usize,

    /// Number of successful operations
    pub successful_entries: usize,

    /// Number of failed operations
    pub failed_entries: usize,

    /// Entries per action
    pub entries_by_action: HashMap<AuditAction, usize>,
}

/// Audit log writer and query surface over the grant store
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn GrantStore>,
}

impl AuditLog {
    /// Create an audit log backed by the given store
    pub fn new(store: Arc<dyn GrantStore>) -> Self {
        Self { store }
    }

    /// Append an entry, mirroring it to structured logging
    pub async fn record(&self, entry: AuditEntry) -> RbacResult<()> {
        if entry.success {
            info!(
                action = ?entry.action,
                actor = ?entry.actor,
                entity_type = ?entry.entity_type,
                entity_id = ?entry.entity_id,
                "Audit event"
            );
        } else {
            warn!(
                action = ?entry.action,
                actor = ?entry.actor,
                entity_type = ?entry.entity_type,
                entity_id = ?entry.entity_id,
                error = ?entry.error_message,
                "Audit event failed"
            );
        }

        self.store.append_audit(entry).await
    }

    /// Query entries newest-first with filtering and pagination
    pub async fn query(&self, query: &AuditQuery) -> RbacResult<Vec<AuditEntry>> {
        self.store.query_audit(query).await
    }

    /// Aggregate statistics over all entries
    pub async fn statistics(&self) -> RbacResult<AuditStatistics> {
        self.store.audit_statistics().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_builder() {
        let actor = Uuid::new_v4();
        let target = Uuid::new_v4();

        let entry = AuditEntry::new(AuditAction::GrantPermission, AuditEntityType::UserPermission, Some(actor))
            .with_entity(target)
            .with_change(AuditChange::PermissionGrant {
                permission_code: "USER_READ".to_string(),
                expires_at: None,
                reason: None,
            });

        assert!(entry.success);
        assert_eq!(entry.actor, Some(actor));
        assert_eq!(entry.entity_id, Some(target));

        let refused = entry.clone().failed("Granter does not have permission USER_READ");
        assert!(!refused.success);
        assert!(refused.error_message.is_some());
    }

    #[test]
    fn test_change_payload_round_trip() {
        let change = AuditChange::UserTypeChange {
            previous_type: UserType::User,
            new_type: UserType::Admin,
        };

        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("user_type_change"));

        let back: AuditChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn test_query_matching() {
        let actor = Uuid::new_v4();
        let entry = AuditEntry::new(AuditAction::RevokePermission, AuditEntityType::UserPermission, Some(actor));

        let mut query = AuditQuery::default();
        assert!(query.matches(&entry));

        query.action = Some(AuditAction::RevokePermission);
        query.actor = Some(actor);
        query.success = Some(true);
        assert!(query.matches(&entry));

        query.success = Some(false);
        assert!(!query.matches(&entry));
    }
}
