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

//! Core RBAC entities: users, roles, grants, and hierarchy edges

use crate::error::{RbacError, RbacResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User type hierarchy for organizational structure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Superadmin,
    Admin,
    User,
    Customer,
}

impl UserType {
    /// Check if this user type can manage another user type.
    ///
    /// SUPERADMIN manages everyone, ADMIN manages USER and CUSTOMER, USER
    /// manages CUSTOMER, CUSTOMER manages no one.
    pub fn can_manage(self, target: UserType) -> bool {
        match self {
            UserType::Superadmin => true,
            UserType::Admin => matches!(target, UserType::User | UserType::Customer),
            UserType::User => matches!(target, UserType::Customer),
            UserType::Customer => false,
        }
    }

    /// Whether this user type clears the risk gate for high-risk grants
    pub fn is_admin(self) -> bool {
        matches!(self, UserType::Superadmin | UserType::Admin)
    }

    /// Canonical string form
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Superadmin => "SUPERADMIN",
            UserType::Admin => "ADMIN",
            UserType::User => "USER",
            UserType::Customer => "CUSTOMER",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = RbacError;

    fn from_str(s: &str) -> RbacResult<Self> {
        match s {
            "SUPERADMIN" => Ok(UserType::Superadmin),
            "ADMIN" => Ok(UserType::Admin),
            "USER" => Ok(UserType::User),
            "CUSTOMER" => Ok(UserType::Customer),
            other => Err(RbacError::validation(format!("Invalid user type: {other}"))),
        }
    }
}

/// A caller identity as supplied by the authentication boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,

    /// Unique username
    pub username: String,

    /// User email address
    pub email: String,

    /// Position in the management hierarchy
    pub user_type: UserType,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user
    pub fn new(username: impl Into<String>, email: impl Into<String>, user_type: UserType) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            user_type,
            created_at: Utc::now(),
        }
    }
}

/// Pre-defined role archetypes with standardized permission sets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleTemplate {
    Superadmin,
    Admin,
    Manager,
    Staff,
    Auditor,
}

impl RoleTemplate {
    /// All known templates, in seeding order
    pub fn all() -> [RoleTemplate; 5] {
        [RoleTemplate::Superadmin, RoleTemplate::Admin, RoleTemplate::Manager, RoleTemplate::Staff, RoleTemplate::Auditor]
    }

    /// Canonical role name for this template
    pub fn role_name(self) -> &'static str {
        match self {
            RoleTemplate::Superadmin => "Superadmin",
            RoleTemplate::Admin => "Admin",
            RoleTemplate::Manager => "Manager",
            RoleTemplate::Staff => "Staff",
            RoleTemplate::Auditor => "Auditor",
        }
    }
}

/// Role definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Unique role identifier
    pub id: Uuid,

    /// Unique role name
    pub name: String,

    /// Role description
    pub description: Option<String>,

    /// Template this role was created from, if any
    pub template: Option<RoleTemplate>,

    /// Whether this is a system-defined role
    pub is_system: bool,

    /// Whether this role may be deleted
    pub can_be_deleted: bool,

    /// Role creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            template: None,
            is_system: false,
            can_be_deleted: true,
            created_at: Utc::now(),
        }
    }

    /// Create a system role from a template
    pub fn from_template(template: RoleTemplate, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: template.role_name().to_string(),
            description: Some(description.into()),
            template: Some(template),
            is_system: true,
            can_be_deleted: false,
            created_at: Utc::now(),
        }
    }
}

/// A direct permission assignment to a user, optionally time-bounded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionGrant {
    /// User holding the grant
    pub user_id: Uuid,

    /// Permission being granted
    pub permission_id: Uuid,

    /// Who granted it (None for system actions)
    pub granted_by: Option<Uuid>,

    /// When it was granted
    pub granted_at: DateTime<Utc>,

    /// Expiration for temporary grants; None means permanent
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    /// Create a permanent grant
    pub fn new(user_id: Uuid, permission_id: Uuid, granted_by: Option<Uuid>) -> Self {
        Self {
            user_id,
            permission_id,
            granted_by,
            granted_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Create a temporary grant
    pub fn temporary(user_id: Uuid, permission_id: Uuid, granted_by: Option<Uuid>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            permission_id,
            granted_by,
            granted_at: Utc::now(),
            expires_at: Some(expires_at),
        }
    }

    /// Check whether the grant has expired as of `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

/// A parent -> child relationship between roles
///
/// Unique per (parent, child) pair. `inherit_permissions` controls whether
/// the child's effective set includes the parent's permissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HierarchyEdge {
    /// Parent role
    pub parent_role_id: Uuid,

    /// Child role
    pub child_role_id: Uuid,

    /// Whether the child inherits the parent's permissions
    pub inherit_permissions: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_rank() {
        assert!(UserType::Superadmin.can_manage(UserType::Superadmin));
        assert!(UserType::Superadmin.can_manage(UserType::Admin));
        assert!(UserType::Admin.can_manage(UserType::User));
        assert!(UserType::Admin.can_manage(UserType::Customer));
        assert!(!UserType::Admin.can_manage(UserType::Admin));
        assert!(!UserType::Admin.can_manage(UserType::Superadmin));
        assert!(UserType::User.can_manage(UserType::Customer));
        assert!(!UserType::User.can_manage(UserType::User));
        assert!(!UserType::Customer.can_manage(UserType::Customer));
    }

    #[test]
    fn test_user_type_parsing() {
        assert_eq!("ADMIN".parse::<UserType>().unwrap(), UserType::Admin);
        assert!("admin".parse::<UserType>().is_err());
        assert!("OWNER".parse::<UserType>().is_err());
    }

    #[test]
    fn test_grant_expiry() {
        let now = Utc::now();
        let permanent = PermissionGrant::new(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(!permanent.is_expired_at(now));

        let expired = PermissionGrant::temporary(Uuid::new_v4(), Uuid::new_v4(), None, now - chrono::Duration::hours(1));
        assert!(expired.is_expired_at(now));

        let live = PermissionGrant::temporary(Uuid::new_v4(), Uuid::new_v4(), None, now + chrono::Duration::hours(1));
        assert!(!live.is_expired_at(now));
    }

    #[test]
    fn test_template_role() {
        let role = Role::from_template(RoleTemplate::Auditor, "Read-only audit access");

        assert_eq!(role.name, "Auditor");
        assert!(role.is_system);
        assert!(!role.can_be_deleted);
    }
}
