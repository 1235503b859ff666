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

//! Warden RBAC resolution engine
//!
//! Determines what an identity is authorized to do: resolves effective
//! permission sets over a cycle-safe role hierarchy, validates permission
//! dependencies, enforces grant/revoke authorization by user-type rank and
//! permission risk level, expires temporary grants, caches resolved sets
//! with explicit invalidation, and appends an audit entry for every
//! mutation.

pub mod audit;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod hierarchy;
pub mod memory;
pub mod model;
pub mod resolver;
pub mod store;

pub use audit::{AuditAction, AuditChange, AuditEntityType, AuditEntry, AuditLog, AuditQuery, AuditStatistics};
pub use cache::{CacheBackend, CacheHealth, CacheStats, MemoryCache, RbacCache};
pub use catalog::{Catalog, DependencyGraph, Permission, PermissionCategory, RiskLevel, codes};
pub use config::RbacConfig;
pub use engine::{EngineHealth, RbacEngine, SeedSummary};
pub use error::{RbacError, RbacResult};
pub use gate::{
    AuthorizationGate, BulkFailure, BulkItem, BulkOutcome, CleanupOutcome, ElevationOutcome, ExtensionOutcome, GrantDecision, GrantOutcome, OperationOutcome,
    TemporaryGrant, TemporaryPermissions,
};
pub use hierarchy::RoleHierarchy;
pub use memory::MemoryStore;
pub use model::{HierarchyEdge, PermissionGrant, Role, RoleTemplate, User, UserType};
pub use resolver::{EffectivePermissions, PermissionCheck, PermissionSource, Resolver, SourcedPermission};
pub use store::GrantStore;
