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

//! Configuration for the RBAC engine

use std::env;
use std::time::Duration;

/// Configuration for the RBAC engine
#[derive(Debug, Clone)]
pub struct RbacConfig {
    /// TTL for cached user and role permission sets
    pub permission_cache_ttl: Duration,

    /// TTL for cached role hierarchy lookups
    pub hierarchy_cache_ttl: Duration,

    /// TTL for cached permission rows and dependency listings
    pub dependency_cache_ttl: Duration,

    /// Upper bound on a single cache backend operation
    pub cache_op_timeout: Duration,

    /// Interval between expired-grant cleanup sweeps
    pub cleanup_interval: Duration,

    /// Maximum page size for audit log queries
    pub audit_query_limit: usize,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            permission_cache_ttl: Duration::from_secs(3600),
            hierarchy_cache_ttl: Duration::from_secs(7200),
            dependency_cache_ttl: Duration::from_secs(14400),
            cache_op_timeout: Duration::from_millis(250),
            cleanup_interval: Duration::from_secs(3600),
            audit_query_limit: 100,
        }
    }
}

impl RbacConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            permission_cache_ttl: env_secs("WARDEN_PERMISSION_CACHE_TTL_SECS", defaults.permission_cache_ttl),

            hierarchy_cache_ttl: env_secs("WARDEN_HIERARCHY_CACHE_TTL_SECS", defaults.hierarchy_cache_ttl),

            dependency_cache_ttl: env_secs("WARDEN_DEPENDENCY_CACHE_TTL_SECS", defaults.dependency_cache_ttl),

            cache_op_timeout: env::var("WARDEN_CACHE_OP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.cache_op_timeout),

            cleanup_interval: env_secs("WARDEN_CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),

            audit_query_limit: env::var("WARDEN_AUDIT_QUERY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.audit_query_limit),
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name).ok().and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(default)
}
