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

//! Permission caching for performance optimization
//!
//! The cache is advisory and never a dependency for correctness or
//! availability: the engine runs with no backend at all, a read that times
//! out degrades to a miss, and a write failure never fails the mutation that
//! triggered it. Whole serialized collections are stored per key.

use crate::catalog::Permission;
use crate::config::RbacConfig;
use crate::error::RbacResult;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const KEY_PREFIX: &str = "rbac:";

/// External cache collaborator
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value; None on miss
    async fn get(&self, key: &str) -> RbacResult<Option<String>>;

    /// Store a value with a TTL
    async fn set(&self, key: &str, value: String, ttl: Duration) -> RbacResult<()>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> RbacResult<bool>;

    /// Delete every key starting with the prefix; returns the count removed
    async fn delete_prefix(&self, prefix: &str) -> RbacResult<usize>;
}

/// Cache entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// In-memory TTL cache backend
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries; returns the count evicted
    pub fn evict_expired(&self) -> usize {
        let mut evicted = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                evicted += 1;
                false
            } else {
                true
            }
        });

        evicted
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> RbacResult<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Lazily drop the expired entry.
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> RbacResult<()> {
        self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> RbacResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> RbacResult<usize> {
        let mut removed = 0;

        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed += 1;
                false
            } else {
                true
            }
        });

        Ok(removed)
    }
}

/// Cache statistics snapshot
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    /// Total cache hits
    pub hits: u64,

    /// Total cache misses
    pub misses: u64,

    /// Reads that timed out or errored and degraded to a miss
    pub degraded_reads: u64,

    /// Writes that failed and were dropped
    pub dropped_writes: u64,
}

impl CacheStats {
    /// Calculate hit ratio
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 { 0.0 } else { self.hits as f64 / (self.hits + self.misses) as f64 }
    }
}

/// Cache health probe result
#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    /// Whether the backend passed the probe (None when caching is disabled)
    pub healthy: Option<bool>,

    /// Current statistics
    pub stats: CacheStats,
}

/// Typed cache facade over an optional backend
///
/// Owns key construction, per-concern TTLs, and JSON serialization. A `None`
/// backend is persistence-only mode: every read misses, every write is a
/// no-op.
pub struct RbacCache {
    backend: Option<Arc<dyn CacheBackend>>,
    permission_ttl: Duration,
    hierarchy_ttl: Duration,
    dependency_ttl: Duration,
    op_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    degraded_reads: AtomicU64,
    dropped_writes: AtomicU64,
}

impl RbacCache {
    /// Create the cache facade
    pub fn new(backend: Option<Arc<dyn CacheBackend>>, config: &RbacConfig) -> Self {
        Self {
            backend,
            permission_ttl: config.permission_cache_ttl,
            hierarchy_ttl: config.hierarchy_cache_ttl,
            dependency_ttl: config.dependency_cache_ttl,
            op_timeout: config.cache_op_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            degraded_reads: AtomicU64::new(0),
            dropped_writes: AtomicU64::new(0),
        }
    }

    /// Whether a backend is configured
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    // Key builders

    fn user_permissions_key(user_id: Uuid) -> String {
        format!("{KEY_PREFIX}user_permissions:{user_id}")
    }

    fn role_permissions_key(role_id: Uuid) -> String {
        format!("{KEY_PREFIX}role_permissions:{role_id}")
    }

    fn role_hierarchy_key(role_id: Uuid) -> String {
        format!("{KEY_PREFIX}role_hierarchy:{role_id}")
    }

    fn permission_deps_key(permission_id: Uuid) -> String {
        format!("{KEY_PREFIX}permission_deps:{permission_id}")
    }

    fn permission_code_key(code: &str) -> String {
        format!("{KEY_PREFIX}permission_code:{code}")
    }

    // User permission sets

    /// Get a cached user permission set
    pub async fn get_user_permissions(&self, user_id: Uuid) -> Option<Vec<Permission>> {
        self.get_json(&Self::user_permissions_key(user_id)).await
    }

    /// Cache a user permission set
    pub async fn set_user_permissions(&self, user_id: Uuid, permissions: &[Permission]) {
        self.set_json(&Self::user_permissions_key(user_id), &permissions, self.permission_ttl).await;
    }

    /// Invalidate a user's cached permission set
    pub async fn invalidate_user_permissions(&self, user_id: Uuid) {
        self.delete(&Self::user_permissions_key(user_id)).await;
    }

    /// Invalidate every cached user permission set.
    ///
    /// Used when a role's derived state changes: the affected user set is
    /// not enumerable without an inverse index.
    pub async fn invalidate_all_user_permissions(&self) {
        self.delete_prefix(&format!("{KEY_PREFIX}user_permissions:")).await;
    }

    // Role permission sets

    /// Get a cached role permission set (direct + inherited)
    pub async fn get_role_permissions(&self, role_id: Uuid) -> Option<Vec<Permission>> {
        self.get_json(&Self::role_permissions_key(role_id)).await
    }

    /// Cache a role permission set
    pub async fn set_role_permissions(&self, role_id: Uuid, permissions: &[Permission]) {
        self.set_json(&Self::role_permissions_key(role_id), &permissions, self.permission_ttl).await;
    }

    /// Invalidate a role's cached permission set
    pub async fn invalidate_role_permissions(&self, role_id: Uuid) {
        self.delete(&Self::role_permissions_key(role_id)).await;
    }

    // Role hierarchy

    /// Get a cached ancestor list
    pub async fn get_role_hierarchy(&self, role_id: Uuid) -> Option<Vec<Uuid>> {
        self.get_json(&Self::role_hierarchy_key(role_id)).await
    }

    /// Cache an ancestor list
    pub async fn set_role_hierarchy(&self, role_id: Uuid, ancestors: &[Uuid]) {
        self.set_json(&Self::role_hierarchy_key(role_id), &ancestors, self.hierarchy_ttl).await;
    }

    /// Invalidate a role's cached ancestor list
    pub async fn invalidate_role_hierarchy(&self, role_id: Uuid) {
        self.delete(&Self::role_hierarchy_key(role_id)).await;
    }

    // Permission dependencies

    /// Get cached resolved dependency rows for a permission
    pub async fn get_permission_dependencies(&self, permission_id: Uuid) -> Option<Vec<Permission>> {
        self.get_json(&Self::permission_deps_key(permission_id)).await
    }

    /// Cache resolved dependency rows for a permission
    pub async fn set_permission_dependencies(&self, permission_id: Uuid, dependencies: &[Permission]) {
        self.set_json(&Self::permission_deps_key(permission_id), &dependencies, self.dependency_ttl).await;
    }

    /// Invalidate cached dependency rows for a permission
    pub async fn invalidate_permission_dependencies(&self, permission_id: Uuid) {
        self.delete(&Self::permission_deps_key(permission_id)).await;
    }

    // Permission by code

    /// Get a cached permission row
    pub async fn get_permission_by_code(&self, code: &str) -> Option<Permission> {
        self.get_json(&Self::permission_code_key(code)).await
    }

    /// Cache a permission row
    pub async fn set_permission_by_code(&self, permission: &Permission) {
        self.set_json(&Self::permission_code_key(&permission.code), permission, self.dependency_ttl).await;
    }

    /// Invalidate a cached permission row
    pub async fn invalidate_permission_by_code(&self, code: &str) {
        self.delete(&Self::permission_code_key(code)).await;
    }

    // Administration

    /// Clear every engine cache entry; returns the count removed
    pub async fn clear_all(&self) -> usize {
        self.delete_prefix(KEY_PREFIX).await
    }

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            degraded_reads: self.degraded_reads.load(Ordering::Relaxed),
            dropped_writes: self.dropped_writes.load(Ordering::Relaxed),
        }
    }

    /// Probe the backend with a set/get/delete round trip
    pub async fn health_check(&self) -> CacheHealth {
        let Some(backend) = &self.backend else {
            return CacheHealth {
                healthy: None,
                stats: self.stats(),
            };
        };

        let key = format!("{KEY_PREFIX}health_check");
        let probe = async {
            backend.set(&key, "ok".to_string(), Duration::from_secs(60)).await?;
            let value = backend.get(&key).await?;
            backend.delete(&key).await?;
            Ok::<_, crate::error::RbacError>(value.as_deref() == Some("ok"))
        };

        let healthy = match tokio::time::timeout(self.op_timeout, probe).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                warn!(error = %e, "Cache health probe failed");
                false
            }
            Err(_) => {
                warn!("Cache health probe timed out");
                false
            }
        };

        CacheHealth {
            healthy: Some(healthy),
            stats: self.stats(),
        }
    }

    // Internals

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;

        let raw = match tokio::time::timeout(self.op_timeout, backend.get(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache read failed, degrading to store");
                return None;
            }
            Err(_) => {
                self.degraded_reads.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "Cache read timed out, degrading to store");
                return None;
            }
        };

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    // Unreadable payloads are treated as misses and dropped.
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "Cache payload undecodable, dropping entry");
                    self.delete(key).await;
                    None
                }
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(backend) = &self.backend else {
            return;
        };

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                self.dropped_writes.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache payload unserializable, dropping write");
                return;
            }
        };

        match tokio::time::timeout(self.op_timeout, backend.set(key, raw, ttl)).await {
            Ok(Ok(())) => debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached"),
            Ok(Err(e)) => {
                self.dropped_writes.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache write failed, dropping");
            }
            Err(_) => {
                self.dropped_writes.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "Cache write timed out, dropping");
            }
        }
    }

    async fn delete(&self, key: &str) {
        let Some(backend) = &self.backend else {
            return;
        };

        match tokio::time::timeout(self.op_timeout, backend.delete(key)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(key = %key, error = %e, "Cache invalidation failed"),
            Err(_) => warn!(key = %key, "Cache invalidation timed out"),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };

        match tokio::time::timeout(self.op_timeout, backend.delete_prefix(prefix)).await {
            Ok(Ok(removed)) => removed,
            Ok(Err(e)) => {
                warn!(prefix = %prefix, error = %e, "Cache prefix invalidation failed");
                0
            }
            Err(_) => {
                warn!(prefix = %prefix, "Cache prefix invalidation timed out");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, PermissionCategory, codes};

    fn test_cache(backend: Option<Arc<dyn CacheBackend>>) -> RbacCache {
        RbacCache::new(backend, &RbacConfig::default())
    }

    fn sample_permission() -> Permission {
        Catalog::builtin().unwrap().permission_row(codes::USER_READ, PermissionCategory::UserManagement)
    }

    #[tokio::test]
    async fn test_round_trip_and_stats() {
        let cache = test_cache(Some(Arc::new(MemoryCache::new())));
        let user_id = Uuid::new_v4();
        let permission = sample_permission();

        assert!(cache.get_user_permissions(user_id).await.is_none());

        cache.set_user_permissions(user_id, std::slice::from_ref(&permission)).await;
        let cached = cache.get_user_permissions(user_id).await.unwrap();

        // The cached row is fully reconstructed, not a partial view.
        assert_eq!(cached, vec![permission]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_disabled_backend_is_a_no_op() {
        let cache = test_cache(None);
        let user_id = Uuid::new_v4();

        cache.set_user_permissions(user_id, &[sample_permission()]).await;
        assert!(cache.get_user_permissions(user_id).await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);

        let health = cache.health_check().await;
        assert_eq!(health.healthy, None);
    }

    #[tokio::test]
    async fn test_invalidation() {
        let cache = test_cache(Some(Arc::new(MemoryCache::new())));
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let permission = sample_permission();

        cache.set_user_permissions(user_id, std::slice::from_ref(&permission)).await;
        cache.set_user_permissions(other, std::slice::from_ref(&permission)).await;

        cache.invalidate_user_permissions(user_id).await;
        assert!(cache.get_user_permissions(user_id).await.is_none());
        assert!(cache.get_user_permissions(other).await.is_some());

        cache.invalidate_all_user_permissions().await;
        assert!(cache.get_user_permissions(other).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_all_only_touches_engine_keys() {
        let backend = Arc::new(MemoryCache::new());
        backend.set("unrelated:key", "value".to_string(), Duration::from_secs(60)).await.unwrap();

        let cache = test_cache(Some(backend.clone()));
        cache.set_permission_by_code(&sample_permission()).await;

        assert_eq!(cache.clear_all().await, 1);
        assert_eq!(backend.get("unrelated:key").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let backend = MemoryCache::new();
        backend.set("k", "v".to_string(), Duration::from_millis(0)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.evict_expired(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let cache = test_cache(Some(Arc::new(MemoryCache::new())));
        let health = cache.health_check().await;
        assert_eq!(health.healthy, Some(true));
    }
}
