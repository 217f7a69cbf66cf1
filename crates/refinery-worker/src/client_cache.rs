// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-tenant cache of delegated-credential clients.
//!
//! Building a tenant client means an STS round trip, so clients are cached per
//! `{resource kind, tenant, region}` for slightly less than the lifetime of
//! the credentials they were built from.
//!
//! # Locking
//!
//! - `entries` is a `DashMap`; reading a live entry takes no other lock.
//! - `locks` is a registry of per-key async mutexes. The registry's own
//!   `std::sync::Mutex` is held only long enough to fetch or create one of
//!   them, never across an await.
//! - The per-key mutex serializes assume-role + construct for that key, so a
//!   stampede of first-time callers for one tenant costs one assumption while
//!   other tenants proceed in parallel.
//! - A per-key mutex is dropped from the registry once no caller holds or
//!   waits on it, so the registry only holds keys with a fill in flight.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::cloud::{
    CachedClient, CloudProvider, FunctionClient, ObjectStore, QueueClient, ResourceKind,
    TopicClient,
};
use crate::config::WorkerConfig;
use crate::error::{ActivityError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: ResourceKind,
    tenant_id: String,
    region: String,
}

struct CacheEntry {
    client: CachedClient,
    created_at: DateTime<Utc>,
    ttl: TimeDelta,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.created_at + self.ttl
    }
}

/// Concurrency-safe cache of tenant clients.
///
/// Construct one per process and share it through an `Arc`.
pub struct ClientCache {
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    region: String,
    session_duration: Duration,
    ttl: TimeDelta,
    cache_function_clients: bool,
    entries: DashMap<CacheKey, CacheEntry>,
    locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClientCache {
    /// Create a cache backed by `provider`, using the wall clock.
    pub fn new(config: &WorkerConfig, provider: Arc<dyn CloudProvider>) -> Self {
        Self::with_clock(config, provider, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source.
    pub fn with_clock(
        config: &WorkerConfig,
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // an out-of-range TTL disables caching rather than failing construction
        let ttl = TimeDelta::from_std(config.client_ttl()).unwrap_or(TimeDelta::zero());
        Self {
            provider,
            clock,
            region: config.region.clone(),
            session_duration: config.session_duration,
            ttl,
            cache_function_clients: config.cache_function_clients,
            entries: DashMap::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Region every cached client is bound to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get a live client for `kind` in `tenant_id`, building one if needed.
    ///
    /// Failures are returned to the caller and never cached.
    pub async fn get_client(&self, kind: ResourceKind, tenant_id: &str) -> Result<CachedClient> {
        let key = self.key(kind, tenant_id);

        if let Some(client) = self.live(&key) {
            debug!(tenant_id, kind = %kind, "Client cache hit");
            return Ok(client);
        }

        let key_lock = self.key_lock(&key);
        let result = self.fill(key.clone(), kind, tenant_id, &key_lock).await;
        self.release_key_lock(&key, key_lock);
        result
    }

    async fn fill(
        &self,
        key: CacheKey,
        kind: ResourceKind,
        tenant_id: &str,
        key_lock: &tokio::sync::Mutex<()>,
    ) -> Result<CachedClient> {
        let _guard = key_lock.lock().await;

        // another caller may have filled the entry while we waited
        if let Some(client) = self.live(&key) {
            debug!(tenant_id, kind = %kind, "Client cache hit after wait");
            return Ok(client);
        }

        debug!(tenant_id, kind = %kind, "Client cache miss");
        let client = self.connect(kind, tenant_id).await?;
        self.entries.insert(
            key,
            CacheEntry {
                client: client.clone(),
                created_at: self.clock.now(),
                ttl: self.ttl,
            },
        );
        Ok(client)
    }

    /// Function client for `tenant_id`.
    ///
    /// Assumes fresh credentials on every call unless function clients are
    /// configured to be cached.
    pub async fn function_client(&self, tenant_id: &str) -> Result<Arc<dyn FunctionClient>> {
        let client = if self.cache_function_clients {
            self.get_client(ResourceKind::Function, tenant_id).await?
        } else {
            self.connect(ResourceKind::Function, tenant_id).await?
        };
        match client {
            CachedClient::Function(client) => Ok(client),
            other => Err(mismatch(ResourceKind::Function, &other)),
        }
    }

    /// Object storage client for `tenant_id`.
    pub async fn object_store(&self, tenant_id: &str) -> Result<Arc<dyn ObjectStore>> {
        match self.get_client(ResourceKind::ObjectStorage, tenant_id).await? {
            CachedClient::ObjectStorage(client) => Ok(client),
            other => Err(mismatch(ResourceKind::ObjectStorage, &other)),
        }
    }

    /// Topic client for `tenant_id`.
    pub async fn topic_client(&self, tenant_id: &str) -> Result<Arc<dyn TopicClient>> {
        match self.get_client(ResourceKind::Topic, tenant_id).await? {
            CachedClient::Topic(client) => Ok(client),
            other => Err(mismatch(ResourceKind::Topic, &other)),
        }
    }

    /// Queue client for `tenant_id`.
    pub async fn queue_client(&self, tenant_id: &str) -> Result<Arc<dyn QueueClient>> {
        match self.get_client(ResourceKind::Queue, tenant_id).await? {
            CachedClient::Queue(client) => Ok(client),
            other => Err(mismatch(ResourceKind::Queue, &other)),
        }
    }

    /// Drop the entry for `kind` in `tenant_id`, if any.
    pub fn invalidate(&self, kind: ResourceKind, tenant_id: &str) -> bool {
        let removed = self.entries.remove(&self.key(kind, tenant_id)).is_some();
        if removed {
            info!(tenant_id, kind = %kind, "Invalidated cached client");
        }
        removed
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(&self, kind: ResourceKind, tenant_id: &str) -> CacheKey {
        CacheKey {
            kind,
            tenant_id: tenant_id.to_string(),
            region: self.region.clone(),
        }
    }

    fn live(&self, key: &CacheKey) -> Option<CachedClient> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => return Some(entry.client.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
            debug!(tenant_id = %key.tenant_id, kind = %key.kind, "Cached client expired");
        }
        None
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the per-key lock once no other caller holds or waits on it.
    fn release_key_lock(&self, key: &CacheKey, key_lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // clones are only taken under `locks`, so the count is stable here
        if Arc::strong_count(&key_lock) == 2
            && locks
                .get(key)
                .is_some_and(|stored| Arc::ptr_eq(stored, &key_lock))
        {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn connect(&self, kind: ResourceKind, tenant_id: &str) -> Result<CachedClient> {
        info!(
            tenant_id,
            kind = %kind,
            provider = self.provider.provider_type(),
            "Assuming tenant role"
        );
        let session = self
            .provider
            .assume_role(tenant_id, self.session_duration)
            .await
            .map_err(|source| ActivityError::Credentials {
                tenant_id: tenant_id.to_string(),
                source,
            })?;

        CachedClient::connect(kind, self.provider.as_ref(), session).map_err(|source| {
            ActivityError::ClientConstruction {
                kind,
                tenant_id: tenant_id.to_string(),
                source,
            }
        })
    }
}

fn mismatch(expected: ResourceKind, actual: &CachedClient) -> ActivityError {
    ActivityError::ClientKindMismatch {
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::cloud::MockCloud;
    use chrono::TimeZone;

    fn config() -> WorkerConfig {
        WorkerConfig::new("us-west-2", "REFINERY_ROLE")
    }

    #[tokio::test]
    async fn test_second_fetch_is_a_hit() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config(), cloud.clone());

        cache.topic_client("111122223333").await.unwrap();
        cache.topic_client("111122223333").await.unwrap();

        assert_eq!(cloud.assume_calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_kinds_are_cached_separately() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config(), cloud.clone());

        cache.topic_client("111122223333").await.unwrap();
        cache.queue_client("111122223333").await.unwrap();
        cache.object_store("111122223333").await.unwrap();

        assert_eq!(cloud.assume_calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_assume_for("111122223333");
        let cache = ClientCache::new(&config(), cloud.clone());

        let err = cache.queue_client("111122223333").await.err().unwrap();
        assert!(matches!(err, ActivityError::Credentials { .. }));
        assert!(cache.is_empty());

        cloud.allow_assume_for("111122223333");
        cache.queue_client("111122223333").await.unwrap();
        assert_eq!(cloud.assume_calls(), 2);
    }

    #[tokio::test]
    async fn test_function_clients_bypass_cache_by_default() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config(), cloud.clone());

        cache.function_client("111122223333").await.unwrap();
        cache.function_client("111122223333").await.unwrap();

        assert_eq!(cloud.assume_calls(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_function_clients_cached_when_enabled() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config().with_cache_function_clients(true), cloud.clone());

        cache.function_client("111122223333").await.unwrap();
        cache.function_client("111122223333").await.unwrap();

        assert_eq!(cloud.assume_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let cloud = Arc::new(MockCloud::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        ));
        let cache = ClientCache::with_clock(&config(), cloud.clone(), clock.clone());

        cache.topic_client("111122223333").await.unwrap();
        // default TTL is 3600s - 600s
        clock.advance(chrono::Duration::seconds(2999));
        cache.topic_client("111122223333").await.unwrap();
        assert_eq!(cloud.assume_calls(), 1);

        clock.advance(chrono::Duration::seconds(1));
        cache.topic_client("111122223333").await.unwrap();
        assert_eq!(cloud.assume_calls(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_key_locks_are_released() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config(), cloud.clone());

        for tenant in ["111122223333", "444455556666", "777788889999"] {
            cache.topic_client(tenant).await.unwrap();
            cache.queue_client(tenant).await.unwrap();
        }
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.key_lock_count(), 0);

        cloud.fail_assume_for("000011112222");
        assert!(cache.topic_client("000011112222").await.is_err());
        assert_eq!(cache.key_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_key_lock_released_after_concurrent_fill() {
        let cloud = Arc::new(MockCloud::new().with_assume_delay_ms(20));
        let cache = Arc::new(ClientCache::new(&config(), cloud.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.queue_client("111122223333").await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(cloud.assume_calls(), 1);
        assert_eq!(cache.key_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_assumption() {
        let cloud = Arc::new(MockCloud::new());
        let cache = ClientCache::new(&config(), cloud.clone());

        cache.queue_client("111122223333").await.unwrap();
        assert!(cache.invalidate(ResourceKind::Queue, "111122223333"));
        assert!(!cache.invalidate(ResourceKind::Queue, "111122223333"));
        cache.queue_client("111122223333").await.unwrap();

        assert_eq!(cloud.assume_calls(), 2);
    }
}
