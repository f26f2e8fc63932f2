//! In-memory query cache shared by all hooks.
//!
//! Values are stored type-erased per [`QueryKey`]; readers get a cloned
//! snapshot. Every write or invalidation is published on a broadcast channel
//! so views can re-render.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, broadcast};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::mirror::MirrorKey;

/// One logical list per key; distinct lists never share a key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Tasks,
    Rules,
    Rewards,
    Punishments,
    PunishmentHistory,
    TaskCompletions,
    RuleViolations,
    Profile,
}

impl QueryKey {
    pub fn mirror_key(&self) -> MirrorKey {
        match self {
            QueryKey::Tasks => MirrorKey::AllTasks,
            QueryKey::Rules => MirrorKey::AllRules,
            QueryKey::Rewards => MirrorKey::AllRewards,
            QueryKey::Punishments => MirrorKey::AllPunishments,
            QueryKey::PunishmentHistory => MirrorKey::AllPunishmentHistory,
            QueryKey::TaskCompletions => MirrorKey::AllTaskCompletions,
            QueryKey::RuleViolations => MirrorKey::AllRuleViolations,
            QueryKey::Profile => MirrorKey::Profile,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CacheEventKind {
    Updated,
    Invalidated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub kind: CacheEventKind,
}

struct Entry {
    value: Box<dyn Any + Send + Sync>,
    stale: bool,
    written_at: Instant,
}

struct Inner {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    fetch_locks: Mutex<HashMap<QueryKey, Arc<Mutex<()>>>>,
    mirror_locks: Mutex<HashMap<QueryKey, Arc<Mutex<()>>>>,
    events: broadcast::Sender<CacheEvent>,
}

/// Cloneable handle; clones share the same storage.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                fetch_locks: Mutex::new(HashMap::new()),
                mirror_locks: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, key: QueryKey, kind: CacheEventKind) {
        // No subscribers is fine
        let _ = self.inner.events.send(CacheEvent { key, kind });
    }

    pub async fn get<T: Clone + 'static>(&self, key: QueryKey) -> Option<T> {
        let entries = self.inner.entries.read().await;
        let entry = entries.get(&key)?;
        match entry.value.downcast_ref::<T>() {
            Some(v) => Some(v.clone()),
            None => {
                warn!(?key, "cache value has a different type than requested");
                None
            }
        }
    }

    pub async fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        self.inner.entries.write().await.insert(
            key,
            Entry {
                value: Box::new(value),
                stale: false,
                written_at: Instant::now(),
            },
        );
        self.publish(key, CacheEventKind::Updated);
    }

    /// Mutates the cached value in place. Returns false when nothing of type `T` is cached.
    pub async fn update<T, F>(&self, key: QueryKey, f: F) -> bool
    where
        T: Send + Sync + 'static,
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut entries = self.inner.entries.write().await;
            match entries
                .get_mut(&key)
                .and_then(|e| e.value.downcast_mut::<T>())
            {
                Some(v) => {
                    f(v);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.publish(key, CacheEventKind::Updated);
        }
        updated
    }

    pub async fn remove(&self, key: QueryKey) {
        let removed = self.inner.entries.write().await.remove(&key).is_some();
        if removed {
            self.publish(key, CacheEventKind::Removed);
        }
    }

    /// Marks the value stale. It stays readable until the next successful fetch.
    pub async fn invalidate(&self, key: QueryKey) {
        if let Some(e) = self.inner.entries.write().await.get_mut(&key) {
            e.stale = true;
        }
        debug!(?key, "cache invalidated");
        self.publish(key, CacheEventKind::Invalidated);
    }

    pub async fn is_stale(&self, key: QueryKey) -> bool {
        self.inner
            .entries
            .read()
            .await
            .get(&key)
            .map(|e| e.stale)
            .unwrap_or(true)
    }

    /// Cached, not invalidated and younger than `max_age`.
    pub async fn is_fresh(&self, key: QueryKey, max_age: Duration) -> bool {
        self.inner
            .entries
            .read()
            .await
            .get(&key)
            .map(|e| !e.stale && e.written_at.elapsed() < max_age)
            .unwrap_or(false)
    }

    /// Per-key guard serializing fetches of the same list.
    pub async fn fetch_lock(&self, key: QueryKey) -> OwnedMutexGuard<()> {
        Self::lock_key(&self.inner.fetch_locks, key).await
    }

    /// Per-key guard held from reading a list until its mirror copy is written,
    /// so an older snapshot never lands after a newer one.
    pub async fn mirror_lock(&self, key: QueryKey) -> OwnedMutexGuard<()> {
        Self::lock_key(&self.inner.mirror_locks, key).await
    }

    async fn lock_key(
        locks: &Mutex<HashMap<QueryKey, Arc<Mutex<()>>>>,
        key: QueryKey,
    ) -> OwnedMutexGuard<()> {
        let lock = locks.lock().await.entry(key).or_default().clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_values_round_trip_and_publish() {
        let cache = QueryCache::new();
        let mut events = cache.subscribe();

        cache.set(QueryKey::Tasks, vec![1u32, 2, 3]).await;
        assert_eq!(cache.get::<Vec<u32>>(QueryKey::Tasks).await, Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<String>(QueryKey::Tasks).await, None);
        assert_eq!(cache.get::<Vec<u32>>(QueryKey::Rules).await, None);

        assert!(cache.update::<Vec<u32>, _>(QueryKey::Tasks, |v| v.push(4)).await);
        assert!(!cache.update::<Vec<u32>, _>(QueryKey::Rules, |v| v.push(4)).await);

        let first = events.recv().await.unwrap();
        assert_eq!(first.key, QueryKey::Tasks);
        assert_eq!(first.kind, CacheEventKind::Updated);
        assert_eq!(events.recv().await.unwrap().kind, CacheEventKind::Updated);
    }

    #[tokio::test]
    async fn invalidated_values_stay_readable_but_not_fresh() {
        let cache = QueryCache::new();
        cache.set(QueryKey::Profile, 7i32).await;
        assert!(cache.is_fresh(QueryKey::Profile, Duration::from_secs(60)).await);

        cache.invalidate(QueryKey::Profile).await;
        assert!(cache.is_stale(QueryKey::Profile).await);
        assert!(!cache.is_fresh(QueryKey::Profile, Duration::from_secs(60)).await);
        assert_eq!(cache.get::<i32>(QueryKey::Profile).await, Some(7));
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let a = QueryCache::new();
        let b = a.clone();
        a.set(QueryKey::Rewards, "x".to_string()).await;
        assert_eq!(b.get::<String>(QueryKey::Rewards).await.as_deref(), Some("x"));
        b.remove(QueryKey::Rewards).await;
        assert!(a.get::<String>(QueryKey::Rewards).await.is_none());
    }
}
