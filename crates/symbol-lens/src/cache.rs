//! Deduplicating, alias-aware async memoization.
//!
//! Each key maps to a shared future. The first `get` for a key creates a
//! pending entry and schedules one load; every later `get` for that key gets
//! a clone of the same shared future. When a load succeeds, `extract` names
//! further keys that are known to resolve to the same value. Those keys are
//! filled in without loading, and keys that were requested while the load was
//! in flight are resolved retroactively with the same value.
//!
//! Loads are gated: at most `max_in_flight` run at once. A miss that arrives
//! while the gate is full is parked and only loaded if it is still unresolved
//! once a slot frees up, so a key that turns out to be an alias of an
//! in-flight load never reaches the loader. Every load is bounded by a
//! timeout; a load that runs out of time is rejected like any other failure
//! and gives its slot back.

use std::{
    collections::VecDeque,
    fmt::Debug,
    hash::Hash,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry as MapEntry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::LookupError;

/// Future handed out by [`AliasCache::get`]. Cheap to clone; every clone
/// resolves to the same value.
pub type CacheFuture<V> = Shared<BoxFuture<'static, Result<V, LookupError>>>;

type LoadFn<K, V> = dyn Fn(K) -> BoxFuture<'static, Result<V, LookupError>> + Send + Sync;
type ExtractFn<K, V> = dyn Fn(&K, &V) -> Vec<K> + Send + Sync;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

enum Slot<V> {
    /// Not yet resolved. `load_id` is `None` while the key is parked behind
    /// the in-flight gate.
    Pending {
        resolver: oneshot::Sender<Result<V, LookupError>>,
        load_id: Option<u64>,
    },
    Resolved,
}

struct Entry<V> {
    future: CacheFuture<V>,
    slot: Slot<V>,
}

struct Scheduler<K> {
    in_flight: usize,
    max_in_flight: usize,
    load_timeout: Option<Duration>,
    parked: VecDeque<K>,
}

struct Inner<K, V> {
    entries: DashMap<K, Entry<V>>,
    scheduler: Mutex<Scheduler<K>>,
    load: Box<LoadFn<K, V>>,
    extract: Box<ExtractFn<K, V>>,
    next_load_id: AtomicU64,
    stats: CacheStats,
}

/// Memoizing cache handle. Clones share the same entries.
pub struct AliasCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for AliasCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> AliasCache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Cache without aliasing: each key is loaded on its own.
    pub fn new<L, Fut>(load: L) -> Self
    where
        L: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, LookupError>> + Send + 'static,
    {
        Self::with_aliases(load, |_: &K, _: &V| Vec::new())
    }

    /// Cache whose resolved values can satisfy other keys.
    pub fn with_aliases<L, Fut, X>(
        load: L,
        extract: X,
    ) -> Self
    where
        L: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, LookupError>> + Send + 'static,
        X: Fn(&K, &V) -> Vec<K> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                scheduler: Mutex::new(Scheduler {
                    in_flight: 0,
                    max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                    load_timeout: Some(DEFAULT_LOAD_TIMEOUT),
                    parked: VecDeque::new(),
                }),
                load: Box::new(move |key| load(key).boxed()),
                extract: Box::new(extract),
                next_load_id: AtomicU64::new(1),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Change how many loads may run at once. Takes effect for new misses
    /// and whenever a running load finishes.
    pub fn set_max_in_flight(
        &self,
        max_in_flight: usize,
    ) {
        let to_start = {
            let mut scheduler = self.inner.lock_scheduler();
            scheduler.max_in_flight = max_in_flight.max(1);
            self.inner.drain_parked(&mut scheduler)
        };
        for (key, load_id) in to_start {
            Inner::spawn_load(&self.inner, key, load_id);
        }
    }

    /// Bound each load started from now on. `None` lets loads run forever.
    pub fn set_load_timeout(
        &self,
        load_timeout: Option<Duration>,
    ) {
        self.inner.lock_scheduler().load_timeout = load_timeout;
    }

    /// Future for `key`, scheduling a load on a miss.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get(
        &self,
        key: K,
    ) -> CacheFuture<V> {
        self.inner.stats.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(entry) = self.inner.entries.get(&key) {
            self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
            return entry.future.clone();
        }

        let (future, load_id) = {
            let mut scheduler = self.inner.lock_scheduler();
            match self.inner.entries.entry(key.clone()) {
                MapEntry::Occupied(occupied) => {
                    self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return occupied.get().future.clone();
                },
                MapEntry::Vacant(vacant) => {
                    let (resolver, receiver) = oneshot::channel();
                    let future = receiver
                        .map(|received| {
                            received.unwrap_or_else(|_| {
                                Err(LookupError::Backend {
                                    reason: "lookup abandoned".to_string(),
                                })
                            })
                        })
                        .boxed()
                        .shared();

                    let load_id = if scheduler.in_flight < scheduler.max_in_flight {
                        scheduler.in_flight += 1;
                        Some(self.inner.next_load_id.fetch_add(1, Ordering::Relaxed))
                    } else {
                        debug!("[cache] parking {key:?} behind {} in-flight load(s)", scheduler.in_flight);
                        scheduler.parked.push_back(key.clone());
                        None
                    };

                    vacant.insert(Entry {
                        future: future.clone(),
                        slot: Slot::Pending {
                            resolver,
                            load_id,
                        },
                    });
                    (future, load_id)
                },
            }
        };

        if let Some(load_id) = load_id {
            Inner::spawn_load(&self.inner, key, load_id);
        }
        future
    }

    /// Whether `key` has an entry, pending or resolved.
    pub fn contains(
        &self,
        key: &K,
    ) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Whether `key` has a resolved entry.
    pub fn is_resolved(
        &self,
        key: &K,
    ) -> bool {
        self.inner.entries.get(key).is_some_and(|entry| matches!(entry.slot, Slot::Resolved))
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every entry. Callers still waiting on a pending entry receive an
    /// error; loads that finish afterwards are discarded.
    pub fn clear(&self) {
        let mut scheduler = self.inner.lock_scheduler();
        scheduler.parked.clear();
        self.inner.entries.clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn log_stats(&self) {
        self.inner.stats.log_summary();
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn lock_scheduler(&self) -> MutexGuard<'_, Scheduler<K>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_load(
        this: &Arc<Self>,
        key: K,
        load_id: u64,
    ) {
        this.stats.loads.fetch_add(1, Ordering::Relaxed);
        let load_timeout = this.lock_scheduler().load_timeout;
        let slot = LoadSlot {
            inner: Arc::clone(this),
        };
        tokio::spawn(async move {
            let inner = &slot.inner;
            let loading = AssertUnwindSafe((inner.load)(key.clone())).catch_unwind();
            let outcome = match load_timeout {
                Some(limit) => match tokio::time::timeout(limit, loading).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("[cache] load for {key:?} timed out after {}ms", limit.as_millis());
                        Ok(Err(LookupError::TimedOut {
                            after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        }))
                    },
                },
                None => loading.await,
            };
            let result = outcome.unwrap_or_else(|_| {
                Err(LookupError::Backend {
                    reason: "loader panicked".to_string(),
                })
            });
            let completed = std::panic::catch_unwind(AssertUnwindSafe(|| inner.complete(key, load_id, result)));
            if completed.is_err() {
                warn!("[cache] alias extraction panicked; aliases of this load were skipped");
            }
        });
    }

    fn complete(
        &self,
        key: K,
        load_id: u64,
        result: Result<V, LookupError>,
    ) {
        match result {
            Ok(value) => self.resolve(key, load_id, value),
            Err(error) => self.reject(key, load_id, error),
        }
    }

    fn resolve(
        &self,
        key: K,
        load_id: u64,
        value: V,
    ) {
        let primary = {
            let Some(mut entry) = self.entries.get_mut(&key) else {
                debug!("[cache] dropping result for evicted {key:?}");
                return;
            };
            if !owns_slot(&entry.slot, load_id) {
                debug!("[cache] {key:?} already resolved through an alias");
                return;
            }
            if let Slot::Pending {
                resolver,
                ..
            } = std::mem::replace(&mut entry.slot, Slot::Resolved)
            {
                let _ = resolver.send(Ok(value.clone()));
            }
            entry.future.clone()
        };

        for alias in (self.extract)(&key, &value) {
            match self.entries.entry(alias) {
                MapEntry::Vacant(vacant) => {
                    self.stats.alias_inserts.fetch_add(1, Ordering::Relaxed);
                    vacant.insert(Entry {
                        future: primary.clone(),
                        slot: Slot::Resolved,
                    });
                },
                MapEntry::Occupied(mut occupied) => {
                    if matches!(occupied.get().slot, Slot::Resolved) {
                        continue;
                    }
                    self.stats.alias_merges.fetch_add(1, Ordering::Relaxed);
                    debug!("[cache] merging pending {:?} into {key:?}", occupied.key());
                    let entry = occupied.get_mut();
                    if let Slot::Pending {
                        resolver,
                        ..
                    } = std::mem::replace(&mut entry.slot, Slot::Resolved)
                    {
                        let _ = resolver.send(Ok(value.clone()));
                    }
                    entry.future = primary.clone();
                },
            }
        }
    }

    fn reject(
        &self,
        key: K,
        load_id: u64,
        error: LookupError,
    ) {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        // Only the load that owns the pending entry may evict it; an entry
        // resolved through an alias in the meantime stays.
        let removed = self.entries.remove_if(&key, |_, entry| owns_slot(&entry.slot, load_id));
        match removed {
            Some((
                _,
                Entry {
                    slot: Slot::Pending {
                        resolver,
                        ..
                    },
                    ..
                },
            )) => {
                debug!("[cache] load for {key:?} failed: {error}");
                let _ = resolver.send(Err(error));
            },
            _ => debug!("[cache] ignoring failure for {key:?}: {error}"),
        }
    }

    fn finish_load(self: &Arc<Self>) {
        let to_start = {
            let mut scheduler = self.lock_scheduler();
            scheduler.in_flight = scheduler.in_flight.saturating_sub(1);
            self.drain_parked(&mut scheduler)
        };
        for (key, load_id) in to_start {
            Self::spawn_load(self, key, load_id);
        }
        if self.stats.loads.load(Ordering::Relaxed) % 200 == 0 {
            self.stats.log_summary();
        }
    }

    /// Claim load slots for parked keys that are still unresolved.
    fn drain_parked(
        &self,
        scheduler: &mut Scheduler<K>,
    ) -> Vec<(K, u64)> {
        let mut to_start = Vec::new();
        while scheduler.in_flight < scheduler.max_in_flight {
            let Some(key) = scheduler.parked.pop_front() else {
                break;
            };
            let Some(mut entry) = self.entries.get_mut(&key) else {
                continue;
            };
            let Slot::Pending {
                load_id,
                ..
            } = &mut entry.slot
            else {
                debug!("[cache] parked {key:?} was resolved without a load");
                continue;
            };
            if load_id.is_some() {
                continue;
            }
            let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
            *load_id = Some(id);
            drop(entry);
            scheduler.in_flight += 1;
            to_start.push((key, id));
        }
        to_start
    }
}

/// One claimed load slot. Dropping it, also while unwinding, frees the slot
/// and starts parked loads.
struct LoadSlot<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Drop for LoadSlot<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.finish_load();
    }
}

fn owns_slot<V>(
    slot: &Slot<V>,
    load_id: u64,
) -> bool {
    matches!(slot, Slot::Pending { load_id: Some(id), .. } if *id == load_id)
}

/// Runtime counters for cache behavior.
#[derive(Default)]
struct CacheStats {
    requests: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    alias_inserts: AtomicU64,
    alias_merges: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub requests: u64,
    pub hits: u64,
    pub loads: u64,
    pub alias_inserts: u64,
    pub alias_merges: u64,
    pub failures: u64,
}

impl CacheStats {
    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            alias_inserts: self.alias_inserts.load(Ordering::Relaxed),
            alias_merges: self.alias_merges.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    fn log_summary(&self) {
        let CacheStatsSnapshot {
            requests,
            hits,
            loads,
            alias_inserts,
            alias_merges,
            failures,
        } = self.snapshot();
        if requests == 0 {
            info!("[perf][cache] no requests recorded yet");
            return;
        }
        let hit_ratio = hits as f64 / requests as f64;
        info!(
            "[perf][cache] requests={requests}, hits={hits} ({hit_ratio:.2}), loads={loads}, \
             aliases(inserted={alias_inserts}, merged={alias_merges}), failures={failures}"
        );
    }
}

#[cfg(test)]
#[path = "../tests/src/cache_tests.rs"]
mod tests;
