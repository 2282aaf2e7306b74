//! Key to local-file store with coalesced fills
//!
//! [`CacheStore`] is the only place cache state lives. Every key is in one
//! of three states: absent, `Filling` (a single fill task is running and its
//! outcome is shared with every caller that asks in the meantime) or
//! `Filled` (a completed [`CacheEntry`]). A key only ever moves
//! absent -> Filling -> Filled, or absent -> Filling -> absent when the fill
//! fails, so a failed fetch is retried by the next request.
//!
//! Fills run on their own tokio task. A request that started a fill can be
//! dropped (client gone) without cancelling it; the result still lands in
//! the store for everyone else.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::fs;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{CacheError, CacheResult, FetchResult};

use super::config::CacheConfig;
use super::entry::{CacheEntry, FileGuard, remove_if_present};
use super::key::CacheKey;
use super::stats::{CacheStats, StatsCounters};

/// Outcome of a fill, shared by every caller waiting on it
pub(crate) type PendingFill = Shared<BoxFuture<'static, CacheResult<PathBuf>>>;

enum Slot {
    Filling(InFlight),
    Filled(CacheEntry),
}

/// A running fill: its shared outcome and a handle to cancel its task
struct InFlight {
    pending: PendingFill,
    abort: AbortHandle,
}

struct StoreState {
    slots: HashMap<CacheKey, Slot>,
    closed: bool,
}

struct StoreInner {
    state: RwLock<StoreState>,
    stats: StatsCounters,
    cache_dir: PathBuf,
}

/// Process-wide cache of origin resources
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("cache_dir", &self.inner.cache_dir)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Create an empty store, creating the cache directory if needed
    ///
    /// # Errors
    ///
    /// Returns `CacheError::DirectoryNotAccessible` if the directory cannot
    /// be created.
    pub async fn new(config: &CacheConfig) -> CacheResult<Self> {
        let cache_dir = config.cache_dir.clone();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: cache_dir.clone(),
                }
            })?;
            debug!("Created cache directory: {}", cache_dir.display());
        }

        info!("Initialized cache store in {}", cache_dir.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState {
                    slots: HashMap::new(),
                    closed: false,
                }),
                stats: StatsCounters::default(),
                cache_dir,
            }),
        })
    }

    /// Directory cache files live in
    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Local path for a completed entry, if there is one
    pub async fn lookup(&self, key: &CacheKey) -> Option<PathBuf> {
        let state = self.inner.state.read().await;
        match state.slots.get(key) {
            Some(Slot::Filled(entry)) => Some(entry.local_path.clone()),
            _ => None,
        }
    }

    /// Return the local path for `key`, running `fill` at most once to get it
    ///
    /// - completed key: returns immediately
    /// - fill in flight: waits for that fill's outcome
    /// - otherwise: this call starts `fill` on a detached task and registers
    ///   its result before anyone sees it
    ///
    /// # Errors
    ///
    /// - `CacheError::FillFailed` with the fill's error, for every waiter
    /// - `CacheError::FillAborted` if the fill task panicked
    /// - `CacheError::ShuttingDown` once [`close`](Self::close) was called
    pub async fn fill_once<F, Fut>(&self, key: CacheKey, fill: F) -> CacheResult<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<PathBuf>> + Send + 'static,
    {
        if let Some(path) = self.lookup(&key).await {
            self.inner.stats.record_hit();
            debug!("Cache hit: {}", key);
            return Ok(path);
        }

        let pending = {
            let mut state = self.inner.state.write().await;
            if state.closed {
                return Err(CacheError::ShuttingDown);
            }

            match state.slots.entry(key) {
                Entry::Occupied(occupied) => match occupied.get() {
                    Slot::Filled(entry) => {
                        self.inner.stats.record_hit();
                        debug!("Cache hit: {}", occupied.key());
                        return Ok(entry.local_path.clone());
                    }
                    Slot::Filling(in_flight) => {
                        self.inner.stats.record_coalesced();
                        debug!("Joining in-flight fill: {}", occupied.key());
                        in_flight.pending.clone()
                    }
                },
                Entry::Vacant(vacant) => {
                    self.inner.stats.record_miss();
                    info!("ingesting {}", vacant.key());
                    let in_flight = self.spawn_fill(vacant.key().clone(), fill());
                    let pending = in_flight.pending.clone();
                    vacant.insert(Slot::Filling(in_flight));
                    pending
                }
            }
        };

        pending.await
    }

    fn spawn_fill<Fut>(&self, key: CacheKey, fill: Fut) -> InFlight
    where
        Fut: Future<Output = FetchResult<PathBuf>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = fill.await;
            // Aborting while waiting to register must not leak the file
            let guard = outcome.as_ref().ok().map(|path| FileGuard::new(path));
            let registered = inner.complete(task_key, outcome).await;
            if let Some(guard) = guard {
                guard.disarm();
            }
            registered
        });
        let abort = handle.abort_handle();

        // Weak so a slot never keeps its own store alive
        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let pending = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!("Fill task for {} aborted: {}", key, join_error);
                    if let Some(inner) = store.upgrade() {
                        inner.abandon(&key).await;
                    }
                    Err(CacheError::FillAborted {
                        reason: join_error.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared();

        InFlight { pending, abort }
    }

    /// Snapshot of every completed entry
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let state = self.inner.state.read().await;
        state
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Filled(entry) => Some(entry.clone()),
                Slot::Filling(_) => None,
            })
            .collect()
    }

    /// Number of completed entries
    pub async fn len(&self) -> usize {
        self.stats().await.entries
    }

    /// Whether the store holds no completed entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the store has been closed for shutdown
    pub async fn is_closed(&self) -> bool {
        self.inner.state.read().await.closed
    }

    /// Current statistics
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.read().await;
        let in_flight = state
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Filling(_)))
            .count();
        self.inner
            .stats
            .snapshot(state.slots.len() - in_flight, in_flight)
    }

    /// Stop accepting fills and hand back every fill still running
    ///
    /// Fills that complete after this point delete their own file instead
    /// of registering it.
    pub(crate) async fn close(&self) -> Vec<PendingFill> {
        let mut state = self.inner.state.write().await;
        state.closed = true;
        state
            .slots
            .values()
            .filter_map(|slot| match slot {
                Slot::Filling(in_flight) => Some(in_flight.pending.clone()),
                Slot::Filled(_) => None,
            })
            .collect()
    }

    /// Cancel every fill still running and hand back their outcomes
    ///
    /// Awaiting the returned fills waits until each cancelled task has been
    /// dropped, which is when a partially written file gets removed.
    pub(crate) async fn abort_in_flight(&self) -> Vec<PendingFill> {
        let state = self.inner.state.read().await;
        state
            .slots
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Filling(in_flight) => {
                    warn!("Aborting fill for {}", key);
                    in_flight.abort.abort();
                    Some(in_flight.pending.clone())
                }
                Slot::Filled(_) => None,
            })
            .collect()
    }

    /// Remove and return every completed entry
    pub(crate) async fn drain_entries(&self) -> Vec<CacheEntry> {
        let mut state = self.inner.state.write().await;
        let mut drained = Vec::new();
        state.slots.retain(|_, slot| match slot {
            Slot::Filled(entry) => {
                drained.push(entry.clone());
                false
            }
            Slot::Filling(_) => true,
        });
        drained
    }
}

impl StoreInner {
    /// Register or discard a finished fill
    async fn complete(
        &self,
        key: CacheKey,
        outcome: FetchResult<PathBuf>,
    ) -> CacheResult<PathBuf> {
        let mut state = self.state.write().await;

        match outcome {
            Ok(local_path) if state.closed => {
                state.slots.remove(&key);
                drop(state);
                self.stats.record_fill_failure();
                warn!(
                    "Fill for {} finished during shutdown, discarding {}",
                    key,
                    local_path.display()
                );
                if let Err(e) = remove_if_present(&local_path).await {
                    warn!("Failed to remove {}: {}", local_path.display(), e);
                }
                Err(CacheError::ShuttingDown)
            }
            Ok(local_path) => {
                debug!("Registered {} as {}", key, local_path.display());
                let entry = CacheEntry::new(key.clone(), local_path.clone());
                state.slots.insert(key, Slot::Filled(entry));
                self.stats.record_fill_success();
                Ok(local_path)
            }
            Err(e) => {
                state.slots.remove(&key);
                self.stats.record_fill_failure();
                debug!("Fill for {} failed: {}", key, e);
                Err(CacheError::FillFailed(Arc::new(e)))
            }
        }
    }

    /// Clear the slot of a fill task that never reported back
    async fn abandon(&self, key: &CacheKey) {
        let mut state = self.state.write().await;
        if matches!(state.slots.get(key), Some(Slot::Filling(_))) {
            state.slots.remove(key);
            self.stats.record_fill_failure();
        }
    }
}
