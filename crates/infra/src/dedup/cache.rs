//! Fingerprint cache with TTL expiry and a capacity bound.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use tracing::{debug, info, warn};

use eventrelay_core::SharedClock;
use eventrelay_events::{fingerprint, Digest, Event, EventFingerprint};

use crate::config::DedupConfig;

/// Duplicate detection abstraction.
///
/// None of these operations fail: a cache that cannot answer treats the event
/// as new.
pub trait DeduplicationCache: Send + Sync {
    /// True when a live (non-expired) fingerprint of `event` is recorded.
    ///
    /// An expired entry counts as absent and is removed on the spot.
    fn is_duplicate(&self, event: &Event) -> bool;

    /// Insert or refresh `fingerprint`, stamped with the current time.
    fn record(&self, fingerprint: EventFingerprint);

    /// Remove every expired entry. Returns how many were removed.
    fn cleanup(&self) -> usize;

    /// Number of entries currently held (expired ones included until swept).
    fn size(&self) -> usize;

    fn is_enabled(&self) -> bool;
}

/// In-memory fingerprint cache.
///
/// - Entries are keyed by digest; re-recording refreshes the timestamp
/// - An entry is expired once its age reaches the TTL (inclusive boundary)
/// - Reaching capacity forces a sweep; if nothing has expired, the oldest
///   tenth of the entries (at least one) is evicted in one go
#[derive(Debug)]
pub struct InMemoryDeduplicationCache {
    enabled: bool,
    ttl: chrono::Duration,
    capacity: usize,
    clock: SharedClock,
    entries: RwLock<HashMap<Digest, EventFingerprint>>,
    /// Set while the cache is full of live entries; only the first eviction warns.
    saturated: AtomicBool,
}

impl InMemoryDeduplicationCache {
    pub fn new(ttl: Duration, capacity: usize, clock: SharedClock) -> Self {
        Self {
            enabled: true,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            capacity: capacity.max(1),
            clock,
            entries: RwLock::new(HashMap::new()),
            saturated: AtomicBool::new(false),
        }
    }

    /// A pass-through cache: nothing is ever a duplicate, nothing is stored.
    pub fn disabled(clock: SharedClock) -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO, 1, clock)
        }
    }

    pub fn from_config(config: &DedupConfig, clock: SharedClock) -> Self {
        if config.enabled {
            Self::new(config.ttl(), config.max_cache_size, clock)
        } else {
            Self::disabled(clock)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Digest, EventFingerprint>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Digest, EventFingerprint>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweep(&self, entries: &mut HashMap<Digest, EventFingerprint>) -> usize {
        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|_, fp| !fp.is_expired(self.ttl, now));
        before - entries.len()
    }

    fn eviction_batch(&self) -> usize {
        (self.capacity / 10).max(1)
    }
}

/// Remove the `count` entries with the oldest timestamps.
fn evict_oldest(entries: &mut HashMap<Digest, EventFingerprint>, count: usize) -> usize {
    let mut by_age: Vec<(DateTime<Utc>, Digest)> = entries
        .values()
        .map(|e| (e.created_at(), e.digest().clone()))
        .collect();
    let count = count.min(by_age.len());
    if count == 0 {
        return 0;
    }

    by_age.select_nth_unstable_by_key(count - 1, |(at, _)| *at);
    for (_, digest) in &by_age[..count] {
        entries.remove(digest);
    }
    count
}

impl DeduplicationCache for InMemoryDeduplicationCache {
    fn is_duplicate(&self, event: &Event) -> bool {
        if !self.enabled {
            debug!("duplicate filter disabled, allowing event");
            return false;
        }

        let now = self.clock.now();
        let fp = fingerprint(event, now);

        let expired = match self.read().get(fp.digest()) {
            None => {
                debug!(digest = %fp.digest(), "fingerprint not seen");
                return false;
            }
            Some(existing) => existing.is_expired(self.ttl, now),
        };

        if expired {
            // Re-check under the write lock: a concurrent record may have refreshed it.
            let mut entries = self.write();
            if entries
                .get(fp.digest())
                .is_some_and(|existing| existing.is_expired(self.ttl, now))
            {
                entries.remove(fp.digest());
            }
            debug!(digest = %fp.digest(), "fingerprint expired, allowing event");
            return false;
        }

        info!(
            source = %event.source(),
            kind = %event.kind(),
            digest = %fp.digest(),
            "duplicate event detected"
        );
        true
    }

    fn record(&self, fingerprint: EventFingerprint) {
        if !self.enabled {
            return;
        }

        let fp = fingerprint.restamped(self.clock.now());
        let mut entries = self.write();

        if entries.len() >= self.capacity {
            let removed = self.sweep(&mut entries);
            if removed > 0 {
                self.saturated.store(false, Ordering::Relaxed);
                debug!(capacity = self.capacity, removed, "dedup cache at capacity, forced cleanup");
            }

            if entries.len() >= self.capacity && !entries.contains_key(fp.digest()) {
                let evicted = evict_oldest(&mut entries, self.eviction_batch());
                if self.saturated.swap(true, Ordering::Relaxed) {
                    debug!(capacity = self.capacity, evicted, "evicted oldest fingerprints");
                } else {
                    warn!(
                        capacity = self.capacity,
                        evicted,
                        "dedup cache full of live entries, evicting oldest"
                    );
                }
            }
        }

        debug!(digest = %fp.digest(), "recorded fingerprint");
        entries.insert(fp.digest().clone(), fp);
    }

    fn cleanup(&self) -> usize {
        if !self.enabled {
            return 0;
        }

        let mut entries = self.write();
        let before = entries.len();
        let removed = self.sweep(&mut entries);
        if entries.len() < self.capacity {
            self.saturated.store(false, Ordering::Relaxed);
        }

        if removed > 0 {
            info!(removed, before, after = entries.len(), "dedup cleanup completed");
        }
        removed
    }

    fn size(&self) -> usize {
        self.read().len()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<C: DeduplicationCache + ?Sized> DeduplicationCache for std::sync::Arc<C> {
    fn is_duplicate(&self, event: &Event) -> bool {
        (**self).is_duplicate(event)
    }

    fn record(&self, fingerprint: EventFingerprint) {
        (**self).record(fingerprint)
    }

    fn cleanup(&self) -> usize {
        (**self).cleanup()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}
