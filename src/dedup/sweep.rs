//! Mark-and-sweep deduplicator.
//!
//! Every entry is stamped when first stored. Lookups ignore entries older than
//! the exchange lifetime, and a periodic sweep removes them from the map.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use log::debug;
use tokio::{runtime::Handle, time::Instant};

use super::{Deduplicator, Maintenance};
use crate::{exchange::Exchange, key::KeyMid};

#[derive(Debug)]
struct Stored {
    exchange: Arc<Exchange>,
    stored_at: Instant,
}

impl Stored {
    fn new(exchange: &Arc<Exchange>, stored_at: Instant) -> Self {
        Self {
            exchange: Arc::clone(exchange),
            stored_at,
        }
    }

    fn is_expired(&self, lifetime: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= lifetime
    }
}

/// Time-boxed deduplicator with periodic eviction.
#[derive(Debug)]
pub struct SweepDeduplicator {
    entries: Arc<DashMap<KeyMid, Stored>>,
    lifetime: Duration,
    interval: Duration,
    maintenance: Maintenance,
}

impl SweepDeduplicator {
    /// Remember entries for `lifetime`, sweeping every `interval`.
    #[must_use]
    pub fn new(lifetime: Duration, interval: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            lifetime,
            interval,
            maintenance: Maintenance::default(),
        }
    }

    /// [`Deduplicator::find_previous`] using an explicit clock reading.
    pub fn find_previous_at(
        &self,
        key: KeyMid,
        exchange: &Arc<Exchange>,
        now: Instant,
    ) -> Option<Arc<Exchange>> {
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.lifetime, now) {
                    occupied.insert(Stored::new(exchange, now));
                    None
                } else {
                    Some(Arc::clone(&occupied.get().exchange))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Stored::new(exchange, now));
                None
            }
        }
    }

    /// [`Deduplicator::find`] using an explicit clock reading.
    #[must_use]
    pub fn find_at(&self, key: &KeyMid, now: Instant) -> Option<Arc<Exchange>> {
        let stored = self.entries.get(key)?;
        (!stored.is_expired(self.lifetime, now)).then(|| Arc::clone(&stored.exchange))
    }

    /// Remove entries that outlived the exchange lifetime.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep_at(&self, now: Instant) -> usize { sweep(&self.entries, self.lifetime, now) }

    /// Number of entries currently held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Whether the background sweep is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool { self.maintenance.is_running() }
}

fn sweep(entries: &DashMap<KeyMid, Stored>, lifetime: Duration, now: Instant) -> usize {
    let mut evicted = 0;
    entries.retain(|_, stored| {
        let expired = stored.is_expired(lifetime, now);
        if expired {
            evicted += 1;
        }
        !expired
    });
    evicted
}

impl Deduplicator for SweepDeduplicator {
    fn start(&self) {
        let entries = Arc::clone(&self.entries);
        let lifetime = self.lifetime;
        self.maintenance
            .start("mark-and-sweep deduplicator", self.interval, move || {
                let evicted = sweep(&entries, lifetime, Instant::now());
                if evicted > 0 {
                    debug!(
                        "swept expired message ids: evicted={evicted}, remaining={}",
                        entries.len()
                    );
                }
            });
    }

    fn stop(&self) {
        self.maintenance.stop();
        self.clear();
    }

    fn set_executor(&self, executor: Handle) { self.maintenance.set_executor(executor); }

    fn find_previous(&self, key: KeyMid, exchange: &Arc<Exchange>) -> Option<Arc<Exchange>> {
        self.find_previous_at(key, exchange, Instant::now())
    }

    fn find(&self, key: &KeyMid) -> Option<Arc<Exchange>> { self.find_at(key, Instant::now()) }

    fn clear(&self) { self.entries.clear(); }
}
