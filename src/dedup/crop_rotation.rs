//! Crop-rotation deduplicator.
//!
//! Entries live in three generations of maps. New keys are written to the two
//! youngest generations, and every rotation period the oldest generation is
//! cleared and recycled as the youngest. A key is therefore remembered for at
//! least one and at most two rotation periods, without per-entry timestamps.

use std::{
    sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::runtime::Handle;

use super::{Deduplicator, Maintenance};
use crate::{exchange::Exchange, key::KeyMid};

const GENERATIONS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Cursor {
    first: usize,
    second: usize,
}

#[derive(Debug)]
struct Generations {
    maps: [DashMap<KeyMid, Arc<Exchange>>; GENERATIONS],
    cursor: RwLock<Cursor>,
    rotation: Mutex<()>,
}

impl Generations {
    fn read(&self) -> RwLockReadGuard<'_, Cursor> {
        self.cursor.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Cursor> {
        self.cursor.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the cursor, then empty the retired generation.
    ///
    /// Lookups only wait for the cursor update. The retired map is out of
    /// reach until the next rotation recycles it, which `rotation` holds off
    /// until the clear has finished.
    fn rotate(&self) {
        let _rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        let retired = {
            let mut cursor = self.write();
            let retired = cursor.first;
            cursor.first = cursor.second;
            cursor.second = (cursor.second + 1) % GENERATIONS;
            retired
        };
        self.maps[retired].clear();
    }
}

fn put_if_absent(
    map: &DashMap<KeyMid, Arc<Exchange>>,
    key: KeyMid,
    exchange: &Arc<Exchange>,
) -> Option<Arc<Exchange>> {
    match map.entry(key) {
        Entry::Occupied(occupied) => Some(Arc::clone(occupied.get())),
        Entry::Vacant(vacant) => {
            vacant.insert(Arc::clone(exchange));
            None
        }
    }
}

/// Deduplicator that forgets entries by rotating map generations.
#[derive(Debug)]
pub struct CropRotationDeduplicator {
    generations: Arc<Generations>,
    period: Duration,
    maintenance: Maintenance,
}

impl CropRotationDeduplicator {
    /// Rotate generations every `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            generations: Arc::new(Generations {
                maps: std::array::from_fn(|_| DashMap::new()),
                cursor: RwLock::new(Cursor {
                    first: 0,
                    second: 1,
                }),
                rotation: Mutex::new(()),
            }),
            period,
            maintenance: Maintenance::default(),
        }
    }

    /// Retire the oldest generation immediately.
    pub fn rotate(&self) { self.generations.rotate(); }
}

impl Deduplicator for CropRotationDeduplicator {
    fn start(&self) {
        let generations = Arc::clone(&self.generations);
        self.maintenance
            .start("crop-rotation deduplicator", self.period, move || generations.rotate());
    }

    fn stop(&self) {
        self.maintenance.stop();
        self.clear();
    }

    fn set_executor(&self, executor: Handle) { self.maintenance.set_executor(executor); }

    fn find_previous(&self, key: KeyMid, exchange: &Arc<Exchange>) -> Option<Arc<Exchange>> {
        let generations = &*self.generations;
        let cursor = generations.read();
        let previous = put_if_absent(&generations.maps[cursor.first], key, exchange);
        if previous.is_some() {
            return previous;
        }
        put_if_absent(&generations.maps[cursor.second], key, exchange)
    }

    fn find(&self, key: &KeyMid) -> Option<Arc<Exchange>> {
        let generations = &*self.generations;
        let cursor = generations.read();
        [cursor.first, cursor.second]
            .into_iter()
            .find_map(|index| generations.maps[index].get(key).map(|found| Arc::clone(&found)))
    }

    fn clear(&self) {
        let generations = &*self.generations;
        let _cursor = generations.write();
        for map in &generations.maps {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::mpsc, thread};

    use super::*;
    use crate::{
        exchange::Origin,
        message::{Method, Request},
    };

    fn key(mid: u16) -> KeyMid { KeyMid::new(mid, SocketAddr::from(([192, 0, 2, 40], 5683))) }

    fn exchange() -> Arc<Exchange> { Exchange::new(Request::new(Method::Get), Origin::Remote) }

    #[test]
    fn lookups_proceed_while_retired_generation_clears() {
        let dedup = Arc::new(CropRotationDeduplicator::new(Duration::from_secs(2)));
        let generations = Arc::clone(&dedup.generations);
        generations.maps[0].insert(key(1), exchange());

        // Holding a shard of the retired map stalls its clear.
        let pinned = generations.maps[0].get(&key(1)).expect("entry is present");

        let rotating = Arc::clone(&generations);
        let rotation = thread::spawn(move || rotating.rotate());

        let (tx, rx) = mpsc::channel();
        let looking = Arc::clone(&dedup);
        thread::spawn(move || {
            while looking.generations.read().first != 1 {
                thread::yield_now();
            }
            let fresh = exchange();
            let _ = tx.send(looking.find_previous(key(2), &fresh).is_none());
        });

        let first_sighting = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("lookup must not wait for the clear");
        assert!(first_sighting);

        drop(pinned);
        rotation.join().expect("rotation thread panicked");
        assert!(generations.maps[0].is_empty());
    }
}
