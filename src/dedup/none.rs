//! Deduplicator that never reports duplicates.

use std::sync::Arc;

use tokio::runtime::Handle;

use super::Deduplicator;
use crate::{exchange::Exchange, key::KeyMid};

/// Disables duplicate detection; every message is a first sighting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDeduplicator;

impl Deduplicator for NoDeduplicator {
    fn start(&self) {}

    fn stop(&self) {}

    fn set_executor(&self, _executor: Handle) {}

    fn find_previous(&self, _key: KeyMid, _exchange: &Arc<Exchange>) -> Option<Arc<Exchange>> {
        None
    }

    fn find(&self, _key: &KeyMid) -> Option<Arc<Exchange>> { None }

    fn clear(&self) {}
}
