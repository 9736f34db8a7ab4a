//! Duplicate detection for inbound message IDs.
//!
//! A [`Deduplicator`] remembers which exchange last owned a [`KeyMid`] so that
//! retransmissions of a message can be recognised instead of being processed
//! again. Retention is bounded: implementations forget entries once the
//! configured exchange lifetime has passed, using a maintenance task spawned
//! on the executor supplied through [`Deduplicator::set_executor`].
//!
//! Three strategies are provided and selected by [`create_deduplicator`]:
//! [`SweepDeduplicator`] (the default), [`CropRotationDeduplicator`] and
//! [`NoDeduplicator`].

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::{debug, warn};
use tokio::{runtime::Handle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{DeduplicatorKind, MatcherConfig},
    exchange::Exchange,
    key::KeyMid,
};

mod crop_rotation;
mod none;
mod sweep;
#[cfg(test)]
mod tests;

pub use crop_rotation::CropRotationDeduplicator;
pub use none::NoDeduplicator;
pub use sweep::SweepDeduplicator;

/// Store mapping message-ID keys to the exchange that last owned them.
pub trait Deduplicator: Send + Sync {
    /// Begin background maintenance. Calling `start` twice has no effect.
    fn start(&self);

    /// Stop background maintenance and discard all remembered entries.
    fn stop(&self);

    /// Provide the runtime used to schedule maintenance.
    fn set_executor(&self, executor: Handle);

    /// Atomically look up `key`, remembering `exchange` if it is absent.
    ///
    /// Returns `None` on first sighting, otherwise the previously stored
    /// exchange, which is left in place.
    fn find_previous(&self, key: KeyMid, exchange: &Arc<Exchange>) -> Option<Arc<Exchange>>;

    /// Look up `key` without inserting anything.
    fn find(&self, key: &KeyMid) -> Option<Arc<Exchange>>;

    /// Forget every entry.
    fn clear(&self);
}

/// Build the deduplicator selected by `config`.
#[must_use]
pub fn create_deduplicator(config: &MatcherConfig) -> Box<dyn Deduplicator> {
    match config.deduplicator {
        DeduplicatorKind::MarkAndSweep => Box::new(SweepDeduplicator::new(
            config.exchange_lifetime,
            config.mark_and_sweep_interval,
        )),
        DeduplicatorKind::CropRotation => {
            Box::new(CropRotationDeduplicator::new(config.crop_rotation_period))
        }
        DeduplicatorKind::None => Box::new(NoDeduplicator),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodic maintenance task shared by the time-bounded deduplicators.
#[derive(Debug, Default)]
struct Maintenance {
    executor: Mutex<Option<Handle>>,
    running: Mutex<Option<CancellationToken>>,
}

impl Maintenance {
    fn set_executor(&self, executor: Handle) { *lock(&self.executor) = Some(executor); }

    /// Run `task` every `period` until [`Maintenance::stop`] is called.
    fn start<F>(&self, name: &'static str, period: Duration, task: F)
    where
        F: Fn() + Send + 'static,
    {
        let mut running = lock(&self.running);
        if running.is_some() {
            return;
        }
        let Some(executor) = lock(&self.executor).clone() else {
            warn!("{name} started without an executor; entries expire lazily only");
            return;
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        executor.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;

                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => task(),
                }
            }
            debug!("{name} maintenance stopped");
        });
        *running = Some(token);
    }

    fn stop(&self) {
        if let Some(token) = lock(&self.running).take() {
            token.cancel();
        }
    }

    fn is_running(&self) -> bool { lock(&self.running).is_some() }
}
