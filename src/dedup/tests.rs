//! Unit tests for the deduplicator implementations.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use rstest::{fixture, rstest};
use tokio::{runtime::Handle, time::Instant};

use super::{
    CropRotationDeduplicator,
    Deduplicator,
    NoDeduplicator,
    SweepDeduplicator,
    create_deduplicator,
};
use crate::{
    config::{DeduplicatorKind, MatcherConfig},
    exchange::{Exchange, Origin},
    key::KeyMid,
    message::{Method, Request},
};

const LIFETIME: Duration = Duration::from_secs(1);
const INTERVAL: Duration = Duration::from_millis(100);

fn peer() -> SocketAddr { SocketAddr::from(([198, 51, 100, 4], 5683)) }

fn exchange() -> Arc<Exchange> { Exchange::new(Request::new(Method::Get), Origin::Remote) }

#[allow(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn sweeper() -> SweepDeduplicator { SweepDeduplicator::new(LIFETIME, INTERVAL) }

#[rstest]
fn second_sighting_returns_first_exchange(sweeper: SweepDeduplicator) {
    let key = KeyMid::new(10, peer());
    let first = exchange();
    let second = exchange();

    assert!(sweeper.find_previous(key, &first).is_none());
    let previous = sweeper
        .find_previous(key, &second)
        .expect("second sighting must be flagged");
    assert!(Arc::ptr_eq(&previous, &first));
    let found = sweeper.find(&key).expect("entry must stay in place");
    assert!(Arc::ptr_eq(&found, &first));
}

#[rstest]
fn expired_entry_counts_as_first_sighting(sweeper: SweepDeduplicator) {
    let key = KeyMid::new(11, peer());
    let start = Instant::now();
    let old = exchange();
    let fresh = exchange();

    assert!(sweeper.find_previous_at(key, &old, start).is_none());
    assert!(sweeper.find_at(&key, start + LIFETIME).is_none());
    assert!(sweeper.find_previous_at(key, &fresh, start + LIFETIME).is_none());
    let found = sweeper
        .find_at(&key, start + LIFETIME)
        .expect("fresh entry replaces the expired one");
    assert!(Arc::ptr_eq(&found, &fresh));
}

#[rstest]
fn sweep_evicts_only_expired_entries(sweeper: SweepDeduplicator) {
    let start = Instant::now();
    sweeper.find_previous_at(KeyMid::new(1, peer()), &exchange(), start);
    sweeper.find_previous_at(KeyMid::new(2, peer()), &exchange(), start + INTERVAL * 5);

    assert_eq!(sweeper.sweep_at(start + LIFETIME), 1);
    assert_eq!(sweeper.len(), 1);
    assert!(sweeper.find_at(&KeyMid::new(2, peer()), start + LIFETIME).is_some());
}

#[tokio::test(start_paused = true)]
async fn background_sweep_empties_store() {
    let sweeper = SweepDeduplicator::new(LIFETIME, INTERVAL);
    sweeper.set_executor(Handle::current());
    sweeper.start();
    sweeper.start();
    assert!(sweeper.is_running());

    sweeper.find_previous(KeyMid::new(3, peer()), &exchange());
    assert_eq!(sweeper.len(), 1);

    tokio::time::sleep(LIFETIME + INTERVAL * 3).await;
    assert!(sweeper.is_empty());

    sweeper.stop();
    assert!(!sweeper.is_running());
}

#[tokio::test]
async fn stop_discards_entries() {
    let sweeper = SweepDeduplicator::new(LIFETIME, INTERVAL);
    sweeper.set_executor(Handle::current());
    sweeper.start();
    sweeper.find_previous(KeyMid::new(4, peer()), &exchange());

    sweeper.stop();
    assert!(sweeper.is_empty());
    assert!(sweeper.find(&KeyMid::new(4, peer())).is_none());
}

#[test]
fn crop_rotation_forgets_after_two_rotations() {
    let dedup = CropRotationDeduplicator::new(INTERVAL);
    let key = KeyMid::new(5, peer());
    let first = exchange();

    assert!(dedup.find_previous(key, &first).is_none());
    dedup.rotate();
    let previous = dedup
        .find_previous(key, &exchange())
        .expect("entry survives one rotation");
    assert!(Arc::ptr_eq(&previous, &first));

    dedup.rotate();
    dedup.rotate();
    assert!(dedup.find(&key).is_none());
}

#[test]
fn crop_rotation_clear_forgets_everything() {
    let dedup = CropRotationDeduplicator::new(INTERVAL);
    let key = KeyMid::new(6, peer());
    dedup.find_previous(key, &exchange());
    dedup.clear();
    assert!(dedup.find(&key).is_none());
}

#[test]
fn no_deduplicator_never_flags() {
    let key = KeyMid::new(7, peer());
    let exchange = exchange();
    assert!(NoDeduplicator.find_previous(key, &exchange).is_none());
    assert!(NoDeduplicator.find_previous(key, &exchange).is_none());
    assert!(NoDeduplicator.find(&key).is_none());
}

#[rstest]
#[case(DeduplicatorKind::MarkAndSweep, true)]
#[case(DeduplicatorKind::CropRotation, true)]
#[case(DeduplicatorKind::None, false)]
fn factory_honours_configured_kind(#[case] kind: DeduplicatorKind, #[case] detects: bool) {
    let dedup = create_deduplicator(&MatcherConfig::default().deduplicator(kind));
    let key = KeyMid::new(8, peer());
    let exchange = exchange();
    dedup.find_previous(key, &exchange);
    assert_eq!(dedup.find_previous(key, &exchange).is_some(), detects);
}
