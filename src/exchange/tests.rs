//! Unit tests for exchange completion.

use std::{
    sync::{
        Arc,
        Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use rstest::{fixture, rstest};

use super::{Exchange, ExchangeObserver, Origin};
use crate::message::{Message, Method, Request};

#[derive(Default)]
struct CountingObserver(AtomicUsize);

impl ExchangeObserver for CountingObserver {
    fn completed(&self, _exchange: &Exchange) { self.0.fetch_add(1, Ordering::SeqCst); }
}

#[fixture]
fn request() -> Request { Request::new(Method::Get).with_mid(41).with_token(vec![0xaa]) }

#[rstest]
fn completing_twice_notifies_once(request: Request) {
    let observer = Arc::new(CountingObserver::default());
    let exchange = Exchange::new(request, Origin::Local);
    exchange.set_observer(observer.clone());

    assert!(exchange.set_complete());
    assert!(!exchange.set_complete());
    assert!(exchange.is_complete());
    assert_eq!(observer.0.load(Ordering::SeqCst), 1);
}

#[rstest]
fn concurrent_completion_notifies_once(request: Request) {
    const CALLERS: usize = 8;
    let observer = Arc::new(CountingObserver::default());
    let exchange = Exchange::new(request, Origin::Remote);
    exchange.set_observer(observer.clone());
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let exchange = Arc::clone(&exchange);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                exchange.set_complete()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|handle| handle.join().expect("completion thread panicked"))
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(observer.0.load(Ordering::SeqCst), 1);
}

#[rstest]
fn current_request_tracks_block_progress(request: Request) {
    let exchange = Exchange::new(request.clone(), Origin::Local);
    assert_eq!(exchange.current_mid(), Some(41));

    exchange.set_current_request(request.with_mid(42));
    let snapshot = exchange.snapshot();
    assert_eq!(snapshot.request.mid(), Some(41));
    assert_eq!(snapshot.current_request.mid(), Some(42));
    assert!(snapshot.response.is_none());
}

#[rstest]
fn identifiers_are_unique(request: Request) {
    let a = Exchange::new(request.clone(), Origin::Local);
    let b = Exchange::new(request, Origin::Local);
    assert_ne!(a.id(), b.id());
}
