//! Correlation of protocol messages with the exchanges they belong to.
//!
//! [`Matcher`] sits between the transport adapter and the protocol layers.
//! Outbound messages pass through the `send_*` operations, which assign
//! message IDs and index the exchange so replies can find it again. Inbound
//! messages pass through the `receive_*` operations, which resolve them to an
//! existing exchange, create a new one for fresh requests, flag
//! retransmissions as duplicates, or reject what cannot be matched.
//!
//! Three sharded tables back the lookups:
//!
//! - by message ID, for outbound messages awaiting an ACK or RST;
//! - by token, for outbound requests awaiting a response;
//! - ongoing by token, for block-wise transfers spanning several requests.
//!
//! Entries are removed by the completion observer once an exchange ends.

use std::{
    hash::Hash,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU16, Ordering},
    },
};

use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::runtime::Handle;

use crate::{
    config::MatcherConfig,
    dedup::{Deduplicator, create_deduplicator},
    error::MatcherError,
    exchange::{Exchange, Origin},
    forwarder::ExchangeForwarder,
    key::{KeyMid, KeyToken},
    message::{EmptyMessage, Message, MessageType, Method, Request, Response},
    metrics::{self, Inbound},
};

mod observer;

use observer::CompletionObserver;

#[derive(Debug, Default)]
struct ExchangeTables {
    by_mid: DashMap<KeyMid, Arc<Exchange>>,
    by_token: DashMap<KeyToken, Arc<Exchange>>,
    ongoing: DashMap<KeyToken, Arc<Exchange>>,
}

impl ExchangeTables {
    fn clear(&self) {
        self.by_mid.clear();
        self.by_token.clear();
        self.ongoing.clear();
    }
}

/// Clone the exchange stored under `key` without holding the shard lock.
fn lookup<K: Eq + Hash>(table: &DashMap<K, Arc<Exchange>>, key: &K) -> Option<Arc<Exchange>> {
    table.get(key).map(|entry| Arc::clone(entry.value()))
}

/// Store `exchange` under `key` unless it has already completed.
///
/// The entry is withdrawn again when completion races with the insert, so a
/// completed exchange never stays reachable.
fn index<K>(table: &DashMap<K, Arc<Exchange>>, key: K, exchange: &Arc<Exchange>)
where
    K: Clone + Eq + Hash,
{
    if exchange.is_complete() {
        return;
    }
    table.insert(key.clone(), Arc::clone(exchange));
    if exchange.is_complete() {
        observer::remove_if_owned(table, &key, exchange);
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    started: bool,
    executor: Option<Handle>,
}

/// Matches inbound and outbound messages to exchanges.
///
/// All operations take `&self` and may be called concurrently from any
/// number of network and application tasks.
pub struct Matcher {
    tables: Arc<ExchangeTables>,
    observer: Arc<CompletionObserver>,
    current_mid: AtomicU16,
    deduplicator: Box<dyn Deduplicator>,
    forwarder: Arc<dyn ExchangeForwarder>,
    lifecycle: Mutex<Lifecycle>,
}

impl Matcher {
    /// Create a matcher using the deduplicator selected by `config`.
    #[must_use]
    pub fn new(forwarder: Arc<dyn ExchangeForwarder>, config: &MatcherConfig) -> Self {
        Self::with_deduplicator(forwarder, config, create_deduplicator(config))
    }

    /// Create a matcher with a caller-supplied deduplicator.
    #[must_use]
    pub fn with_deduplicator(
        forwarder: Arc<dyn ExchangeForwarder>,
        config: &MatcherConfig,
        deduplicator: Box<dyn Deduplicator>,
    ) -> Self {
        let tables = Arc::new(ExchangeTables::default());
        let first_mid = if config.random_mid_start {
            rand::random::<u16>()
        } else {
            0
        };
        Self {
            observer: Arc::new(CompletionObserver::new(&tables)),
            tables,
            current_mid: AtomicU16::new(first_mid),
            deduplicator,
            forwarder,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the deduplicator. Calling `start` on a running matcher does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`MatcherError::MissingExecutor`] if [`Matcher::set_executor`]
    /// has not been called.
    pub fn start(&self) -> Result<(), MatcherError> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.started {
            return Ok(());
        }
        if lifecycle.executor.is_none() {
            return Err(MatcherError::MissingExecutor);
        }
        self.deduplicator.start();
        lifecycle.started = true;
        Ok(())
    }

    /// Stop the deduplicator and forget every exchange. Calling `stop` on a
    /// stopped matcher does nothing.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        if !lifecycle.started {
            return;
        }
        lifecycle.started = false;
        self.deduplicator.stop();
        self.clear();
    }

    /// Provide the runtime that schedules deduplicator maintenance.
    pub fn set_executor(&self, executor: Handle) {
        let mut lifecycle = self.lifecycle();
        self.deduplicator.set_executor(executor.clone());
        lifecycle.executor = Some(executor);
    }

    /// Whether the matcher has been started.
    #[must_use]
    pub fn is_started(&self) -> bool { self.lifecycle().started }

    /// Drop every table entry and all duplicate-detection state.
    pub fn clear(&self) {
        self.tables.clear();
        self.deduplicator.clear();
    }

    fn next_mid(&self) -> u16 { self.current_mid.fetch_add(1, Ordering::Relaxed) }

    fn assign_mid(&self, message: &mut impl Message) -> u16 {
        if let Some(mid) = message.mid() {
            return mid;
        }
        let mid = self.next_mid();
        message.set_mid(mid);
        mid
    }

    fn mark_duplicate(message: &mut impl Message, inbound: Inbound) {
        message.set_duplicate(true);
        metrics::inc_duplicates(inbound);
    }

    fn index_mid(&self, exchange: &Arc<Exchange>, key: KeyMid) {
        exchange.record_indexed_mid(key);
        index(&self.tables.by_mid, key, exchange);
    }

    fn reject(&self, message: EmptyMessage) {
        metrics::inc_rejections(message.kind());
        self.forwarder.send_empty_message(None, message);
    }

    /// Register an outgoing request so its responses can be matched.
    ///
    /// Assigns the next message ID if the request has none.
    pub fn send_request(&self, exchange: &Arc<Exchange>, request: &mut Request) {
        let mid = self.assign_mid(request);
        exchange.record_outgoing(request);
        exchange.set_observer(self.observer.clone());

        self.index_mid(exchange, KeyMid::new(mid, request.destination()));
        index(
            &self.tables.by_token,
            KeyToken::from_destination(request),
            exchange,
        );
    }

    /// Register an outgoing response.
    ///
    /// Assigns the next message ID if the response has none. A final ACK or
    /// NON response completes the exchange; a CON response keeps it open
    /// until the peer acknowledges or resets it.
    pub fn send_response(&self, exchange: &Arc<Exchange>, response: &mut Response) {
        let mid = self.assign_mid(response);
        exchange.set_response(response.clone());
        exchange.set_observer(self.observer.clone());
        self.index_mid(exchange, KeyMid::new(mid, response.destination()));

        let snapshot = exchange.snapshot();
        if snapshot.current_request.method() == Method::Get && response.options().block2.is_some() {
            index(
                &self.tables.ongoing,
                KeyToken::from_source(&snapshot.request),
                exchange,
            );
        }

        if matches!(response.kind(), MessageType::Ack | MessageType::Non) && response.is_last() {
            exchange.set_complete();
        }
    }

    /// Account for an outgoing empty message.
    ///
    /// An RST sent on behalf of an exchange rejects it and completes it.
    pub fn send_empty_message(&self, exchange: Option<&Arc<Exchange>>, message: &EmptyMessage) {
        if message.kind() == MessageType::Rst
            && let Some(exchange) = exchange
        {
            debug!("{} rejected by outgoing reset", exchange.id());
            exchange.set_complete();
        }
        if message.mid().is_none() {
            warn!(
                "empty {} to {} has no message id",
                message.kind(),
                message.destination()
            );
        }
    }

    /// Resolve an inbound request to its exchange.
    ///
    /// Returns a new exchange for a fresh request, the owning exchange for a
    /// retransmission (flagged with [`Message::set_duplicate`]) or a later
    /// block, and `None` when the request was rejected and must be dropped.
    pub fn receive_request(&self, request: &mut Request) -> Option<Arc<Exchange>> {
        let Some(mid_key) = KeyMid::from_source(request) else {
            warn!("dropping request without message id from {}", request.source());
            return None;
        };
        let token_key = KeyToken::from_source(request);

        if !request.options().continues_transfer() {
            debug!("creating exchange for remote request: {mid_key}");
            let exchange = Exchange::new(request.clone(), Origin::Remote);
            exchange.set_observer(self.observer.clone());

            return match self.deduplicator.find_previous(mid_key, &exchange) {
                None => {
                    if request.options().block1.is_some() {
                        self.tables.ongoing.insert(token_key, Arc::clone(&exchange));
                    }
                    Some(exchange)
                }
                Some(previous) => {
                    debug!("duplicate request, ignoring: {mid_key}");
                    Self::mark_duplicate(request, Inbound::Request);
                    Some(previous)
                }
            };
        }

        // Block-wise transfers must start at block zero; a later block with
        // no ongoing exchange is never treated as a fresh request.
        let ongoing = lookup(&self.tables.ongoing, &token_key);
        if let Some(ongoing) = ongoing {
            if self.deduplicator.find_previous(mid_key, &ongoing).is_some() {
                debug!("duplicate request block, ignoring: {mid_key}");
                Self::mark_duplicate(request, Inbound::Request);
            }
            return Some(ongoing);
        }

        if let Some(previous) = self.deduplicator.find(&mid_key) {
            debug!("duplicate block of completed exchange, ignoring: {mid_key}");
            Self::mark_duplicate(request, Inbound::Request);
            return Some(previous);
        }

        info!("request block matches no ongoing exchange, acknowledging and dropping: {token_key}");
        self.reject(EmptyMessage::ack_for(request));
        None
    }

    /// Resolve an inbound response to the exchange of its request.
    ///
    /// Returns `None`, after sending an RST, when the response matches no
    /// exchange or is a piggy-backed response for an older request.
    pub fn receive_response(&self, response: &mut Response) -> Option<Arc<Exchange>> {
        let Some(mid_key) = KeyMid::from_source(response) else {
            warn!("dropping response without message id from {}", response.source());
            return None;
        };
        let token_key = KeyToken::from_source(response);

        if let Some(exchange) = lookup(&self.tables.by_token, &token_key) {
            if self.deduplicator.find_previous(mid_key, &exchange).is_some() {
                debug!("duplicate response: {mid_key}");
                Self::mark_duplicate(response, Inbound::Response);
            }

            if response.kind() != MessageType::Ack {
                return Some(exchange);
            }
            let expected = exchange.current_mid();
            if expected == Some(mid_key.mid()) {
                return Some(exchange);
            }
            info!(
                "token matches but message id does not: token={}, expected={expected:?}, \
                 received={}",
                token_key.token(),
                mid_key.mid()
            );
            self.reject(EmptyMessage::rst_for(response));
            return None;
        }

        // The peer picks the message ID of a separate response, so only CON
        // and NON responses can be recognised as duplicates here.
        if response.kind() != MessageType::Ack
            && let Some(previous) = self.deduplicator.find(&mid_key)
        {
            debug!("duplicate response of completed exchange, ignoring: {mid_key}");
            Self::mark_duplicate(response, Inbound::Response);
            return Some(previous);
        }

        info!(
            "unexpected {} response, sending reset: {token_key}, {mid_key}",
            response.kind()
        );
        self.reject(EmptyMessage::rst_for(response));
        None
    }

    /// Resolve an inbound ACK or RST to the exchange of the message it
    /// answers. Unmatched empty messages are logged and dropped.
    pub fn receive_empty_message(&self, message: &EmptyMessage) -> Option<Arc<Exchange>> {
        let Some(key) = KeyMid::from_source(message) else {
            warn!("dropping empty message without message id from {}", message.source());
            return None;
        };
        let exchange = lookup(&self.tables.by_mid, &key);
        if exchange.is_none() {
            info!(
                "empty {} matches no exchange, ignoring: {key}",
                message.kind()
            );
        }
        exchange
    }

    /// Exchange awaiting an ACK or RST for `key`.
    #[must_use]
    pub fn exchange_by_mid(&self, key: &KeyMid) -> Option<Arc<Exchange>> {
        lookup(&self.tables.by_mid, key)
    }

    /// Exchange awaiting a response for `key`.
    #[must_use]
    pub fn exchange_by_token(&self, key: &KeyToken) -> Option<Arc<Exchange>> {
        lookup(&self.tables.by_token, key)
    }

    /// Block-wise exchange in progress for `key`.
    #[must_use]
    pub fn ongoing_exchange(&self, key: &KeyToken) -> Option<Arc<Exchange>> {
        lookup(&self.tables.ongoing, key)
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("tables", &self.tables)
            .field("current_mid", &self.current_mid)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}
