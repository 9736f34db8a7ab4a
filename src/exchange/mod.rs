//! State of one logical request/response cycle.
//!
//! An [`Exchange`] is shared through `Arc` between the matcher tables, the
//! deduplicator and whichever layers are driving it. Message fields sit behind
//! a mutex so every reader sees a consistent snapshot, while completion is a
//! single compare-and-swap that fires the registered [`ExchangeObserver`] at
//! most once.

use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use derive_more::Display;

use crate::{
    key::KeyMid,
    message::{Message, Request, Response, Token},
};

#[cfg(test)]
mod tests;

/// Which side initiated the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Origin {
    /// We sent the request.
    #[display("local")]
    Local,
    /// We received the request.
    #[display("remote")]
    Remote,
}

/// Process-unique identifier of an exchange, used in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("exchange#{_0}")]
pub struct ExchangeId(u64);

impl ExchangeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

/// Callback run once when an exchange completes.
pub trait ExchangeObserver: Send + Sync {
    /// Called exactly once, by the call that completed `exchange`.
    fn completed(&self, exchange: &Exchange);
}

/// Consistent copy of the messages held by an exchange.
#[derive(Clone, Debug)]
pub struct ExchangeSnapshot {
    /// The request that opened the exchange.
    pub request: Request,
    /// The request fragment currently outstanding.
    pub current_request: Request,
    /// The response, once known.
    pub response: Option<Response>,
}

#[derive(Debug)]
struct Messages {
    request: Request,
    current_request: Request,
    response: Option<Response>,
    indexed_mids: Vec<KeyMid>,
}

/// One logical request/response cycle.
pub struct Exchange {
    id: ExchangeId,
    origin: Origin,
    messages: Mutex<Messages>,
    complete: AtomicBool,
    observer: Mutex<Option<Arc<dyn ExchangeObserver>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Exchange {
    /// Create an exchange for `request`, which also becomes the current request.
    #[must_use]
    pub fn new(request: Request, origin: Origin) -> Arc<Self> {
        Arc::new(Self {
            id: ExchangeId::next(),
            origin,
            messages: Mutex::new(Messages {
                current_request: request.clone(),
                request,
                response: None,
                indexed_mids: Vec::new(),
            }),
            complete: AtomicBool::new(false),
            observer: Mutex::new(None),
        })
    }

    /// Identifier of this exchange.
    #[must_use]
    pub fn id(&self) -> ExchangeId { self.id }

    /// Which side initiated the exchange.
    #[must_use]
    pub fn origin(&self) -> Origin { self.origin }

    /// The request that opened the exchange.
    #[must_use]
    pub fn request(&self) -> Request { lock(&self.messages).request.clone() }

    /// Replace the originating request.
    pub fn set_request(&self, request: Request) { lock(&self.messages).request = request; }

    /// The request fragment currently outstanding.
    #[must_use]
    pub fn current_request(&self) -> Request { lock(&self.messages).current_request.clone() }

    /// Replace the outstanding request, for example when a block-wise
    /// transfer moves on to the next block.
    pub fn set_current_request(&self, request: Request) {
        lock(&self.messages).current_request = request;
    }

    /// Record an outgoing request as the outstanding one.
    ///
    /// The first transmission also fills in the originating request, whose
    /// message ID was unknown until the matcher assigned it.
    pub(crate) fn record_outgoing(&self, request: &Request) {
        let mut messages = lock(&self.messages);
        if messages.request.mid().is_none() {
            messages.request = request.clone();
        }
        messages.current_request = request.clone();
    }

    /// Message ID of the outstanding request.
    #[must_use]
    pub fn current_mid(&self) -> Option<u16> { lock(&self.messages).current_request.mid() }

    /// Token of the originating request.
    #[must_use]
    pub fn token(&self) -> Token { lock(&self.messages).request.token().clone() }

    /// The response, once known.
    #[must_use]
    pub fn response(&self) -> Option<Response> { lock(&self.messages).response.clone() }

    /// Record the response.
    pub fn set_response(&self, response: Response) {
        lock(&self.messages).response = Some(response);
    }

    /// Copy request, current request and response under one lock.
    #[must_use]
    pub fn snapshot(&self) -> ExchangeSnapshot {
        let messages = lock(&self.messages);
        ExchangeSnapshot {
            request: messages.request.clone(),
            current_request: messages.current_request.clone(),
            response: messages.response.clone(),
        }
    }

    /// Remember that the exchange is indexed under `key`.
    pub(crate) fn record_indexed_mid(&self, key: KeyMid) {
        let mut messages = lock(&self.messages);
        if !messages.indexed_mids.contains(&key) {
            messages.indexed_mids.push(key);
        }
    }

    /// Every message-ID key recorded so far, leaving none behind.
    pub(crate) fn take_indexed_mids(&self) -> Vec<KeyMid> {
        std::mem::take(&mut lock(&self.messages).indexed_mids)
    }

    /// Register the completion observer, replacing any previous one.
    pub fn set_observer(&self, observer: Arc<dyn ExchangeObserver>) {
        *lock(&self.observer) = Some(observer);
    }

    /// Whether the exchange has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.complete.load(Ordering::Acquire) }

    /// Mark the exchange complete.
    ///
    /// Only the first call wins: it returns `true` and runs the observer.
    /// Later or concurrent calls return `false` and do nothing.
    pub fn set_complete(&self) -> bool {
        if self
            .complete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let observer = lock(&self.observer).take();
        if let Some(observer) = observer {
            observer.completed(self);
        }
        true
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}
