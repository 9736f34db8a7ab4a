//! Table cleanup run when an exchange completes.

use std::{
    hash::Hash,
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use log::debug;

use super::ExchangeTables;
use crate::{
    exchange::{Exchange, ExchangeObserver, Origin},
    key::KeyToken,
    metrics,
};

/// Removes a completed exchange from the matcher tables.
///
/// Local exchanges are indexed by the token of the request we sent, remote
/// exchanges by the token of the request we received while a block-wise
/// transfer is ongoing. Both are indexed by the message ID of every message
/// they sent.
#[derive(Debug)]
pub(super) struct CompletionObserver {
    tables: Weak<ExchangeTables>,
}

impl CompletionObserver {
    pub(super) fn new(tables: &Arc<ExchangeTables>) -> Self {
        Self {
            tables: Arc::downgrade(tables),
        }
    }
}

/// Remove `key` only while it still points at `exchange`; a newer exchange
/// may have reused the key.
pub(super) fn remove_if_owned<K: Eq + Hash>(
    table: &DashMap<K, Arc<Exchange>>,
    key: &K,
    exchange: &Exchange,
) {
    table.remove_if(key, |_, stored| std::ptr::eq(Arc::as_ptr(stored), exchange));
}

impl ExchangeObserver for CompletionObserver {
    fn completed(&self, exchange: &Exchange) {
        metrics::inc_completed(exchange.origin());
        let Some(tables) = self.tables.upgrade() else {
            return;
        };
        let request = exchange.request();

        match exchange.origin() {
            Origin::Local => {
                let token_key = KeyToken::from_destination(&request);
                remove_if_owned(&tables.by_token, &token_key, exchange);
            }
            Origin::Remote => {
                let token_key = KeyToken::from_source(&request);
                remove_if_owned(&tables.ongoing, &token_key, exchange);
            }
        }
        // Every block of a transfer is indexed under its own message ID.
        for key in exchange.take_indexed_mids() {
            remove_if_owned(&tables.by_mid, &key, exchange);
        }
        debug!("{} completed: origin={}", exchange.id(), exchange.origin());
    }
}
