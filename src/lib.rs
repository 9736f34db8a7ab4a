#![doc(html_root_url = "https://docs.rs/coap-matcher/latest")]
//! Exchange matching and duplicate detection for a CoAP-style protocol.
//!
//! This crate correlates request, response and empty messages with the
//! logical exchange they belong to, recognises retransmissions, and routes
//! block-wise fragments to the exchange that owns the transfer. Socket I/O,
//! message parsing and retransmission timers are left to the caller.

pub mod config;
pub mod dedup;
pub mod error;
pub mod exchange;
pub mod forwarder;
pub mod key;
pub mod matcher;
pub mod message;
pub mod metrics;

pub use config::{DeduplicatorKind, MatcherConfig};
pub use dedup::{
    CropRotationDeduplicator,
    Deduplicator,
    NoDeduplicator,
    SweepDeduplicator,
    create_deduplicator,
};
pub use error::{MatcherError, UnknownDeduplicator};
pub use exchange::{Exchange, ExchangeId, ExchangeObserver, ExchangeSnapshot, Origin};
pub use forwarder::{ChannelForwarder, ExchangeForwarder, Outbound};
pub use key::{KeyMid, KeyToken};
pub use matcher::Matcher;
pub use message::{
    BlockOption,
    EmptyMessage,
    Message,
    MessageType,
    Method,
    Options,
    Request,
    Response,
    Token,
};
