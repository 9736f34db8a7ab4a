//! Metric helpers for the matcher.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::{exchange::Origin, message::MessageType};

/// Name of the counter tracking messages flagged as duplicates.
pub const DUPLICATES_TOTAL: &str = "coap_matcher_duplicates_total";
/// Name of the counter tracking rejections sent for unmatched messages.
pub const REJECTIONS_TOTAL: &str = "coap_matcher_rejections_total";
/// Name of the counter tracking completed exchanges.
pub const EXCHANGES_COMPLETED: &str = "coap_matcher_exchanges_completed_total";

/// Kind of inbound message that was flagged as a duplicate.
#[derive(Clone, Copy, Debug)]
pub enum Inbound {
    /// A request or request block.
    Request,
    /// A piggy-backed or separate response.
    Response,
}

impl Inbound {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Inbound::Request => "request",
            Inbound::Response => "response",
        }
    }
}

/// Record a duplicate of the given inbound kind.
pub fn inc_duplicates(inbound: Inbound) {
    #[cfg(feature = "metrics")]
    counter!(DUPLICATES_TOTAL, "direction" => inbound.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = inbound;
}

/// Record a rejection sent with the given empty message type.
pub fn inc_rejections(kind: MessageType) {
    #[cfg(feature = "metrics")]
    counter!(REJECTIONS_TOTAL, "kind" => if kind == MessageType::Ack { "ack" } else { "rst" })
        .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a completed exchange.
pub fn inc_completed(origin: Origin) {
    #[cfg(feature = "metrics")]
    counter!(EXCHANGES_COMPLETED, "origin" => match origin {
        Origin::Local => "local",
        Origin::Remote => "remote",
    })
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = origin;
}
