//! Outbound path for rejections synthesised by the matcher.
//!
//! The matcher never touches sockets. When it has to acknowledge or reset an
//! unmatched message it hands the empty message to an [`ExchangeForwarder`],
//! which is expected to transmit it without reporting back.

use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc;

use crate::{
    exchange::Exchange,
    message::{EmptyMessage, Message},
};

/// Fire-and-forget transmission of empty messages.
pub trait ExchangeForwarder: Send + Sync {
    /// Transmit `message`, optionally on behalf of `exchange`.
    fn send_empty_message(&self, exchange: Option<&Arc<Exchange>>, message: EmptyMessage);
}

/// An empty message queued for transmission.
#[derive(Clone, Debug)]
pub struct Outbound {
    /// Exchange the message belongs to, if any.
    pub exchange: Option<Arc<Exchange>>,
    /// The message to transmit.
    pub message: EmptyMessage,
}

/// Forwarder that queues messages on an unbounded channel drained by the
/// transport task.
///
/// # Examples
///
/// ```
/// use coap_matcher::{
///     forwarder::{ChannelForwarder, ExchangeForwarder},
///     message::{EmptyMessage, MessageType},
/// };
///
/// let (forwarder, mut rx) = ChannelForwarder::new();
/// forwarder.send_empty_message(None, EmptyMessage::new(MessageType::Rst));
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct ChannelForwarder {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelForwarder {
    /// Create a forwarder and the receiver the transport drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ExchangeForwarder for ChannelForwarder {
    fn send_empty_message(&self, exchange: Option<&Arc<Exchange>>, message: EmptyMessage) {
        let kind = message.kind();
        let destination = message.destination();
        let outbound = Outbound {
            exchange: exchange.cloned(),
            message,
        };
        if self.tx.send(outbound).is_err() {
            warn!("dropping outbound {kind}: transport receiver closed, destination={destination}");
        }
    }
}
