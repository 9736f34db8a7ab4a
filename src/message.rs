//! Message model consumed by the exchange matcher.
//!
//! Only the identity fields the matcher reads are modelled here: message ID,
//! token, type, request method, response code, block options and endpoints.
//! Parsing and serialising these messages belongs to the transport adapter.

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr},
};

use bytes::Bytes;
use derive_more::Display;

/// Transmission type carried in every message header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum MessageType {
    /// Confirmable: the peer must acknowledge or reset it.
    #[display("CON")]
    Con,
    /// Non-confirmable.
    #[display("NON")]
    Non,
    /// Acknowledgement, optionally carrying a piggy-backed response.
    #[display("ACK")]
    Ack,
    /// Reset: the receiver could not process a message.
    #[display("RST")]
    Rst,
}

/// Request method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Method {
    /// Retrieve a representation. Only GET downloads are tracked block-wise.
    #[display("GET")]
    Get,
    /// Process the enclosed representation.
    #[display("POST")]
    Post,
    /// Create or replace the target resource.
    #[display("PUT")]
    Put,
    /// Remove the target resource.
    #[display("DELETE")]
    Delete,
}

/// Opaque correlation token chosen by the requester.
///
/// # Examples
///
/// ```
/// use coap_matcher::message::Token;
/// let token = Token::from_static(&[0xbe, 0xef]);
/// assert_eq!(token.to_string(), "beef");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Token(Bytes);

impl Token {
    /// An empty token, as carried by empty ACK and RST messages.
    #[must_use]
    pub const fn empty() -> Self { Self(Bytes::new()) }

    /// Wrap a static byte slice.
    #[must_use]
    pub const fn from_static(bytes: &'static [u8]) -> Self { Self(Bytes::from_static(bytes)) }

    /// Borrow the raw token bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    /// Number of bytes in the token.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the token carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<Vec<u8>> for Token {
    fn from(value: Vec<u8>) -> Self { Self(Bytes::from(value)) }
}

impl From<Bytes> for Token {
    fn from(value: Bytes) -> Self { Self(value) }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Block-wise transfer option (block-1 or block-2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockOption {
    /// Zero-based block number.
    pub num: u32,
    /// Whether further blocks follow.
    pub more: bool,
    /// Size exponent; the block size is `2^(szx + 4)` bytes.
    pub szx: u8,
}

impl BlockOption {
    /// Create a block option.
    #[must_use]
    pub const fn new(num: u32, more: bool, szx: u8) -> Self { Self { num, more, szx } }

    /// Block size in bytes.
    #[must_use]
    pub const fn size(self) -> usize { 1 << (self.szx as usize + 4) }
}

/// Options the matcher inspects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Request payload fragmentation.
    pub block1: Option<BlockOption>,
    /// Response payload fragmentation.
    pub block2: Option<BlockOption>,
}

impl Options {
    /// Whether either block option continues a transfer (block number above zero).
    #[must_use]
    pub fn continues_transfer(&self) -> bool {
        self.block1.is_some_and(|block| block.num != 0)
            || self.block2.is_some_and(|block| block.num != 0)
    }
}

/// Identity fields shared by requests, responses and empty messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    kind: MessageType,
    mid: Option<u16>,
    token: Token,
    source: SocketAddr,
    destination: SocketAddr,
    duplicate: bool,
}

impl Header {
    fn new(kind: MessageType) -> Self {
        let unspecified = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        Self {
            kind,
            mid: None,
            token: Token::empty(),
            source: unspecified,
            destination: unspecified,
            duplicate: false,
        }
    }
}

/// Read and write access to the identity fields of a message.
///
/// Implementors expose their [`Header`]; every accessor is provided.
pub trait Message {
    /// Borrow the message header.
    fn header(&self) -> &Header;

    /// Mutably borrow the message header.
    fn header_mut(&mut self) -> &mut Header;

    /// Transmission type.
    fn kind(&self) -> MessageType { self.header().kind }

    /// Message ID, or `None` when not yet assigned.
    fn mid(&self) -> Option<u16> { self.header().mid }

    /// Assign the message ID.
    fn set_mid(&mut self, mid: u16) { self.header_mut().mid = Some(mid); }

    /// Correlation token.
    fn token(&self) -> &Token { &self.header().token }

    /// Endpoint the message came from.
    fn source(&self) -> SocketAddr { self.header().source }

    /// Endpoint the message is sent to.
    fn destination(&self) -> SocketAddr { self.header().destination }

    /// Whether the matcher recognised this message as a retransmission.
    fn is_duplicate(&self) -> bool { self.header().duplicate }

    /// Flag the message as a retransmission.
    fn set_duplicate(&mut self, duplicate: bool) { self.header_mut().duplicate = duplicate; }
}

macro_rules! header_builders {
    ($ty:ty) => {
        impl Message for $ty {
            fn header(&self) -> &Header { &self.header }

            fn header_mut(&mut self) -> &mut Header { &mut self.header }
        }

        impl $ty {
            /// Set the transmission type.
            #[must_use]
            pub fn with_kind(mut self, kind: MessageType) -> Self {
                self.header.kind = kind;
                self
            }

            /// Set the message ID.
            #[must_use]
            pub fn with_mid(mut self, mid: u16) -> Self {
                self.header.mid = Some(mid);
                self
            }

            /// Set the correlation token.
            #[must_use]
            pub fn with_token(mut self, token: impl Into<Token>) -> Self {
                self.header.token = token.into();
                self
            }

            /// Set the source endpoint.
            #[must_use]
            pub fn with_source(mut self, source: SocketAddr) -> Self {
                self.header.source = source;
                self
            }

            /// Set the destination endpoint.
            #[must_use]
            pub fn with_destination(mut self, destination: SocketAddr) -> Self {
                self.header.destination = destination;
                self
            }
        }
    };
}

/// A request as seen by the matcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    header: Header,
    method: Method,
    options: Options,
}

impl Request {
    /// Create a confirmable request with no MID, an empty token and
    /// unspecified endpoints.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            header: Header::new(MessageType::Con),
            method,
            options: Options::default(),
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> Method { self.method }

    /// Block options carried by the request.
    #[must_use]
    pub fn options(&self) -> &Options { &self.options }

    /// Attach a block-1 option.
    #[must_use]
    pub fn with_block1(mut self, block: BlockOption) -> Self {
        self.options.block1 = Some(block);
        self
    }

    /// Attach a block-2 option.
    #[must_use]
    pub fn with_block2(mut self, block: BlockOption) -> Self {
        self.options.block2 = Some(block);
        self
    }
}

header_builders!(Request);

/// A response as seen by the matcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    header: Header,
    code: u8,
    options: Options,
    last: bool,
}

impl Response {
    /// Create a piggy-backed (ACK) response with the given raw response code.
    #[must_use]
    pub fn new(code: u8) -> Self {
        Self {
            header: Header::new(MessageType::Ack),
            code,
            options: Options::default(),
            last: true,
        }
    }

    /// Raw response code (`class << 5 | detail`).
    #[must_use]
    pub fn code(&self) -> u8 { self.code }

    /// Block options carried by the response.
    #[must_use]
    pub fn options(&self) -> &Options { &self.options }

    /// Attach a block-2 option.
    #[must_use]
    pub fn with_block2(mut self, block: BlockOption) -> Self {
        self.options.block2 = Some(block);
        self
    }

    /// Mark whether this response ends the exchange.
    #[must_use]
    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    /// Whether this response is the final one of its exchange.
    ///
    /// A block-2 fragment with the *more* flag set is never final.
    #[must_use]
    pub fn is_last(&self) -> bool { self.last && !self.options.block2.is_some_and(|b| b.more) }
}

header_builders!(Response);

/// A message with no code, used for bare acknowledgements and resets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmptyMessage {
    header: Header,
}

impl EmptyMessage {
    /// Create an empty message of the given type.
    #[must_use]
    pub fn new(kind: MessageType) -> Self {
        Self {
            header: Header::new(kind),
        }
    }

    /// Build an ACK answering `message`, addressed back to its source.
    #[must_use]
    pub fn ack_for(message: &impl Message) -> Self { Self::reply(MessageType::Ack, message) }

    /// Build an RST rejecting `message`, addressed back to its source.
    #[must_use]
    pub fn rst_for(message: &impl Message) -> Self { Self::reply(MessageType::Rst, message) }

    fn reply(kind: MessageType, message: &impl Message) -> Self {
        let mut header = Header::new(kind);
        header.mid = message.mid();
        header.source = message.destination();
        header.destination = message.source();
        Self { header }
    }
}

header_builders!(EmptyMessage);
