//! Lookup keys identifying messages and exchanges per remote endpoint.
//!
//! Message IDs and tokens are only unique per peer, so both keys pair the
//! identifier with the peer's [`SocketAddr`]. Equality and hashing compare the
//! identifier bytes, address and port exactly.

use std::net::SocketAddr;

use derive_more::Display;

use crate::message::{Message, Token};

/// Key for a message ID scoped to a remote endpoint.
///
/// # Examples
///
/// ```
/// use coap_matcher::key::KeyMid;
/// let key = KeyMid::new(7, "127.0.0.1:5683".parse().unwrap());
/// assert_eq!(key.to_string(), "mid 7 @ 127.0.0.1:5683");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("mid {mid} @ {peer}")]
pub struct KeyMid {
    mid: u16,
    peer: SocketAddr,
}

impl KeyMid {
    /// Create a key from a message ID and the peer it is scoped to.
    #[must_use]
    pub const fn new(mid: u16, peer: SocketAddr) -> Self { Self { mid, peer } }

    /// Key a message by its ID and source endpoint.
    ///
    /// Returns `None` when the message has no ID yet.
    pub fn from_source(message: &impl Message) -> Option<Self> {
        message.mid().map(|mid| Self::new(mid, message.source()))
    }

    /// Key a message by its ID and destination endpoint.
    ///
    /// Returns `None` when the message has no ID yet.
    pub fn from_destination(message: &impl Message) -> Option<Self> {
        message.mid().map(|mid| Self::new(mid, message.destination()))
    }

    /// The message ID.
    #[must_use]
    pub const fn mid(&self) -> u16 { self.mid }

    /// The remote endpoint.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr { self.peer }
}

/// Key for a token scoped to a remote endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("token {token} @ {peer}")]
pub struct KeyToken {
    token: Token,
    peer: SocketAddr,
}

impl KeyToken {
    /// Create a key from a token and the peer it is scoped to.
    #[must_use]
    pub fn new(token: Token, peer: SocketAddr) -> Self { Self { token, peer } }

    /// Key a message by its token and source endpoint.
    pub fn from_source(message: &impl Message) -> Self {
        Self::new(message.token().clone(), message.source())
    }

    /// Key a message by its token and destination endpoint.
    pub fn from_destination(message: &impl Message) -> Self {
        Self::new(message.token().clone(), message.destination())
    }

    /// The token.
    #[must_use]
    pub fn token(&self) -> &Token { &self.token }

    /// The remote endpoint.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr { self.peer }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::message::{Method, Request};

    fn addr(port: u16) -> SocketAddr { SocketAddr::from(([192, 0, 2, 1], port)) }

    #[test]
    fn keys_differ_by_port() {
        let keys: HashSet<_> = [KeyMid::new(1, addr(5683)), KeyMid::new(1, addr(5684))].into();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn token_keys_compare_bytes() {
        let a = KeyToken::new(Token::from(vec![1, 2, 3]), addr(5683));
        let b = KeyToken::new(Token::from_static(&[1, 2, 3]), addr(5683));
        assert_eq!(a, b);
        assert_ne!(a, KeyToken::new(Token::from(vec![1, 2]), addr(5683)));
    }

    #[test]
    fn unassigned_mid_yields_no_key() {
        let request = Request::new(Method::Get).with_destination(addr(5683));
        assert!(KeyMid::from_destination(&request).is_none());
        let request = request.with_mid(9);
        assert_eq!(KeyMid::from_destination(&request), Some(KeyMid::new(9, addr(5683))));
    }
}
