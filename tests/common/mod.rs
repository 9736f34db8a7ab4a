//! Shared utilities for integration tests.
//!
//! Provides a forwarder that records rejections, a matcher fixture wired to
//! it, fixed client and server endpoints, and message builders. These helpers
//! reduce duplication across test modules.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use coap_matcher::{
    BlockOption,
    EmptyMessage,
    Exchange,
    ExchangeForwarder,
    Matcher,
    MatcherConfig,
    MessageType,
    Method,
    Outbound,
    Request,
    Response,
};
use logtest::Logger;
use rstest::fixture;

/// Endpoint of the local client.
pub const CLIENT: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
    56830,
);
/// Endpoint of the remote server.
pub const SERVER: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2)),
    5683,
);
/// 2.05 Content.
pub const CONTENT: u8 = 0x45;
/// 2.31 Continue.
pub const CONTINUE: u8 = 0x5f;

/// Forwarder that records every message instead of transmitting it.
#[derive(Default)]
pub struct RecordingForwarder {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingForwarder {
    fn sent(&self) -> MutexGuard<'_, Vec<Outbound>> {
        self.sent.lock().expect("forwarder lock poisoned")
    }

    /// Drain the recorded messages.
    pub fn take(&self) -> Vec<Outbound> { std::mem::take(&mut *self.sent()) }
}

impl ExchangeForwarder for RecordingForwarder {
    fn send_empty_message(&self, exchange: Option<&Arc<Exchange>>, message: EmptyMessage) {
        self.sent().push(Outbound {
            exchange: exchange.cloned(),
            message,
        });
    }
}

/// A matcher together with the forwarder it reports rejections to.
pub struct Harness {
    pub matcher: Matcher,
    pub forwarder: Arc<RecordingForwarder>,
}

impl Harness {
    /// Build a harness around `config`.
    pub fn new(config: &MatcherConfig) -> Self {
        let forwarder = Arc::new(RecordingForwarder::default());
        let matcher = Matcher::new(forwarder.clone(), config);
        Self { matcher, forwarder }
    }
}

/// Harness with sequential message IDs and the default deduplicator.
#[fixture]
pub fn harness() -> Harness { Harness::new(&MatcherConfig::default().use_random_mid_start(false)) }

/// A GET request sent by the client to the server.
pub fn client_get(token: &[u8]) -> Request {
    Request::new(Method::Get)
        .with_token(token.to_vec())
        .with_source(CLIENT)
        .with_destination(SERVER)
}

/// A request received by the server from the client.
pub fn inbound_request(method: Method, mid: u16, token: &[u8]) -> Request {
    Request::new(method)
        .with_mid(mid)
        .with_token(token.to_vec())
        .with_source(CLIENT)
        .with_destination(SERVER)
}

/// One block of an upload received from the client.
pub fn upload_block(num: u32, more: bool, mid: u16, token: &[u8]) -> Request {
    inbound_request(Method::Put, mid, token).with_block1(BlockOption::new(num, more, 2))
}

/// A response of the given type arriving from the server.
pub fn server_response(kind: MessageType, mid: u16, token: &[u8]) -> Response {
    Response::new(CONTENT)
        .with_kind(kind)
        .with_mid(mid)
        .with_token(token.to_vec())
        .with_source(SERVER)
        .with_destination(CLIENT)
}

/// A response sent by the server back to the client.
pub fn reply_to_client(kind: MessageType, code: u8) -> Response {
    Response::new(code)
        .with_kind(kind)
        .with_source(SERVER)
        .with_destination(CLIENT)
}

/// Handle to the global logger with exclusive access.
///
/// Serialises log capture so tests do not see each other's records.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global [`Logger`] instance.
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let guard = logger.lock().expect("logger poisoned");

        Self { guard }
    }

    /// Discard records captured so far.
    pub fn clear(&mut self) { while self.guard.pop().is_some() {} }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
