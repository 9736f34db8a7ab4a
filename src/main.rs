//! Demo binary driving a loopback exchange through the matcher.
//!
//! Sends a request, feeds back a piggy-backed response and its retransmission,
//! then an unexpected response, and logs how each one was matched.

mod cli;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use coap_matcher::{
    ChannelForwarder,
    DeduplicatorKind,
    Exchange,
    Matcher,
    MatcherConfig,
    Message,
    MessageType,
    Method,
    Origin,
    Request,
    Response,
};
use tokio::runtime::Handle;

const CONTENT: u8 = 0x45;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = MatcherConfig::default()
        .use_random_mid_start(!cli.sequential_mids)
        .deduplicator(cli.deduplicator.parse::<DeduplicatorKind>()?)
        .exchange_lifetime(Duration::from_millis(cli.exchange_lifetime_ms.max(1)));

    let (forwarder, mut outbound) = ChannelForwarder::new();
    let matcher = Matcher::new(Arc::new(forwarder), &config);
    matcher.set_executor(Handle::current());
    matcher.start()?;

    let local: SocketAddr = ([127, 0, 0, 1], 56830).into();
    let peer: SocketAddr = ([127, 0, 0, 1], 5683).into();

    let mut request = Request::new(Method::Get)
        .with_token(vec![0xca, 0xfe])
        .with_source(local)
        .with_destination(peer);
    let exchange = Exchange::new(request.clone(), Origin::Local);
    matcher.send_request(&exchange, &mut request);
    let mid = request.mid().unwrap_or_default();
    tracing::info!(%mid, token = %request.token(), "request sent");

    for attempt in 1..=2 {
        let mut ack = Response::new(CONTENT)
            .with_mid(mid)
            .with_token(request.token().clone())
            .with_source(peer)
            .with_destination(local);
        let matched = matcher.receive_response(&mut ack);
        tracing::info!(
            attempt,
            matched = ?matched.as_ref().map(|exchange| exchange.id()),
            duplicate = ack.is_duplicate(),
            "piggy-backed response received"
        );
    }
    exchange.set_complete();

    let mut stray = Response::new(CONTENT)
        .with_kind(MessageType::Non)
        .with_mid(mid.wrapping_add(100))
        .with_token(vec![0xde, 0xad])
        .with_source(peer)
        .with_destination(local);
    let matched = matcher.receive_response(&mut stray);
    tracing::info!(matched = matched.is_some(), "unexpected response received");

    while let Ok(sent) = outbound.try_recv() {
        tracing::info!(
            kind = %sent.message.kind(),
            mid = ?sent.message.mid(),
            destination = %sent.message.destination(),
            "rejection forwarded"
        );
    }

    matcher.stop();
    Ok(())
}
