//! Command line interface for the `coap-matcher` demo binary.
//!
//! Shared with the build script, which renders a man page from it.

use clap::Parser;

/// Command line arguments for the `coap-matcher` binary.
#[derive(Debug, Parser)]
#[command(
    name = "coap-matcher",
    version,
    about = "Drive a loopback exchange through the CoAP matcher"
)]
pub struct Cli {
    /// Start message IDs at zero instead of a random value.
    #[arg(long)]
    pub sequential_mids: bool,

    /// Duplicate detection strategy: mark-and-sweep, crop-rotation or none.
    #[arg(
        long,
        default_value = "mark-and-sweep",
        value_parser = ["mark-and-sweep", "crop-rotation", "none"]
    )]
    pub deduplicator: String,

    /// How long message IDs are remembered, in milliseconds.
    #[arg(long, default_value_t = 247_000)]
    pub exchange_lifetime_ms: u64,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_options() {
        let cli = Cli::parse_from([
            "coap-matcher",
            "--sequential-mids",
            "--deduplicator",
            "crop-rotation",
            "--exchange-lifetime-ms",
            "500",
        ]);
        assert!(cli.sequential_mids);
        assert_eq!(cli.deduplicator, "crop-rotation");
        assert_eq!(cli.exchange_lifetime_ms, 500);
    }

    #[test]
    fn rejects_unknown_deduplicator() {
        let parsed = Cli::try_parse_from(["coap-matcher", "--deduplicator", "bloom"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn defaults_match_protocol_lifetime() {
        let cli = Cli::parse_from(["coap-matcher"]);
        assert!(!cli.sequential_mids);
        assert_eq!(cli.exchange_lifetime_ms, 247_000);
    }
}
