//! Errors raised by [`Matcher`](crate::matcher::Matcher) lifecycle operations
//! and configuration parsing.
//!
//! Protocol anomalies never surface here: unmatched messages are rejected on
//! the wire and dropped, and duplicates are flagged on the message itself.

use thiserror::Error;

/// Errors that indicate the matcher was wired up incorrectly.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MatcherError {
    /// `start` was called before `set_executor`.
    #[error("matcher has no executor to schedule deduplicator maintenance")]
    MissingExecutor,
}

/// A deduplicator name that matches no [`DeduplicatorKind`].
///
/// [`DeduplicatorKind`]: crate::config::DeduplicatorKind
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown deduplicator `{0}`; expected mark-and-sweep, crop-rotation or none")]
pub struct UnknownDeduplicator(pub String);
