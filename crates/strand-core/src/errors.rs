//! Error types for the channel bridge.
//!
//! The taxonomy mirrors how failures surface:
//!
//! - [`BridgeError`]: failures of the exchange state machine itself.
//!   Only upgrade failures propagate to the dispatch loop; handshake
//!   rejections are an outcome, not an error.
//! - [`SocketError`]: transport-level socket failures, shared by the live
//!   socket and test doubles.
//! - [`PredicateError`]: a handshake predicate that failed instead of
//!   answering; treated as a rejection by the negotiator.

use thiserror::Error;

/// Boxed error type for crossing trait-object seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures of the exchange state machine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The channel subsystem was never initialized. A configuration defect,
    /// not a per-request failure: the container must be fixed.
    #[error("channel container unavailable")]
    ContainerUnavailable,

    /// The transport-level upgrade call itself failed. The exchange cannot
    /// proceed in either mode, so this propagates to the dispatch loop.
    #[error("channel upgrade failed: {source}")]
    Upgrade {
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },

    /// A delegated exchange pipeline failed.
    #[error("{stage} pipeline failed: {source}")]
    Pipeline {
        /// Which pipeline failed ("fallback" or "suspended").
        stage: &'static str,
        /// Underlying pipeline error.
        #[source]
        source: BoxError,
    },
}

impl BridgeError {
    /// Wrap a transport error as an upgrade failure.
    #[must_use]
    pub fn upgrade(source: impl Into<BoxError>) -> Self {
        Self::Upgrade {
            source: source.into(),
        }
    }

    /// Wrap a pipeline error with its stage label.
    #[must_use]
    pub fn pipeline(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Pipeline {
            stage,
            source: source.into(),
        }
    }
}

/// Transport-level socket failures.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The connection is no longer open.
    #[error("channel is closed")]
    Closed,

    /// The underlying transport rejected or dropped the operation.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Failure to capture a context snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The original request context is unavailable and degraded capture was
    /// not permitted by the caller.
    #[error("original request context unavailable and degraded capture not allowed")]
    OriginalUnavailable,
}

/// A handshake predicate that failed rather than answering.
///
/// The negotiator logs this and treats the exchange exactly like an
/// explicit rejection.
#[derive(Debug, Error)]
#[error("handshake predicate failed: {message}")]
pub struct PredicateError {
    /// What went wrong.
    pub message: String,
}

impl PredicateError {
    /// Create a predicate error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
