//! The outcome contract of processing one exchange.
//!
//! Every pass through the bridge resolves to exactly one [`ExchangeOutcome`],
//! consumed by the outer dispatch loop to decide whether to hold the
//! underlying connection open, finalize it, or reject it.

use serde::{Deserialize, Serialize};

/// Result of processing one inbound exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// The exchange completed synchronously; the dispatch loop may finalize
    /// the response. Also returned immediately after a successful upgrade,
    /// where the transport owns completing the handshake from there.
    Continue,
    /// The exchange is parked awaiting further channel events. No
    /// exchange-level action is taken.
    Suspend,
    /// A previously suspended exchange was resumed. Terminal for this
    /// exchange instance.
    Resume,
    /// The exchange was terminated (rejected handshake, demanded channel
    /// that cannot arrive, or terminal re-entry). Terminal.
    Cancelled,
}

impl ExchangeOutcome {
    /// Stable string form (for logs and metrics labels).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this outcome is terminal for the exchange instance.
    ///
    /// `Continue` immediately after upgrade acceptance is *not* terminal:
    /// the channel subsystem re-enters the same logical exchange from its
    /// own event loop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resume | Self::Cancelled)
    }
}

impl std::fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
