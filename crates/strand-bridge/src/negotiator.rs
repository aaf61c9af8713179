//! Upgrade negotiation.
//!
//! Decides whether an exchange may upgrade to a channel. The decision is a
//! pure value: on acceptance, a [`ChannelCreationDirective`] binds the
//! protocol processor instance and the context source for the eventual
//! channel, so the actual upgrade can be deferred to the transport's own
//! upgrade call without re-deciding anything.

use std::sync::Arc;

use strand_core::context::{ContextSnapshot, RequestContext, SnapshotOptions};
use tracing::{debug, warn};

use crate::exchange::Exchange;
use crate::processor::{HandshakePredicate, ProtocolProcessor};

/// Status sent to the peer when the handshake is rejected.
pub const REJECT_STATUS: u16 = 403;
/// Reason sent to the peer when the handshake is rejected.
pub const REJECT_REASON: &str = "WebSocket requests rejected.";

/// Where the adapter obtains the authoritative post-upgrade snapshot.
///
/// Holds the original request so the late capture can still reach it; if
/// the transport has recycled it by then, capture degrades rather than
/// failing the channel open.
#[derive(Clone)]
pub struct ContextSource {
    original: Option<Arc<RequestContext>>,
    options: SnapshotOptions,
}

impl ContextSource {
    /// A source backed by the original request.
    #[must_use]
    pub fn new(original: Arc<RequestContext>, options: SnapshotOptions) -> Self {
        Self {
            original: Some(original),
            options,
        }
    }

    /// A source whose original could not be recovered from the transport.
    /// Late captures from it are always degraded.
    #[must_use]
    pub fn detached(options: SnapshotOptions) -> Self {
        Self {
            original: None,
            options,
        }
    }

    /// Capture the authoritative post-upgrade snapshot, degrading if the
    /// original is gone. Infallible: the options force degraded fallback.
    #[must_use]
    pub fn capture_late(&self) -> ContextSnapshot {
        let options = SnapshotOptions {
            allow_degraded: true,
            ..self.options
        };
        ContextSnapshot::capture(self.original.as_deref(), options)
            .expect("degraded capture cannot fail")
    }
}

/// The pure value produced by an accepted negotiation.
///
/// Deterministically associates the *same* processor instance with the
/// channel the transport will eventually open.
#[derive(Clone)]
pub struct ChannelCreationDirective {
    processor: Arc<dyn ProtocolProcessor>,
    context: ContextSource,
}

impl ChannelCreationDirective {
    /// Bind a processor and context source.
    #[must_use]
    pub fn new(processor: Arc<dyn ProtocolProcessor>, context: ContextSource) -> Self {
        Self { processor, context }
    }

    /// The processor every event on this channel is delivered to.
    #[must_use]
    pub fn processor(&self) -> &Arc<dyn ProtocolProcessor> {
        &self.processor
    }

    /// The context source for the late snapshot.
    #[must_use]
    pub fn context(&self) -> &ContextSource {
        &self.context
    }
}

/// Outcome of one negotiation.
pub enum UpgradeDecision {
    /// Upgrade accepted; the transport performs it with this directive.
    Accepted(ChannelCreationDirective),
    /// Upgrade rejected. The caller terminates the exchange with
    /// [`REJECT_STATUS`] / [`REJECT_REASON`] and must not attempt it.
    Rejected,
}

impl UpgradeDecision {
    /// Whether the upgrade was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Evaluates the handshake policy for channel-eligible exchanges.
pub struct UpgradeNegotiator {
    predicate: Arc<dyn HandshakePredicate>,
    create_session: bool,
}

impl UpgradeNegotiator {
    /// Build a negotiator around a handshake predicate.
    #[must_use]
    pub fn new(predicate: Arc<dyn HandshakePredicate>) -> Self {
        Self {
            predicate,
            create_session: true,
        }
    }

    /// Control whether snapshots create a session when the request carries
    /// none. Defaults to creating one.
    #[must_use]
    pub fn create_session(mut self, create: bool) -> Self {
        self.create_session = create;
        self
    }

    /// Negotiate the upgrade for `exchange`, binding `processor` on
    /// acceptance.
    pub fn negotiate(
        &self,
        exchange: &Exchange,
        processor: Arc<dyn ProtocolProcessor>,
    ) -> UpgradeDecision {
        // Transport-level extensions are never honored: framing stays
        // deterministic and extension-free regardless of what the peer
        // advertises.
        exchange.clear_extensions();

        // Handshake decisions run on the pre-upgrade snapshot; sessions are
        // not created for peers that may yet be rejected.
        let early = match ContextSnapshot::capture(
            Some(exchange.request().as_ref()),
            SnapshotOptions::pre_upgrade().without_session_creation(),
        ) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(exchange_id = %exchange.id(), error = %e, "handshake snapshot failed, rejecting");
                return UpgradeDecision::Rejected;
            }
        };

        match self.predicate.handshake(&early) {
            Ok(true) => {}
            Ok(false) => {
                debug!(exchange_id = %exchange.id(), path = ?early.path(), "handshake predicate rejected upgrade");
                return UpgradeDecision::Rejected;
            }
            Err(e) => {
                warn!(exchange_id = %exchange.id(), error = %e, "handshake predicate failed, rejecting upgrade");
                return UpgradeDecision::Rejected;
            }
        }

        let mut options = SnapshotOptions::post_upgrade();
        options.create_session = self.create_session;
        let context = ContextSource::new(Arc::clone(exchange.request()), options);
        UpgradeDecision::Accepted(ChannelCreationDirective::new(processor, context))
    }
}
