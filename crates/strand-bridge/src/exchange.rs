//! Per-exchange state.
//!
//! One [`Exchange`] represents one inbound request/response pair. The same
//! `Arc<Exchange>` is re-presented to the bridge across the multiple
//! re-entries of a single logical exchange (initial negotiation, then the
//! channel subsystem's own callbacks), so channel progress lives here as an
//! explicit [`ChannelState`] value rather than ad hoc flags scattered over
//! a recycled transport object.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use strand_core::context::RequestContext;
use tracing::debug;
use uuid::Uuid;

/// Channel progress of one exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// No channel upgrade requested and none completed.
    NotChannel,
    /// Upgrade requested; negotiation not yet initiated.
    Negotiating,
    /// Negotiation accepted and the transport-level upgrade initiated; the
    /// channel subsystem now re-enters this exchange from its event loop.
    Upgraded,
    /// Cancelled or resumed; nothing further will happen on this instance.
    Terminal,
}

/// The response the bridge decided on, for the dispatch shim to realize.
pub enum ExchangeResponse {
    /// Terminate the exchange with a status and textual reason.
    Reject {
        /// HTTP-equivalent status code.
        status: u16,
        /// Fixed textual reason sent to the peer.
        reason: String,
    },
    /// A transport-produced upgrade response (opaque to the bridge).
    Upgrade(Box<dyn Any + Send>),
}

impl std::fmt::Debug for ExchangeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reject { status, reason } => f
                .debug_struct("Reject")
                .field("status", status)
                .field("reason", reason)
                .finish(),
            Self::Upgrade(_) => f.write_str("Upgrade(..)"),
        }
    }
}

/// One inbound request/response pair flowing through the bridge.
pub struct Exchange {
    id: String,
    request: Arc<RequestContext>,
    state: Mutex<ChannelState>,
    response: Mutex<Option<ExchangeResponse>>,
    resumed: AtomicBool,
    demands_channel: AtomicBool,
    subprotocol: Mutex<Option<String>>,
    extensions: Mutex<Vec<String>>,
    transport_state: Mutex<Option<Box<dyn Any + Send>>>,
}

impl Exchange {
    /// Build an exchange around a request. The initial channel state is
    /// derived from the request's upgrade semantics.
    #[must_use]
    pub fn new(request: RequestContext) -> Self {
        let initial = if wants_channel_upgrade(&request) {
            ChannelState::Negotiating
        } else {
            ChannelState::NotChannel
        };
        Self {
            id: Uuid::now_v7().to_string(),
            request: Arc::new(request),
            state: Mutex::new(initial),
            response: Mutex::new(None),
            resumed: AtomicBool::new(false),
            demands_channel: AtomicBool::new(false),
            subprotocol: Mutex::new(None),
            extensions: Mutex::new(Vec::new()),
            transport_state: Mutex::new(None),
        }
    }

    /// The exchange id (for logs and correlation).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The request this exchange carries.
    #[must_use]
    pub fn request(&self) -> &Arc<RequestContext> {
        &self.request
    }

    /// Current channel state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Advance the channel state.
    pub(crate) fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    /// Record the response decision. Write-once: later calls are ignored so
    /// a cleanup path cannot clobber the decision already made.
    pub fn respond(&self, response: ExchangeResponse) {
        let mut slot = self.response.lock();
        if slot.is_some() {
            debug!(exchange_id = %self.id, "response already recorded, ignoring");
            return;
        }
        *slot = Some(response);
    }

    /// Reject with a status and reason.
    pub fn reject(&self, status: u16, reason: impl Into<String>) {
        self.respond(ExchangeResponse::Reject {
            status,
            reason: reason.into(),
        });
    }

    /// Take the recorded response, if any.
    #[must_use]
    pub fn take_response(&self) -> Option<ExchangeResponse> {
        self.response.lock().take()
    }

    /// Mark this exchange resumed, for downstream consumers.
    pub fn mark_resumed(&self) {
        self.resumed.store(true, Ordering::Release);
    }

    /// Whether the resume flag is set.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed.load(Ordering::Acquire)
    }

    /// Declare that the bound resource demands channel transport. Used on
    /// the non-channel path to force cancellation of requests that cannot
    /// deliver the channel the resource insists on.
    pub fn declare_channel_demand(&self) {
        self.demands_channel.store(true, Ordering::Release);
    }

    /// Whether the bound resource demands channel transport.
    #[must_use]
    pub fn demands_channel(&self) -> bool {
        self.demands_channel.load(Ordering::Acquire)
    }

    /// The negotiated sub-protocol, if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<String> {
        self.subprotocol.lock().clone()
    }

    /// Record the negotiated sub-protocol.
    pub fn set_subprotocol(&self, subprotocol: impl Into<String>) {
        *self.subprotocol.lock() = Some(subprotocol.into());
    }

    /// The client-declared extension list.
    #[must_use]
    pub fn extensions(&self) -> Vec<String> {
        self.extensions.lock().clone()
    }

    /// Record the client-declared extension list.
    pub fn set_extensions(&self, extensions: Vec<String>) {
        *self.extensions.lock() = extensions;
    }

    /// Drop all client-declared extensions. Channel framing is always
    /// extension-free regardless of what the peer advertises.
    pub fn clear_extensions(&self) {
        self.extensions.lock().clear();
    }

    /// Park transport-specific state on the exchange (e.g. the server's
    /// upgrade token between the dispatch shim and the container).
    pub fn stash_transport(&self, value: Box<dyn Any + Send>) {
        *self.transport_state.lock() = Some(value);
    }

    /// Take previously parked transport state.
    #[must_use]
    pub fn take_transport(&self) -> Option<Box<dyn Any + Send>> {
        self.transport_state.lock().take()
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

/// Whether a request carries channel-upgrade semantics: a `Connection`
/// header listing `upgrade` and an `Upgrade: websocket` header.
#[must_use]
pub fn wants_channel_upgrade(request: &RequestContext) -> bool {
    let connection_upgrades = request
        .header("connection")
        .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")));
    let upgrade_websocket = request
        .header("upgrade")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    connection_upgrades && upgrade_websocket
}
