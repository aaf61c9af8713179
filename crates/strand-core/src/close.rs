//! Channel close codes.
//!
//! A [`CloseCode`] is the u16 status carried on a close frame. The named
//! constants cover the codes the bridge itself produces or inspects; any
//! other peer-supplied value passes through untouched.

use serde::{Deserialize, Serialize};

/// A channel close status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// Endpoint going away (server shutdown, navigation).
    pub const GOING_AWAY: Self = Self(1001);
    /// Protocol error detected by the peer.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// Abnormal closure: the connection dropped without a close frame.
    /// Synthesized by the bridge when the transport reports an error.
    pub const ABNORMAL: Self = Self(1006);
    /// Message too big for the receiver's configured limits.
    pub const MESSAGE_TOO_BIG: Self = Self(1009);

    /// The raw u16 value.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Whether this code indicates an abnormal termination.
    #[must_use]
    pub fn is_abnormal(self) -> bool {
        self == Self::ABNORMAL
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
