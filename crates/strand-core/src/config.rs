//! Channel transport configuration knobs.
//!
//! Read once at startup and applied by the transport binding; the bridge
//! core never re-checks these limits per message. Every knob is optional;
//! `None` means "use the transport default".
//!
//! Two loading paths exist: serde (camelCase JSON, partial objects allowed)
//! and [`ChannelConfig::from_params`] for generic string key/value
//! configuration sources. Malformed values are logged and ignored rather
//! than failing startup.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key for the transport input buffer size in bytes.
pub const PARAM_BUFFER_SIZE: &str = "channel.bufferSize";
/// Key for the connection idle timeout in milliseconds.
pub const PARAM_IDLE_TIMEOUT_MS: &str = "channel.idleTimeoutMs";
/// Key for the maximum inbound text message size in bytes.
pub const PARAM_MAX_TEXT_SIZE: &str = "channel.maxTextMessageSize";
/// Key for the maximum inbound binary message size in bytes.
pub const PARAM_MAX_BINARY_SIZE: &str = "channel.maxBinaryMessageSize";

/// Startup-time channel transport knobs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelConfig {
    /// Transport input buffer size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    /// Connection idle timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    /// Maximum inbound text message size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_text_message_size: Option<usize>,
    /// Maximum inbound binary message size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_binary_message_size: Option<usize>,
}

impl ChannelConfig {
    /// Load from a generic string key/value configuration source.
    ///
    /// Unknown keys are ignored. Values that fail to parse are logged at
    /// warn level and left at their default, matching the tolerance of the
    /// rest of the settings stack.
    #[must_use]
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            buffer_size: parse_param(params, PARAM_BUFFER_SIZE),
            idle_timeout_ms: parse_param(params, PARAM_IDLE_TIMEOUT_MS),
            max_text_message_size: parse_param(params, PARAM_MAX_TEXT_SIZE),
            max_binary_message_size: parse_param(params, PARAM_MAX_BINARY_SIZE),
        }
    }

    /// The idle timeout as a [`Duration`], if configured.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// The larger of the two message-size limits, if either is configured.
    ///
    /// For transports with a single message-size knob covering both frame
    /// kinds.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        match (self.max_text_message_size, self.max_binary_message_size) {
            (Some(t), Some(b)) => Some(t.max(b)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }
}

fn parse_param<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = params.get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed channel config value");
            None
        }
    }
}
