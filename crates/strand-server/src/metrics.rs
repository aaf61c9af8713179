//! Prometheus metrics recorder and metric-name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Channel upgrades performed total (counter).
pub const CHANNEL_UPGRADES_TOTAL: &str = "channel_upgrades_total";
/// Handshake rejections total (counter).
pub const CHANNEL_HANDSHAKE_REJECTIONS_TOTAL: &str = "channel_handshake_rejections_total";
/// Channels opened total (counter).
pub const CHANNEL_OPENS_TOTAL: &str = "channel_opens_total";
/// Channels closed total (counter).
pub const CHANNEL_CLOSES_TOTAL: &str = "channel_closes_total";
/// Inbound channel messages total (counter).
pub const CHANNEL_MESSAGES_TOTAL: &str = "channel_messages_total";
/// Failed outbound writes total (counter).
pub const CHANNEL_WRITE_FAILURES_TOTAL: &str = "channel_write_failures_total";
/// Active channel connections (gauge).
pub const CHANNEL_CONNECTIONS_ACTIVE: &str = "channel_connections_active";
/// Idle-timeout disconnects total (counter).
pub const CHANNEL_IDLE_TIMEOUTS_TOTAL: &str = "channel_idle_timeouts_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            CHANNEL_UPGRADES_TOTAL,
            CHANNEL_HANDSHAKE_REJECTIONS_TOTAL,
            CHANNEL_OPENS_TOTAL,
            CHANNEL_CLOSES_TOTAL,
            CHANNEL_MESSAGES_TOTAL,
            CHANNEL_WRITE_FAILURES_TOTAL,
            CHANNEL_CONNECTIONS_ACTIVE,
            CHANNEL_IDLE_TIMEOUTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
