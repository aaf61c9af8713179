//! Minimal channel server: upgrades `/chat`, echoes every text frame, and
//! serves Prometheus metrics at `/metrics`.
//!
//! ```sh
//! cargo run -p strand-server --example echo_server
//! websocat ws://127.0.0.1:9400/chat
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use strand_bridge::bridge::{ChannelBridge, ChannelContainer};
use strand_bridge::handle::ChannelHandle;
use strand_bridge::processor::{ChannelResponse, ProtocolProcessor};
use strand_core::close::CloseCode;
use strand_core::config::{ChannelConfig, PARAM_IDLE_TIMEOUT_MS};
use strand_core::context::ContextSnapshot;
use strand_core::errors::{BoxError, PredicateError};
use strand_core::payload::MessagePayload;
use strand_server::container::AxumChannelContainer;
use strand_server::shim::channel_router;

struct Echo;

#[async_trait]
impl ProtocolProcessor for Echo {
    async fn open(
        &self,
        channel: ChannelHandle,
        request: ContextSnapshot,
        _response: ChannelResponse,
    ) -> Result<(), BoxError> {
        info!(
            channel_id = %channel.id(),
            path = ?request.path(),
            degraded = request.is_degraded(),
            "channel opened"
        );
        Ok(())
    }

    async fn invoke_protocol(&self, channel: &ChannelHandle, payload: MessagePayload) {
        match payload {
            MessagePayload::Text(text) => {
                let _ = channel.write_text(text);
            }
            MessagePayload::Binary(data) => {
                let _ = channel.write_binary(data);
            }
        }
    }

    async fn close(&self, channel: &ChannelHandle, code: CloseCode) {
        info!(channel_id = %channel.id(), code = %code, "channel closed");
    }
}

async fn metrics_endpoint(State(handle): State<PrometheusHandle>) -> String {
    strand_server::metrics::render(&handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,strand_bridge=debug,strand_server=debug".into()),
        )
        .init();

    let metrics_handle = strand_server::metrics::install_recorder();

    let params: HashMap<String, String> =
        [(PARAM_IDLE_TIMEOUT_MS.to_owned(), "60000".to_owned())].into();
    let config = ChannelConfig::from_params(&params);

    let bridge = Arc::new(
        ChannelBridge::builder(
            Arc::new(Echo),
            Arc::new(|_: &ContextSnapshot| -> Result<bool, PredicateError> { Ok(true) }),
        )
        .container(Arc::new(AxumChannelContainer::new(config)) as Arc<dyn ChannelContainer>)
        .build(),
    );

    let app: Router = channel_router("/chat", bridge).merge(
        Router::new()
            .route("/metrics", get(metrics_endpoint))
            .with_state(metrics_handle),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:9400").await?;
    info!("echo channel server listening on ws://127.0.0.1:9400/chat");
    axum::serve(listener, app).await?;
    Ok(())
}
