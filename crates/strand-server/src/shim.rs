//! Per-request dispatch shim.
//!
//! The thin glue between axum and the bridge: decides whether a request is
//! a channel-upgrade candidate, builds the exchange, runs the state
//! machine, and realizes the outcome as an HTTP response.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::FromRequestParts;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use strand_bridge::bridge::ChannelBridge;
use strand_bridge::exchange::{Exchange, ExchangeResponse};
use strand_core::context::RequestContext;
use strand_core::outcome::ExchangeOutcome;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Largest request body the shim will buffer into the exchange.
const BODY_LIMIT: usize = 1024 * 1024;

/// Build a router serving the channel endpoint at `path`.
pub fn channel_router(path: &str, bridge: Arc<ChannelBridge>) -> Router {
    Router::new()
        .route(path, any(serve_channel))
        .with_state(bridge)
        .layer(TraceLayer::new_for_http())
}

/// Serve one exchange through the bridge.
pub async fn serve_channel(
    State(bridge): State<Arc<ChannelBridge>>,
    request: Request,
) -> Response {
    let (mut parts, body) = request.into_parts();

    // Candidate sniffing is the transport's business: the extractor
    // succeeds only for genuine upgrade requests on a live connection.
    let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await.ok();

    // Materialize the body up front; the exchange owns its copy from here.
    let body = match axum::body::to_bytes(body, BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to buffer request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };

    let exchange = Exchange::new(request_context(&parts, body));
    let declared = declared_extensions(exchange.request());
    if !declared.is_empty() {
        exchange.set_extensions(declared);
    }
    if let Some(upgrade) = upgrade {
        exchange.stash_transport(Box::new(upgrade));
    }

    match bridge.process(&exchange).await {
        Ok(outcome) => realize_response(&exchange, outcome),
        Err(e) => {
            error!(exchange_id = %exchange.id(), error = %e, "exchange processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "channel processing failed").into_response()
        }
    }
}

/// Copy the request into the bridge's owned representation.
fn request_context(parts: &Parts, body: Bytes) -> RequestContext {
    let mut ctx = RequestContext::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        ctx = ctx.with_query(query);
    }
    for (name, value) in &parts.headers {
        ctx = ctx.with_header(
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        );
    }
    if !body.is_empty() {
        ctx = ctx.with_body(body);
    }
    ctx
}

/// The extension list the client declared, split across any number of
/// `Sec-WebSocket-Extensions` headers. The negotiator clears these before
/// evaluating the handshake; they are recorded so that clearing is a real
/// decision and not an accident of representation.
fn declared_extensions(request: &RequestContext) -> Vec<String> {
    request
        .header_all("sec-websocket-extensions")
        .iter()
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Map the bridge's decision onto an HTTP response.
fn realize_response(exchange: &Exchange, outcome: ExchangeOutcome) -> Response {
    match exchange.take_response() {
        Some(ExchangeResponse::Upgrade(token)) => match token.downcast::<Response>() {
            Ok(response) => *response,
            Err(_) => {
                error!(exchange_id = %exchange.id(), "upgrade response had unexpected type");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Some(ExchangeResponse::Reject { status, reason }) => {
            let status =
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, reason).into_response()
        }
        None => match outcome {
            ExchangeOutcome::Continue | ExchangeOutcome::Resume => {
                StatusCode::OK.into_response()
            }
            ExchangeOutcome::Suspend => StatusCode::ACCEPTED.into_response(),
            // Cancelled without a recorded response should not happen; the
            // bridge records one on every cancellation path.
            ExchangeOutcome::Cancelled => StatusCode::FORBIDDEN.into_response(),
        },
    }
}
