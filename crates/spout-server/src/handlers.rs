//! HTTP handlers for Spout server.
//!
//! Every path outside the control API prefix is an event stream endpoint.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, MeteredSink};
use crate::resolve::TopicResolver;
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use spout_core::{Hub, HubError, Message, SubscribeRequest, TopicInfo, TracingLogger};
use spout_protocol::EventCodec;
use spout_transport::{body_stream, drain, open_stream, ChannelSink, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The dispatch hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
    /// Maps stream requests to topics.
    pub resolver: Arc<dyn TopicResolver>,
    /// Encoder stamping the configured retry interval.
    pub codec: EventCodec,
    /// Extra headers for stream responses.
    pub extra_headers: HeaderMap,
}

impl AppState {
    /// Create new app state and start the hub.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let options = config
            .hub_options()
            .with_logger(Arc::new(TracingLogger))
            .with_on_disconnect(|topic, identity| {
                debug!(topic, identity, "Subscriber removed");
                metrics::record_hub_disconnect();
            });

        Self {
            hub: Hub::new(options),
            resolver: config.stream.resolver.build(),
            codec: EventCodec::new(config.stream.retry_interval_ms),
            extra_headers: header_map(&config),
            config,
        }
    }
}

fn header_map(config: &Config) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.stream.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid stream header"),
        }
    }
    headers
}

/// Control API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Hub(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::TopicNotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Body of a publish request.
///
/// An empty `topic` publishes to every topic; an empty `subscriber`
/// publishes to every subscriber of the resolved topics.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PublishRequest {
    pub topic: String,
    pub subscriber: String,
    pub id: String,
    pub data: String,
    pub event: String,
    pub version: u32,
}

#[derive(Debug, Deserialize)]
pub struct TopicQuery {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub topic: String,
}

/// Build the HTTP router.
pub fn app(state: Arc<AppState>) -> Router {
    let prefix = state.config.api.prefix.trim_end_matches('/').to_string();

    Router::new()
        .route("/health", get(health_handler))
        .route(&format!("{prefix}/publish"), post(publish_handler))
        .route(&format!("{prefix}/topics"), get(topics_handler))
        .route(&format!("{prefix}/topic"), get(topic_handler))
        .route(&format!("{prefix}/close"), post(close_handler))
        .route(&format!("{prefix}/restart"), post(restart_handler))
        .fallback(stream_handler)
        .with_state(state)
}

/// Run the HTTP server until ctrl-c.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app(state.clone());

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Spout server listening on {}", addr);
    info!("Control API: http://{}{}", addr, config.api.prefix);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.hub.clone()))
        .await?;

    info!("Spout server stopped");
    Ok(())
}

/// Wait for ctrl-c, then close every stream so the server can drain.
async fn shutdown_signal(hub: Hub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received");
    if let Err(e) = hub.shutdown().await {
        warn!("Hub shutdown failed: {}", e);
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Stream endpoint for every path outside the control API.
async fn stream_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _) = request.into_parts();

    if is_api_path(parts.uri.path(), &state.config.api.prefix) {
        return StatusCode::NOT_FOUND.into_response();
    }

    if parts.method == Method::OPTIONS {
        return (StatusCode::OK, state.extra_headers.clone()).into_response();
    }
    if parts.method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let resolution = state.resolver.resolve(&parts);
    let mut subscribe = SubscribeRequest::new(resolution.topic)
        .with_identity(resolution.identity)
        .with_min_version(resolution.min_version);
    if let Some(last_event_id) = parts
        .headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
    {
        subscribe = subscribe.with_last_event_id(last_event_id);
    }

    let (sink, receiver) = ChannelSink::new(state.config.stream.body_buffer);
    let mut sink = MeteredSink::new(sink);

    let subscription = match open_stream(&state.hub, subscribe, &sink).await {
        Ok(subscription) => subscription,
        Err(TransportError::StreamingUnsupported) => {
            metrics::record_error("streaming_unsupported");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Streaming unsupported.").into_response();
        }
        Err(e) => {
            warn!(error = %e, "Failed to open stream");
            metrics::record_error("subscribe");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    metrics::record_subscription();

    let hub = state.hub.clone();
    let codec = state.codec;
    tokio::spawn(async move {
        let _metrics_guard = ConnectionMetricsGuard::new();
        refresh_active_topics(&hub).await;

        let report = drain(&hub, subscription, &mut sink, codec).await;
        debug!(
            outcome = ?report.outcome,
            delivered = report.delivered,
            bytes = report.bytes,
            "Stream closed"
        );

        // Every topic removal ends at least one drain, so this runs after it.
        refresh_active_topics(&hub).await;
    });

    let mut response = Response::new(Body::from_stream(body_stream(receiver)));
    let headers = response.headers_mut();
    headers.extend(state.extra_headers.clone());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Whether `path` falls under the control API `prefix`.
fn is_api_path(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Publish the current topic count to the active-topics gauge.
async fn refresh_active_topics(hub: &Hub) {
    if let Ok(topics) = hub.list_topics().await {
        metrics::set_active_topics(topics.len());
    }
}

async fn publish_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> Result<StatusCode, ApiError> {
    let scope = match (request.topic.is_empty(), request.subscriber.is_empty()) {
        (true, _) => "all",
        (false, true) => "topic",
        (false, false) => "subscriber",
    };
    debug!(topic = %request.topic, scope, "Publish request");

    let message =
        Message::new(request.id, request.data, request.event).with_version(request.version);
    state
        .hub
        .broadcast(request.topic, request.subscriber, message)
        .await?;

    metrics::record_publish(scope);
    Ok(StatusCode::ACCEPTED)
}

async fn topics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TopicInfo>>, ApiError> {
    let mut topics = Vec::new();
    for name in state.hub.list_topics().await? {
        // A topic can vanish between the listing and the lookup.
        if let Some(info) = state.hub.get_topic(name).await? {
            topics.push(info);
        }
    }
    Ok(Json(topics))
}

async fn topic_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopicQuery>,
) -> Result<Json<TopicInfo>, ApiError> {
    state
        .hub
        .get_topic(query.name.clone())
        .await?
        .map(Json)
        .ok_or(ApiError::TopicNotFound(query.name))
}

async fn close_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CloseRequest>,
) -> Result<StatusCode, ApiError> {
    state.hub.close_topic(request.topic).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn restart_handler(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.hub.restart().await?;
    Ok(StatusCode::ACCEPTED)
}
