//! # Doorman Proxy HTTP Service
//!
//! HTTP surface of the release intake service:
//! - `POST /events/minio` accepts MinIO object notifications and queues releases
//! - `GET /release` hands the oldest queued release to a poller
//! - `GET /health` reports liveness without authentication
//!
//! Every route except `/health` passes through the [`AuthGate`].

pub mod config;
pub mod errors;
pub mod middleware;

pub use config::{AdminConfig, LoggingConfig, ServerConfig, ServiceConfig, SourceConfig};
pub use errors::{ConfigError, HandlerError, ServiceError};
pub use middleware::{proxy_auth_gate, resolve_real_ip, AuthGate, WEBHOOK_PATH_PATTERN};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use doorman_proxy_core::{
    InboundEvent, PayloadFormat, Release, ReleaseQueue, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Release queue backed by the configuration source
    pub queue: ReleaseQueue,

    /// Path-based authenticator selection
    pub auth: AuthGate,
}

impl AppState {
    pub fn new(config: ServiceConfig, queue: ReleaseQueue, auth: AuthGate) -> Self {
        Self {
            config,
            queue,
            auth,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/events/minio", post(handle_minio_event))
        .route("/release", get(handle_get_release))
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            middleware::authentication_middleware,
        ));

    let mut router = Router::new()
        .route("/health", get(handle_health_check))
        .merge(protected_routes);

    if state.config.logging.request_logging {
        router = router.layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start HTTP server and run until SIGINT or SIGTERM
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let config = state.config.clone();
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener =
        tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: addr.clone(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    serve_with_shutdown(
        listener,
        app,
        shutdown_signal(shutdown_timeout),
        shutdown_timeout,
    )
    .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Serve until `shutdown` resolves, then drain open connections for at most
/// `shutdown_timeout` before returning
async fn serve_with_shutdown<S>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: S,
    shutdown_timeout: Duration,
) -> Result<(), ServiceError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (draining_tx, draining_rx) = tokio::sync::oneshot::channel::<()>();

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        let _ = draining_tx.send(());
    })
    .into_future();
    tokio::pin!(server);

    let drain_deadline = async {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(shutdown_timeout).await,
            // Server stopped without a shutdown request
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal(shutdown_timeout: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown with {}s timeout", shutdown_timeout.as_secs());
        },
    }
}

// ============================================================================
// Event Handlers
// ============================================================================

/// Handle a MinIO object notification
///
/// The body is decoded as YAML when the `Content-Type` names YAML and as JSON
/// otherwise. An accepted notification produces exactly one queued release.
#[instrument(skip(state, headers, body))]
pub async fn handle_minio_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAcceptedResponse>), HandlerError> {
    let format = PayloadFormat::from_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );

    let event = InboundEvent::parse(&body, format)?;
    let release = Release::from_event(&event);
    let folder_name = release.folder_name.clone();

    let key = state
        .queue
        .enqueue(release)
        .await
        .map_err(|e| HandlerError::store("cannot persist release information", e))?;

    Ok((
        StatusCode::CREATED,
        Json(EventAcceptedResponse {
            key: key.to_string(),
            folder_name,
            status: "queued".to_string(),
        }),
    ))
}

/// Hand the oldest queued release to the caller
///
/// Responds in YAML when the `Accept` header asks for it, JSON otherwise.
#[instrument(skip(state, headers))]
pub async fn handle_get_release(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let release = state
        .queue
        .dequeue_oldest()
        .await
        .map_err(|e| HandlerError::store("cannot retrieve release information", e))?
        .ok_or(HandlerError::NoRelease)?;

    match accepted_format(&headers) {
        PayloadFormat::Json => Ok(Json(release).into_response()),
        PayloadFormat::Yaml => {
            let body = serde_yaml::to_string(&release).map_err(|e| HandlerError::InternalError {
                message: format!("cannot serialize release: {}", e),
            })?;
            Ok((
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/yaml"))],
                body,
            )
                .into_response())
        }
    }
}

/// Response format requested through `Accept`; YAML only when named explicitly
fn accepted_format(headers: &HeaderMap) -> PayloadFormat {
    let yaml_requested = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|media| PayloadFormat::from_content_type(Some(media)) == PayloadFormat::Yaml);

    if yaml_requested {
        PayloadFormat::Yaml
    } else {
        PayloadFormat::Json
    }
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Liveness check
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Timestamp::now(),
    })
}

// ============================================================================
// Response Types
// ============================================================================

/// Body returned when a notification is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAcceptedResponse {
    /// Store key of the queued release
    pub key: String,
    pub folder_name: String,
    pub status: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: Timestamp,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
