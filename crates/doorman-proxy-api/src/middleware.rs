//! Request logging and the authentication gate

use crate::{
    config::AdminConfig,
    errors::{ConfigError, HandlerError},
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use doorman_proxy_core::{
    Authenticator, BasicAuthenticator, RequestCredentials, SourceStore, UserPrincipal,
    WebhookAuthenticator,
};
use regex::Regex;
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Authentication Gate
// ============================================================================

/// Selects an [`Authenticator`] by request path
///
/// Routes are tried in registration order; the first pattern matching the
/// path wins. Paths matching no pattern use the default authenticator.
#[derive(Clone)]
pub struct AuthGate {
    routes: Vec<(Regex, Arc<dyn Authenticator>)>,
    default: Arc<dyn Authenticator>,
}

impl AuthGate {
    pub fn new(default: Arc<dyn Authenticator>) -> Self {
        Self {
            routes: Vec::new(),
            default,
        }
    }

    /// Register an authenticator for paths matching `pattern`
    pub fn route(
        mut self,
        pattern: &str,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.routes.push((regex, authenticator));
        Ok(self)
    }

    /// Authenticator responsible for `path`
    pub fn authenticator_for(&self, path: &str) -> &Arc<dyn Authenticator> {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.is_match(path))
            .map(|(_, authenticator)| authenticator)
            .unwrap_or(&self.default)
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<&str> = self.routes.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("AuthGate")
            .field("routes", &patterns)
            .finish_non_exhaustive()
    }
}

/// Paths authenticated with webhook tokens
pub const WEBHOOK_PATH_PATTERN: &str = "^/events/.*";

/// Gate wiring used by the proxy
///
/// Event paths accept webhook tokens and fall back to the admin account;
/// every other path requires the admin account.
pub fn proxy_auth_gate(
    store: Arc<dyn SourceStore>,
    admin: &AdminConfig,
) -> Result<AuthGate, ConfigError> {
    let admin: Arc<dyn Authenticator> =
        Arc::new(BasicAuthenticator::new(&admin.user, &admin.password));
    let webhook = Arc::new(WebhookAuthenticator::new(store, Some(admin.clone())));

    AuthGate::new(admin).route(WEBHOOK_PATH_PATTERN, webhook)
}

/// Resolve the caller IP behind reverse proxies
///
/// Order: first `X-Forwarded-For` entry, `X-Real-IP`, the TCP peer, then empty.
pub fn resolve_real_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(forwarded) = header_value("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(real_ip) = header_value("x-real-ip") {
        return real_ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Collect the credential-bearing parts of a request
pub fn credentials_from_request(headers: &HeaderMap, peer: Option<SocketAddr>) -> RequestCredentials {
    let mut credentials = RequestCredentials::new(resolve_real_ip(headers, peer));
    if let Some(authorization) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        credentials = credentials.with_authorization(authorization);
    }
    if let Some(referrer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) {
        credentials = credentials.with_referrer(referrer);
    }
    credentials
}

/// Authenticate every request before it reaches a protected handler
///
/// On success the [`UserPrincipal`] is inserted into the request extensions.
pub async fn authentication_middleware(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let credentials = credentials_from_request(request.headers(), peer);
    let path = request.uri().path().to_string();

    match gate.authenticator_for(&path).authenticate(&credentials).await {
        Ok(principal) => {
            debug!(user = %principal.username, path = %path, "Request authenticated");
            request.extensions_mut().insert::<UserPrincipal>(principal);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, path = %path, ip = %credentials.real_ip, "Request denied");
            HandlerError::Unauthorized(e).into_response()
        }
    }
}

// ============================================================================
// Request Logging
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Installed only when request logging is enabled in configuration. Reuses
/// an incoming `x-correlation-id` or generates one, and echoes it on the
/// response.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    info!(correlation_id = %correlation_id, "Request started");

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
