//! Common test utilities for doorman-proxy-api integration tests
//!
//! This module provides:
//! - A harness wiring the real router, authentication gate and an in-memory source
//! - A configuration source double that fails every call
//! - Request builders for notifications and release polls

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::Request,
    response::Response,
    Router,
};
use base64::Engine;
use doorman_proxy_api::{
    create_router, proxy_auth_gate, AdminConfig, AppState, ServiceConfig,
};
use doorman_proxy_core::{
    InMemorySource, Record, RecordType, ReleaseQueue, SourceStore, StoreError, WebhookPolicy,
};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-pwd";

/// Token restricted to requests from 127.0.0.1
pub const SAFELISTED_TOKEN: &str = "SECRET";

/// Token without IP or referrer restrictions
pub const OPEN_TOKEN: &str = "OPEN";

/// Token whose policy rejects one referrer value
pub const REFERRER_TOKEN: &str = "REFTOKEN";
pub const REJECTED_REFERRER: &str = "https://blocked.example.com";

/// The sample notification: `releases/1.2.0/spec.yaml` created in bucket `b1`
pub const SCENARIO_EVENT: &str = r#"{
    "EventName": "s3:ObjectCreated:Put",
    "Key": "b1/releases%2F1.2.0%2Fspec.yaml",
    "Records": [{
        "eventVersion": "2.0",
        "eventSource": "minio:s3",
        "eventTime": "2024-05-01T10:00:00.000Z",
        "eventName": "s3:ObjectCreated:Put",
        "s3": {
            "bucket": { "name": "b1", "arn": "arn:aws:s3:::b1" },
            "object": {
                "key": "releases%2F1.2.0%2Fspec.yaml",
                "size": 512,
                "eTag": "d41d8cd98f00b204e9800998ecf8427e",
                "contentType": "application/x-yaml"
            }
        },
        "responseElements": {
            "x-minio-deployment-id": "d1",
            "x-minio-origin-endpoint": "o1"
        }
    }]
}"#;

// ============================================================================
// Harness
// ============================================================================

/// Router wired the way the service binary wires it
pub struct TestHarness {
    pub store: InMemorySource,
    app: Router,
}

impl TestHarness {
    /// Harness with the standard test policies loaded
    pub fn new() -> Self {
        Self::with_policies(default_policies())
    }

    pub fn with_policies(policies: Vec<WebhookPolicy>) -> Self {
        let store = InMemorySource::with_policies(policies);
        let app = build_app(Arc::new(store.clone()));
        Self { store, app }
    }

    /// Send a request through a fresh clone of the router
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub fn queued_releases(&self) -> usize {
        self.store.len(RecordType::Release)
    }
}

/// Build the router over any source
pub fn build_app(store: Arc<dyn SourceStore>) -> Router {
    let config = ServiceConfig {
        admin: AdminConfig {
            user: ADMIN_USER.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        },
        ..ServiceConfig::default()
    };
    let auth = proxy_auth_gate(store.clone(), &config.admin).unwrap();

    create_router(AppState::new(config, ReleaseQueue::new(store), auth))
}

pub fn default_policies() -> Vec<WebhookPolicy> {
    vec![
        WebhookPolicy {
            ip_safelist: vec!["127.0.0.1".to_string()],
            ..WebhookPolicy::with_token(SAFELISTED_TOKEN)
        },
        WebhookPolicy::with_token(OPEN_TOKEN),
        WebhookPolicy {
            referrer_url: REJECTED_REFERRER.to_string(),
            ..WebhookPolicy::with_token(REFERRER_TOKEN)
        },
    ]
}

// ============================================================================
// Failing source
// ============================================================================

/// Source whose every operation reports the store as unreachable
pub struct UnreachableSource;

#[async_trait]
impl SourceStore for UnreachableSource {
    async fn register_type(&self, _record_type: RecordType) -> Result<(), StoreError> {
        Err(unreachable_error())
    }

    async fn load_items(&self, _record_type: RecordType) -> Result<Vec<Record>, StoreError> {
        Err(unreachable_error())
    }

    async fn save(&self, _key: &str, _record: Record) -> Result<(), StoreError> {
        Err(unreachable_error())
    }

    async fn pop_oldest(&self, _record_type: RecordType) -> Result<Option<Record>, StoreError> {
        Err(unreachable_error())
    }
}

fn unreachable_error() -> StoreError {
    StoreError::Unavailable {
        message: "connection refused".to_string(),
    }
}

// ============================================================================
// Request builders
// ============================================================================

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn basic(user: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
    format!("Basic {}", encoded)
}

pub fn admin_auth() -> String {
    basic(ADMIN_USER, ADMIN_PASSWORD)
}

/// POST /events/minio from 127.0.0.1 with a JSON body
pub fn event_request(body: &str, authorization: Option<&str>) -> Request<Body> {
    event_request_from(body, authorization, "127.0.0.1")
}

pub fn event_request_from(body: &str, authorization: Option<&str>, ip: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/events/minio")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip);
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// GET /release with optional credentials
pub fn release_request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/release");
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::empty()).unwrap()
}

/// Notification for `key` in bucket `bucket` with deployment `d1` and origin `o1`
pub fn event_for_key(bucket: &str, key: &str) -> String {
    serde_json::json!({
        "EventName": "s3:ObjectCreated:Put",
        "Key": format!("{}/{}", bucket, key),
        "Records": [{
            "eventName": "s3:ObjectCreated:Put",
            "s3": {
                "bucket": { "name": bucket },
                "object": { "key": key }
            },
            "responseElements": {
                "x-minio-deployment-id": "d1",
                "x-minio-origin-endpoint": "o1"
            }
        }]
    })
    .to_string()
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

