//! # HTTP Configuration Source Client
//!
//! [`SourceStore`] implementation talking to a remote configuration source over
//! HTTP with basic authentication.
//!
//! | Operation     | Request                                  |
//! |---------------|------------------------------------------|
//! | register type | `PUT {uri}/type/{type}` (prototype body) |
//! | load items    | `GET {uri}/item/{type}`                  |
//! | save          | `PUT {uri}/item/{type}/{key}`            |
//! | pop oldest    | `DELETE {uri}/item/{type}/oldest`        |
//!
//! Items travel as `{"key": ..., "value": {...}}` documents and are decoded
//! through the [`RecordType`] registry.

use crate::store::{Record, RecordType, SourceStore, StoreError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection options for [`HttpSourceClient`]
#[derive(Debug, Clone)]
pub struct HttpSourceOptions {
    /// Accept invalid TLS certificates from the source
    pub insecure_skip_verify: bool,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpSourceOptions {
    fn default() -> Self {
        Self {
            insecure_skip_verify: false,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceItem {
    key: String,
    value: Value,
}

/// HTTP client for the remote configuration source
pub struct HttpSourceClient {
    base_uri: String,
    user: String,
    password: String,
    http_client: reqwest::Client,
}

impl HttpSourceClient {
    /// Create a client for the source at `uri`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OperationFailed`] when the URI is not a valid
    /// absolute URL or the HTTP client cannot be built.
    pub fn new(
        uri: &str,
        user: impl Into<String>,
        password: impl Into<String>,
        options: HttpSourceOptions,
    ) -> Result<Self, StoreError> {
        url::Url::parse(uri).map_err(|e| StoreError::OperationFailed {
            message: format!("invalid source URI '{}': {}", uri, e),
        })?;

        let http_client = reqwest::Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.insecure_skip_verify)
            .build()
            .map_err(|e| StoreError::OperationFailed {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            base_uri: uri.trim_end_matches('/').to_string(),
            user: user.into(),
            password: password.into(),
            http_client,
        })
    }

    fn type_url(&self, record_type: RecordType) -> String {
        format!("{}/type/{}", self.base_uri, record_type.as_str())
    }

    fn items_url(&self, record_type: RecordType) -> String {
        format!("{}/item/{}", self.base_uri, record_type.as_str())
    }

    fn item_url(&self, record_type: RecordType, key: &str) -> String {
        format!(
            "{}/item/{}/{}",
            self.base_uri,
            record_type.as_str(),
            urlencoding::encode(key)
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        request
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("HTTP request failed: {}", e),
            })
    }

    /// Map a non-success status to a store error
    async fn status_error(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        let message = format!("source responded with status {}: {}", status, body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StoreError::AuthenticationFailed { message }
            }
            s if s.is_server_error() => StoreError::Unavailable { message },
            _ => StoreError::OperationFailed { message },
        }
    }

    async fn read_item(
        response: reqwest::Response,
        record_type: RecordType,
    ) -> Result<SourceItem, StoreError> {
        response
            .json::<SourceItem>()
            .await
            .map_err(|e| StoreError::Decode {
                record_type,
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for HttpSourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSourceClient")
            .field("base_uri", &self.base_uri)
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl SourceStore for HttpSourceClient {
    #[instrument(skip(self), fields(record_type = %record_type))]
    async fn register_type(&self, record_type: RecordType) -> Result<(), StoreError> {
        let response = self
            .send(
                self.http_client
                    .put(self.type_url(record_type))
                    .json(&record_type.prototype()),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(record_type = %record_type))]
    async fn load_items(&self, record_type: RecordType) -> Result<Vec<Record>, StoreError> {
        let response = self
            .send(self.http_client.get(self.items_url(record_type)))
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let items = response
            .json::<Vec<SourceItem>>()
            .await
            .map_err(|e| StoreError::Decode {
                record_type,
                message: e.to_string(),
            })?;

        debug!(count = items.len(), "Loaded items from source");
        items
            .into_iter()
            .map(|item| record_type.decode(item.value))
            .collect()
    }

    #[instrument(skip(self, record), fields(record_type = %record.record_type()))]
    async fn save(&self, key: &str, record: Record) -> Result<(), StoreError> {
        let body = record.to_value()?;
        let response = self
            .send(
                self.http_client
                    .put(self.item_url(record.record_type(), key))
                    .json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(record_type = %record_type))]
    async fn pop_oldest(&self, record_type: RecordType) -> Result<Option<Record>, StoreError> {
        let response = self
            .send(
                self.http_client
                    .delete(self.item_url(record_type, "oldest")),
            )
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let item = Self::read_item(response, record_type).await?;
        debug!(key = %item.key, "Popped oldest item from source");
        record_type.decode(item.value).map(Some)
    }
}

#[cfg(test)]
#[path = "http_source_tests.rs"]
mod tests;
