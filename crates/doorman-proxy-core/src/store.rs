//! # Configuration Source Interface
//!
//! The proxy keeps no state of its own. Webhook policies and queued releases
//! live in an external configuration source reached through [`SourceStore`].
//!
//! The source hands back loosely typed items. Each item belongs to a
//! registered [`RecordType`], and the type decides how the item is decoded into
//! the closed [`Record`] variant, so callers never cast dynamically.

use crate::{auth::WebhookPolicy, release::Release};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{info, instrument};

// ============================================================================
// Record Registry
// ============================================================================

/// Record types known to the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// Webhook authentication policy
    WebhookInfo,
    /// Queued release
    Release,
}

impl RecordType {
    /// Every record type the proxy registers at startup
    pub const ALL: [RecordType; 2] = [RecordType::WebhookInfo, RecordType::Release];

    /// Type identifier used by the configuration source
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebhookInfo => "DPROXY_WEBHOOK_INFO",
            Self::Release => "DPROXY_RELEASE",
        }
    }

    /// Prototype document registered with the source for this type
    pub fn prototype(&self) -> Value {
        match self {
            Self::WebhookInfo => json!({
                "webhookToken": "",
                "ipSafeList": [],
                "referrerURL": "",
                "filter": "",
            }),
            Self::Release => json!({
                "origin": "",
                "deploymentId": "",
                "bucketName": "",
                "folderName": "",
                "time": "",
            }),
        }
    }

    /// Decode a raw item of this type into a [`Record`]
    pub fn decode(&self, value: Value) -> Result<Record, StoreError> {
        let decode_error = |e: serde_json::Error| StoreError::Decode {
            record_type: *self,
            message: e.to_string(),
        };

        match self {
            Self::WebhookInfo => serde_json::from_value::<WebhookPolicy>(value)
                .map(Record::WebhookPolicy)
                .map_err(decode_error),
            Self::Release => serde_json::from_value::<Release>(value)
                .map(Record::Release)
                .map_err(decode_error),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded item from the configuration source
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    WebhookPolicy(WebhookPolicy),
    Release(Release),
}

impl Record {
    /// The registered type this record belongs to
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::WebhookPolicy(_) => RecordType::WebhookInfo,
            Self::Release(_) => RecordType::Release,
        }
    }

    /// Encode the record as the document stored in the source
    pub fn to_value(&self) -> Result<Value, StoreError> {
        let encoded = match self {
            Self::WebhookPolicy(policy) => serde_json::to_value(policy),
            Self::Release(release) => serde_json::to_value(release),
        };
        encoded.map_err(|e| StoreError::Decode {
            record_type: self.record_type(),
            message: e.to_string(),
        })
    }

    /// Coerce into a webhook policy
    pub fn into_policy(self) -> Result<WebhookPolicy, StoreError> {
        match self {
            Self::WebhookPolicy(policy) => Ok(policy),
            other => Err(StoreError::UnexpectedRecord {
                expected: RecordType::WebhookInfo,
                actual: other.record_type(),
            }),
        }
    }

    /// Coerce into a release
    pub fn into_release(self) -> Result<Release, StoreError> {
        match self {
            Self::Release(release) => Ok(release),
            other => Err(StoreError::UnexpectedRecord {
                expected: RecordType::Release,
                actual: other.record_type(),
            }),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failures talking to the configuration source
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Configuration source unavailable: {message}")]
    Unavailable { message: String },

    #[error("Configuration source rejected credentials: {message}")]
    AuthenticationFailed { message: String },

    #[error("Record type {record_type} has not been registered")]
    TypeNotRegistered { record_type: RecordType },

    #[error("Cannot decode {record_type} record: {message}")]
    Decode {
        record_type: RecordType,
        message: String,
    },

    #[error("Expected a {expected} record but the source returned {actual}")]
    UnexpectedRecord {
        expected: RecordType,
        actual: RecordType,
    },

    #[error("Configuration source operation failed: {message}")]
    OperationFailed { message: String },
}

impl StoreError {
    /// Whether the source could not be reached or refused the connection
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

// ============================================================================
// Store Interface
// ============================================================================

/// Narrow interface onto the external configuration source
///
/// Implementations own atomicity: `pop_oldest` must hand any one record to at
/// most one caller.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Register a record type and its prototype. Registering twice is a no-op.
    async fn register_type(&self, record_type: RecordType) -> Result<(), StoreError>;

    /// Load every record of the given type, in source order
    async fn load_items(&self, record_type: RecordType) -> Result<Vec<Record>, StoreError>;

    /// Persist a record under `key`
    async fn save(&self, key: &str, record: Record) -> Result<(), StoreError>;

    /// Remove and return the oldest record of the given type, if any
    async fn pop_oldest(&self, record_type: RecordType) -> Result<Option<Record>, StoreError>;
}

/// Register every record type used by the proxy
#[instrument(skip(store))]
pub async fn register_schemas(store: &dyn SourceStore) -> Result<(), StoreError> {
    for record_type in RecordType::ALL {
        store.register_type(record_type).await?;
        info!(record_type = %record_type, "Registered record type");
    }
    Ok(())
}

/// Load the current webhook policies
///
/// Always reads through to the source; policies are never cached.
#[instrument(skip(store))]
pub async fn load_policies(store: &dyn SourceStore) -> Result<Vec<WebhookPolicy>, StoreError> {
    store
        .load_items(RecordType::WebhookInfo)
        .await?
        .into_iter()
        .map(Record::into_policy)
        .collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
