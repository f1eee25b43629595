//! # MinIO Event Parsing
//!
//! Decodes MinIO-compatible S3 bucket notifications and validates that the
//! changed object is a release specification placed inside a version folder.
//!
//! Only `s3:ObjectCreated:*` style notifications carrying a `Records` array are
//! understood. The first record decides the outcome.

use crate::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// Object key suffix that marks a release specification
pub const RELEASE_SPEC_SUFFIX: &str = "spec.yaml";

// ============================================================================
// Wire Types
// ============================================================================

/// MinIO bucket notification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinioS3Event {
    #[serde(rename = "EventName", default, deserialize_with = "null_as_default")]
    pub event_name: String,

    #[serde(rename = "Key", default, deserialize_with = "null_as_default")]
    pub key: String,

    #[serde(rename = "Records", default)]
    pub records: Option<Vec<MinioRecord>>,
}

/// A single notification record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinioRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub event_version: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub event_source: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub event_time: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub event_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub s3: S3Entity,

    #[serde(default, deserialize_with = "null_as_default")]
    pub response_elements: ResponseElements,
}

/// Bucket and object affected by the change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Entity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bucket: S3Bucket,

    #[serde(default, deserialize_with = "null_as_default")]
    pub object: S3Object,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Bucket {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub arn: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Object {
    /// Percent-encoded object key
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub e_tag: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,
}

/// MinIO response elements identifying the emitting deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseElements {
    #[serde(
        rename = "x-minio-deployment-id",
        default,
        deserialize_with = "null_as_default"
    )]
    pub deployment_id: String,

    #[serde(
        rename = "x-minio-origin-endpoint",
        default,
        deserialize_with = "null_as_default"
    )]
    pub origin_endpoint: String,
}

// ============================================================================
// Payload Format
// ============================================================================

/// Encoding of an inbound notification body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    Yaml,
}

impl PayloadFormat {
    /// Select the format from a `Content-Type` header value; JSON unless YAML is named
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let media_type = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match media_type.as_str() {
            "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml" => Self::Yaml,
            _ => Self::Json,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons an inbound notification is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Invalid event: changed object was '{key}' but required spec.yaml")]
    UnsupportedObjectType { key: String },

    #[error(
        "No release folder specified within bucket for object '{key}'. Objects must be put \
         under a version folder (s3host://bucket-name/version-folder/spec.yaml), \
         not at the bucket root"
    )]
    MissingReleaseFolder { key: String },
}

// ============================================================================
// Inbound Event
// ============================================================================

/// A validated release notification
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Endpoint of the MinIO instance that emitted the event
    pub origin: String,

    /// Identifier of the emitting MinIO deployment
    pub deployment_id: String,

    pub bucket_name: String,

    /// Percent-decoded object key
    pub object_key: String,

    /// Key prefix up to, and excluding, the final path separator
    pub folder_name: String,

    pub received_at: Timestamp,
}

impl InboundEvent {
    /// Decode and validate a raw notification body
    pub fn parse(body: &[u8], format: PayloadFormat) -> Result<Self, EventError> {
        let notification: MinioS3Event = match format {
            PayloadFormat::Json => {
                serde_json::from_slice(body).map_err(|e| EventError::MalformedPayload {
                    message: format!("cannot unmarshal webhook payload: {}", e),
                })?
            }
            PayloadFormat::Yaml => {
                serde_yaml::from_slice(body).map_err(|e| EventError::MalformedPayload {
                    message: format!("cannot unmarshal webhook payload: {}", e),
                })?
            }
        };

        Self::from_notification(notification)
    }

    /// Validate an already decoded notification
    pub fn from_notification(notification: MinioS3Event) -> Result<Self, EventError> {
        let record = notification
            .records
            .and_then(|records| records.into_iter().next())
            .ok_or_else(|| EventError::MalformedPayload {
                message: "incorrect webhook payload, missing Records, cannot continue".to_string(),
            })?;

        let raw_key = record.s3.object.key;
        if !raw_key.ends_with(RELEASE_SPEC_SUFFIX) {
            return Err(EventError::UnsupportedObjectType { key: raw_key });
        }

        let object_key = path_unescape(&raw_key)?;

        let folder_name = match object_key.rfind('/') {
            Some(cut) => object_key[..cut].to_string(),
            None => return Err(EventError::MissingReleaseFolder { key: object_key }),
        };

        let event = Self {
            origin: record.response_elements.origin_endpoint,
            deployment_id: record.response_elements.deployment_id,
            bucket_name: record.s3.bucket.name,
            object_key,
            folder_name,
            received_at: Timestamp::now(),
        };

        info!(
            origin = %event.origin,
            time = %event.received_at,
            deployment_id = %event.deployment_id,
            bucket = %event.bucket_name,
            folder = %event.folder_name,
            source_type = "minio compatible",
            "New release notification accepted"
        );

        Ok(event)
    }
}

/// Read an explicit `null` the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Percent-decode an object key with path semantics
///
/// `+` is kept as is. A `%` not followed by two hex digits, or a decoded
/// sequence that is not UTF-8, is rejected.
fn path_unescape(key: &str) -> Result<String, EventError> {
    let bytes = key.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let escape_is_valid = bytes
                .get(index + 1..index + 3)
                .is_some_and(|digits| digits.iter().all(u8::is_ascii_hexdigit));
            if !escape_is_valid {
                return Err(EventError::MalformedPayload {
                    message: format!("cannot unescape object key {}", key),
                });
            }
            index += 3;
        } else {
            index += 1;
        }
    }

    urlencoding::decode(key)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| EventError::MalformedPayload {
            message: format!("cannot unescape object key {}", key),
        })
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
