//! # Doorman Proxy Core
//!
//! Domain logic for the Doorman Proxy release intake service.
//!
//! The proxy receives MinIO-compatible S3 change notifications, authenticates
//! the sender against the webhook policies held in the configuration source,
//! and turns every accepted notification into a [`Release`] record that a
//! downstream poller takes off a FIFO queue.
//!
//! ## Architecture
//!
//! - [`event`] decodes and validates inbound notifications
//! - [`auth`] decides whether a request may reach the handlers
//! - [`release`] maps validated events to releases and exposes the queue
//! - [`store`] is the narrow interface onto the external configuration source
//! - [`adapters`] holds the in-memory and HTTP implementations of that interface
//!
//! All infrastructure is reached through the [`SourceStore`] trait and injected
//! at runtime.
//!
//! ## Usage
//!
//! ```rust
//! use doorman_proxy_core::{ReleaseKey, Timestamp};
//!
//! let key = ReleaseKey::new();
//! assert!(key.as_str().starts_with("release-"));
//! let _now = Timestamp::now();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use ulid::Ulid;

// ============================================================================
// Identifier Types
// ============================================================================

/// Storage key of a queued release
///
/// Backed by a ULID, so every enqueue produces a distinct entry. Queue order is
/// decided by the store, not by comparing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseKey(Ulid);

impl ReleaseKey {
    const PREFIX: &'static str = "release-";

    /// Generate a new unique release key
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Get the string form used as the store key
    pub fn as_str(&self) -> String {
        format!("{}{}", Self::PREFIX, self.0)
    }
}

impl Default for ReleaseKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for ReleaseKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        let ulid = raw.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "release-<ULID>".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC date time
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook authentication
pub mod auth;

/// MinIO notification parsing and validation
pub mod event;

/// Release records and the release queue
pub mod release;

/// External configuration source interface
pub mod store;

/// Store implementations
pub mod adapters;

pub use adapters::{HttpSourceClient, HttpSourceOptions, InMemorySource};
pub use auth::{
    AuthError, Authenticator, BasicAuthenticator, RequestCredentials, UserPrincipal,
    WebhookAuthenticator, WebhookPolicy, WEBHOOK_USER,
};
pub use event::{EventError, InboundEvent, MinioS3Event, PayloadFormat};
pub use release::{Release, ReleaseQueue};
pub use store::{Record, RecordType, SourceStore, StoreError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
