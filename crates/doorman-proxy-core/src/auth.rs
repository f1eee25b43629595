//! # Webhook Authentication
//!
//! Decides whether an inbound request may reach the proxy handlers.
//!
//! Webhook senders authenticate with an opaque bearer token. Each registered
//! consumer is described by a [`WebhookPolicy`] held in the configuration
//! source, optionally restricted to a set of caller IPs and a referrer value.
//! Requests that match no policy are handed to an injected fallback
//! authenticator, normally the administrative [`BasicAuthenticator`].
//!
//! Policies are read from the source on every call so that a revoked token
//! stops working on the next request.

use crate::{
    store::{load_policies, SourceStore, StoreError},
    Timestamp,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, instrument, warn};

/// Username of the principal created for an accepted webhook request
pub const WEBHOOK_USER: &str = "webhook-user";

// ============================================================================
// Policy
// ============================================================================

/// Authentication rule for one webhook consumer
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebhookPolicy {
    /// Secret expected at the end of the `Authorization` header
    #[serde(rename = "webhookToken", default)]
    pub token: String,

    /// Caller IPs allowed to use this token; empty means any
    #[serde(
        rename = "ipSafeList",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub ip_safelist: Vec<String>,

    /// Referrer value checked against the request `Referer` header; empty disables the check
    #[serde(rename = "referrerURL", default)]
    pub referrer_url: String,

    /// Reserved
    #[serde(default)]
    pub filter: String,
}

impl WebhookPolicy {
    /// Policy with only a token configured
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Suffix match: the credential may carry a scheme prefix before the token
    pub fn matches_token(&self, credential: &str) -> bool {
        credential.ends_with(&self.token)
    }

    /// Whether the caller IP passes the safelist
    pub fn allows_ip(&self, ip: &str) -> bool {
        self.ip_safelist.is_empty() || self.ip_safelist.iter().any(|listed| listed == ip)
    }

    /// Whether the referrer check rejects the request
    ///
    /// A referrer equal (ignoring case) to the configured value is
    /// rejected; any other referrer passes.
    pub fn rejects_referrer(&self, referrer: &str) -> bool {
        !self.referrer_url.is_empty()
            && referrer.to_lowercase() == self.referrer_url.to_lowercase()
    }
}

impl std::fmt::Debug for WebhookPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookPolicy")
            .field("token", &"<REDACTED>")
            .field("ip_safelist", &self.ip_safelist)
            .field("referrer_url", &self.referrer_url)
            .field("filter", &self.filter)
            .finish()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Request and Principal
// ============================================================================

/// The parts of an HTTP request that authentication looks at
#[derive(Clone, Default)]
pub struct RequestCredentials {
    /// Raw `Authorization` header value
    pub authorization: Option<String>,

    /// Caller IP after proxy-forwarding resolution
    pub real_ip: String,

    /// Raw `Referer` header value
    pub referrer: Option<String>,
}

impl RequestCredentials {
    pub fn new(real_ip: impl Into<String>) -> Self {
        Self {
            real_ip: real_ip.into(),
            ..Self::default()
        }
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    fn token(&self) -> &str {
        self.authorization.as_deref().unwrap_or("")
    }

    fn referrer(&self) -> &str {
        self.referrer.as_deref().unwrap_or("")
    }
}

impl std::fmt::Debug for RequestCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCredentials")
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<REDACTED>"),
            )
            .field("real_ip", &self.real_ip)
            .field("referrer", &self.referrer)
            .finish()
    }
}

/// Identity attached to an authenticated request
#[derive(Clone, PartialEq, Eq)]
pub struct UserPrincipal {
    pub username: String,
    pub created: Timestamp,

    /// Opaque context, the presented credential for webhook principals
    pub context: Option<String>,
}

impl UserPrincipal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            created: Timestamp::now(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Debug for UserPrincipal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPrincipal")
            .field("username", &self.username)
            .field("created", &self.created)
            .field("context", &self.context.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a request is denied
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Cannot load webhook configuration: {0}")]
    PolicyLoadFailed(#[from] StoreError),

    #[error("Requester IP '{ip}' is not safe listed")]
    IpNotSafelisted { ip: String },

    #[error("Referrer URL '{referrer}' rejected by the configured referrer policy")]
    ReferrerRejected { referrer: String },

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid credentials")]
    InvalidCredentials,
}

// ============================================================================
// Authenticators
// ============================================================================

/// A strategy that turns request credentials into a principal
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &RequestCredentials) -> Result<UserPrincipal, AuthError>;
}

/// Authenticates webhook senders against the policies in the configuration source
pub struct WebhookAuthenticator {
    store: Arc<dyn SourceStore>,
    fallback: Option<Arc<dyn Authenticator>>,
}

impl WebhookAuthenticator {
    /// Create an authenticator reading policies from `store`
    ///
    /// `fallback` is consulted when no policy token matches.
    pub fn new(store: Arc<dyn SourceStore>, fallback: Option<Arc<dyn Authenticator>>) -> Self {
        Self { store, fallback }
    }
}

#[async_trait]
impl Authenticator for WebhookAuthenticator {
    #[instrument(skip(self, request), fields(ip = %request.real_ip))]
    async fn authenticate(&self, request: &RequestCredentials) -> Result<UserPrincipal, AuthError> {
        let policies = load_policies(self.store.as_ref()).await.map_err(|e| {
            error!(error = %e, "Cannot load webhook configuration, cannot authenticate request");
            AuthError::PolicyLoadFailed(e)
        })?;

        let token = request.token();
        let ip = request.real_ip.as_str();

        if let Some(policy) = policies.iter().find(|p| p.matches_token(token)) {
            if !policy.allows_ip(ip) {
                warn!(ip = %ip, "Authentication failed, requester IP is not safe listed");
                return Err(AuthError::IpNotSafelisted { ip: ip.to_string() });
            }

            let referrer = request.referrer();
            if policy.rejects_referrer(referrer) {
                warn!(
                    referrer = %referrer,
                    required = %policy.referrer_url,
                    "Authentication failed, referrer URL rejected"
                );
                return Err(AuthError::ReferrerRejected {
                    referrer: referrer.to_string(),
                });
            }

            return Ok(UserPrincipal::new(WEBHOOK_USER).with_context(token));
        }

        if let Some(fallback) = &self.fallback {
            if let Ok(principal) = fallback.authenticate(request).await {
                return Ok(principal);
            }
        }

        warn!(token = %token, "Authentication failed, invalid token");
        Err(AuthError::InvalidToken)
    }
}

/// HTTP Basic authentication against a single administrative account
pub struct BasicAuthenticator {
    username: String,
    password: String,
}

impl BasicAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn decode_basic(authorization: &str) -> Option<(String, String)> {
        let (scheme, encoded) = authorization.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

impl std::fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, request: &RequestCredentials) -> Result<UserPrincipal, AuthError> {
        let (user, password) = request
            .authorization
            .as_deref()
            .and_then(Self::decode_basic)
            .ok_or(AuthError::InvalidCredentials)?;

        // Both comparisons run regardless of the first outcome.
        let user_ok = user.as_bytes().ct_eq(self.username.as_bytes());
        let password_ok = password.as_bytes().ct_eq(self.password.as_bytes());

        if bool::from(user_ok & password_ok) {
            Ok(UserPrincipal::new(user))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
