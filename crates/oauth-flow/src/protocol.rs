//! Protocol library seam
//!
//! Identity resolution, discovery, PAR and token endpoint calls live behind
//! [`OAuthProtocol`]. The orchestrator hands it a [`ProtocolContext`] with the
//! client identity, the store's seven tables (for its caches and DPoP nonces)
//! and the key service for proofs.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn OAuthProtocol>`).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use credential_store::{PendingFlow, StoreTables, TokenSet};
use dpop_key::{Key, KeyService};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Where the authorization server puts callback parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "query" => Ok(ResponseMode::Query),
            "fragment" => Ok(ResponseMode::Fragment),
            other => Err(Error::InvalidResponseMode(other.to_string())),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMetadata {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    pub scope: String,
    pub response_mode: ResponseMode,
}

impl ClientMetadata {
    /// # Errors
    /// `MissingClientMetadata` without a client section or redirect URI,
    /// `InvalidResponseMode` for anything but `query` or `fragment`.
    pub fn from_config(config: Option<&ClientConfig>) -> Result<Self> {
        let config = config.ok_or(Error::MissingClientMetadata)?;
        if config.client_id.is_empty() || config.redirect_uris.is_empty() {
            return Err(Error::MissingClientMetadata);
        }
        Ok(Self {
            client_id: config.client_id.clone(),
            redirect_uris: config.redirect_uris.clone(),
            scope: config.scope.clone(),
            response_mode: config.response_mode.parse()?,
        })
    }

    /// The redirect URI used for interactive sign-in.
    pub fn redirect_uri(&self) -> &str {
        // from_config guarantees at least one
        self.redirect_uris.first().map(String::as_str).unwrap_or_default()
    }
}

/// Everything a protocol call may use.
#[derive(Clone)]
pub struct ProtocolContext {
    pub client: Arc<ClientMetadata>,
    pub tables: StoreTables,
    pub keys: KeyService,
}

/// An account resolved from a handle or identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Stable account identifier.
    pub sub: String,
    pub handle: Option<String>,
    /// Authorization server issuer for the account.
    pub issuer: String,
}

/// Authorization URL plus the PKCE verifier to keep for the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub verifier: Option<String>,
}

/// Failure from a protocol call, classified for the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The server refused the request (bad grant, revoked token). Retrying
    /// with the same input will not help.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Network failure, timeout or 5xx. May succeed later.
    #[error("transient: {0}")]
    Transient(String),
}

impl ProtocolError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ProtocolError::Rejected(_))
    }
}

pub type ProtocolFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, ProtocolError>> + Send + 'a>>;

/// OAuth protocol operations with DPoP-bound tokens.
pub trait OAuthProtocol: Send + Sync {
    /// Resolve a handle or account identifier to its account and issuer.
    fn resolve_identity<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        identifier: &'a str,
    ) -> ProtocolFuture<'a, ResolvedIdentity>;

    /// Build the authorization URL carrying `state` as correlation value.
    /// The request is bound to `dpop_key`.
    fn build_authorization_url<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        identity: &'a ResolvedIdentity,
        dpop_key: &'a Key,
        state: &'a str,
    ) -> ProtocolFuture<'a, AuthorizationRequest>;

    /// Exchange an authorization code for tokens bound to the flow's key.
    fn exchange_code<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        pending: &'a PendingFlow,
        code: &'a str,
    ) -> ProtocolFuture<'a, TokenSet>;

    /// Obtain a new token set with the refresh token in `token_set`.
    fn refresh_token<'a>(
        &'a self,
        ctx: &'a ProtocolContext,
        dpop_key: &'a Key,
        token_set: &'a TokenSet,
    ) -> ProtocolFuture<'a, TokenSet>;
}
