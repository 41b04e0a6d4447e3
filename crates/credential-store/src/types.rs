//! Values held by the credential tables
//!
//! Records carrying key material are stored with the key in exchange format
//! (`Jwk`) and rebuilt through `Key::from_jwk` on read, so a corrupted key is
//! rejected at load time rather than at signing time.

use std::fmt;

use dpop_key::{Jwk, Key};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tokens issued by an authorization server for one account.
///
/// `expires_at` is the access-token expiry as unix milliseconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl TokenSet {
    /// Whether the access token is past its expiry. A token without expiry
    /// never expires.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_millis)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("iss", &self.iss)
            .field("sub", &self.sub)
            .field("aud", &self.aud)
            .field("scope", &self.scope)
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An authorization request waiting for its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlow {
    pub dpop_key: Key,
    /// Issuer the request was sent to; the callback must come from the same one.
    pub iss: String,
    /// PKCE code verifier.
    pub verifier: Option<String>,
    /// Caller data returned unchanged from the callback.
    pub app_state: Option<String>,
}

/// An authenticated account: its tokens and the key they are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub dpop_key: Key,
    pub token_set: TokenSet,
}

/// Result of a handle lookup. `None` caches a negative answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedHandle(pub Option<String>);

/// A resolved identity document, kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityDocument(pub serde_json::Value);

/// An authorization or resource server discovery document, kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerMetadata(pub serde_json::Value);

/// Stored form of a [`PendingFlow`]: the key travels as a private JWK.
#[derive(Debug, Serialize, Deserialize)]
pub struct EncodedPendingFlow {
    pub dpop_key: Jwk,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_state: Option<String>,
}

/// Stored form of a [`Session`].
#[derive(Debug, Serialize, Deserialize)]
pub struct EncodedSession {
    pub dpop_key: Jwk,
    pub token_set: TokenSet,
}

/// Export a key for storage. Only private keys can be stored: a flow or
/// session whose key lost `d` could never sign again.
pub(crate) fn encode_key(key: &Key) -> Result<Jwk> {
    if !key.is_private() {
        return Err(dpop_key::Error::InvalidKey(format!(
            "key {} has no private component and cannot be stored",
            key.kid()
        ))
        .into());
    }
    Ok(key.to_jwk())
}

pub(crate) fn decode_key(jwk: &Jwk) -> Result<Key> {
    let key = Key::from_jwk(jwk)?;
    if !key.is_private() {
        return Err(dpop_key::Error::InvalidKey(format!(
            "stored key {} has no private component",
            key.kid()
        ))
        .into());
    }
    Ok(key)
}
