//! `DPoP` proof creation (RFC 9449)
//!
//! A proof is a compact JWS with `typ: dpop+jwt`, the bare public key in the
//! `jwk` header, and claims binding it to one HTTP request.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::jwk::base64_url_encode;
use crate::jwt::{JwtClaims, JwtHeader};
use crate::key::Key;
use crate::service::KeyService;

/// `typ` header of every DPoP proof.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// `DPoP` proof claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Unique proof identifier for replay detection.
    pub jti: String,
    /// HTTP method of the request.
    pub htm: String,
    /// HTTP URI of the request, without query or fragment.
    pub htu: String,
    pub iat: u64,
    /// Hash of the access token the proof accompanies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
    /// Server-provided nonce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl KeyService {
    /// Create a `DPoP` proof for one request.
    ///
    /// # Errors
    /// `SigningUnavailable` for a public-only key.
    pub fn dpop_proof(
        &self,
        key: &Key,
        method: &str,
        uri: &str,
        access_token: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<String> {
        let ath = match access_token {
            Some(token) => Some(base64_url_encode(
                &self.crypto().digest(token.as_bytes(), "sha256")?,
            )),
            None => None,
        };

        let claims = DpopClaims {
            jti: base64_url_encode(&self.crypto().random_bytes(16)),
            htm: method.to_uppercase(),
            htu: normalize_uri(uri).to_string(),
            iat: self.clock().now_secs(),
            ath,
            nonce: nonce.map(String::from),
        };

        let header = JwtHeader {
            typ: Some(DPOP_JWT_TYPE.to_string()),
            jwk: Some(key.bare_jwk()),
            ..Default::default()
        };

        let claims: JwtClaims = match serde_json::to_value(&claims) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return Err(Error::Encoding("DPoP claims are not an object".into())),
            Err(e) => return Err(Error::Encoding(format!("failed to serialize claims: {e}"))),
        };

        self.create_jwt(key, &header, &claims)
    }
}

/// Strip query string and fragment.
fn normalize_uri(uri: &str) -> &str {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    &uri[..end]
}
