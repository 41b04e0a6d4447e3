//! JWK exchange format
//!
//! `{kty, use, crv, kid, x, y, d?, alg}` is the only on-disk and on-the-wire
//! representation of key material. Every field is optional at the serde
//! level so that a malformed object reaches `Key::from_jwk` and is rejected
//! there with a precise `InvalidKey` reason instead of a generic parse error.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key type for elliptic-curve keys.
pub const KTY_EC: &str = "EC";

/// The one supported curve.
pub const CURVE_P256: &str = "P-256";

/// Raw JWK as exchanged with storage and peers.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("use", &self.key_use)
            .field("crv", &self.crv)
            .field("kid", &self.kid)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("d", &self.d.as_ref().map(|_| "[REDACTED]"))
            .field("alg", &self.alg)
            .finish()
    }
}

/// Signature algorithm. ES256 (ECDSA over P-256 with SHA-256) is the only
/// algorithm the capability provider is required to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Es256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Es256 => "ES256",
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ES256" => Ok(Algorithm::Es256),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared key usage (`use` member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUse {
    Signing,
    Encryption,
}

impl KeyUse {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUse::Signing => "sig",
            KeyUse::Encryption => "enc",
        }
    }
}

impl FromStr for KeyUse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sig" => Ok(KeyUse::Signing),
            "enc" => Ok(KeyUse::Encryption),
            other => Err(Error::InvalidKey(format!(
                "\"use\" must be \"sig\" or \"enc\", got {other:?}"
            ))),
        }
    }
}

pub(crate) fn base64_url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub(crate) fn base64_url_decode(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_member_serializes_as_use() {
        let jwk = Jwk {
            kty: KTY_EC.into(),
            key_use: Some("sig".into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&jwk).unwrap();
        assert_eq!(json, r#"{"kty":"EC","use":"sig"}"#);
    }

    #[test]
    fn missing_members_deserialize_as_none() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty":"EC","crv":"P-256"}"#).unwrap();
        assert_eq!(jwk.crv.as_deref(), Some(CURVE_P256));
        assert!(jwk.key_use.is_none());
        assert!(jwk.x.is_none());
    }

    #[test]
    fn debug_redacts_private_scalar() {
        let jwk = Jwk {
            kty: KTY_EC.into(),
            d: Some("super-secret-scalar".into()),
            ..Default::default()
        };
        let debug = format!("{jwk:?}");
        assert!(!debug.contains("super-secret-scalar"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn algorithm_parsing() {
        assert_eq!("ES256".parse::<Algorithm>().unwrap(), Algorithm::Es256);
        assert!(matches!(
            "RS256".parse::<Algorithm>(),
            Err(Error::UnsupportedAlgorithm(alg)) if alg == "RS256"
        ));
    }

    #[test]
    fn key_use_parsing() {
        assert_eq!("sig".parse::<KeyUse>().unwrap(), KeyUse::Signing);
        assert_eq!("enc".parse::<KeyUse>().unwrap(), KeyUse::Encryption);
        assert!(matches!("verify".parse::<KeyUse>(), Err(Error::InvalidKey(_))));
    }
}
