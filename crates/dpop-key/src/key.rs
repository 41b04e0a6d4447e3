//! Validated key pair
//!
//! `Key` can only be built through [`Key::from_jwk`], which checks curve,
//! coordinates, usage, algorithm and (for private keys) that the scalar
//! matches the public point. Code holding a `Key` never re-checks fields.

use common::Secret;
use sha2::{Digest, Sha256};

use crate::crypto::{coordinates_for_scalar, decode_coordinate, verifying_key_from_coordinates};
use crate::error::{Error, Result};
use crate::jwk::{Algorithm, CURVE_P256, Jwk, KTY_EC, KeyUse, base64_url_decode, base64_url_encode};

/// A P-256 key, public-only or private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    kid: String,
    key_use: KeyUse,
    algorithm: Algorithm,
    x: String,
    y: String,
    d: Option<Secret<String>>,
}

impl Key {
    /// Validate an exchange-format key.
    ///
    /// `kid` and `alg` are required as well as the curve parameters: stored
    /// flows and proof headers name the key by `kid`, and signing and
    /// verification take the algorithm from the key, never from a token.
    ///
    /// # Errors
    /// `InvalidKey` when `kty`, `crv`, `x`, `y`, `use`, `kid` or `alg` are
    /// missing or malformed, when `alg` is anything but ES256, or when `d`
    /// does not belong to `(x, y)`.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        if jwk.kty != KTY_EC {
            return Err(Error::InvalidKey(format!(
                "unsupported key type {:?}, expected {KTY_EC}",
                jwk.kty
            )));
        }

        match jwk.crv.as_deref() {
            Some(CURVE_P256) => {}
            Some(other) => {
                return Err(Error::InvalidKey(format!(
                    "unsupported curve {other:?}, expected {CURVE_P256}"
                )));
            }
            None => return Err(Error::InvalidKey("missing \"crv\"".into())),
        }

        let x = jwk
            .x
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("missing \"x\"".into()))?;
        let y = jwk
            .y
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("missing \"y\"".into()))?;

        let key_use: KeyUse = jwk
            .key_use
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("missing \"use\" parameter value".into()))?
            .parse()?;

        let kid = match jwk.kid.as_deref() {
            Some(kid) if !kid.is_empty() => kid.to_string(),
            _ => return Err(Error::InvalidKey("missing \"kid\"".into())),
        };

        let alg = jwk
            .alg
            .as_deref()
            .ok_or_else(|| Error::InvalidKey("missing \"alg\"".into()))?;
        let algorithm: Algorithm = alg.parse().map_err(|_| {
            Error::InvalidKey(format!(
                "unsupported \"alg\" {alg:?}, expected {}",
                Algorithm::Es256.as_str()
            ))
        })?;

        let x_bytes = decode_coordinate("x", x)?;
        let y_bytes = decode_coordinate("y", y)?;
        verifying_key_from_coordinates(&x_bytes, &y_bytes)?;

        if let Some(d) = jwk.d.as_deref() {
            let scalar = base64_url_decode(d)
                .map_err(|e| Error::InvalidKey(format!("invalid base64 in \"d\": {e}")))?;
            let (derived_x, derived_y) = coordinates_for_scalar(&scalar)?;
            if derived_x != x_bytes || derived_y != y_bytes {
                return Err(Error::InvalidKey(
                    "private scalar does not match public coordinates".into(),
                ));
            }
        }

        Ok(Self {
            kid,
            key_use,
            algorithm,
            x: x.to_string(),
            y: y.to_string(),
            d: jwk.d.clone().map(Secret::new),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_use(&self) -> KeyUse {
        self.key_use
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// The same key with the private scalar stripped.
    #[must_use]
    pub fn public_view(&self) -> Key {
        Key {
            d: None,
            ..self.clone()
        }
    }

    /// Export in exchange format. `d` is present iff the key is private.
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: KTY_EC.to_string(),
            key_use: Some(self.key_use.as_str().to_string()),
            crv: Some(CURVE_P256.to_string()),
            kid: Some(self.kid.clone()),
            x: Some(self.x.clone()),
            y: Some(self.y.clone()),
            d: self.d.as_ref().map(|d| d.expose().clone()),
            alg: Some(self.algorithm.as_str().to_string()),
        }
    }

    /// Public exchange form, never carrying `d`.
    pub fn public_jwk(&self) -> Jwk {
        self.public_view().to_jwk()
    }

    /// Bare public key members, as embedded in a DPoP proof header.
    pub fn bare_jwk(&self) -> Jwk {
        Jwk {
            kty: KTY_EC.to_string(),
            crv: Some(CURVE_P256.to_string()),
            x: Some(self.x.clone()),
            y: Some(self.y.clone()),
            ..Default::default()
        }
    }

    /// RFC 7638 JWK thumbprint (the DPoP `jkt`).
    #[must_use]
    pub fn thumbprint(&self) -> String {
        // Required members only, lexicographic order, no whitespace
        let canonical = format!(
            r#"{{"crv":"{CURVE_P256}","kty":"{KTY_EC}","x":"{}","y":"{}"}}"#,
            self.x, self.y
        );
        base64_url_encode(&Sha256::digest(canonical.as_bytes()))
    }
}
