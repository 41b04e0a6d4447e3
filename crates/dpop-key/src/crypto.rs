//! Capability provider for platform cryptography
//!
//! The key abstraction never touches curve arithmetic or entropy directly for
//! its operations; it goes through `CryptoProvider`. `SoftwareCrypto` is the
//! in-process implementation (P-256 via `p256`, SHA-256 via `sha2`, OS entropy
//! via `rand`). A platform keystore would implement the same trait.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{EncodedPoint, PublicKey};
use rand::RngExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::jwk::{Algorithm, CURVE_P256, Jwk, KTY_EC, KeyUse, base64_url_decode, base64_url_encode};

/// Byte length of a P-256 field element (coordinates and private scalar).
pub const P256_FIELD_LEN: usize = 32;

/// Attempts at drawing a valid scalar before giving up. A uniformly random
/// 32-byte string is out of range with probability ~2^-32.
const MAX_SCALAR_ATTEMPTS: usize = 8;

/// Platform cryptography consumed by the key abstraction.
pub trait CryptoProvider: Send + Sync {
    /// Cryptographically secure random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// Hash `data`. Only `"sha256"` is required.
    fn digest(&self, data: &[u8], algorithm: &str) -> Result<Vec<u8>>;

    /// Generate a private key in exchange format for `algorithm`.
    fn generate_private_jwk(&self, algorithm: &str) -> Result<Jwk>;

    /// Sign `message` with the private scalar carried by `jwk`.
    fn sign(&self, jwk: &Jwk, message: &[u8]) -> Result<Vec<u8>>;

    /// Check `signature` over `message` against the public coordinates of `jwk`.
    ///
    /// A structurally invalid signature is reported as `Ok(false)`.
    fn verify(&self, jwk: &Jwk, message: &[u8], signature: &[u8]) -> Result<bool>;
}

/// In-process software implementation of [`CryptoProvider`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCrypto;

impl CryptoProvider for SoftwareCrypto {
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rng().fill(&mut bytes[..]);
        bytes
    }

    fn digest(&self, data: &[u8], algorithm: &str) -> Result<Vec<u8>> {
        match algorithm {
            "sha256" => Ok(Sha256::digest(data).to_vec()),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn generate_private_jwk(&self, algorithm: &str) -> Result<Jwk> {
        let alg: Algorithm = algorithm.parse()?;

        let mut signing_key = None;
        for _ in 0..MAX_SCALAR_ATTEMPTS {
            if let Ok(key) = SigningKey::from_slice(&self.random_bytes(P256_FIELD_LEN)) {
                signing_key = Some(key);
                break;
            }
        }
        let signing_key = signing_key
            .ok_or_else(|| Error::InvalidKey("could not draw a valid P-256 scalar".into()))?;

        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| Error::InvalidKey("generated point has no x coordinate".into()))?;
        let y = point
            .y()
            .ok_or_else(|| Error::InvalidKey("generated point has no y coordinate".into()))?;

        let kid = uuid::Uuid::new_v4().to_string();
        debug!(kid = %kid, alg = %alg, "generated private key");

        Ok(Jwk {
            kty: KTY_EC.to_string(),
            key_use: Some(KeyUse::Signing.as_str().to_string()),
            crv: Some(CURVE_P256.to_string()),
            kid: Some(kid),
            x: Some(base64_url_encode(x)),
            y: Some(base64_url_encode(y)),
            d: Some(base64_url_encode(&signing_key.to_bytes())),
            alg: Some(alg.as_str().to_string()),
        })
    }

    fn sign(&self, jwk: &Jwk, message: &[u8]) -> Result<Vec<u8>> {
        let d = jwk
            .d
            .as_deref()
            .ok_or_else(|| Error::SigningUnavailable("key has no private component".into()))?;
        let scalar = base64_url_decode(d)
            .map_err(|e| Error::InvalidKey(format!("invalid base64 in \"d\": {e}")))?;
        let signing_key = SigningKey::from_slice(&scalar)
            .map_err(|e| Error::InvalidKey(format!("invalid private scalar: {e}")))?;

        let signature: Signature = signing_key.sign(message);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, jwk: &Jwk, message: &[u8], signature: &[u8]) -> Result<bool> {
        let (x, y) = match (jwk.x.as_deref(), jwk.y.as_deref()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(Error::InvalidKey("key has no public coordinates".into())),
        };
        let verifying_key = verifying_key_from_coordinates(
            &decode_coordinate("x", x)?,
            &decode_coordinate("y", y)?,
        )?;

        // ES256 signatures are the fixed 64-byte r || s encoding
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying_key.verify(message, &signature).is_ok())
    }
}

/// Decode one base64url coordinate and check its length.
pub(crate) fn decode_coordinate(name: &str, value: &str) -> Result<Vec<u8>> {
    let bytes = base64_url_decode(value)
        .map_err(|e| Error::InvalidKey(format!("invalid base64 in {name:?}: {e}")))?;
    if bytes.len() != P256_FIELD_LEN {
        return Err(Error::InvalidKey(format!(
            "{name:?} must be {P256_FIELD_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Build a verifying key from affine coordinates, rejecting points off the curve.
pub(crate) fn verifying_key_from_coordinates(x: &[u8], y: &[u8]) -> Result<VerifyingKey> {
    // Uncompressed SEC1 point: 0x04 || x || y
    let mut point_bytes = Vec::with_capacity(1 + 2 * P256_FIELD_LEN);
    point_bytes.push(0x04);
    point_bytes.extend_from_slice(x);
    point_bytes.extend_from_slice(y);

    let encoded_point = EncodedPoint::from_bytes(&point_bytes)
        .map_err(|e| Error::InvalidKey(format!("invalid encoded point: {e}")))?;

    let public_key: Option<PublicKey> = PublicKey::from_encoded_point(&encoded_point).into();
    let public_key =
        public_key.ok_or_else(|| Error::InvalidKey("point is not on the P-256 curve".into()))?;

    Ok(VerifyingKey::from(&public_key))
}

/// Derive the public coordinates belonging to a private scalar.
pub(crate) fn coordinates_for_scalar(scalar: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let signing_key = SigningKey::from_slice(scalar)
        .map_err(|e| Error::InvalidKey(format!("invalid private scalar: {e}")))?;
    let point = signing_key.verifying_key().to_encoded_point(false);
    match (point.x(), point.y()) {
        (Some(x), Some(y)) => Ok((x.to_vec(), y.to_vec())),
        _ => Err(Error::InvalidKey("private scalar maps to the identity point".into())),
    }
}
