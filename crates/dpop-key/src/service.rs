//! Key operations backed by a capability provider
//!
//! `KeyService` is the entry point the flow layer uses: generate and import
//! keys, sign and verify compact tokens. It owns no mutable state; every key
//! it hands out is an independent immutable value.

use std::sync::Arc;

use common::{Clock, SystemClock};
use tracing::debug;

use crate::crypto::{CryptoProvider, SoftwareCrypto};
use crate::error::{Error, Result};
use crate::jwk::{Algorithm, Jwk, KeyUse, base64_url_decode, base64_url_encode};
use crate::jwt::{
    JwtClaims, JwtHeader, VerifiedJwt, VerifyOptions, check_claims, decode_segment, split_token,
};
use crate::key::Key;

#[derive(Clone)]
pub struct KeyService {
    crypto: Arc<dyn CryptoProvider>,
    clock: Arc<dyn Clock>,
}

impl Default for KeyService {
    fn default() -> Self {
        Self::new(Arc::new(SoftwareCrypto), Arc::new(SystemClock))
    }
}

impl KeyService {
    pub fn new(crypto: Arc<dyn CryptoProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { crypto, clock }
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Generate a fresh private key.
    ///
    /// # Errors
    /// `UnsupportedAlgorithm` for anything but `"ES256"`.
    pub fn generate(&self, algorithm: &str) -> Result<Key> {
        let alg: Algorithm = algorithm.parse()?;
        let jwk = self.crypto.generate_private_jwk(alg.as_str())?;
        Key::from_jwk(&jwk)
    }

    /// Import a key from exchange format.
    pub fn import(&self, jwk: &Jwk) -> Result<Key> {
        Key::from_jwk(jwk)
    }

    /// Sign raw header and payload bytes into a compact token.
    ///
    /// # Errors
    /// `SigningUnavailable` if the key is public-only or declared for encryption.
    pub fn sign(&self, key: &Key, header: &[u8], payload: &[u8]) -> Result<String> {
        if !key.is_private() {
            return Err(Error::SigningUnavailable(format!(
                "key {} has no private component",
                key.kid()
            )));
        }
        if key.key_use() != KeyUse::Signing {
            return Err(Error::SigningUnavailable(format!(
                "key {} is declared for encryption",
                key.kid()
            )));
        }

        let signing_input = format!(
            "{}.{}",
            base64_url_encode(header),
            base64_url_encode(payload)
        );
        let signature = self.crypto.sign(&key.to_jwk(), signing_input.as_bytes())?;
        Ok(format!("{signing_input}.{}", base64_url_encode(&signature)))
    }

    /// Serialize `header` and `claims` and sign them. `alg` and `kid` are
    /// filled from the key.
    pub fn create_jwt(&self, key: &Key, header: &JwtHeader, claims: &JwtClaims) -> Result<String> {
        let header = JwtHeader {
            alg: key.algorithm().as_str().to_string(),
            kid: header.kid.clone().or_else(|| Some(key.kid().to_string())),
            ..header.clone()
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| Error::Encoding(format!("failed to serialize header: {e}")))?;
        let claims_json = serde_json::to_vec(claims)
            .map_err(|e| Error::Encoding(format!("failed to serialize claims: {e}")))?;
        self.sign(key, &header_json, &claims_json)
    }

    /// Verify a compact token against `key` and `options`.
    ///
    /// Only the public half of `key` is used.
    ///
    /// # Errors
    /// `VerificationFailed` with the first failing check as reason.
    pub fn verify(&self, token: &str, key: &Key, options: &VerifyOptions) -> Result<VerifiedJwt> {
        let (header_b64, payload_b64, signature_b64) = split_token(token)?;

        let header: JwtHeader = decode_segment("header", header_b64)?;
        if header.alg != key.algorithm().as_str() {
            return Err(Error::VerificationFailed(format!(
                "unexpected algorithm {:?}, key requires {}",
                header.alg,
                key.algorithm()
            )));
        }

        let signature = base64_url_decode(signature_b64)
            .map_err(|e| Error::VerificationFailed(format!("invalid base64 in signature: {e}")))?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
        if !self
            .crypto
            .verify(&key.public_jwk(), signing_input.as_bytes(), &signature)?
        {
            return Err(Error::VerificationFailed("signature mismatch".into()));
        }

        let claims: JwtClaims = decode_segment("payload", payload_b64)?;
        let now = options.current_time.unwrap_or_else(|| self.clock.now_secs());
        check_claims(&header, &claims, options, now)?;

        debug!(kid = key.kid(), "token verified");
        Ok(VerifiedJwt { header, claims })
    }
}
