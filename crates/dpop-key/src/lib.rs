//! DPoP key abstraction
//!
//! Wraps P-256 key pairs in the JWK exchange format and signs/verifies compact
//! tokens with them. All byte-level cryptography goes through the
//! [`CryptoProvider`] capability trait.
//!
//! Typical use:
//! 1. `KeyService::generate("ES256")` mints a private DPoP key
//! 2. `Key::to_jwk()` / `KeyService::import()` move it through storage
//! 3. `KeyService::dpop_proof()` signs per-request proofs
//! 4. `KeyService::verify()` checks tokens against a key's public view

pub mod crypto;
pub mod dpop;
pub mod error;
pub mod jwk;
pub mod jwt;
pub mod key;
pub mod service;

pub use crypto::{CryptoProvider, SoftwareCrypto};
pub use dpop::{DPOP_JWT_TYPE, DpopClaims};
pub use error::{Error, Result};
pub use jwk::{Algorithm, Jwk, KeyUse};
pub use jwt::{JwtClaims, JwtHeader, VerifiedJwt, VerifyOptions};
pub use key::Key;
pub use service::KeyService;
