//! Error types for key and token operations

/// Errors from key construction, signing and verification.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("signing unavailable: {0}")]
    SigningUnavailable(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result alias for key operations.
pub type Result<T> = std::result::Result<T, Error>;
