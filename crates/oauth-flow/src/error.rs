//! Error types for flow operations

/// Errors from the authorization flow and session lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No pending authorization matches the callback's `state`.
    #[error("unknown or expired authorization flow")]
    UnknownOrExpiredFlow,

    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),

    /// The authorization server returned an error instead of a code.
    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("no session for {0}")]
    NoSession(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid response mode {0:?}, expected \"query\" or \"fragment\"")]
    InvalidResponseMode(String),

    #[error("no client metadata configured")]
    MissingClientMetadata,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Store(#[from] credential_store::Error),

    #[error(transparent)]
    Key(#[from] dpop_key::Error),
}

impl Error {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Error::UnknownOrExpiredFlow => "unknown_or_expired_flow",
            Error::ExchangeFailed(_) => "exchange_failed",
            Error::AuthorizationDenied { .. } => "authorization_denied",
            Error::NoSession(_) => "no_session",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::InvalidResponseMode(_) => "invalid_response_mode",
            Error::MissingClientMetadata => "missing_client_metadata",
            Error::Protocol(_) => "protocol",
            Error::Store(_) => "store",
            Error::Key(_) => "key",
        }
    }
}

/// Result alias for flow operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert() {
        let err: Error = credential_store::Error::Unavailable("disk gone".into()).into();
        assert_eq!(err.label(), "store");
        assert_eq!(err.to_string(), "store unavailable: disk gone");
    }

    #[test]
    fn response_mode_message_names_value() {
        let err = Error::InvalidResponseMode("form_post".into());
        assert!(err.to_string().contains("\"form_post\""));
    }
}
