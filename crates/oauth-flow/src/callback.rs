//! Authorization callback parameters

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::ResponseMode;

/// Parameters the authorization server appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Correlation value issued by `authorize`.
    pub state: String,
    pub code: Option<String>,
    /// Issuer identification (RFC 9207).
    pub iss: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse `application/x-www-form-urlencoded` callback parameters.
    ///
    /// # Errors
    /// `Protocol` if `state` is missing.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut params = CallbackParams::default();
        let mut state = None;

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match name.as_ref() {
                "state" => state = Some(value),
                "code" => params.code = Some(value),
                "iss" => params.iss = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }

        params.state = state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Protocol("callback is missing state".into()))?;
        Ok(params)
    }

    /// Parse the parameters out of a full redirect URL, reading the query or
    /// the fragment according to `mode`.
    pub fn from_redirect_url(redirect: &str, mode: ResponseMode) -> Result<Self> {
        let url = Url::parse(redirect)
            .map_err(|e| Error::Protocol(format!("invalid redirect URL: {e}")))?;
        let params = match mode {
            ResponseMode::Query => url.query(),
            ResponseMode::Fragment => url.fragment(),
        };
        let params = params.ok_or_else(|| {
            Error::Protocol(format!("redirect URL has no {mode} parameters"))
        })?;
        Self::from_query(params)
    }
}
