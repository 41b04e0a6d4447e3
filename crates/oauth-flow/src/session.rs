//! Authenticated session handle

use std::fmt;

use credential_store::{Session, TokenSet};
use dpop_key::{Key, KeyService};

use crate::error::Result;

/// A live session returned by callback, restore and refresh.
///
/// Holds a snapshot of the stored session; a later refresh through the client
/// does not update handles already handed out.
#[derive(Clone)]
pub struct OAuthSession {
    session: Session,
    keys: KeyService,
}

impl OAuthSession {
    pub(crate) fn new(session: Session, keys: KeyService) -> Self {
        Self { session, keys }
    }

    /// Account identifier.
    pub fn sub(&self) -> &str {
        &self.session.token_set.sub
    }

    pub fn token_set(&self) -> &TokenSet {
        &self.session.token_set
    }

    pub fn dpop_key(&self) -> &Key {
        &self.session.dpop_key
    }

    /// `Authorization` header value, e.g. `DPoP <access token>`.
    pub fn authorization_header(&self) -> String {
        let tokens = &self.session.token_set;
        format!("{} {}", tokens.token_type, tokens.access_token)
    }

    /// DPoP proof for a resource request made with this session's access
    /// token.
    pub fn dpop_proof(&self, method: &str, url: &str, nonce: Option<&str>) -> Result<String> {
        Ok(self.keys.dpop_proof(
            &self.session.dpop_key,
            method,
            url,
            Some(self.session.token_set.access_token.as_str()),
            nonce,
        )?)
    }

    pub fn into_inner(self) -> Session {
        self.session
    }
}

impl fmt::Debug for OAuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSession")
            .field("sub", &self.sub())
            .field("token_set", &self.session.token_set)
            .field("kid", &self.session.dpop_key.kid())
            .finish()
    }
}
