//! Table kinds and their retention policies
//!
//! The set of tables is closed. Each table is a marker type implementing
//! [`Table`], which fixes its value type, its storage encoding and how long
//! a value lives.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::types::{
    EncodedPendingFlow, EncodedSession, IdentityDocument, PendingFlow, ResolvedHandle,
    ServerMetadata, Session, decode_key, encode_key,
};

const ONE_MINUTE: Duration = Duration::from_secs(60);
const TEN_MINUTES: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    PendingFlow,
    Session,
    IdentityCache,
    HandleCache,
    NonceCache,
    AuthServerMetadataCache,
    ResourceServerMetadataCache,
}

impl TableKind {
    pub const ALL: [TableKind; 7] = [
        TableKind::PendingFlow,
        TableKind::Session,
        TableKind::IdentityCache,
        TableKind::HandleCache,
        TableKind::NonceCache,
        TableKind::AuthServerMetadataCache,
        TableKind::ResourceServerMetadataCache,
    ];

    /// Namespace used in storage keys, metrics and logs.
    pub fn name(self) -> &'static str {
        match self {
            TableKind::PendingFlow => "pending-flow",
            TableKind::Session => "session",
            TableKind::IdentityCache => "remote-identity-cache",
            TableKind::HandleCache => "handle-cache",
            TableKind::NonceCache => "replay-nonce-cache",
            TableKind::AuthServerMetadataCache => "auth-server-metadata-cache",
            TableKind::ResourceServerMetadataCache => "resource-server-metadata-cache",
        }
    }

    /// Fixed lifetime of values in this table. Sessions have none; their
    /// expiry depends on the stored token set.
    pub fn default_ttl(self) -> Option<Duration> {
        match self {
            TableKind::PendingFlow | TableKind::NonceCache => Some(TEN_MINUTES),
            TableKind::Session => None,
            TableKind::IdentityCache
            | TableKind::HandleCache
            | TableKind::AuthServerMetadataCache
            | TableKind::ResourceServerMetadataCache => Some(ONE_MINUTE),
        }
    }

    pub(crate) fn prefix(self) -> String {
        format!("{}.", self.name())
    }

    pub(crate) fn storage_key(self, key: &str) -> String {
        format!("{}.{key}", self.name())
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed table.
pub trait Table: Send + Sync + 'static {
    const KIND: TableKind;

    type Value: Send + Sync;

    /// JSON shape written to storage.
    type Encoded: Serialize + DeserializeOwned;

    fn encode(value: &Self::Value) -> Result<Self::Encoded>;

    fn decode(encoded: Self::Encoded) -> Result<Self::Value>;

    /// Absolute expiry (unix millis) for a value written at `now_millis`.
    fn expires_at(_value: &Self::Value, now_millis: u64) -> Option<u64> {
        Self::KIND
            .default_ttl()
            .map(|ttl| now_millis.saturating_add(ttl.as_millis() as u64))
    }
}

/// Authorization requests awaiting a callback, keyed by `state`.
pub struct PendingFlows;

impl Table for PendingFlows {
    const KIND: TableKind = TableKind::PendingFlow;
    type Value = PendingFlow;
    type Encoded = EncodedPendingFlow;

    fn encode(value: &PendingFlow) -> Result<EncodedPendingFlow> {
        Ok(EncodedPendingFlow {
            dpop_key: encode_key(&value.dpop_key)?,
            iss: value.iss.clone(),
            verifier: value.verifier.clone(),
            app_state: value.app_state.clone(),
        })
    }

    fn decode(encoded: EncodedPendingFlow) -> Result<PendingFlow> {
        Ok(PendingFlow {
            dpop_key: decode_key(&encoded.dpop_key)?,
            iss: encoded.iss,
            verifier: encoded.verifier,
            app_state: encoded.app_state,
        })
    }
}

/// Sessions keyed by account identifier (`sub`).
pub struct Sessions;

impl Table for Sessions {
    const KIND: TableKind = TableKind::Session;
    type Value = Session;
    type Encoded = EncodedSession;

    fn encode(value: &Session) -> Result<EncodedSession> {
        Ok(EncodedSession {
            dpop_key: encode_key(&value.dpop_key)?,
            token_set: value.token_set.clone(),
        })
    }

    fn decode(encoded: EncodedSession) -> Result<Session> {
        Ok(Session {
            dpop_key: decode_key(&encoded.dpop_key)?,
            token_set: encoded.token_set,
        })
    }

    /// A session that can be refreshed, or whose access token never expires,
    /// is kept until sign-out. Otherwise it goes away with its access token.
    fn expires_at(value: &Session, _now_millis: u64) -> Option<u64> {
        let tokens = &value.token_set;
        if tokens.refresh_token.is_some() {
            return None;
        }
        tokens.expires_at
    }
}

macro_rules! cache_table {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $value:ty) => {
        $(#[$doc])*
        pub struct $name;

        impl Table for $name {
            const KIND: TableKind = $kind;
            type Value = $value;
            type Encoded = $value;

            fn encode(value: &$value) -> Result<$value> {
                Ok(value.clone())
            }

            fn decode(encoded: $value) -> Result<$value> {
                Ok(encoded)
            }
        }
    };
}

cache_table!(
    /// Identity documents keyed by account identifier.
    IdentityCache,
    TableKind::IdentityCache,
    IdentityDocument
);
cache_table!(
    /// Handle to account identifier resolutions.
    HandleCache,
    TableKind::HandleCache,
    ResolvedHandle
);
cache_table!(
    /// Most recent DPoP nonce per server origin.
    NonceCache,
    TableKind::NonceCache,
    String
);
cache_table!(
    /// Authorization server metadata keyed by issuer.
    AuthServerMetadataCache,
    TableKind::AuthServerMetadataCache,
    ServerMetadata
);
cache_table!(
    /// Protected resource metadata keyed by origin.
    ResourceServerMetadataCache,
    TableKind::ResourceServerMetadataCache,
    ServerMetadata
);
