//! Expiring credential store for DPoP-bound OAuth sessions
//!
//! Provides:
//! - `KvBackend` storage engines (in-memory and atomic JSON file)
//! - Seven typed tables with fixed retention policies
//! - `CredentialStore` with lazy expiry on read
//! - `CleanupScheduler` for the periodic sweep of expired entries

pub mod backend;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod file;
pub mod metrics;
pub mod store;
pub mod table;
pub mod types;

pub use backend::{BackendFuture, KvBackend, MemoryBackend, StoredItem};
pub use cleanup::{CleanupScheduler, DEFAULT_CLEANUP_INTERVAL, SweepReport};
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use file::FileBackend;
pub use store::{CredentialStore, StoreTables, TableStore};
pub use table::{
    AuthServerMetadataCache, HandleCache, IdentityCache, NonceCache, PendingFlows,
    ResourceServerMetadataCache, Sessions, Table, TableKind,
};
pub use types::{
    EncodedPendingFlow, EncodedSession, IdentityDocument, PendingFlow, ResolvedHandle,
    ServerMetadata, Session, TokenSet,
};
