//! Namespaced, expiring credential store
//!
//! Each table lives under its own key prefix in one [`KvBackend`]. Values are
//! JSON encoded and written together with their expiry as a single item.
//! Reads treat an expired item as absent and remove it before returning.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use common::Clock;
use tracing::{debug, info};

use crate::backend::{KvBackend, MemoryBackend, StoredItem};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::file::FileBackend;
use crate::metrics;
use crate::table::{
    AuthServerMetadataCache, HandleCache, IdentityCache, NonceCache, PendingFlows,
    ResourceServerMetadataCache, Sessions, Table, TableKind,
};

pub struct CredentialStore {
    backend: Arc<dyn KvBackend>,
    clock: Arc<dyn Clock>,
    /// Set while a cleanup scheduler owns this store.
    pub(crate) cleanup_active: AtomicBool,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KvBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            cleanup_active: AtomicBool::new(false),
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), clock)
    }

    /// Open the engine named by the configuration: the file engine when a
    /// path is set, memory otherwise.
    pub async fn open(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let backend: Arc<dyn KvBackend> = match &config.path {
            Some(path) => Arc::new(FileBackend::load(path.clone()).await?),
            None => {
                info!("no store path configured, using in-memory store");
                Arc::new(MemoryBackend::new())
            }
        };
        Ok(Self::new(backend, clock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Read a live value. Expired entries are deleted and reported absent.
    pub async fn get<T: Table>(&self, key: &str) -> Result<Option<T::Value>> {
        let storage_key = T::KIND.storage_key(key);
        let Some(item) = self.backend.get(&storage_key).await? else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        if item.is_expired(now) {
            self.evict_if_expired(T::KIND, key, now).await?;
            return Ok(None);
        }

        decode::<T>(&item).map(Some)
    }

    /// Write a value with the table's expiry policy.
    ///
    /// # Errors
    /// `Key` if the value holds a key without private component, `Unavailable`
    /// if the engine fails.
    pub async fn set<T: Table>(&self, key: &str, value: &T::Value) -> Result<()> {
        let encoded = T::encode(value)?;
        let text = serde_json::to_string(&encoded).map_err(|e| Error::Codec {
            table: T::KIND.name(),
            message: e.to_string(),
        })?;
        let expires_at = T::expires_at(value, self.clock.now_millis());

        self.backend
            .put(
                &T::KIND.storage_key(key),
                StoredItem {
                    value: text,
                    expires_at,
                },
            )
            .await?;

        debug!(table = %T::KIND, key, ?expires_at, "stored value");
        Ok(())
    }

    /// Delete a value. Deleting an absent key succeeds.
    pub async fn delete(&self, kind: TableKind, key: &str) -> Result<()> {
        self.backend.remove(&kind.storage_key(key)).await?;
        debug!(table = %kind, key, "deleted value");
        Ok(())
    }

    /// Remove a value and return it if it was live. At most one concurrent
    /// caller receives it.
    pub async fn take<T: Table>(&self, key: &str) -> Result<Option<T::Value>> {
        let Some(item) = self.backend.take(&T::KIND.storage_key(key)).await? else {
            return Ok(None);
        };

        if item.is_expired(self.clock.now_millis()) {
            metrics::record_eviction(T::KIND);
            debug!(table = %T::KIND, key, "consumed expired value");
            return Ok(None);
        }

        decode::<T>(&item).map(Some)
    }

    /// All keys present in a table, including expired ones not yet removed.
    pub async fn list_keys(&self, kind: TableKind) -> Result<Vec<String>> {
        let prefix = kind.prefix();
        let keys = self.backend.keys(&prefix).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// The raw stored item, expired or not.
    pub async fn entry(&self, kind: TableKind, key: &str) -> Result<Option<StoredItem>> {
        self.backend.get(&kind.storage_key(key)).await
    }

    /// Remove an entry if it is expired at `now_millis`.
    pub(crate) async fn evict_if_expired(
        &self,
        kind: TableKind,
        key: &str,
        now_millis: u64,
    ) -> Result<bool> {
        let evicted = self
            .backend
            .remove_expired(&kind.storage_key(key), now_millis)
            .await?;
        if evicted {
            metrics::record_eviction(kind);
            debug!(table = %kind, key, "evicted expired value");
        }
        Ok(evicted)
    }

    /// Typed handle to one table.
    pub fn table<T: Table>(self: &Arc<Self>) -> TableStore<T> {
        TableStore {
            store: Arc::clone(self),
            _table: PhantomData,
        }
    }

    /// Handles to every table, as handed to the protocol library.
    pub fn tables(self: &Arc<Self>) -> StoreTables {
        StoreTables {
            pending_flows: self.table(),
            sessions: self.table(),
            identity_cache: self.table(),
            handle_cache: self.table(),
            nonce_cache: self.table(),
            auth_server_metadata: self.table(),
            resource_server_metadata: self.table(),
        }
    }
}

fn decode<T: Table>(item: &StoredItem) -> Result<T::Value> {
    let encoded: T::Encoded = serde_json::from_str(&item.value).map_err(|e| Error::Codec {
        table: T::KIND.name(),
        message: e.to_string(),
    })?;
    T::decode(encoded)
}

/// A store bound to one table.
pub struct TableStore<T> {
    store: Arc<CredentialStore>,
    _table: PhantomData<fn() -> T>,
}

impl<T> Clone for TableStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _table: PhantomData,
        }
    }
}

impl<T: Table> TableStore<T> {
    pub async fn get(&self, key: &str) -> Result<Option<T::Value>> {
        self.store.get::<T>(key).await
    }

    pub async fn set(&self, key: &str, value: &T::Value) -> Result<()> {
        self.store.set::<T>(key, value).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(T::KIND, key).await
    }

    pub async fn take(&self, key: &str) -> Result<Option<T::Value>> {
        self.store.take::<T>(key).await
    }

    pub async fn list_keys(&self) -> Result<Vec<String>> {
        self.store.list_keys(T::KIND).await
    }
}

/// All seven tables of one store.
#[derive(Clone)]
pub struct StoreTables {
    pub pending_flows: TableStore<PendingFlows>,
    pub sessions: TableStore<Sessions>,
    pub identity_cache: TableStore<IdentityCache>,
    pub handle_cache: TableStore<HandleCache>,
    pub nonce_cache: TableStore<NonceCache>,
    pub auth_server_metadata: TableStore<AuthServerMetadataCache>,
    pub resource_server_metadata: TableStore<ResourceServerMetadataCache>,
}
