//! Storage engine abstraction
//!
//! A `KvBackend` is a flat string-keyed map of [`StoredItem`]s. The value and
//! its expiry live in one item, so a reader can never observe a value whose
//! intended expiry has not been recorded yet. Every method is atomic with
//! respect to the others for a given key.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn KvBackend>`).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Boxed future returned by every backend operation.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One persisted entry: encoded value text plus optional expiry.
///
/// `expires_at` is a unix timestamp in milliseconds. `None` never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl StoredItem {
    /// An entry is expired at or after its expiry instant.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now_millis)
    }
}

/// Flat key-value storage engine.
pub trait KvBackend: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>>;

    /// Insert or replace an item.
    fn put<'a>(&'a self, key: &'a str, item: StoredItem) -> BackendFuture<'a, ()>;

    /// Remove an item. Absent keys are not an error.
    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()>;

    /// Remove and return an item in one step.
    fn take<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>>;

    /// Remove the item only if it is expired at `now_millis`.
    ///
    /// The check and removal happen under one lock so a value rewritten
    /// concurrently with a fresh expiry is never evicted by a stale read.
    fn remove_expired<'a>(&'a self, key: &'a str, now_millis: u64) -> BackendFuture<'a, bool>;

    /// All keys starting with `prefix`, expired or not.
    fn keys<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>>;
}

/// In-process engine. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<HashMap<String, StoredItem>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
        Box::pin(async move { Ok(self.state.read().await.get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, item: StoredItem) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.state.write().await.insert(key.to_string(), item);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.state.write().await.remove(key);
            Ok(())
        })
    }

    fn take<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
        Box::pin(async move { Ok(self.state.write().await.remove(key)) })
    }

    fn remove_expired<'a>(&'a self, key: &'a str, now_millis: u64) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            if state.get(key).is_some_and(|item| item.is_expired(now_millis)) {
                state.remove(key);
                return Ok(true);
            }
            Ok(false)
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }
}
