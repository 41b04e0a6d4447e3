//! Background sweep of expired entries
//!
//! Reads already hide expired values, but only for keys that are read. The
//! sweep physically removes everything past its expiry so abandoned flows and
//! stale cache entries do not accumulate.
//!
//! The scheduler is an owned handle: one per store, stopped with
//! [`CleanupScheduler::stop`]. No sweep starts after `stop` returns.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use crate::store::CredentialStore;
use crate::table::TableKind;

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of one sweep across every table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    /// Storage errors logged and skipped.
    pub errors: usize,
}

impl CredentialStore {
    /// Remove every entry at or past its expiry.
    ///
    /// Entries without expiry are never touched. A failure listing a table or
    /// removing a key is logged and counted; the sweep moves on.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock().now_millis();

        for kind in TableKind::ALL {
            let keys = match self.list_keys(kind).await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(table = %kind, error = %e, "failed to list keys, skipping table");
                    metrics::record_sweep_error(kind);
                    report.errors += 1;
                    continue;
                }
            };

            for key in &keys {
                match self.evict_if_expired(kind, key, now).await {
                    Ok(true) => report.evicted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(table = %kind, key = %key, error = %e, "failed to evict expired entry");
                        metrics::record_sweep_error(kind);
                        report.errors += 1;
                    }
                }
            }
        }

        debug!(evicted = report.evicted, errors = report.errors, "sweep finished");
        report
    }

    /// Start the periodic sweep.
    ///
    /// # Errors
    /// `SchedulerRunning` if a scheduler already owns this store.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> Result<CleanupScheduler> {
        if self
            .cleanup_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SchedulerRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the immediate first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        store.sweep().await;
                    }
                }
            }
            debug!("cleanup task exiting");
        });

        info!(interval_secs = interval.as_secs(), "cleanup scheduler started");
        Ok(CleanupScheduler {
            store: Arc::clone(self),
            shutdown_tx,
            handle: Some(handle),
        })
    }
}

/// Handle owning the background sweep task.
pub struct CleanupScheduler {
    store: Arc<CredentialStore>,
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupScheduler {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task and wait for it to exit. A sweep in progress finishes
    /// first; none starts afterwards.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "cleanup task ended abnormally");
        }
        self.store.cleanup_active.store(false, Ordering::Release);
        info!("cleanup scheduler stopped");
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            warn!("cleanup scheduler dropped without stop, aborting task");
            handle.abort();
            self.store.cleanup_active.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFuture, KvBackend, MemoryBackend, StoredItem};
    use crate::table::{HandleCache, NonceCache, Sessions};
    use crate::types::{ResolvedHandle, Session, TokenSet};
    use common::ManualClock;
    use dpop_key::KeyService;

    const T0: u64 = 1_700_000_000_000;

    fn store() -> (Arc<CredentialStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (Arc::new(CredentialStore::in_memory(clock.clone())), clock)
    }

    fn session() -> Session {
        Session {
            dpop_key: KeyService::default().generate("ES256").unwrap(),
            token_set: TokenSet {
                iss: "https://auth.example".into(),
                sub: "did:plc:alice".into(),
                aud: "https://pds.example".into(),
                scope: None,
                access_token: "at".into(),
                token_type: "DPoP".into(),
                refresh_token: Some("rt".into()),
                expires_at: Some(T0),
            },
        }
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let (store, clock) = store();
        store
            .set::<HandleCache>("alice.example", &ResolvedHandle(None))
            .await
            .unwrap();
        store.set::<NonceCache>("https://pds.example", &"n".into()).await.unwrap();
        store.set::<Sessions>("did:plc:alice", &session()).await.unwrap();

        // Handle cache (60s) expired, nonce cache (600s) not
        clock.advance(Duration::from_secs(60));
        let report = store.sweep().await;
        assert_eq!(report, SweepReport { evicted: 1, errors: 0 });

        assert!(store.list_keys(TableKind::HandleCache).await.unwrap().is_empty());
        assert_eq!(store.list_keys(TableKind::NonceCache).await.unwrap().len(), 1);
        assert_eq!(store.list_keys(TableKind::Session).await.unwrap().len(), 1);
    }

    /// Engine whose removals always fail.
    struct FailingRemovals(MemoryBackend);

    impl KvBackend for FailingRemovals {
        fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
            self.0.get(key)
        }
        fn put<'a>(&'a self, key: &'a str, item: StoredItem) -> BackendFuture<'a, ()> {
            self.0.put(key, item)
        }
        fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
            self.0.remove(key)
        }
        fn take<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
            self.0.take(key)
        }
        fn remove_expired<'a>(&'a self, key: &'a str, _now: u64) -> BackendFuture<'a, bool> {
            Box::pin(async move { Err(Error::Unavailable(format!("cannot remove {key}"))) })
        }
        fn keys<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>> {
            self.0.keys(prefix)
        }
    }

    #[tokio::test]
    async fn sweep_logs_and_continues_on_errors() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = CredentialStore::new(
            Arc::new(FailingRemovals(MemoryBackend::new())),
            clock.clone(),
        );
        store.set::<HandleCache>("a.example", &ResolvedHandle(None)).await.unwrap();
        store.set::<HandleCache>("b.example", &ResolvedHandle(None)).await.unwrap();
        store.set::<NonceCache>("https://pds.example", &"n".into()).await.unwrap();

        clock.advance(Duration::from_secs(600));
        let report = store.sweep().await;
        assert_eq!(report, SweepReport { evicted: 0, errors: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_sweeps_each_interval() {
        let (store, clock) = store();
        store
            .set::<HandleCache>("alice.example", &ResolvedHandle(None))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));

        let scheduler = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();
        assert!(scheduler.is_running());

        // No sweep on start
        tokio::task::yield_now().await;
        assert_eq!(store.list_keys(TableKind::HandleCache).await.unwrap().len(), 1);

        tokio::time::sleep(DEFAULT_CLEANUP_INTERVAL + Duration::from_millis(10)).await;
        assert!(store.list_keys(TableKind::HandleCache).await.unwrap().is_empty());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_sweep_after_stop() {
        let (store, clock) = store();
        let scheduler = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();
        scheduler.stop().await;

        store
            .set::<HandleCache>("alice.example", &ResolvedHandle(None))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(60));

        tokio::time::sleep(DEFAULT_CLEANUP_INTERVAL * 3).await;
        assert_eq!(store.list_keys(TableKind::HandleCache).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let (store, _) = store();
        let scheduler = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();

        assert!(matches!(
            store.start_cleanup(DEFAULT_CLEANUP_INTERVAL),
            Err(Error::SchedulerRunning)
        ));

        scheduler.stop().await;
        let again = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();
        again.stop().await;
    }

    #[tokio::test]
    async fn dropping_scheduler_releases_store() {
        let (store, _) = store();
        let scheduler = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();
        drop(scheduler);

        let again = store.start_cleanup(DEFAULT_CLEANUP_INTERVAL).unwrap();
        again.stop().await;
    }
}
