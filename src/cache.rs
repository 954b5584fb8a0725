//! Per-run fetch cache
//!
//! Keyed by [`ModReference`]. Each key is resolved and fetched at most once per
//! run, even when several tasks ask for it at the same time; later callers wait
//! for the first one and share its result, failures included.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

use crate::error::{ResolveError, SyncError};
use crate::sync::{FetchedBytes, ModReference, ResolvedVersion};

#[derive(Default)]
struct CacheEntry {
    resolved: OnceCell<Result<ResolvedVersion, ResolveError>>,
    fetched: OnceCell<Result<FetchedBytes, SyncError>>,
}

/// In-memory, single-flight cache owned by one sync run
#[derive(Default)]
pub struct FetchCache {
    entries: Mutex<HashMap<ModReference, Arc<CacheEntry>>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry for a key, creating it if needed.
    /// The map lock is only held for the lookup, never across an await.
    fn entry(&self, key: &ModReference) -> Arc<CacheEntry> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(entries.entry(key.clone()).or_default())
    }

    /// Get the resolved version for a key or resolve it using the provided async function
    pub async fn resolve_with<F, Fut>(
        &self,
        key: &ModReference,
        resolve_fn: F,
    ) -> Result<ResolvedVersion, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolvedVersion, ResolveError>>,
    {
        let entry = self.entry(key);
        entry.resolved.get_or_init(resolve_fn).await.clone()
    }

    /// Get the fetched file for a key or fetch it using the provided async function
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &ModReference,
        fetch_fn: F,
    ) -> Result<FetchedBytes, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedBytes, SyncError>>,
    {
        let entry = self.entry(key);
        entry.fetched.get_or_init(fetch_fn).await.clone()
    }

    /// Number of distinct keys seen this run
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
