//! Read-through cache over a table.
//!
//! [`CachedTable`] keeps the records it has loaded in a map keyed by one
//! scalar extracted from each key, with a single refresh timestamp for the
//! whole set. Once the set is older than the freshness window, or empty, the
//! next request drops it and reloads only what was asked for. While it is
//! fresh, only missing keys are fetched and merged in.
//!
//! The cache mutates through `&mut self`. Wrap it in a lock to share it
//! between tasks.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use tablekit_core::model::{Item, Record};
use tablekit_core::storage::Result;

use crate::config::Config;
use crate::table::{GetOptions, ScanOptions, Table};

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

type KeyFn<K> = Arc<dyn Fn(&Item) -> Option<K> + Send + Sync>;

pub struct CachedTable<T, K> {
    table: Table<T>,
    key_of: KeyFn<K>,
    ttl: Duration,
    entries: HashMap<K, T>,
    refreshed_at: Option<Instant>,
    /// Set by a full scan; cleared whenever the set is reloaded by key.
    complete: bool,
}

impl<T, K> fmt::Debug for CachedTable<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTable")
            .field("table", &self.table)
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .field("refreshed_at", &self.refreshed_at)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl<T, K> CachedTable<T, K>
where
    T: Record,
    K: Hash + Eq + Clone,
{
    /// Caches `table`, identifying records by `key_of`.
    ///
    /// `key_of` is applied both to requested keys and to the fields of loaded
    /// records, so it must read an attribute present in both.
    pub fn new(
        table: Table<T>,
        key_of: impl Fn(&Item) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        Self {
            table,
            key_of: Arc::new(key_of),
            ttl: DEFAULT_TTL,
            entries: HashMap::new(),
            refreshed_at: None,
            complete: false,
        }
    }

    /// Same as [`CachedTable::new`] with the configured freshness window.
    pub fn from_config(
        table: Table<T>,
        config: &Config,
        key_of: impl Fn(&Item) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        Self::new(table, key_of).with_ttl(config.cache_ttl())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn table(&self) -> &Table<T> {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_fresh(&self) -> bool {
        self.refreshed_at
            .is_some_and(|at| at.elapsed() <= self.ttl)
    }

    /// Every record of the table. Served from the cache only when it holds a
    /// fresh full scan.
    ///
    /// A fresh cache filled by [`CachedTable::get_batch`] holds only the
    /// requested records, so it is rescanned rather than returned as the
    /// whole table.
    pub async fn scan(&mut self) -> Result<Vec<T>> {
        if !self.complete || !self.is_fresh() {
            let result = self.table.scan(ScanOptions::default()).await?;
            self.entries.clear();
            for record in result.items {
                self.insert(record);
            }
            self.refreshed_at = Some(Instant::now());
            self.complete = true;
            tracing::debug!(table = %self.table.name(), entries = self.entries.len(), "Cache loaded by scan");
        }
        Ok(self.entries.values().cloned().collect())
    }

    /// Records for `keys`, in first-occurrence order of the distinct keys.
    /// Absent records are omitted, as are keys `key_of` cannot read.
    pub async fn get_batch(&mut self, keys: &[Item]) -> Result<Vec<T>> {
        let mut seen = HashSet::new();
        let requested: Vec<(K, &Item)> = keys
            .iter()
            .filter_map(|key| (self.key_of)(key).map(|k| (k, key)))
            .filter(|(k, _)| seen.insert(k.clone()))
            .collect();

        if self.entries.is_empty() || !self.is_fresh() {
            self.entries.clear();
            self.complete = false;
            self.refreshed_at = None;

            let all: Vec<Item> = requested.iter().map(|(_, key)| (*key).clone()).collect();
            self.fetch(all).await?;
            self.refreshed_at = Some(Instant::now());
        } else {
            let missing: Vec<Item> = requested
                .iter()
                .filter(|(k, _)| !self.entries.contains_key(k))
                .map(|(_, key)| (*key).clone())
                .collect();
            tracing::debug!(
                table = %self.table.name(),
                requested = requested.len(),
                missing = missing.len(),
                "Cache lookup"
            );
            if !missing.is_empty() {
                self.fetch(missing).await?;
            }
        }

        Ok(requested
            .iter()
            .filter_map(|(k, _)| self.entries.get(k).cloned())
            .collect())
    }

    /// One record, through [`CachedTable::get_batch`].
    pub async fn get(&mut self, key: Item) -> Result<Option<T>> {
        Ok(self.get_batch(&[key]).await?.into_iter().next())
    }

    /// Drops every cached record.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.refreshed_at = None;
        self.complete = false;
    }

    async fn fetch(&mut self, keys: Vec<Item>) -> Result<()> {
        match keys.as_slice() {
            [] => {}
            [key] => {
                if let Some(record) = self.table.get(key.clone(), GetOptions::default()).await? {
                    self.insert(record);
                }
            }
            _ => {
                for record in self.table.get_batch(&keys, 0).await? {
                    self.insert(record);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, record: T) {
        match (self.key_of)(&record.to_fields()) {
            Some(key) => {
                self.entries.insert(key, record);
            }
            None => {
                tracing::warn!(table = %self.table.name(), "Loaded record has no cache key, skipping");
            }
        }
    }
}
