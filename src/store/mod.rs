//! # Key-Value Store Abstraction
//!
//! The crawl core persists every piece of shared state through named,
//! typed key-value tables opened from a [`StoreEngine`]. The engine is an
//! external collaborator: this module defines the contract the core relies
//! on (point lookup, upsert-returns-changed, deletion, ordered first-entry
//! removal, early-stop iteration, whole-table rename/drop) and ships one
//! process-local implementation for tests and single-node runs.
//!
//! `save()` returning whether the stored value changed is load-bearing: the
//! cluster claim primitive is built on it. Engines that cannot answer that
//! atomically degrade the claim to best-effort last-write-wins.

pub mod memory;

pub use memory::MemoryStoreEngine;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{CrawlError, Result};

/// Untyped view of one named table. Values are JSON documents.
#[async_trait]
pub trait RawStore: Send + Sync {
    fn name(&self) -> &str;

    /// Upsert. Returns true when the write changed the stored value
    /// (insert, or update to a different value).
    async fn save(&self, id: &str, value: Value) -> Result<bool>;

    async fn find(&self, id: &str) -> Result<Option<Value>>;

    /// First entry in the table's iteration order, if any.
    async fn find_first(&self) -> Result<Option<(String, Value)>>;

    async fn exists(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// Returns true when an entry was actually removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Remove and return the first entry in iteration order.
    async fn delete_first(&self) -> Result<Option<(String, Value)>>;

    async fn clear(&self) -> Result<()>;

    /// Visit entries until the visitor returns false. Returns whether
    /// iteration ran to completion.
    async fn for_each(
        &self,
        visitor: &mut (dyn for<'a> FnMut(&'a str, &'a Value) -> bool + Send),
    ) -> Result<bool>;

    async fn is_empty(&self) -> Result<bool>;
}

/// Engine managing named tables for one orchestrator instance.
#[async_trait]
pub trait StoreEngine: Send + Sync {
    /// Open (creating if needed) the named table.
    async fn open_store(&self, name: &str) -> Result<Arc<dyn RawStore>>;

    /// Rename a table, replacing any table already at the target name.
    async fn rename_store(&self, from: &str, to: &str) -> Result<()>;

    async fn drop_store(&self, name: &str) -> Result<()>;

    /// Whether tables opened from this engine are visible to sibling
    /// orchestrator instances. Drives the default cluster poll cadence.
    fn cluster_friendly(&self) -> bool;

    /// Drop all tables belonging to this engine.
    async fn clean(&self) -> Result<()>;
}

/// Typed wrapper over a [`RawStore`], handling serde conversion.
pub struct Store<T> {
    raw: Arc<dyn RawStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("name", &self.raw.name()).finish()
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync> Store<T> {
    pub fn new(raw: Arc<dyn RawStore>) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.raw.name()
    }

    fn encode(&self, value: &T) -> Result<Value> {
        serde_json::to_value(value).map_err(|e| {
            CrawlError::Store(format!("Could not serialize value for '{}': {e}", self.name()))
        })
    }

    fn decode(&self, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| {
            CrawlError::Store(format!(
                "Could not deserialize value from '{}': {e}",
                self.name()
            ))
        })
    }

    pub async fn save(&self, id: &str, value: &T) -> Result<bool> {
        let encoded = self.encode(value)?;
        self.raw.save(id, encoded).await
    }

    pub async fn find(&self, id: &str) -> Result<Option<T>> {
        match self.raw.find(id).await? {
            Some(value) => Ok(Some(self.decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        self.raw.exists(id).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.raw.count().await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.raw.delete(id).await
    }

    pub async fn delete_first(&self) -> Result<Option<T>> {
        match self.raw.delete_first().await? {
            Some((_, value)) => Ok(Some(self.decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.raw.clear().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.raw.is_empty().await
    }

    /// Visit typed entries until the visitor returns false. Returns whether
    /// iteration ran to completion.
    pub async fn for_each<F>(&self, mut visitor: F) -> Result<bool>
    where
        F: FnMut(&str, T) -> bool + Send,
    {
        let mut decode_error: Option<CrawlError> = None;
        let name = self.name().to_string();
        let completed = self
            .raw
            .for_each(&mut |id, value| match serde_json::from_value::<T>(value.clone()) {
                Ok(typed) => visitor(id, typed),
                Err(e) => {
                    decode_error = Some(CrawlError::Store(format!(
                        "Could not deserialize value from '{name}': {e}"
                    )));
                    false
                }
            })
            .await?;
        match decode_error {
            Some(err) => Err(err),
            None => Ok(completed),
        }
    }
}
