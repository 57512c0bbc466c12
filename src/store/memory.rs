use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{RawStore, StoreEngine};
use crate::error::{CrawlError, Result};

type TableRef = Arc<RwLock<BTreeMap<String, Value>>>;

/// Process-local store engine.
///
/// Tables live in memory, ordered by key. Clones share the same underlying
/// tables, which is how multi-instance coordination is exercised in tests:
/// several orchestrator instances are handed clones of one engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreEngine {
    tables: Arc<RwLock<HashMap<String, TableRef>>>,
}

impl MemoryStoreEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreEngine for MemoryStoreEngine {
    async fn open_store(&self, name: &str) -> Result<Arc<dyn RawStore>> {
        let table = {
            let mut tables = self.tables.write();
            Arc::clone(
                tables
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new()))),
            )
        };
        Ok(Arc::new(MemoryStore {
            name: name.to_string(),
            table,
        }))
    }

    async fn rename_store(&self, from: &str, to: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let table = tables
            .remove(from)
            .ok_or_else(|| CrawlError::Store(format!("No such store to rename: {from}")))?;
        tables.insert(to.to_string(), table);
        Ok(())
    }

    async fn drop_store(&self, name: &str) -> Result<()> {
        self.tables.write().remove(name);
        Ok(())
    }

    fn cluster_friendly(&self) -> bool {
        false
    }

    async fn clean(&self) -> Result<()> {
        self.tables.write().clear();
        Ok(())
    }
}

struct MemoryStore {
    name: String,
    table: TableRef,
}

#[async_trait]
impl RawStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save(&self, id: &str, value: Value) -> Result<bool> {
        let mut table = self.table.write();
        let changed = table.get(id) != Some(&value);
        table.insert(id.to_string(), value);
        Ok(changed)
    }

    async fn find(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.table.read().get(id).cloned())
    }

    async fn find_first(&self) -> Result<Option<(String, Value)>> {
        Ok(self
            .table
            .read()
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.table.read().contains_key(id))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.table.read().len() as u64)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.table.write().remove(id).is_some())
    }

    async fn delete_first(&self) -> Result<Option<(String, Value)>> {
        let mut table = self.table.write();
        let first_key = table.keys().next().cloned();
        Ok(first_key.and_then(|k| table.remove(&k).map(|v| (k, v))))
    }

    async fn clear(&self) -> Result<()> {
        self.table.write().clear();
        Ok(())
    }

    async fn for_each(
        &self,
        visitor: &mut (dyn for<'a> FnMut(&'a str, &'a Value) -> bool + Send),
    ) -> Result<bool> {
        // Iterate over a snapshot so visitors may freely write back into
        // this or other tables without deadlocking.
        let snapshot: Vec<(String, Value)> = self
            .table
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (id, value) in &snapshot {
            if !visitor(id, value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.table.read().is_empty())
    }
}
