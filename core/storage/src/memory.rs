//! In-memory fragment store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::store::FragmentStore;
use fragments_common::{FragmentId, FragmentRecord, OwnerId, Result};

/// In-memory fragment store.
///
/// Useful for testing and throwaway sessions. All data is stored in memory
/// and lost on drop.
pub struct MemoryStore {
    records: RwLock<HashMap<FragmentId, FragmentRecord>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records across all owners.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, record: &FragmentRecord) -> Result<FragmentId> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(record.id.clone())
    }

    async fn get(&self, id: &FragmentId) -> Result<Option<FragmentRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| &r.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &FragmentId) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn list_pending_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| &r.owner_id == owner && r.pending_sync)
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    async fn reconcile(&self, old: &FragmentId, confirmed: &FragmentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(old);
        records.insert(confirmed.id.clone(), confirmed.clone());
        Ok(())
    }
}
