//! Local fragment store trait definition.

use async_trait::async_trait;

use fragments_common::{FragmentId, FragmentRecord, OwnerId, Result};

/// Persistent, keyed store of fragment records.
///
/// Records are keyed by id and partitioned by owner. Every write is
/// persisted before the call returns; there is no batching.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Get the backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Insert or fully replace a record.
    ///
    /// # Postconditions
    /// - Exactly one record with `record.id` exists
    /// - Returns the stored key
    ///
    /// # Errors
    /// - Store could not be opened
    /// - Write failure
    async fn save(&self, record: &FragmentRecord) -> Result<FragmentId>;

    /// Point lookup by id.
    async fn get(&self, id: &FragmentId) -> Result<Option<FragmentRecord>>;

    /// All records of an owner, in no particular order.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>>;

    /// Remove a record. Deleting an absent id is not an error.
    async fn delete(&self, id: &FragmentId) -> Result<()>;

    /// Records of an owner with `pending_sync` set.
    async fn list_pending_by_owner(&self, owner: &OwnerId) -> Result<Vec<FragmentRecord>>;

    /// Remove every record.
    async fn clear(&self) -> Result<()>;

    /// Replace the record stored under `old` with a server-confirmed one.
    ///
    /// Saves first and deletes second, so an interruption leaves both
    /// records rather than neither. Backends with transactions override this.
    async fn reconcile(&self, old: &FragmentId, confirmed: &FragmentRecord) -> Result<()> {
        self.save(confirmed).await?;
        if old != &confirmed.id {
            self.delete(old).await?;
        }
        Ok(())
    }
}
