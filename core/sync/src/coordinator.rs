//! Offline-first coordinator over the local store and the remote API.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use fragments_common::{
    base_type, type_for_extension, Error, FragmentContent, FragmentId, FragmentRecord, OwnerId,
    Result,
};
use fragments_storage::{FragmentStore, RemoteFragments};

use crate::connectivity::Connectivity;
use crate::locks::KeyedLocks;
use crate::merge::merge_listing;

/// How an operation was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The remote API confirmed the operation.
    OnlineSuccess,
    /// Applied locally; will be pushed by the next resync.
    OfflineQueued,
    /// Answered from the local store.
    ServedLocally,
    /// A resync pass finished.
    SyncComplete { synced: usize, failed: usize },
    /// The id is unknown to both stores.
    NotFound,
    /// The record is local only and the conversion needs the server.
    ConversionUnavailable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::OnlineSuccess => write!(f, "online-success"),
            Outcome::OfflineQueued => write!(f, "offline-queued"),
            Outcome::ServedLocally => write!(f, "served-locally"),
            Outcome::SyncComplete { synced, failed } => {
                write!(f, "sync-complete ({} synced, {} failed)", synced, failed)
            }
            Outcome::NotFound => write!(f, "not-found"),
            Outcome::ConversionUnavailable => write!(f, "conversion-unavailable"),
        }
    }
}

/// Value of an operation together with its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Completed<T> {
    pub value: T,
    pub outcome: Outcome,
}

impl<T> Completed<T> {
    fn new(value: T, outcome: Outcome) -> Self {
        Self { value, outcome }
    }
}

/// Result of one resync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub duration: Duration,
}

impl SyncReport {
    pub fn outcome(&self) -> Outcome {
        Outcome::SyncComplete {
            synced: self.synced,
            failed: self.failed,
        }
    }
}

/// Routes every fragment operation through the remote API when possible and
/// through the local store otherwise.
///
/// Remote failures never escape an operation; they turn into a local
/// fallback. Storage failures are returned as errors. Mutations of the same
/// id are serialized.
pub struct SyncCoordinator {
    store: Arc<dyn FragmentStore>,
    remote: Arc<dyn RemoteFragments>,
    connectivity: Arc<dyn Connectivity>,
    owner: OwnerId,
    locks: KeyedLocks,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn FragmentStore>,
        remote: Arc<dyn RemoteFragments>,
        connectivity: Arc<dyn Connectivity>,
        owner: OwnerId,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            owner,
            locks: KeyedLocks::new(),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn store(&self) -> &Arc<dyn FragmentStore> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteFragments> {
        &self.remote
    }

    /// Whether a call to the API should be attempted for `id`.
    fn reaches_remote(&self, id: &FragmentId) -> bool {
        !id.is_offline() && self.connectivity.is_online()
    }

    /// Create a fragment.
    ///
    /// # Errors
    /// - Empty type or payload
    /// - Local store failure
    pub async fn create(
        &self,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<Completed<FragmentRecord>> {
        if content_type.trim().is_empty() {
            return Err(Error::InvalidInput("Content type cannot be empty".to_string()));
        }
        if data.is_empty() {
            return Err(Error::InvalidInput("Fragment data cannot be empty".to_string()));
        }

        if self.connectivity.is_online() {
            match self.remote.create(content_type, data.clone()).await {
                Ok(server) => {
                    let record = FragmentRecord::confirmed(server, self.owner.clone(), data);
                    self.store.save(&record).await?;
                    info!("Created fragment {}", record.id);
                    return Ok(Completed::new(record, Outcome::OnlineSuccess));
                }
                Err(e) => remote_failure("Remote create", &e),
            }
        }

        let record = FragmentRecord::new_offline(self.owner.clone(), content_type, data);
        self.store.save(&record).await?;
        info!("Queued fragment {} for sync", record.id);
        Ok(Completed::new(record, Outcome::OfflineQueued))
    }

    /// Replace the content of a fragment.
    ///
    /// The value is the local mirror after the update, if one exists.
    ///
    /// # Errors
    /// - Empty type or payload
    /// - Local store failure
    pub async fn update(
        &self,
        id: &FragmentId,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<Completed<Option<FragmentRecord>>> {
        if content_type.trim().is_empty() {
            return Err(Error::InvalidInput("Content type cannot be empty".to_string()));
        }
        if data.is_empty() {
            return Err(Error::InvalidInput("Fragment data cannot be empty".to_string()));
        }
        let _guard = self.locks.lock(id).await;

        if self.reaches_remote(id) {
            match self.remote.update(id, content_type, data.clone()).await {
                Ok(()) => {
                    let mirror = match self.store.get(id).await? {
                        Some(mut record) => {
                            record.touch(content_type, data);
                            record.pending_sync = false;
                            self.store.save(&record).await?;
                            Some(record)
                        }
                        None => None,
                    };
                    info!("Updated fragment {}", id);
                    return Ok(Completed::new(mirror, Outcome::OnlineSuccess));
                }
                Err(e) => warn!("Remote update of {} failed, queueing locally: {}", id, e),
            }
        }

        let Some(mut record) = self.store.get(id).await? else {
            debug!("Update of unknown fragment {}", id);
            return Ok(Completed::new(None, Outcome::NotFound));
        };
        record.touch(content_type, data);
        record.pending_sync = true;
        self.store.save(&record).await?;
        info!("Queued update of fragment {}", id);
        Ok(Completed::new(Some(record), Outcome::OfflineQueued))
    }

    /// Delete a fragment locally and, when possible, remotely.
    ///
    /// `OnlineSuccess` once the API confirmed the delete. Otherwise
    /// `ServedLocally` if a local record was removed, or `NotFound` if
    /// neither side had it. A delete the API did not confirm is not
    /// retried by resync.
    pub async fn delete(&self, id: &FragmentId) -> Result<Completed<()>> {
        let _guard = self.locks.lock(id).await;
        let existed = self.store.get(id).await?.is_some();
        self.store.delete(id).await?;

        if self.reaches_remote(id) {
            match self.remote.delete(id).await {
                Ok(()) => {
                    info!("Deleted fragment {}", id);
                    return Ok(Completed::new((), Outcome::OnlineSuccess));
                }
                Err(e) => warn!("Remote delete of {} failed: {}", id, e),
            }
        }

        if existed {
            info!("Deleted fragment {} locally only", id);
            Ok(Completed::new((), Outcome::ServedLocally))
        } else {
            debug!("Delete of unknown fragment {}", id);
            Ok(Completed::new((), Outcome::NotFound))
        }
    }

    /// Raw content of a fragment.
    ///
    /// A pending local record is newer than the server copy and is served
    /// as is.
    pub async fn get(&self, id: &FragmentId) -> Result<Completed<Option<FragmentContent>>> {
        let local = self.store.get(id).await?;

        if !is_pending(&local) && self.reaches_remote(id) {
            match self.remote.fetch(id).await {
                Ok(content) => return Ok(Completed::new(Some(content), Outcome::OnlineSuccess)),
                Err(e) => warn!("Remote fetch of {} failed, reading locally: {}", id, e),
            }
        }

        Ok(match local {
            Some(record) => Completed::new(
                Some(FragmentContent::new(record.fragment_type, record.data)),
                Outcome::ServedLocally,
            ),
            None => Completed::new(None, Outcome::NotFound),
        })
    }

    /// Content of a fragment converted to the format of `ext`.
    ///
    /// Only the API converts. Offline, or while local edits are pending, a
    /// request for the fragment's own format is answered from the local
    /// store.
    ///
    /// # Errors
    /// - Unknown extension
    /// - Local store failure
    pub async fn convert(
        &self,
        id: &FragmentId,
        ext: &str,
    ) -> Result<Completed<Option<FragmentContent>>> {
        let target = type_for_extension(ext)
            .ok_or_else(|| Error::InvalidInput(format!("Unsupported extension '{}'", ext)))?;

        let local = self.store.get(id).await?;

        if !is_pending(&local) && self.reaches_remote(id) {
            match self.remote.convert(id, ext).await {
                Ok(content) => return Ok(Completed::new(Some(content), Outcome::OnlineSuccess)),
                Err(e) => warn!("Remote conversion of {} failed: {}", id, e),
            }
        }

        Ok(match local {
            Some(record) if base_type(&record.fragment_type).eq_ignore_ascii_case(target) => {
                Completed::new(
                    Some(FragmentContent::new(record.fragment_type, record.data)),
                    Outcome::ServedLocally,
                )
            }
            Some(record) => {
                debug!(
                    "Cannot convert {} from {} to {} locally",
                    id, record.fragment_type, target
                );
                Completed::new(None, Outcome::ConversionUnavailable)
            }
            None => Completed::new(None, Outcome::NotFound),
        })
    }

    /// All fragments of the owner, local and remote, newest first.
    pub async fn list(&self) -> Result<Completed<Vec<FragmentRecord>>> {
        let (remote, outcome) = if self.connectivity.is_online() {
            match self.remote.list_expanded().await {
                Ok(records) => (records, Outcome::OnlineSuccess),
                Err(e) => {
                    warn!("Remote listing failed, showing local fragments: {}", e);
                    (Vec::new(), Outcome::ServedLocally)
                }
            }
        } else {
            (Vec::new(), Outcome::ServedLocally)
        };

        let local = self.store.list_by_owner(&self.owner).await?;
        debug!("Merging {} local and {} remote fragments", local.len(), remote.len());
        Ok(Completed::new(merge_listing(local, remote), outcome))
    }

    /// Number of local records waiting for a resync.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.list_pending_by_owner(&self.owner).await?.len())
    }

    /// Push every pending record of the owner to the API.
    ///
    /// Records are processed independently; a failure leaves the record
    /// pending and does not stop the pass. Offline, nothing is attempted and
    /// every pending record counts as failed.
    ///
    /// # Errors
    /// - Local store failure
    pub async fn resync(&self) -> Result<Completed<SyncReport>> {
        let start = Instant::now();
        let pending = self.store.list_pending_by_owner(&self.owner).await?;

        if !self.connectivity.is_online() {
            info!("Offline, {} fragments left pending", pending.len());
            let report = SyncReport {
                synced: 0,
                failed: pending.len(),
                duration: start.elapsed(),
            };
            return Ok(Completed::new(report.clone(), report.outcome()));
        }

        info!("Resyncing {} pending fragments", pending.len());
        let mut synced = 0;
        let mut failed = 0;

        for listed in pending {
            let _guard = self.locks.lock(&listed.id).await;

            // Re-read under the lock; the record may have changed since listing.
            let record = match self.store.get(&listed.id).await? {
                Some(record) if record.pending_sync => record,
                _ => {
                    debug!("Fragment {} no longer pending", listed.id);
                    continue;
                }
            };

            if self.push(record).await? {
                synced += 1;
            } else {
                failed += 1;
            }
        }

        let report = SyncReport {
            synced,
            failed,
            duration: start.elapsed(),
        };
        info!(
            "Resync completed: {} synced, {} failed in {:?}",
            report.synced, report.failed, report.duration
        );
        Ok(Completed::new(report.clone(), report.outcome()))
    }

    /// Push one pending record. Returns false if the API did not accept it.
    async fn push(&self, mut record: FragmentRecord) -> Result<bool> {
        if record.id.is_offline() {
            match self
                .remote
                .create(&record.fragment_type, record.data.clone())
                .await
            {
                Ok(server) => {
                    let old = record.id;
                    let confirmed = FragmentRecord::confirmed(server, self.owner.clone(), record.data);
                    self.store.reconcile(&old, &confirmed).await?;
                    debug!("Fragment {} is now {}", old, confirmed.id);
                    Ok(true)
                }
                Err(e) => {
                    remote_failure(&format!("Remote create of {}", record.id), &e);
                    Ok(false)
                }
            }
        } else {
            match self
                .remote
                .update(&record.id, &record.fragment_type, record.data.clone())
                .await
            {
                Ok(()) => {
                    record.pending_sync = false;
                    self.store.save(&record).await?;
                    debug!("Pushed update of {}", record.id);
                    Ok(true)
                }
                Err(e) => {
                    warn!("Failed to update {} remotely: {}", record.id, e);
                    Ok(false)
                }
            }
        }
    }
}

fn is_pending(record: &Option<FragmentRecord>) -> bool {
    record.as_ref().is_some_and(|r| r.pending_sync)
}

/// Log an absorbed failure of a remote write.
///
/// A non-transport error after the request was sent (an unreadable 2xx
/// body) means the API may already hold the fragment, and pushing it again
/// can duplicate it.
fn remote_failure(action: &str, e: &Error) {
    if e.is_remote() {
        warn!("{} failed, keeping it pending: {}", action, e);
    } else {
        warn!(
            "{} may have been stored by the API but the response was unreadable; \
             keeping it pending, a resync can duplicate it: {}",
            action, e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityMonitor;
    use crate::testing::StubRemote;
    use chrono::Utc;
    use fragments_storage::{MemoryStore, SqliteStore};
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<MemoryStore>,
        remote: Arc<StubRemote>,
        connectivity: Arc<ConnectivityMonitor>,
        coordinator: SyncCoordinator,
    }

    fn fixture(online: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(StubRemote::new());
        let connectivity = Arc::new(ConnectivityMonitor::new(online));
        let coordinator = SyncCoordinator::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            owner(),
        );
        Fixture {
            store,
            remote,
            connectivity,
            coordinator,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("alice").unwrap()
    }

    fn id(s: &str) -> FragmentId {
        FragmentId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_online() {
        let f = fixture(true);
        let done = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();

        assert_eq!(done.outcome, Outcome::OnlineSuccess);
        assert_eq!(done.value.id.as_str(), "srv-1");

        let stored = f.store.get(&id("srv-1")).await.unwrap().unwrap();
        assert!(!stored.pending_sync);
        assert_eq!(stored.owner_id, owner());
        assert_eq!(stored.data, b"hello");
    }

    #[tokio::test]
    async fn test_create_offline() {
        let f = fixture(false);
        let done = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();

        assert_eq!(done.outcome, Outcome::OfflineQueued);
        assert!(done.value.id.is_offline());
        assert!(done.value.pending_sync);
        assert_eq!(f.remote.calls(), 0);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_falls_back_on_remote_failure() {
        let f = fixture(true);
        f.remote.reject_payload(b"hello");

        let done = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();
        assert_eq!(done.outcome, Outcome::OfflineQueued);
        assert!(done.value.id.is_offline());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_input() {
        let f = fixture(true);
        assert!(matches!(
            f.coordinator.create("text/plain", Vec::new()).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.coordinator.create("", b"x".to_vec()).await,
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(f.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_offline_create_then_resync() {
        let f = fixture(false);
        let created = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();
        let offline_id = created.value.id;

        f.connectivity.set_online(true);
        let done = f.coordinator.resync().await.unwrap();
        assert_eq!(done.outcome, Outcome::SyncComplete { synced: 1, failed: 0 });

        assert!(f.store.get(&offline_id).await.unwrap().is_none());
        let confirmed = f.store.get(&id("srv-1")).await.unwrap().unwrap();
        assert!(!confirmed.pending_sync);
        assert_eq!(confirmed.data, b"hello");

        let listed = f.coordinator.list().await.unwrap();
        assert_eq!(listed.outcome, Outcome::OnlineSuccess);
        assert_eq!(listed.value.len(), 1);
        assert_eq!(listed.value[0].id.as_str(), "srv-1");
    }

    #[tokio::test]
    async fn test_partial_failure_resync() {
        let f = fixture(false);
        for payload in [&b"one"[..], b"two", b"three"] {
            f.coordinator.create("text/plain", payload.to_vec()).await.unwrap();
        }
        f.remote.reject_payload(b"two");
        f.connectivity.set_online(true);

        let done = f.coordinator.resync().await.unwrap();
        assert_eq!(done.value.synced, 2);
        assert_eq!(done.value.failed, 1);

        let pending = f.store.list_pending_by_owner(&owner()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].data, b"two");
        assert!(pending[0].id.is_offline());
        assert_eq!(f.remote.len(), 2);

        let mut synced: Vec<_> = f
            .store
            .list_by_owner(&owner())
            .await
            .unwrap()
            .into_iter()
            .filter(|r| !r.pending_sync)
            .collect();
        synced.sort_by(|a, b| a.data.cmp(&b.data));
        assert_eq!(synced.len(), 2);
        assert!(synced.iter().all(|r| r.id.as_str().starts_with("srv-")));
        assert_eq!(synced[0].data, b"one");
        assert_eq!(synced[1].data, b"three");
        // Only the failed record still carries an offline id.
        assert_eq!(f.store.len().await, 3);
    }

    #[tokio::test]
    async fn test_resync_offline_reports_all_failed() {
        let f = fixture(false);
        f.coordinator.create("text/plain", b"a".to_vec()).await.unwrap();
        f.coordinator.create("text/plain", b"b".to_vec()).await.unwrap();

        let done = f.coordinator.resync().await.unwrap();
        assert_eq!(done.outcome, Outcome::SyncComplete { synced: 0, failed: 2 });
        assert_eq!(f.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_resync_with_nothing_pending() {
        let f = fixture(true);
        f.coordinator.create("text/plain", b"a".to_vec()).await.unwrap();
        let calls = f.remote.calls();

        let done = f.coordinator.resync().await.unwrap();
        assert_eq!(done.outcome, Outcome::SyncComplete { synced: 0, failed: 0 });
        assert_eq!(f.remote.calls(), calls);
    }

    #[tokio::test]
    async fn test_offline_update_demotes_and_resync_keeps_id() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"v1".to_vec()).await.unwrap();
        let server_id = created.value.id;

        f.connectivity.set_online(false);
        let updated = f
            .coordinator
            .update(&server_id, "text/plain", b"v2".to_vec())
            .await
            .unwrap();
        assert_eq!(updated.outcome, Outcome::OfflineQueued);
        let record = updated.value.unwrap();
        assert_eq!(record.id, server_id);
        assert!(record.pending_sync);
        assert!(record.updated >= record.created);

        f.connectivity.set_online(true);
        let done = f.coordinator.resync().await.unwrap();
        assert_eq!(done.outcome, Outcome::SyncComplete { synced: 1, failed: 0 });

        assert_eq!(f.remote.len(), 1);
        assert_eq!(f.remote.content(server_id.as_str()).unwrap(), b"v2");
        assert!(!f.store.get(&server_id).await.unwrap().unwrap().pending_sync);
    }

    #[tokio::test]
    async fn test_update_online() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"v1".to_vec()).await.unwrap();

        let done = f
            .coordinator
            .update(&created.value.id, "text/markdown", b"# v2".to_vec())
            .await
            .unwrap();
        assert_eq!(done.outcome, Outcome::OnlineSuccess);
        let mirror = done.value.unwrap();
        assert_eq!(mirror.fragment_type, "text/markdown");
        assert_eq!(mirror.size, 4);
        assert!(!mirror.pending_sync);
    }

    #[tokio::test]
    async fn test_update_online_without_mirror() {
        let f = fixture(true);
        let now = Utc::now();
        f.remote.seed(
            FragmentRecord {
                id: id("elsewhere"),
                owner_id: OwnerId::new("hashed-owner").unwrap(),
                created: now,
                updated: now,
                fragment_type: "text/plain".to_string(),
                size: 3,
                pending_sync: false,
                data: Vec::new(),
            },
            b"old".to_vec(),
        );

        let done = f
            .coordinator
            .update(&id("elsewhere"), "text/plain", b"new".to_vec())
            .await
            .unwrap();
        assert_eq!(done.outcome, Outcome::OnlineSuccess);
        assert!(done.value.is_none());
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_offline_id_stays_local() {
        let f = fixture(false);
        let created = f.coordinator.create("text/plain", b"v1".to_vec()).await.unwrap();
        f.connectivity.set_online(true);

        let done = f
            .coordinator
            .update(&created.value.id, "text/plain", b"v2".to_vec())
            .await
            .unwrap();
        assert_eq!(done.outcome, Outcome::OfflineQueued);
        assert_eq!(done.value.unwrap().id, created.value.id);
        assert_eq!(f.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let f = fixture(false);
        let done = f
            .coordinator
            .update(&id("missing"), "text/plain", b"x".to_vec())
            .await
            .unwrap();
        assert_eq!(done.outcome, Outcome::NotFound);
        assert!(done.value.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"x".to_vec()).await.unwrap();

        let done = f.coordinator.delete(&created.value.id).await.unwrap();
        assert_eq!(done.outcome, Outcome::OnlineSuccess);
        assert!(f.store.is_empty().await);
        assert_eq!(f.remote.len(), 0);

        // Second delete: gone locally and the API answers 404.
        let again = f.coordinator.delete(&created.value.id).await.unwrap();
        assert_eq!(again.outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_offline_is_local_only() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"x".to_vec()).await.unwrap();
        f.connectivity.set_online(false);

        let done = f.coordinator.delete(&created.value.id).await.unwrap();
        assert_eq!(done.outcome, Outcome::ServedLocally);
        assert!(f.store.is_empty().await);
        assert_eq!(f.remote.len(), 1);
        assert_eq!(f.coordinator.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_remote_failure_is_local_only() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"x".to_vec()).await.unwrap();
        f.remote.set_reachable(false);

        let done = f.coordinator.delete(&created.value.id).await.unwrap();
        assert_eq!(done.outcome, Outcome::ServedLocally);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let f = fixture(false);
        let done = f.coordinator.delete(&id("never-existed")).await.unwrap();
        assert_eq!(done.outcome, Outcome::NotFound);
        assert_eq!(f.coordinator.pending_count().await.unwrap(), 0);

        let f = fixture(false);
        let queued = f.coordinator.create("text/plain", b"x".to_vec()).await.unwrap();
        let done = f.coordinator.delete(&queued.value.id).await.unwrap();
        assert_eq!(done.outcome, Outcome::ServedLocally);
        assert_eq!(f.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_get() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();

        let online = f.coordinator.get(&created.value.id).await.unwrap();
        assert_eq!(online.outcome, Outcome::OnlineSuccess);
        assert_eq!(online.value.unwrap().data, b"hello");

        f.connectivity.set_online(false);
        let offline = f.coordinator.get(&created.value.id).await.unwrap();
        assert_eq!(offline.outcome, Outcome::ServedLocally);
        assert_eq!(offline.value.unwrap().content_type, "text/plain");

        let missing = f.coordinator.get(&id("missing")).await.unwrap();
        assert_eq!(missing.outcome, Outcome::NotFound);
    }

    #[tokio::test]
    async fn test_get_prefers_pending_local_copy() {
        let f = fixture(true);
        let created = f.coordinator.create("text/plain", b"v1".to_vec()).await.unwrap();
        let server_id = created.value.id;

        f.connectivity.set_online(false);
        f.coordinator
            .update(&server_id, "text/plain", b"v2".to_vec())
            .await
            .unwrap();
        f.connectivity.set_online(true);

        let calls = f.remote.calls();
        let done = f.coordinator.get(&server_id).await.unwrap();
        assert_eq!(done.outcome, Outcome::ServedLocally);
        assert_eq!(done.value.unwrap().data, b"v2");
        assert_eq!(f.remote.calls(), calls);

        let listed = f.coordinator.list().await.unwrap();
        assert_eq!(listed.value[0].data, b"v2");
    }

    #[tokio::test]
    async fn test_convert_pending_stays_local() {
        let f = fixture(true);
        let created = f.coordinator.create("text/markdown", b"# v1".to_vec()).await.unwrap();
        let server_id = created.value.id;

        f.connectivity.set_online(false);
        f.coordinator
            .update(&server_id, "text/markdown", b"# v2".to_vec())
            .await
            .unwrap();
        f.connectivity.set_online(true);

        let same = f.coordinator.convert(&server_id, "md").await.unwrap();
        assert_eq!(same.outcome, Outcome::ServedLocally);
        assert_eq!(same.value.unwrap().data, b"# v2");

        let html = f.coordinator.convert(&server_id, "html").await.unwrap();
        assert_eq!(html.outcome, Outcome::ConversionUnavailable);
        assert!(html.value.is_none());

        // Once pushed, the API converts again.
        f.coordinator.resync().await.unwrap();
        let html = f.coordinator.convert(&server_id, "html").await.unwrap();
        assert_eq!(html.outcome, Outcome::OnlineSuccess);
        assert_eq!(html.value.unwrap().data, b"# v2");
    }

    #[tokio::test]
    async fn test_create_keeps_payload_when_response_unreadable() {
        let f = fixture(true);
        f.remote.garble_create_responses(true);

        let done = f.coordinator.create("text/plain", b"hello".to_vec()).await.unwrap();
        assert_eq!(done.outcome, Outcome::OfflineQueued);
        assert!(done.value.id.is_offline());
        assert_eq!(f.store.get(&done.value.id).await.unwrap().unwrap().data, b"hello");
        assert_eq!(f.remote.len(), 1);

        // Resync leaves the record pending while responses stay unreadable.
        let report = f.coordinator.resync().await.unwrap();
        assert_eq!(report.outcome, Outcome::SyncComplete { synced: 0, failed: 1 });
        assert_eq!(f.coordinator.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_convert() {
        let f = fixture(false);
        let created = f.coordinator.create("text/markdown", b"# hi".to_vec()).await.unwrap();
        let local_id = created.value.id;

        let same = f.coordinator.convert(&local_id, ".md").await.unwrap();
        assert_eq!(same.outcome, Outcome::ServedLocally);
        assert_eq!(same.value.unwrap().data, b"# hi");

        let html = f.coordinator.convert(&local_id, "html").await.unwrap();
        assert_eq!(html.outcome, Outcome::ConversionUnavailable);
        assert!(html.value.is_none());

        let missing = f.coordinator.convert(&id("missing"), "html").await.unwrap();
        assert_eq!(missing.outcome, Outcome::NotFound);

        assert!(matches!(
            f.coordinator.convert(&local_id, "exe").await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_convert_online() {
        let f = fixture(true);
        let created = f.coordinator.create("text/markdown", b"# hi".to_vec()).await.unwrap();

        let html = f.coordinator.convert(&created.value.id, "html").await.unwrap();
        assert_eq!(html.outcome, Outcome::OnlineSuccess);
        assert_eq!(html.value.unwrap().content_type, "text/html");
    }

    #[tokio::test]
    async fn test_list_merges_and_orders() {
        let f = fixture(true);
        let first = f.coordinator.create("text/plain", b"first".to_vec()).await.unwrap();

        f.connectivity.set_online(false);
        f.coordinator
            .update(&first.value.id, "text/plain", b"edited".to_vec())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = f.coordinator.create("text/plain", b"second".to_vec()).await.unwrap();

        f.connectivity.set_online(true);
        let listed = f.coordinator.list().await.unwrap();
        assert_eq!(listed.outcome, Outcome::OnlineSuccess);
        assert_eq!(listed.value.len(), 2);
        assert_eq!(listed.value[0].id, second.value.id);
        assert_eq!(listed.value[1].id, first.value.id);
        // Local copy wins over the server's.
        assert!(listed.value[1].pending_sync);
        assert_eq!(listed.value[1].data, b"edited");
    }

    #[tokio::test]
    async fn test_list_remote_failure_serves_local() {
        let f = fixture(true);
        f.coordinator.create("text/plain", b"x".to_vec()).await.unwrap();
        f.remote.set_reachable(false);

        let listed = f.coordinator.list().await.unwrap();
        assert_eq!(listed.outcome, Outcome::ServedLocally);
        assert_eq!(listed.value.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_partitioned_by_owner() {
        let f = fixture(false);
        f.coordinator.create("text/plain", b"mine".to_vec()).await.unwrap();
        f.store
            .save(&FragmentRecord::new_offline(
                OwnerId::new("bob").unwrap(),
                "text/plain",
                b"theirs".to_vec(),
            ))
            .await
            .unwrap();

        let listed = f.coordinator.list().await.unwrap();
        assert_eq!(listed.value.len(), 1);
        assert_eq!(f.coordinator.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_same_id() {
        let f = fixture(false);
        let created = f.coordinator.create("text/plain", b"v0".to_vec()).await.unwrap();
        let fid = created.value.id;

        let updates = (1..=8).map(|n| {
            f.coordinator
                .update(&fid, "text/plain", format!("v{}", n).into_bytes())
        });
        let results = futures::future::join_all(updates).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(f.store.len().await, 1);
        assert!(f.store.get(&fid).await.unwrap().unwrap().pending_sync);
    }

    #[tokio::test]
    async fn test_pending_survives_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fragments.db");
        let remote = Arc::new(StubRemote::new());

        {
            let coordinator = SyncCoordinator::new(
                Arc::new(SqliteStore::new(&path)),
                remote.clone(),
                Arc::new(ConnectivityMonitor::offline()),
                owner(),
            );
            coordinator.create("text/plain", b"persisted".to_vec()).await.unwrap();
        }

        let coordinator = SyncCoordinator::new(
            Arc::new(SqliteStore::new(&path)),
            remote.clone(),
            Arc::new(ConnectivityMonitor::always_online()),
            owner(),
        );
        assert_eq!(coordinator.pending_count().await.unwrap(), 1);
        let done = coordinator.resync().await.unwrap();
        assert_eq!(done.value.synced, 1);
        assert_eq!(remote.content("srv-1").unwrap(), b"persisted");
        assert_eq!(coordinator.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let coordinator = SyncCoordinator::new(
            Arc::new(SqliteStore::new(blocker.join("fragments.db"))),
            Arc::new(StubRemote::new()),
            Arc::new(ConnectivityMonitor::offline()),
            owner(),
        );
        let err = coordinator
            .create("text/plain", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::OfflineQueued.to_string(), "offline-queued");
        assert_eq!(
            Outcome::SyncComplete { synced: 2, failed: 1 }.to_string(),
            "sync-complete (2 synced, 1 failed)"
        );
    }
}
