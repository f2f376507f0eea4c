//! In-process remote API used by the sync tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use fragments_common::{
    type_for_extension, Error, FragmentContent, FragmentId, FragmentRecord, OwnerId, Result,
};
use fragments_storage::RemoteFragments;

/// Remote stub assigning `srv-<n>` ids.
///
/// It can be made unreachable, or made to reject writes carrying a given
/// payload.
pub struct StubRemote {
    reachable: AtomicBool,
    garbled: AtomicBool,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    rejected: Mutex<HashSet<Vec<u8>>>,
    fragments: Mutex<Vec<(FragmentRecord, Vec<u8>)>>,
}

impl StubRemote {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            garbled: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
            rejected: Mutex::new(HashSet::new()),
            fragments: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Store creates but answer them with an unreadable body.
    pub fn garble_create_responses(&self, garbled: bool) {
        self.garbled.store(garbled, Ordering::SeqCst);
    }

    /// Reject every create or update carrying `data`.
    pub fn reject_payload(&self, data: &[u8]) {
        self.rejected.lock().unwrap().insert(data.to_vec());
    }

    /// Number of API calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Add a fragment as if created by another client.
    pub fn seed(&self, record: FragmentRecord, data: Vec<u8>) {
        self.fragments.lock().unwrap().push((record, data));
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.fragments
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| r.id.as_str() == id)
            .map(|(_, d)| d.clone())
    }

    pub fn len(&self) -> usize {
        self.fragments.lock().unwrap().len()
    }

    fn check(&self, payload: Option<&[u8]>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnreachable("connection refused".to_string()));
        }
        if let Some(payload) = payload {
            if self.rejected.lock().unwrap().contains(payload) {
                return Err(Error::RemoteRejected {
                    status: 500,
                    message: "unable to store fragment".to_string(),
                });
            }
        }
        Ok(())
    }

    fn not_found() -> Error {
        Error::RemoteRejected {
            status: 404,
            message: "fragment not found".to_string(),
        }
    }
}

#[async_trait]
impl RemoteFragments for StubRemote {
    fn name(&self) -> &str {
        "stub"
    }

    async fn ping(&self) -> Result<()> {
        self.check(None)
    }

    async fn list_ids(&self) -> Result<Vec<FragmentId>> {
        self.check(None)?;
        let fragments = self.fragments.lock().unwrap();
        Ok(fragments.iter().map(|(r, _)| r.id.clone()).collect())
    }

    async fn list_expanded(&self) -> Result<Vec<FragmentRecord>> {
        self.check(None)?;
        let fragments = self.fragments.lock().unwrap();
        Ok(fragments.iter().map(|(r, _)| r.clone()).collect())
    }

    async fn create(&self, content_type: &str, data: Vec<u8>) -> Result<FragmentRecord> {
        self.check(Some(&data))?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let record = FragmentRecord {
            id: FragmentId::new(format!("srv-{}", n))?,
            owner_id: OwnerId::new("hashed-owner")?,
            created: now,
            updated: now,
            fragment_type: content_type.to_string(),
            size: data.len() as u64,
            pending_sync: false,
            data: Vec::new(),
        };
        self.fragments.lock().unwrap().push((record.clone(), data));
        if self.garbled.load(Ordering::SeqCst) {
            return Err(Error::Serialization(
                "Failed to parse response: expected value at line 1 column 1".to_string(),
            ));
        }
        Ok(record)
    }

    async fn fetch(&self, id: &FragmentId) -> Result<FragmentContent> {
        self.check(None)?;
        let fragments = self.fragments.lock().unwrap();
        let (record, data) = fragments
            .iter()
            .find(|(r, _)| &r.id == id)
            .ok_or_else(Self::not_found)?;
        Ok(FragmentContent::new(record.fragment_type.clone(), data.clone()))
    }

    async fn convert(&self, id: &FragmentId, ext: &str) -> Result<FragmentContent> {
        self.check(None)?;
        let fragments = self.fragments.lock().unwrap();
        let (_, data) = fragments
            .iter()
            .find(|(r, _)| &r.id == id)
            .ok_or_else(Self::not_found)?;
        let content_type = type_for_extension(ext).ok_or(Error::RemoteRejected {
            status: 415,
            message: "unsupported extension".to_string(),
        })?;
        Ok(FragmentContent::new(content_type, data.clone()))
    }

    async fn update(&self, id: &FragmentId, content_type: &str, data: Vec<u8>) -> Result<()> {
        self.check(Some(&data))?;
        let mut fragments = self.fragments.lock().unwrap();
        let (record, stored) = fragments
            .iter_mut()
            .find(|(r, _)| &r.id == id)
            .ok_or_else(Self::not_found)?;
        record.fragment_type = content_type.to_string();
        record.size = data.len() as u64;
        record.updated = Utc::now();
        *stored = data;
        Ok(())
    }

    async fn delete(&self, id: &FragmentId) -> Result<()> {
        self.check(None)?;
        let mut fragments = self.fragments.lock().unwrap();
        let before = fragments.len();
        fragments.retain(|(r, _)| &r.id != id);
        if fragments.len() == before {
            return Err(Self::not_found());
        }
        Ok(())
    }
}
