//! Application facade
//!
//! Mutations go to the store first and return as soon as memory is updated.
//! Each one that changes externally visible fields then spawns a push to the
//! registered sources without waiting for it.

use crate::error::Result;
use crate::matching::DuplicateCandidate;
use crate::store::ContactStore;
use crate::sync::{PushIntent, SyncResult, SyncState, Synchronizer};
use crate::types::{ContactDraft, ContactPatch, ContactRecord, HistoryEvent};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone)]
pub struct ContactService {
    store: ContactStore,
    sync: Option<Arc<Synchronizer>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ContactService {
    /// Local-only service with no sources attached
    pub fn new(store: ContactStore) -> Self {
        Self {
            store,
            sync: None,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_sync(store: ContactStore, sync: Arc<Synchronizer>) -> Self {
        Self {
            sync: Some(sync),
            ..Self::new(store)
        }
    }

    pub fn store(&self) -> &ContactStore {
        &self.store
    }

    pub fn synchronizer(&self) -> Option<&Arc<Synchronizer>> {
        self.sync.as_ref()
    }

    // ---------- Mutations ----------

    pub fn add(&self, draft: ContactDraft) -> Result<ContactRecord> {
        let record = self.store.add(draft)?;
        self.spawn_push(record.clone(), PushIntent::Add);
        Ok(record)
    }

    pub fn update(&self, id: &str, patch: ContactPatch) -> Option<ContactRecord> {
        let record = self.store.update(id, patch)?;
        self.spawn_push(record.clone(), PushIntent::Update);
        Some(record)
    }

    pub fn delete(&self, id: &str) -> Option<ContactRecord> {
        let record = self.store.delete(id)?;
        self.spawn_push(record.clone(), PushIntent::Delete);
        Some(record)
    }

    // Favorite, VIP and history are local-only and never pushed.

    pub fn toggle_favorite(&self, id: &str) -> Option<ContactRecord> {
        self.store.toggle_favorite(id)
    }

    pub fn toggle_vip(&self, id: &str) -> Option<ContactRecord> {
        self.store.toggle_vip(id)
    }

    pub fn append_history(&self, id: &str, event: HistoryEvent) -> Option<ContactRecord> {
        self.store.append_history(id, event)
    }

    /// Merge locally, then update the survivor and delete the absorbed record externally.
    pub fn merge_into(&self, primary_id: &str, secondary_id: &str) -> Result<ContactRecord> {
        let (merged, mut absorbed) = self.store.merge_into(primary_id, secondary_id)?;
        // The survivor may have adopted the absorbed record's external copies,
        // and shares its phones; only delete copies nothing else points at.
        absorbed
            .external_ids
            .retain(|source, external_id| merged.external_id(source) != Some(external_id.as_str()));
        absorbed.phones.clear();
        self.spawn_push(merged.clone(), PushIntent::Update);
        if !absorbed.external_ids.is_empty() {
            self.spawn_push(absorbed, PushIntent::Delete);
        }
        Ok(merged)
    }

    // ---------- Reads ----------

    pub fn list(&self) -> Vec<ContactRecord> {
        self.store.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<ContactRecord> {
        self.store.get(id)
    }

    pub fn favorites(&self) -> Vec<ContactRecord> {
        self.store.favorites()
    }

    pub fn vips(&self) -> Vec<ContactRecord> {
        self.store.vips()
    }

    pub fn emergency_contacts(&self) -> Vec<ContactRecord> {
        self.store.emergency_contacts()
    }

    pub fn groups(&self) -> BTreeMap<String, Vec<ContactRecord>> {
        self.store.groups()
    }

    pub fn recent(&self, days: i64) -> Vec<ContactRecord> {
        let window = chrono::Duration::try_days(days).unwrap_or(chrono::Duration::MAX);
        self.store.recent(window)
    }

    pub fn find_duplicates(&self) -> Vec<DuplicateCandidate> {
        self.store.find_duplicates()
    }

    // ---------- Sync ----------

    pub async fn push_all(&self, source_id: &str) -> Result<SyncResult> {
        match &self.sync {
            Some(sync) => sync.push_all(source_id).await,
            None => Ok(SyncResult::skipped()),
        }
    }

    pub async fn pull_all(&self, source_id: &str) -> Result<SyncResult> {
        match &self.sync {
            Some(sync) => sync.pull_all(source_id).await,
            None => Ok(SyncResult::skipped()),
        }
    }

    pub fn sync_states(&self) -> Vec<SyncState> {
        self.sync.as_ref().map(|s| s.states()).unwrap_or_default()
    }

    /// Wait for every push spawned so far.
    pub async fn settle(&self) {
        let handles = std::mem::take(&mut *self.lock_pending());
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Settle outstanding pushes, then flush and stop the store writer.
    pub async fn shutdown(&self) {
        self.settle().await;
        self.store.shutdown().await;
    }

    fn spawn_push(&self, record: ContactRecord, intent: PushIntent) {
        let Some(sync) = &self.sync else {
            return;
        };
        let sync = Arc::clone(sync);
        debug!("Scheduling {:?} push for {}", intent, record.id);
        let handle = tokio::spawn(async move {
            sync.push(&record, intent).await;
        });
        let mut pending = self.lock_pending();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().expect("pending push mutex poisoned")
    }
}
