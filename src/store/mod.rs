//! Canonical contact store
//!
//! The only mutable holder of contact records. All writes go through
//! [`ContactStore::dispatch`], which applies one [`Intent`] at a time under a
//! single lock. Readers get cloned snapshots. Durable writes are debounced by
//! a background [`flush::SnapshotWriter`].

pub mod flush;
pub mod intent;
pub mod reducer;
pub mod views;

pub use intent::{Intent, MutationOutcome};
pub use reducer::{Snapshot, StoreState};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::matching::{find_duplicates, DuplicateCandidate};
use crate::persistence::{KeyValueStore, SNAPSHOT_KEY};
use crate::types::{ContactDraft, ContactPatch, ContactRecord, HistoryEvent};
use chrono::Duration as ChronoDuration;
use flush::{FlushCommand, SnapshotWriter};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Store tuning
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Quiet period before a burst of mutations is written out
    pub debounce: Duration,
    /// History events per record kept in memory after load
    pub history_retention: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            history_retention: 20,
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            history_retention: config.history_retention,
        }
    }
}

#[derive(Clone)]
pub struct ContactStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<dyn Clock>,
    writer: mpsc::UnboundedSender<FlushCommand>,
}

impl ContactStore {
    /// Load the durable snapshot (or start empty) and spawn the writer task.
    pub async fn open(kv: Arc<dyn KeyValueStore>, options: StoreOptions) -> Self {
        Self::open_with_clock(kv, options, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        kv: Arc<dyn KeyValueStore>,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = load_state(kv.as_ref(), options.history_retention);
        info!("Contact store opened with {} records", state.contacts.len());
        let state = Arc::new(Mutex::new(state));
        let (writer, _handle) = SnapshotWriter::spawn(Arc::clone(&state), kv, options.debounce);
        Self {
            state,
            clock,
            writer,
        }
    }

    /// Apply one intent atomically and schedule a durable write if it changed anything.
    pub fn dispatch(&self, intent: Intent) -> Result<MutationOutcome> {
        let name = intent.name();
        let outcome = {
            let mut state = self.lock();
            let mut next_id = || uuid::Uuid::new_v4().to_string();
            reducer::apply(&mut state, intent, self.clock.now(), &mut next_id)?
        };
        if outcome.changed() {
            debug!("Applied {} intent", name);
            let _ = self.writer.send(FlushCommand::Dirty);
        } else {
            debug!("Intent {} was a no-op", name);
        }
        Ok(outcome)
    }

    pub fn replace_all(&self, records: Vec<ContactRecord>) -> usize {
        match self.dispatch(Intent::ReplaceAll(records)) {
            Ok(MutationOutcome::Replaced { count }) => count,
            _ => 0,
        }
    }

    pub fn add(&self, draft: ContactDraft) -> Result<ContactRecord> {
        match self.dispatch(Intent::Add(draft))? {
            MutationOutcome::Added(record) => Ok(record),
            other => unreachable!("add produced {:?}", other),
        }
    }

    /// Returns the updated record, or `None` when the id is gone
    pub fn update(&self, id: &str, patch: ContactPatch) -> Option<ContactRecord> {
        self.dispatch(Intent::Update {
            id: id.to_string(),
            patch,
        })
        .ok()
        .and_then(|o| o.record().cloned())
    }

    pub fn delete(&self, id: &str) -> Option<ContactRecord> {
        match self.dispatch(Intent::Delete { id: id.to_string() }) {
            Ok(MutationOutcome::Deleted(record)) => Some(record),
            _ => None,
        }
    }

    pub fn toggle_favorite(&self, id: &str) -> Option<ContactRecord> {
        self.dispatch(Intent::ToggleFavorite { id: id.to_string() })
            .ok()
            .and_then(|o| o.record().cloned())
    }

    pub fn toggle_vip(&self, id: &str) -> Option<ContactRecord> {
        self.dispatch(Intent::ToggleVip { id: id.to_string() })
            .ok()
            .and_then(|o| o.record().cloned())
    }

    pub fn append_history(&self, id: &str, event: HistoryEvent) -> Option<ContactRecord> {
        self.dispatch(Intent::AppendHistory {
            id: id.to_string(),
            event,
        })
        .ok()
        .and_then(|o| o.record().cloned())
    }

    /// Merge `secondary_id` into `primary_id`. Returns the merged record and the
    /// record that was absorbed.
    pub fn merge_into(
        &self,
        primary_id: &str,
        secondary_id: &str,
    ) -> Result<(ContactRecord, ContactRecord)> {
        match self.dispatch(Intent::MergeInto {
            primary_id: primary_id.to_string(),
            secondary_id: secondary_id.to_string(),
        })? {
            MutationOutcome::Merged { record, absorbed } => Ok((record, absorbed)),
            other => unreachable!("merge produced {:?}", other),
        }
    }

    pub fn link_external(&self, id: &str, source: &str, external_id: &str) -> Option<ContactRecord> {
        self.dispatch(Intent::LinkExternal {
            id: id.to_string(),
            source: source.to_string(),
            external_id: external_id.to_string(),
        })
        .ok()
        .and_then(|o| o.record().cloned())
    }

    /// Returns `(inserted, updated)`
    pub fn apply_pulled(&self, source: &str, contacts: Vec<ContactRecord>) -> (usize, usize) {
        match self.dispatch(Intent::ApplyPulled {
            source: source.to_string(),
            contacts,
        }) {
            Ok(MutationOutcome::Pulled { inserted, updated }) => (inserted, updated),
            _ => (0, 0),
        }
    }

    // ---------- Reads ----------

    pub fn snapshot(&self) -> Vec<ContactRecord> {
        self.lock().contacts.clone()
    }

    pub fn get(&self, id: &str) -> Option<ContactRecord> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn favorites(&self) -> Vec<ContactRecord> {
        views::favorites(&self.lock().contacts)
    }

    pub fn vips(&self) -> Vec<ContactRecord> {
        views::vips(&self.lock().contacts)
    }

    pub fn emergency_contacts(&self) -> Vec<ContactRecord> {
        views::emergency_contacts(&self.lock().contacts)
    }

    pub fn groups(&self) -> BTreeMap<String, Vec<ContactRecord>> {
        views::by_group(&self.lock().contacts)
    }

    pub fn recent(&self, window: ChronoDuration) -> Vec<ContactRecord> {
        let now = self.clock.now();
        views::recent(&self.lock().contacts, window, now)
    }

    pub fn find_duplicates(&self) -> Vec<DuplicateCandidate> {
        find_duplicates(&self.snapshot())
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    // ---------- Durability ----------

    /// Write any pending snapshot now instead of waiting for the debounce window.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(FlushCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Flush and stop the writer. Later mutations stay in memory only.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.writer.send(FlushCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("store state mutex poisoned")
    }
}

/// A missing, unreadable, or corrupt snapshot yields an empty store.
fn load_state(kv: &dyn KeyValueStore, retention: usize) -> StoreState {
    let bytes = match kv.load(SNAPSHOT_KEY) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return StoreState::default(),
        Err(e) => {
            warn!("Failed to read contact snapshot, starting empty: {:#}", e);
            return StoreState::default();
        }
    };
    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) => StoreState::from_snapshot(snapshot, retention.max(1)),
        Err(e) => {
            warn!("Contact snapshot is corrupt, starting empty: {}", e);
            StoreState::default()
        }
    }
}
