//! Cross-source synchronizer
//!
//! Pushes local mutations to every registered [`ContactSource`] and runs bulk
//! push/pull passes. Single-record pushes never fail outward; their errors
//! are logged and reported. Bulk passes are exclusive per source.

use super::settings::{PushIntent, SyncFields, SyncSettings};
use super::source::ContactSource;
use super::state::{SyncPhase, SyncResult, SyncState, SyncStats};
use crate::error::{ContactError, Result};
use crate::persistence::KeyValueStore;
use crate::store::ContactStore;
use crate::types::ContactRecord;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a single-record push did at one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Settings excluded the record or the intent
    Skipped,
    Created(String),
    Updated(String),
    Deleted(String),
    /// Delete requested but the source had no matching record
    AlreadyAbsent,
}

#[derive(Debug)]
pub struct PushReport {
    pub source_id: String,
    pub outcome: Result<PushOutcome>,
}

#[derive(Debug)]
struct SourceRuntime {
    phase: SyncPhase,
    permission_granted: bool,
    settings: SyncSettings,
    stats: SyncStats,
}

struct SourceHandle {
    source: Arc<dyn ContactSource>,
    runtime: Mutex<SourceRuntime>,
    /// Serializes resolve-then-write sequences against this source
    push_lock: tokio::sync::Mutex<()>,
}

impl SourceHandle {
    fn id(&self) -> &str {
        self.source.id()
    }

    fn lock(&self) -> MutexGuard<'_, SourceRuntime> {
        self.runtime.lock().expect("sync runtime mutex poisoned")
    }

    fn settings(&self) -> SyncSettings {
        self.lock().settings.clone()
    }

    fn set_access(&self, granted: bool) {
        let mut rt = self.lock();
        rt.permission_granted = granted;
        if granted {
            let auto_sync = rt.settings.auto_sync;
            rt.phase.access_granted(auto_sync);
        } else {
            rt.phase.access_revoked();
        }
    }

    fn note_error(&self, err: &ContactError) {
        if matches!(err, ContactError::PermissionDenied(_)) {
            self.set_access(false);
        }
    }
}

/// Holds a source in `Syncing`; dropping it returns the phase to rest
struct BulkGuard<'a> {
    handle: &'a SourceHandle,
}

impl Drop for BulkGuard<'_> {
    fn drop(&mut self) {
        let mut rt = self.handle.lock();
        let auto_sync = rt.settings.auto_sync;
        rt.phase.end_bulk(auto_sync);
        if !rt.permission_granted {
            rt.phase.access_revoked();
        }
    }
}

pub struct Synchronizer {
    store: ContactStore,
    kv: Arc<dyn KeyValueStore>,
    sources: Vec<Arc<SourceHandle>>,
    batch_size: usize,
}

impl Synchronizer {
    pub fn new(store: ContactStore, kv: Arc<dyn KeyValueStore>, batch_size: usize) -> Self {
        Self {
            store,
            kv,
            sources: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Register a source, restoring its persisted settings and counters.
    pub fn register(&mut self, source: Arc<dyn ContactSource>) {
        let id = source.id().to_string();
        let settings = SyncSettings::load(self.kv.as_ref(), &id).unwrap_or_else(|e| {
            warn!("Using default sync settings for {}: {:#}", id, e);
            SyncSettings::default()
        });
        let stats = SyncStats::load(self.kv.as_ref(), &id).unwrap_or_else(|e| {
            warn!("Resetting sync stats for {}: {:#}", id, e);
            SyncStats::default()
        });
        info!("Registered {} source '{}'", source.kind().as_str(), id);
        self.sources.push(Arc::new(SourceHandle {
            source,
            runtime: Mutex::new(SourceRuntime {
                phase: SyncPhase::Unconfigured,
                permission_granted: false,
                settings,
                stats,
            }),
            push_lock: tokio::sync::Mutex::new(()),
        }));
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|h| h.id().to_string()).collect()
    }

    pub fn state(&self, source_id: &str) -> Option<SyncState> {
        self.find(source_id).map(|handle| {
            let rt = handle.lock();
            SyncState {
                source_id: source_id.to_string(),
                phase: rt.phase,
                permission_granted: rt.permission_granted,
                stats: rt.stats.clone(),
            }
        })
    }

    pub fn states(&self) -> Vec<SyncState> {
        self.sources
            .iter()
            .filter_map(|h| self.state(h.id()))
            .collect()
    }

    pub fn settings(&self, source_id: &str) -> Option<SyncSettings> {
        self.find(source_id).map(|h| h.settings())
    }

    /// Change and persist settings for one source.
    pub fn update_settings<F>(&self, source_id: &str, change: F) -> Result<SyncSettings>
    where
        F: FnOnce(&mut SyncSettings),
    {
        let handle = self.handle(source_id)?;
        let settings = {
            let mut rt = handle.lock();
            change(&mut rt.settings);
            let auto_sync = rt.settings.auto_sync;
            rt.phase.set_auto_sync(auto_sync);
            rt.settings.clone()
        };
        settings.save(self.kv.as_ref(), source_id)?;
        Ok(settings)
    }

    /// Check access, asking for it when missing. Updates the permission flag.
    pub async fn authorize(&self, source_id: &str) -> Result<bool> {
        let handle = self.handle(source_id)?;
        self.ensure_access(&handle).await
    }

    // ---------- Single-record push ----------

    /// Propagate one local mutation to every source. Never fails; each
    /// source's outcome is reported and failures are logged.
    pub async fn push(&self, record: &ContactRecord, intent: PushIntent) -> Vec<PushReport> {
        let mut reports = Vec::with_capacity(self.sources.len());
        for handle in &self.sources {
            let outcome = self.push_to(handle, record, intent).await;
            if let Err(e) = &outcome {
                handle.note_error(e);
                warn!(
                    "Background sync failed for '{}' on {}: {}",
                    record.name,
                    handle.id(),
                    e
                );
            }
            reports.push(PushReport {
                source_id: handle.id().to_string(),
                outcome,
            });
        }
        reports
    }

    async fn push_to(
        &self,
        handle: &SourceHandle,
        record: &ContactRecord,
        intent: PushIntent,
    ) -> Result<PushOutcome> {
        let settings = handle.settings();
        if !settings.allows_push(&record.id, intent) {
            debug!("Push of {} to {} skipped by settings", record.id, handle.id());
            return Ok(PushOutcome::Skipped);
        }
        // Resolve-then-write must not interleave with another push to this source.
        let _serial = handle.push_lock.lock().await;
        match intent {
            PushIntent::Delete => self.delete_external(handle, record).await,
            PushIntent::Add | PushIntent::Update => {
                // Read under the lock so a link written by an earlier push is seen.
                let Some(latest) = self.store.get(&record.id) else {
                    debug!("{} was deleted before its push to {}", record.id, handle.id());
                    return Ok(PushOutcome::Skipped);
                };
                self.upsert_external(handle, &latest, &settings.fields).await
            }
        }
    }

    /// Caller holds `push_lock`.
    async fn upsert_external(
        &self,
        handle: &SourceHandle,
        record: &ContactRecord,
        fields: &SyncFields,
    ) -> Result<PushOutcome> {
        let source = handle.source.as_ref();
        let outbound = fields.filter(record);
        match resolve_external(source, record).await? {
            Some(external_id) => {
                source.update(&external_id, &outbound).await?;
                if record.external_id(source.id()) != Some(external_id.as_str()) {
                    self.store.link_external(&record.id, source.id(), &external_id);
                }
                Ok(PushOutcome::Updated(external_id))
            }
            None => {
                let external_id = source.create(&outbound).await?;
                if self
                    .store
                    .link_external(&record.id, source.id(), &external_id)
                    .is_none()
                {
                    // Deleted locally while the create was in flight; its delete
                    // push saw no link, so remove the copy here.
                    debug!("{} vanished during create on {}", record.id, source.id());
                    source.delete(&external_id).await?;
                    return Ok(PushOutcome::Deleted(external_id));
                }
                debug!("Created {} on {} for {}", external_id, source.id(), record.id);
                Ok(PushOutcome::Created(external_id))
            }
        }
    }

    /// Caller holds `push_lock`.
    async fn delete_external(
        &self,
        handle: &SourceHandle,
        record: &ContactRecord,
    ) -> Result<PushOutcome> {
        let source = handle.source.as_ref();
        match resolve_external(source, record).await? {
            Some(external_id) => {
                source.delete(&external_id).await?;
                Ok(PushOutcome::Deleted(external_id))
            }
            None => Ok(PushOutcome::AlreadyAbsent),
        }
    }

    // ---------- Bulk passes ----------

    /// Push every eligible local record to one source.
    pub async fn push_all(&self, source_id: &str) -> Result<SyncResult> {
        let handle = self.handle(source_id)?;
        let Some(_guard) = self.begin_bulk(&handle).await? else {
            return Ok(SyncResult::skipped());
        };
        info!("Pushing all contacts to {}", source_id);
        let result = self.push_pass(&handle).await;
        self.finish(&handle, &result);
        Ok(result)
    }

    /// Fetch every record from one source and fold it into the store.
    pub async fn pull_all(&self, source_id: &str) -> Result<SyncResult> {
        let handle = self.handle(source_id)?;
        let Some(_guard) = self.begin_bulk(&handle).await? else {
            return Ok(SyncResult::skipped());
        };
        info!("Pulling all contacts from {}", source_id);
        let result = self.pull_pass(&handle).await?;
        self.finish(&handle, &result);
        Ok(result)
    }

    /// Pull then push under one exclusive pass. Used by scheduled syncs.
    pub async fn reconcile(&self, source_id: &str) -> Result<SyncResult> {
        let handle = self.handle(source_id)?;
        let Some(_guard) = self.begin_bulk(&handle).await? else {
            return Ok(SyncResult::skipped());
        };
        let started = Instant::now();
        let pulled = self.pull_pass(&handle).await?;
        let pushed = self.push_pass(&handle).await;

        let mut errors = pulled.errors;
        errors.extend(pushed.errors);
        let result = SyncResult {
            success: pulled.success && pushed.success,
            total: pulled.total + pushed.total,
            succeeded: pulled.succeeded + pushed.succeeded,
            failed: pulled.failed + pushed.failed,
            elapsed: started.elapsed(),
            errors,
            skipped: false,
        };
        self.finish(&handle, &result);
        Ok(result)
    }

    async fn push_pass(&self, handle: &SourceHandle) -> SyncResult {
        let started = Instant::now();
        let settings = handle.settings();
        let records: Vec<ContactRecord> = self
            .store
            .snapshot()
            .into_iter()
            .filter(|r| settings.includes(&r.id))
            .collect();

        let mut result = SyncResult {
            total: records.len(),
            ..Default::default()
        };
        for batch in records.chunks(self.batch_size) {
            for record in batch {
                let _serial = handle.push_lock.lock().await;
                let Some(latest) = self.store.get(&record.id) else {
                    // Deleted since the snapshot was taken
                    result.total -= 1;
                    continue;
                };
                match self.upsert_external(handle, &latest, &settings.fields).await {
                    Ok(_) => result.succeeded += 1,
                    Err(e) => {
                        handle.note_error(&e);
                        warn!("Failed to push '{}' to {}: {}", record.name, handle.id(), e);
                        result.failed += 1;
                        result.errors.push(format!("{}: {}", record.name, e));
                    }
                }
            }
            tokio::task::yield_now().await;
        }
        result.success = result.failed == 0;
        result.elapsed = started.elapsed();
        info!("Push to {}: {}", handle.id(), result.summary());
        result
    }

    async fn pull_pass(&self, handle: &SourceHandle) -> Result<SyncResult> {
        let started = Instant::now();
        let pulled = match handle.source.list_all().await {
            Ok(pulled) => pulled,
            Err(e) => {
                handle.note_error(&e);
                warn!("Failed to list contacts from {}: {}", handle.id(), e);
                return Err(e);
            }
        };

        let mut result = SyncResult {
            total: pulled.len(),
            ..Default::default()
        };
        for batch in pulled.chunks(self.batch_size) {
            let (inserted, updated) = self.store.apply_pulled(handle.id(), batch.to_vec());
            debug!(
                "Pulled batch from {}: {} inserted, {} updated",
                handle.id(),
                inserted,
                updated
            );
            result.succeeded += inserted + updated;
            tokio::task::yield_now().await;
        }
        result.failed = result.total.saturating_sub(result.succeeded);
        result.success = result.failed == 0;
        result.elapsed = started.elapsed();
        info!("Pull from {}: {}", handle.id(), result.summary());
        Ok(result)
    }

    /// `None` when sync is switched off for the source.
    async fn begin_bulk<'a>(&self, handle: &'a SourceHandle) -> Result<Option<BulkGuard<'a>>> {
        let (enabled, phase) = {
            let rt = handle.lock();
            (rt.settings.enabled, rt.phase)
        };
        if !enabled {
            debug!("Sync disabled for {}, skipping bulk pass", handle.id());
            return Ok(None);
        }
        if phase == SyncPhase::Unconfigured && !self.ensure_access(handle).await? {
            return Err(ContactError::PermissionDenied(handle.id().to_string()));
        }
        handle.lock().phase.begin_bulk(handle.id())?;
        Ok(Some(BulkGuard { handle }))
    }

    async fn ensure_access(&self, handle: &SourceHandle) -> Result<bool> {
        let source = handle.source.as_ref();
        let granted = if source.check_access().await? {
            true
        } else {
            info!("Requesting access to {}", source.id());
            source.request_access().await?
        };
        handle.set_access(granted);
        if !granted {
            warn!("Access to {} was denied", source.id());
        }
        Ok(granted)
    }

    fn finish(&self, handle: &SourceHandle, result: &SyncResult) {
        let stats = {
            let mut rt = handle.lock();
            rt.stats.record(result, self.store.clock().now());
            rt.stats.clone()
        };
        if let Err(e) = stats.save(self.kv.as_ref(), handle.id()) {
            warn!("Failed to persist sync stats for {}: {:#}", handle.id(), e);
        }
    }

    fn find(&self, source_id: &str) -> Option<&Arc<SourceHandle>> {
        self.sources.iter().find(|h| h.id() == source_id)
    }

    fn handle(&self, source_id: &str) -> Result<Arc<SourceHandle>> {
        self.find(source_id)
            .cloned()
            .ok_or_else(|| ContactError::NotFound(format!("sync source '{}'", source_id)))
    }
}

/// External id by stored link first, then by primary phone.
async fn resolve_external(
    source: &dyn ContactSource,
    record: &ContactRecord,
) -> Result<Option<String>> {
    if let Some(linked) = record.external_id(source.id()) {
        if let Some(found) = source.find_by_external_id(linked).await? {
            return Ok(Some(found));
        }
        debug!("Linked id {} no longer exists on {}", linked, source.id());
    }
    match record.primary_phone() {
        Some(phone) if !phone.normalized().is_empty() => source.find_by_phone(&phone.number).await,
        _ => Ok(None),
    }
}
