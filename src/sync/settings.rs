//! Per-source sync settings, persisted as JSON in the key/value store

use crate::persistence::{sync_settings_key, KeyValueStore};
use crate::types::ContactRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which kind of local mutation triggered a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushIntent {
    Add,
    Update,
    Delete,
}

/// Field groups that may leave the device. Excluded groups are blanked
/// before a record is sent to the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncFields {
    pub phones: bool,
    pub emails: bool,
    pub organization: bool,
    pub notes: bool,
    pub address: bool,
    pub website: bool,
    pub birthday: bool,
    pub photo: bool,
}

impl Default for SyncFields {
    fn default() -> Self {
        Self {
            phones: true,
            emails: true,
            organization: true,
            notes: true,
            address: true,
            website: true,
            birthday: true,
            photo: true,
        }
    }
}

impl SyncFields {
    pub fn filter(&self, record: &ContactRecord) -> ContactRecord {
        let mut out = record.clone();
        if !self.phones {
            out.phones.clear();
        }
        if !self.emails {
            out.emails.clear();
        }
        if !self.organization {
            out.organization = None;
            out.title = None;
        }
        if !self.notes {
            out.notes = None;
        }
        if !self.address {
            out.address = None;
        }
        if !self.website {
            out.website = None;
        }
        if !self.birthday {
            out.birthday = None;
        }
        if !self.photo {
            out.photo_uri = None;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Master switch; when off nothing is sent or pulled
    pub enabled: bool,
    /// Mutation-triggered pushes and scheduled passes
    pub auto_sync: bool,
    /// Only records in `selected_ids` participate
    pub selective: bool,
    pub selected_ids: BTreeSet<String>,
    pub sync_on_add: bool,
    pub sync_on_update: bool,
    pub sync_on_delete: bool,
    pub fields: SyncFields,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_sync: true,
            selective: false,
            selected_ids: BTreeSet::new(),
            sync_on_add: true,
            sync_on_update: true,
            sync_on_delete: true,
            fields: SyncFields::default(),
        }
    }
}

impl SyncSettings {
    /// Whether the record participates at all under the selective filter
    pub fn includes(&self, record_id: &str) -> bool {
        !self.selective || self.selected_ids.contains(record_id)
    }

    /// Whether a mutation-triggered push should reach the source
    pub fn allows_push(&self, record_id: &str, intent: PushIntent) -> bool {
        let intent_enabled = match intent {
            PushIntent::Add => self.sync_on_add,
            PushIntent::Update => self.sync_on_update,
            PushIntent::Delete => self.sync_on_delete,
        };
        self.enabled && self.auto_sync && intent_enabled && self.includes(record_id)
    }

    /// Missing settings yield the defaults
    pub fn load(kv: &dyn KeyValueStore, source_id: &str) -> Result<Self> {
        match kv.load(&sync_settings_key(source_id))? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing sync settings for {}", source_id)),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, kv: &dyn KeyValueStore, source_id: &str) -> Result<()> {
        let bytes = serde_json::to_vec(self).context("serializing sync settings")?;
        kv.save(&sync_settings_key(source_id), &bytes)
    }
}
