//! State transition function for the canonical store

use super::intent::{Intent, MutationOutcome};
use crate::error::{ContactError, Result};
use crate::matching::{absorb_external, merge, scorer::emails_overlap};
use crate::types::{ContactRecord, HistoryEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything the store holds in memory
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub contacts: Vec<ContactRecord>,
    /// Older history trimmed off at load time, re-attached on every write
    pub archived_history: HashMap<String, Vec<HistoryEvent>>,
}

/// Serialized form of the store
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub contacts: Vec<ContactRecord>,
}

impl StoreState {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.contacts.iter().position(|c| c.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&ContactRecord> {
        self.contacts.iter().find(|c| c.id == id)
    }

    /// Build state from a durable snapshot, keeping only the newest
    /// `retention` history events per record in memory.
    pub fn from_snapshot(snapshot: Snapshot, retention: usize) -> Self {
        let mut state = StoreState::default();
        for mut record in snapshot.contacts {
            if record.history.len() > retention {
                let keep_from = record.history.len() - retention;
                let recent = record.history.split_off(keep_from);
                let older = std::mem::replace(&mut record.history, recent);
                state.archived_history.insert(record.id.clone(), older);
            }
            state.contacts.push(record);
        }
        state
    }

    /// Full-history snapshot for durable storage
    pub fn to_snapshot(&self) -> Snapshot {
        let contacts = self
            .contacts
            .iter()
            .map(|record| match self.archived_history.get(&record.id) {
                Some(older) => {
                    let mut full = record.clone();
                    full.history = older.iter().chain(record.history.iter()).cloned().collect();
                    full
                }
                None => record.clone(),
            })
            .collect();
        Snapshot {
            version: SNAPSHOT_VERSION,
            contacts,
        }
    }
}

/// Apply one intent. Preconditions are checked before anything is touched, so
/// an `Err` always leaves `state` unchanged.
pub fn apply(
    state: &mut StoreState,
    intent: Intent,
    now: DateTime<Utc>,
    next_id: &mut dyn FnMut() -> String,
) -> Result<MutationOutcome> {
    match intent {
        Intent::ReplaceAll(mut records) => {
            let count = records.len();
            for record in &mut records {
                record.heal_primary_flags();
            }
            state.contacts = records;
            state.archived_history.clear();
            Ok(MutationOutcome::Replaced { count })
        }
        Intent::Add(draft) => {
            let id = fresh_id(state, next_id);
            let record = ContactRecord::from_draft(id, draft, now);
            state.contacts.push(record.clone());
            Ok(MutationOutcome::Added(record))
        }
        Intent::Update { id, patch } => Ok(modify(state, &id, now, |record| {
            patch.apply_to(record);
        })
        .map(MutationOutcome::Updated)
        .unwrap_or(MutationOutcome::Noop)),
        Intent::Delete { id } => match state.position(&id) {
            Some(index) => {
                let removed = state.contacts.remove(index);
                state.archived_history.remove(&id);
                Ok(MutationOutcome::Deleted(removed))
            }
            None => Ok(MutationOutcome::Noop),
        },
        Intent::ToggleFavorite { id } => Ok(modify(state, &id, now, |record| {
            record.favorite = !record.favorite;
        })
        .map(MutationOutcome::Updated)
        .unwrap_or(MutationOutcome::Noop)),
        Intent::ToggleVip { id } => Ok(modify(state, &id, now, |record| {
            record.vip = !record.vip;
        })
        .map(MutationOutcome::Updated)
        .unwrap_or(MutationOutcome::Noop)),
        Intent::AppendHistory { id, event } => Ok(modify(state, &id, now, |record| {
            record.history.push(event);
        })
        .map(MutationOutcome::Updated)
        .unwrap_or(MutationOutcome::Noop)),
        Intent::MergeInto {
            primary_id,
            secondary_id,
        } => merge_into(state, &primary_id, &secondary_id, now),
        Intent::LinkExternal {
            id,
            source,
            external_id,
        } => Ok(modify(state, &id, now, |record| {
            record.external_ids.insert(source, external_id);
        })
        .map(MutationOutcome::Linked)
        .unwrap_or(MutationOutcome::Noop)),
        Intent::ApplyPulled { source, contacts } => {
            Ok(apply_pulled(state, &source, contacts, now, next_id))
        }
    }
}

fn modify(
    state: &mut StoreState,
    id: &str,
    now: DateTime<Utc>,
    change: impl FnOnce(&mut ContactRecord),
) -> Option<ContactRecord> {
    let record = state.contacts.iter_mut().find(|c| c.id == id)?;
    change(record);
    record.updated_at = now;
    Some(record.clone())
}

fn merge_into(
    state: &mut StoreState,
    primary_id: &str,
    secondary_id: &str,
    now: DateTime<Utc>,
) -> Result<MutationOutcome> {
    if primary_id == secondary_id {
        return Err(ContactError::NotFound(format!(
            "cannot merge {} with itself",
            primary_id
        )));
    }
    let primary_index = state
        .position(primary_id)
        .ok_or_else(|| ContactError::NotFound(primary_id.to_string()))?;
    let secondary_index = state
        .position(secondary_id)
        .ok_or_else(|| ContactError::NotFound(secondary_id.to_string()))?;

    // Merge whole histories so the durable order stays primary then secondary.
    let primary_full = with_archive(state, primary_index);
    let secondary_full = with_archive(state, secondary_index);
    let mut merged = merge(&primary_full, &secondary_full, now);

    // The in-memory tail is as long as both sides held, plus the merge note.
    let archived = (primary_full.history.len() - state.contacts[primary_index].history.len())
        + (secondary_full.history.len() - state.contacts[secondary_index].history.len());
    let tail = merged.history.split_off(archived.min(merged.history.len()));
    let older = std::mem::replace(&mut merged.history, tail);

    state.archived_history.remove(secondary_id);
    if older.is_empty() {
        state.archived_history.remove(primary_id);
    } else {
        state.archived_history.insert(primary_id.to_string(), older);
    }
    state.contacts[primary_index] = merged.clone();
    let absorbed = state.contacts.remove(secondary_index);

    Ok(MutationOutcome::Merged {
        record: merged,
        absorbed,
    })
}

/// Record at `index` with its archived history put back in front
fn with_archive(state: &StoreState, index: usize) -> ContactRecord {
    let record = &state.contacts[index];
    let mut full = record.clone();
    if let Some(older) = state.archived_history.get(&record.id) {
        full.history = older.iter().chain(record.history.iter()).cloned().collect();
    }
    full
}

/// Match each pulled record by external id first, then by shared email.
fn apply_pulled(
    state: &mut StoreState,
    source: &str,
    contacts: Vec<ContactRecord>,
    now: DateTime<Utc>,
    next_id: &mut dyn FnMut() -> String,
) -> MutationOutcome {
    let mut inserted = 0;
    let mut updated = 0;

    for external in contacts {
        let by_external_id = external.external_id(source).and_then(|ext_id| {
            state
                .contacts
                .iter()
                .position(|c| c.external_id(source) == Some(ext_id))
        });
        let matched = by_external_id.or_else(|| {
            state
                .contacts
                .iter()
                .position(|c| emails_overlap(c, &external))
        });

        match matched {
            Some(index) => {
                let absorbed = absorb_external(&state.contacts[index], &external, source, now);
                state.contacts[index] = absorbed;
                updated += 1;
            }
            None => {
                let mut record = external;
                record.id = fresh_id(state, next_id);
                record.favorite = false;
                record.vip = false;
                record.history.clear();
                record.created_at = now;
                record.updated_at = now;
                record.heal_primary_flags();
                state.contacts.push(record);
                inserted += 1;
            }
        }
    }

    MutationOutcome::Pulled { inserted, updated }
}

fn fresh_id(state: &StoreState, next_id: &mut dyn FnMut() -> String) -> String {
    loop {
        let candidate = next_id();
        if state.position(&candidate).is_none() {
            return candidate;
        }
    }
}
