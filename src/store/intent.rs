use crate::types::{ContactDraft, ContactPatch, ContactRecord, HistoryEvent};

/// Closed set of mutations the canonical store accepts.
///
/// Every intent goes through [`super::reducer::apply`] under the store lock, so
/// no two intents ever interleave.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Bulk load or overwrite of the whole collection
    ReplaceAll(Vec<ContactRecord>),
    Add(ContactDraft),
    /// Shallow update; a missing id is a silent no-op
    Update { id: String, patch: ContactPatch },
    Delete { id: String },
    ToggleFavorite { id: String },
    ToggleVip { id: String },
    AppendHistory { id: String, event: HistoryEvent },
    /// Absorb `secondary_id` into `primary_id`; missing ids report `NotFound`
    MergeInto {
        primary_id: String,
        secondary_id: String,
    },
    /// Remember the identifier an external source assigned to a record
    LinkExternal {
        id: String,
        source: String,
        external_id: String,
    },
    /// Fold records pulled from an external source into the collection
    ApplyPulled {
        source: String,
        contacts: Vec<ContactRecord>,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::ReplaceAll(_) => "replace_all",
            Intent::Add(_) => "add",
            Intent::Update { .. } => "update",
            Intent::Delete { .. } => "delete",
            Intent::ToggleFavorite { .. } => "toggle_favorite",
            Intent::ToggleVip { .. } => "toggle_vip",
            Intent::AppendHistory { .. } => "append_history",
            Intent::MergeInto { .. } => "merge_into",
            Intent::LinkExternal { .. } => "link_external",
            Intent::ApplyPulled { .. } => "apply_pulled",
        }
    }
}

/// Result of applying one intent
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    Replaced { count: usize },
    Added(ContactRecord),
    Updated(ContactRecord),
    Deleted(ContactRecord),
    Merged {
        record: ContactRecord,
        absorbed: ContactRecord,
    },
    Linked(ContactRecord),
    Pulled { inserted: usize, updated: usize },
    /// The intent referenced nothing that exists; state is unchanged
    Noop,
}

impl MutationOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, MutationOutcome::Noop)
    }

    /// The record left in the store by this mutation, if there is one
    pub fn record(&self) -> Option<&ContactRecord> {
        match self {
            MutationOutcome::Added(r)
            | MutationOutcome::Updated(r)
            | MutationOutcome::Linked(r) => Some(r),
            MutationOutcome::Merged { record, .. } => Some(record),
            _ => None,
        }
    }
}
