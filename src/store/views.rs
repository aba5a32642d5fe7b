//! Read-only views derived from a snapshot. Nothing here is persisted.

use crate::types::ContactRecord;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Bucket for records without a group
pub const OTHER_GROUP: &str = "Other";

pub fn favorites(contacts: &[ContactRecord]) -> Vec<ContactRecord> {
    contacts.iter().filter(|c| c.favorite).cloned().collect()
}

pub fn vips(contacts: &[ContactRecord]) -> Vec<ContactRecord> {
    contacts.iter().filter(|c| c.vip).cloned().collect()
}

pub fn emergency_contacts(contacts: &[ContactRecord]) -> Vec<ContactRecord> {
    contacts.iter().filter(|c| c.emergency).cloned().collect()
}

pub fn by_group(contacts: &[ContactRecord]) -> BTreeMap<String, Vec<ContactRecord>> {
    let mut groups: BTreeMap<String, Vec<ContactRecord>> = BTreeMap::new();
    for contact in contacts {
        let key = contact
            .group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(OTHER_GROUP);
        groups.entry(key.to_string()).or_default().push(contact.clone());
    }
    groups
}

/// Records whose latest interaction falls within `window` of `now`, newest first.
/// A window reaching past the earliest representable time covers everything.
pub fn recent(
    contacts: &[ContactRecord],
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<ContactRecord> {
    let cutoff = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut hits: Vec<(DateTime<Utc>, &ContactRecord)> = contacts
        .iter()
        .filter_map(|c| c.last_interaction().map(|ts| (ts, c)))
        .filter(|(ts, _)| *ts >= cutoff)
        .collect();
    hits.sort_by(|a, b| b.0.cmp(&a.0));
    hits.into_iter().map(|(_, c)| c.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContactDraft, EventSource, HistoryEvent, InteractionKind};

    fn record(id: &str, draft: ContactDraft) -> ContactRecord {
        ContactRecord::from_draft(id.to_string(), draft, Utc::now())
    }

    #[test]
    fn empty_group_falls_into_other() {
        let contacts = vec![
            record("1", ContactDraft::named("A").with_group("Family")),
            record("2", ContactDraft::named("B")),
            record("3", ContactDraft::named("C").with_group("  ")),
        ];
        let groups = by_group(&contacts);
        assert_eq!(groups["Family"].len(), 1);
        assert_eq!(groups[OTHER_GROUP].len(), 2);
    }

    #[test]
    fn recent_sorts_by_latest_event_within_window() {
        let now = Utc::now();
        let event = |ts| HistoryEvent::new(InteractionKind::Call, ts, EventSource::Automatic);

        let mut old = record("old", ContactDraft::named("Old"));
        old.history.push(event(now - Duration::days(30)));
        let mut mid = record("mid", ContactDraft::named("Mid"));
        mid.history.push(event(now - Duration::days(2)));
        let mut fresh = record("fresh", ContactDraft::named("Fresh"));
        fresh.history.push(event(now - Duration::days(20)));
        fresh.history.push(event(now - Duration::hours(1)));
        let never = record("never", ContactDraft::named("Never"));

        let out = recent(&[old, mid, fresh, never], Duration::days(7), now);
        let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "mid"]);
    }

    #[test]
    fn oversized_window_covers_all_history() {
        let now = Utc::now();
        let mut ancient = record("ancient", ContactDraft::named("Ancient"));
        ancient.history.push(HistoryEvent::new(
            InteractionKind::Visit,
            now - Duration::days(365 * 200),
            EventSource::Manual,
        ));

        let out = recent(&[ancient], Duration::MAX, now);
        assert_eq!(out.len(), 1);
    }
}
