//! Deterministic record merging
//!
//! Two policies live here:
//! - [`merge`]: user-driven duplicate merge. Primary wins on scalars,
//!   collections are unioned, flags are OR-ed, history is concatenated.
//! - [`absorb_external`]: inbound pull. The external copy wins on descriptive
//!   fields while local-only state (flags, history, creation time) is kept.

use crate::types::{
    ContactRecord, EmailAddress, EventSource, HistoryEvent, InteractionKind, PhoneNumber,
};
use chrono::{DateTime, Utc};

/// Merge `secondary` into `primary`. The result keeps the primary id and
/// creation time; removing the secondary from the store is the caller's job.
pub fn merge(
    primary: &ContactRecord,
    secondary: &ContactRecord,
    now: DateTime<Utc>,
) -> ContactRecord {
    let mut merged = ContactRecord {
        id: primary.id.clone(),
        external_ids: primary.external_ids.clone(),
        name: prefer(&Some(primary.name.clone()), &Some(secondary.name.clone()))
            .unwrap_or_default(),
        first_name: prefer(&primary.first_name, &secondary.first_name),
        last_name: prefer(&primary.last_name, &secondary.last_name),
        phones: union_phones(&primary.phones, &secondary.phones),
        emails: union_emails(&primary.emails, &secondary.emails),
        organization: prefer(&primary.organization, &secondary.organization),
        title: prefer(&primary.title, &secondary.title),
        business_type: prefer(&primary.business_type, &secondary.business_type),
        notes: prefer(&primary.notes, &secondary.notes),
        address: prefer(&primary.address, &secondary.address),
        website: prefer(&primary.website, &secondary.website),
        social_handle: prefer(&primary.social_handle, &secondary.social_handle),
        birthday: prefer(&primary.birthday, &secondary.birthday),
        anniversary: prefer(&primary.anniversary, &secondary.anniversary),
        group: prefer(&primary.group, &secondary.group),
        labels: primary.labels.union(&secondary.labels).cloned().collect(),
        favorite: primary.favorite || secondary.favorite,
        vip: primary.vip || secondary.vip,
        emergency: primary.emergency || secondary.emergency,
        emergency_info: prefer(&primary.emergency_info, &secondary.emergency_info),
        photo_uri: prefer(&primary.photo_uri, &secondary.photo_uri),
        history: primary
            .history
            .iter()
            .chain(secondary.history.iter())
            .cloned()
            .collect(),
        created_at: primary.created_at,
        updated_at: now,
    };

    // Keep the secondary's links to sources the primary was never pushed to,
    // otherwise the next push would create a second external copy.
    for (source, external_id) in &secondary.external_ids {
        merged
            .external_ids
            .entry(source.clone())
            .or_insert_with(|| external_id.clone());
    }

    merged.history.push(
        HistoryEvent::new(InteractionKind::Custom, now, EventSource::Manual).with_note(format!(
            "Merged with {} ({})",
            secondary.name, secondary.id
        )),
    );
    merged.heal_primary_flags();
    merged
}

/// Fold a pulled external record into its matched local record.
pub fn absorb_external(
    local: &ContactRecord,
    external: &ContactRecord,
    source: &str,
    now: DateTime<Utc>,
) -> ContactRecord {
    let mut absorbed = ContactRecord {
        id: local.id.clone(),
        external_ids: local.external_ids.clone(),
        name: prefer(&Some(external.name.clone()), &Some(local.name.clone()))
            .unwrap_or_default(),
        first_name: prefer(&external.first_name, &local.first_name),
        last_name: prefer(&external.last_name, &local.last_name),
        phones: union_phones(&external.phones, &local.phones),
        emails: union_emails(&external.emails, &local.emails),
        organization: prefer(&external.organization, &local.organization),
        title: prefer(&external.title, &local.title),
        business_type: prefer(&external.business_type, &local.business_type),
        notes: prefer(&external.notes, &local.notes),
        address: prefer(&external.address, &local.address),
        website: prefer(&external.website, &local.website),
        social_handle: prefer(&external.social_handle, &local.social_handle),
        birthday: prefer(&external.birthday, &local.birthday),
        anniversary: prefer(&external.anniversary, &local.anniversary),
        group: prefer(&local.group, &external.group),
        labels: local.labels.union(&external.labels).cloned().collect(),
        favorite: local.favorite,
        vip: local.vip,
        emergency: local.emergency,
        emergency_info: local.emergency_info.clone(),
        photo_uri: prefer(&external.photo_uri, &local.photo_uri),
        history: local.history.clone(),
        created_at: local.created_at,
        updated_at: now,
    };
    if let Some(external_id) = external.external_id(source) {
        absorbed
            .external_ids
            .insert(source.to_string(), external_id.to_string());
    }
    absorbed.heal_primary_flags();
    absorbed
}

fn prefer(first: &Option<String>, second: &Option<String>) -> Option<String> {
    first
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| second.as_ref().filter(|v| !v.trim().is_empty()))
        .cloned()
}

fn union_phones(first: &[PhoneNumber], second: &[PhoneNumber]) -> Vec<PhoneNumber> {
    let mut out = first.to_vec();
    let mut seen: Vec<String> = out.iter().map(PhoneNumber::normalized).collect();
    for phone in second {
        let key = phone.normalized();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(phone.clone());
        }
    }
    out
}

fn union_emails(first: &[EmailAddress], second: &[EmailAddress]) -> Vec<EmailAddress> {
    let mut out = first.to_vec();
    let mut seen: Vec<String> = out.iter().map(EmailAddress::normalized).collect();
    for email in second {
        let key = email.normalized();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(email.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContactDraft;
    use chrono::Duration;

    fn record(id: &str, draft: ContactDraft) -> ContactRecord {
        ContactRecord::from_draft(id.to_string(), draft, Utc::now() - Duration::days(1))
    }

    #[test]
    fn primary_wins_on_scalars_and_fills_gaps() {
        let mut a = record("a", ContactDraft::named("Jane Doe").with_organization("Acme"));
        a.title = None;
        let mut b = record("b", ContactDraft::named("J. Doe").with_organization("Other"));
        b.title = Some("CTO".to_string());
        b.website = Some("https://jd.example".to_string());

        let m = merge(&a, &b, Utc::now());
        assert_eq!(m.id, "a");
        assert_eq!(m.name, "Jane Doe");
        assert_eq!(m.organization.as_deref(), Some("Acme"));
        assert_eq!(m.title.as_deref(), Some("CTO"));
        assert_eq!(m.website.as_deref(), Some("https://jd.example"));
        assert_eq!(m.created_at, a.created_at);
    }

    #[test]
    fn collections_union_by_normalized_value() {
        let a = record(
            "a",
            ContactDraft::named("A").with_phone("555-1234").with_email("Jane@X.com"),
        );
        let b = record(
            "b",
            ContactDraft::named("B")
                .with_phone("(555) 1234")
                .with_phone("555-9999")
                .with_email("jane@x.com")
                .with_email("jd@y.com"),
        );
        let m = merge(&a, &b, Utc::now());
        let phones: Vec<&str> = m.phones.iter().map(|p| p.number.as_str()).collect();
        assert_eq!(phones, vec!["555-1234", "555-9999"]);
        let emails: Vec<&str> = m.emails.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(emails, vec!["Jane@X.com", "jd@y.com"]);
        assert_eq!(m.phones.iter().filter(|p| p.primary).count(), 1);
    }

    #[test]
    fn flags_are_ored_in_both_orders() {
        let mut a = record("a", ContactDraft::named("A"));
        let mut b = record("b", ContactDraft::named("B"));
        a.favorite = true;
        b.vip = true;
        b.emergency = true;
        for m in [merge(&a, &b, Utc::now()), merge(&b, &a, Utc::now())] {
            assert!(m.favorite);
            assert!(m.vip);
            assert!(m.emergency);
        }
    }

    #[test]
    fn history_concatenates_and_records_merge() {
        let now = Utc::now();
        let mut a = record("a", ContactDraft::named("A"));
        let mut b = record("b", ContactDraft::named("Bee"));
        a.history.push(HistoryEvent::new(InteractionKind::Call, now, EventSource::Automatic));
        b.history.push(HistoryEvent::new(InteractionKind::Email, now, EventSource::Manual));
        let m = merge(&a, &b, now);
        assert_eq!(m.history.len(), 3);
        assert_eq!(m.history[0].kind, InteractionKind::Call);
        assert_eq!(m.history[1].kind, InteractionKind::Email);
        let last = &m.history[2];
        assert_eq!(last.kind, InteractionKind::Custom);
        assert_eq!(last.source, EventSource::Manual);
        assert_eq!(last.note.as_deref(), Some("Merged with Bee (b)"));
        assert_eq!(m.updated_at, now);
    }

    #[test]
    fn repeated_merge_is_not_idempotent_on_history() {
        let a = record("a", ContactDraft::named("A"));
        let b = record("b", ContactDraft::named("B"));
        let once = merge(&a, &b, Utc::now());
        let twice = merge(&once, &b, Utc::now());
        assert_eq!(twice.history.len(), 2);
    }

    #[test]
    fn absorb_keeps_local_state() {
        let now = Utc::now();
        let mut local = record("local", ContactDraft::named("Jane").with_organization("Old"));
        local.favorite = true;
        local.vip = true;
        local.history.push(HistoryEvent::new(InteractionKind::Call, now, EventSource::Manual));
        let mut external = record("ext", ContactDraft::named("Jane Doe").with_organization("New"));
        external.external_ids.insert("cloud".to_string(), "people/1".to_string());

        let out = absorb_external(&local, &external, "cloud", now);
        assert_eq!(out.id, "local");
        assert_eq!(out.name, "Jane Doe");
        assert_eq!(out.organization.as_deref(), Some("New"));
        assert!(out.favorite && out.vip);
        assert_eq!(out.history, local.history);
        assert_eq!(out.created_at, local.created_at);
        assert_eq!(out.external_id("cloud"), Some("people/1"));
    }
}
