//! Plain-text rendering for the shell

use crate::matching::DuplicateCandidate;
use crate::sync::{SyncResult, SyncState};
use crate::types::ContactRecord;
use std::collections::BTreeMap;

/// Leading characters of an id shown in listings; any unique prefix is accepted back
pub const SHORT_ID_LEN: usize = 8;

pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((index, _)) => &id[..index],
        None => id,
    }
}

pub fn render_help() -> String {
    r#"Contact Sync Commands

Contacts:
  /list                      List all contacts
  /add name=.. phone=.. email=.. org=.. group=..
                             Add a contact (values may contain spaces)
  /edit <id> key=value ..    Change fields (same keys as /add)
  /log <id> <kind> [note]    Record a call, message, email, meeting, visit or custom event
  /delete <id>               Delete a contact
  /fav <id>                  Toggle favorite
  /vip <id>                  Toggle VIP
  <text>                     Find contacts whose name contains <text>

Views:
  /favorites                 Favorite contacts
  /groups                    Contacts by group
  /recent [days]             Contacts with recent interactions (default 7 days)
  /duplicates                Likely duplicate pairs
  /merge <primary> <secondary>
                             Merge the secondary contact into the primary

Sync:
  /sync status               Per-source sync state
  /sync push <source>        Push every contact to a source
  /sync pull <source>        Pull every contact from a source

General:
  /config show               Display current configuration
  /flush                     Write pending changes to disk now
  /help                      Show this help message
  /quit                      Exit

Ids may be abbreviated to any unique prefix."#
        .to_string()
}

fn contact_line(contact: &ContactRecord) -> String {
    let mut line = format!("  {}  {}", short_id(&contact.id), contact.name);
    if let Some(phone) = contact.primary_phone() {
        line.push_str(&format!("  {}", phone.number));
    }
    if let Some(email) = contact.primary_email() {
        line.push_str(&format!("  <{}>", email.address));
    }
    if contact.favorite {
        line.push_str("  [fav]");
    }
    if contact.vip {
        line.push_str("  [vip]");
    }
    line
}

pub fn render_contacts(title: &str, contacts: &[ContactRecord]) -> String {
    if contacts.is_empty() {
        return format!("{}: none", title);
    }
    let mut out = format!("{} ({}):", title, contacts.len());
    for contact in contacts {
        out.push('\n');
        out.push_str(&contact_line(contact));
    }
    out
}

pub fn render_groups(groups: &BTreeMap<String, Vec<ContactRecord>>) -> String {
    if groups.is_empty() {
        return "Groups: none".to_string();
    }
    let mut out = String::from("Groups:");
    for (name, members) in groups {
        out.push_str(&format!("\n{} ({})", name, members.len()));
        for member in members {
            out.push('\n');
            out.push_str(&contact_line(member));
        }
    }
    out
}

pub fn render_duplicates(candidates: &[DuplicateCandidate]) -> String {
    if candidates.is_empty() {
        return "No likely duplicates found.".to_string();
    }
    let mut out = format!("Likely duplicates ({}):", candidates.len());
    for candidate in candidates {
        out.push_str(&format!(
            "\n  {}% {} ({}) <-> {} ({})\n      {}",
            candidate.similarity.min(100),
            candidate.a.name,
            short_id(&candidate.a.id),
            candidate.b.name,
            short_id(&candidate.b.id),
            candidate.reasons.join(", ")
        ));
    }
    out
}

pub fn render_sync_states(states: &[SyncState]) -> String {
    if states.is_empty() {
        return "No sync sources configured.".to_string();
    }
    let mut out = String::from("Sync sources:");
    for state in states {
        let last = state
            .stats
            .last_synced_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "\n  {}: {} (access {}), last sync {}, {} ok / {} failed",
            state.source_id,
            state.phase.as_str(),
            if state.permission_granted {
                "granted"
            } else {
                "not granted"
            },
            last,
            state.stats.succeeded,
            state.stats.failed
        ));
    }
    out
}

pub fn render_sync_result(action: &str, source_id: &str, result: &SyncResult) -> String {
    let mut out = format!("{} {}: {}", action, source_id, result.summary());
    for error in &result.errors {
        out.push_str(&format!("\n  {}", error));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_truncates_long_ids_only() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn empty_views_render_placeholders() {
        assert_eq!(render_contacts("Favorites", &[]), "Favorites: none");
        assert_eq!(render_duplicates(&[]), "No likely duplicates found.");
        assert_eq!(render_sync_states(&[]), "No sync sources configured.");
    }
}
