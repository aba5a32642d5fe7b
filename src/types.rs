use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fallback display name when a record carries nothing better
pub const UNNAMED_CONTACT: &str = "Unnamed Contact";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Mobile,
    Home,
    Work,
    Personal,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mobile => "mobile",
            Category::Home => "home",
            Category::Work => "work",
            Category::Personal => "personal",
            Category::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "mobile" | "cell" => Category::Mobile,
            "home" => Category::Home,
            "work" => Category::Work,
            "personal" => Category::Personal,
            _ => Category::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub number: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub primary: bool,
}

impl PhoneNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            category: Category::Mobile,
            primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn normalized(&self) -> String {
        normalize_phone(&self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub address: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub primary: bool,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            category: Category::Personal,
            primary: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn normalized(&self) -> String {
        normalize_email(&self.address)
    }
}

/// Strip everything but ASCII digits
pub fn normalize_phone(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn normalize_email(address: &str) -> String {
    address.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Call,
    Message,
    Email,
    Meeting,
    Visit,
    Custom,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Call => "call",
            InteractionKind::Message => "message",
            InteractionKind::Email => "email",
            InteractionKind::Meeting => "meeting",
            InteractionKind::Visit => "visit",
            InteractionKind::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "call" => Some(InteractionKind::Call),
            "message" => Some(InteractionKind::Message),
            "email" => Some(InteractionKind::Email),
            "meeting" => Some(InteractionKind::Meeting),
            "visit" => Some(InteractionKind::Visit),
            "custom" => Some(InteractionKind::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Automatic,
    Manual,
}

/// One entry in a contact's append-only interaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub kind: InteractionKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    pub source: EventSource,
}

impl HistoryEvent {
    pub fn new(kind: InteractionKind, timestamp: DateTime<Utc>, source: EventSource) -> Self {
        Self {
            kind,
            timestamp,
            location: None,
            note: None,
            duration_secs: None,
            source,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Canonical contact entity owned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    /// External identifier per connected source, keyed by source id
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phones: Vec<PhoneNumber>,
    #[serde(default)]
    pub emails: Vec<EmailAddress>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_handle: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub anniversary: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub emergency_info: Option<String>,
    #[serde(default)]
    pub photo_uri: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRecord {
    /// Build a fresh record from a draft. Flags start cleared and history empty.
    pub fn from_draft(id: String, draft: ContactDraft, now: DateTime<Utc>) -> Self {
        let name = derive_display_name(
            draft.name.as_deref(),
            draft.first_name.as_deref(),
            draft.last_name.as_deref(),
            draft.organization.as_deref(),
        );
        let mut record = Self {
            id,
            external_ids: BTreeMap::new(),
            name,
            first_name: non_empty(draft.first_name),
            last_name: non_empty(draft.last_name),
            phones: draft.phones,
            emails: draft.emails,
            organization: non_empty(draft.organization),
            title: non_empty(draft.title),
            business_type: non_empty(draft.business_type),
            notes: non_empty(draft.notes),
            address: non_empty(draft.address),
            website: non_empty(draft.website),
            social_handle: non_empty(draft.social_handle),
            birthday: non_empty(draft.birthday),
            anniversary: non_empty(draft.anniversary),
            group: non_empty(draft.group),
            labels: draft.labels,
            favorite: false,
            vip: false,
            emergency: draft.emergency,
            emergency_info: non_empty(draft.emergency_info),
            photo_uri: non_empty(draft.photo_uri),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        record.heal_primary_flags();
        record
    }

    /// The flagged primary phone, or the first one when none is flagged
    pub fn primary_phone(&self) -> Option<&PhoneNumber> {
        self.phones
            .iter()
            .find(|p| p.primary)
            .or_else(|| self.phones.first())
    }

    pub fn primary_email(&self) -> Option<&EmailAddress> {
        self.emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.emails.first())
    }

    pub fn normalized_phones(&self) -> Vec<String> {
        self.phones
            .iter()
            .map(PhoneNumber::normalized)
            .filter(|n| !n.is_empty())
            .collect()
    }

    pub fn normalized_emails(&self) -> Vec<String> {
        self.emails
            .iter()
            .map(EmailAddress::normalized)
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Timestamp of the most recent interaction, if any
    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        self.history.iter().map(|e| e.timestamp).max()
    }

    pub fn external_id(&self, source: &str) -> Option<&str> {
        self.external_ids.get(source).map(String::as_str)
    }

    /// Keep at most one primary flag per list; the first flagged entry wins.
    pub fn heal_primary_flags(&mut self) {
        let mut seen = false;
        for phone in &mut self.phones {
            if phone.primary {
                phone.primary = !seen;
                seen = true;
            }
        }
        let mut seen = false;
        for email in &mut self.emails {
            if email.primary {
                email.primary = !seen;
                seen = true;
            }
        }
    }

    /// Recompute the display name from name parts
    pub fn refresh_display_name(&mut self) {
        self.name = derive_display_name(
            Some(self.name.as_str()),
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.organization.as_deref(),
        );
    }
}

/// Input for the store's add operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phones: Vec<PhoneNumber>,
    #[serde(default)]
    pub emails: Vec<EmailAddress>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub business_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_handle: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub anniversary: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub emergency: bool,
    #[serde(default)]
    pub emergency_info: Option<String>,
    #[serde(default)]
    pub photo_uri: Option<String>,
}

impl ContactDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, number: impl Into<String>) -> Self {
        let phone = PhoneNumber::new(number);
        let phone = if self.phones.is_empty() { phone.primary() } else { phone };
        self.phones.push(phone);
        self
    }

    pub fn with_email(mut self, address: impl Into<String>) -> Self {
        let email = EmailAddress::new(address);
        let email = if self.emails.is_empty() { email.primary() } else { email };
        self.emails.push(email);
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Shallow partial update. `None` leaves a field untouched; an empty string
/// clears an optional text field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phones: Option<Vec<PhoneNumber>>,
    pub emails: Option<Vec<EmailAddress>>,
    pub organization: Option<String>,
    pub title: Option<String>,
    pub business_type: Option<String>,
    pub notes: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub social_handle: Option<String>,
    pub birthday: Option<String>,
    pub anniversary: Option<String>,
    pub group: Option<String>,
    pub labels: Option<BTreeSet<String>>,
    pub favorite: Option<bool>,
    pub vip: Option<bool>,
    pub emergency: Option<bool>,
    pub emergency_info: Option<String>,
    pub photo_uri: Option<String>,
}

impl ContactPatch {
    pub fn apply_to(self, record: &mut ContactRecord) {
        fn set_text(field: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                *field = non_empty(Some(value));
            }
        }

        let name_parts_changed =
            self.name.is_some() || self.first_name.is_some() || self.last_name.is_some();

        set_text(&mut record.first_name, self.first_name);
        set_text(&mut record.last_name, self.last_name);
        if let Some(phones) = self.phones {
            record.phones = phones;
        }
        if let Some(emails) = self.emails {
            record.emails = emails;
        }
        set_text(&mut record.organization, self.organization);
        set_text(&mut record.title, self.title);
        set_text(&mut record.business_type, self.business_type);
        set_text(&mut record.notes, self.notes);
        set_text(&mut record.address, self.address);
        set_text(&mut record.website, self.website);
        set_text(&mut record.social_handle, self.social_handle);
        set_text(&mut record.birthday, self.birthday);
        set_text(&mut record.anniversary, self.anniversary);
        set_text(&mut record.group, self.group);
        if let Some(labels) = self.labels {
            record.labels = labels;
        }
        if let Some(favorite) = self.favorite {
            record.favorite = favorite;
        }
        if let Some(vip) = self.vip {
            record.vip = vip;
        }
        if let Some(emergency) = self.emergency {
            record.emergency = emergency;
        }
        set_text(&mut record.emergency_info, self.emergency_info);
        set_text(&mut record.photo_uri, self.photo_uri);

        if name_parts_changed {
            let explicit = self.name.filter(|n| !n.trim().is_empty());
            record.name = derive_display_name(
                explicit.as_deref(),
                record.first_name.as_deref(),
                record.last_name.as_deref(),
                record.organization.as_deref(),
            );
        }
        record.heal_primary_flags();
    }
}

/// Display name precedence: explicit name, then "first last", then organization.
pub fn derive_display_name(
    name: Option<&str>,
    first: Option<&str>,
    last: Option<&str>,
    organization: Option<&str>,
) -> String {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }
    organization
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| UNNAMED_CONTACT.to_string())
}

/// Collapse blank strings to `None`
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_through_parts() {
        assert_eq!(derive_display_name(Some("Jane"), None, None, None), "Jane");
        assert_eq!(
            derive_display_name(Some("  "), Some("Jane"), Some("Doe"), None),
            "Jane Doe"
        );
        assert_eq!(derive_display_name(None, None, None, Some("Acme")), "Acme");
        assert_eq!(derive_display_name(None, None, None, None), UNNAMED_CONTACT);
    }

    #[test]
    fn heal_keeps_first_primary_only() {
        let mut record = ContactRecord::from_draft(
            "c1".to_string(),
            ContactDraft::named("Jane"),
            Utc::now(),
        );
        record.phones = vec![
            PhoneNumber::new("1"),
            PhoneNumber::new("2").primary(),
            PhoneNumber::new("3").primary(),
        ];
        record.heal_primary_flags();
        let flags: Vec<bool> = record.phones.iter().map(|p| p.primary).collect();
        assert_eq!(flags, vec![false, true, false]);
        assert_eq!(record.primary_phone().map(|p| p.number.as_str()), Some("2"));
    }

    #[test]
    fn primary_defaults_to_first_entry() {
        let mut record = ContactRecord::from_draft(
            "c1".to_string(),
            ContactDraft::named("Jane"),
            Utc::now(),
        );
        record.emails = vec![EmailAddress::new("a@x.com"), EmailAddress::new("b@x.com")];
        assert_eq!(
            record.primary_email().map(|e| e.address.as_str()),
            Some("a@x.com")
        );
    }

    #[test]
    fn patch_clears_with_empty_string_and_renames() {
        let mut record = ContactRecord::from_draft(
            "c1".to_string(),
            ContactDraft::named("Jane").with_organization("Acme"),
            Utc::now(),
        );
        ContactPatch {
            organization: Some(String::new()),
            name: Some("Janet".to_string()),
            ..Default::default()
        }
        .apply_to(&mut record);
        assert_eq!(record.organization, None);
        assert_eq!(record.name, "Janet");
    }

    #[test]
    fn normalizers() {
        assert_eq!(normalize_phone("(555) 123-4567"), "5551234567");
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }
}
