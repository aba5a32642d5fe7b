//! Device address book adapter

use super::source::{ContactSource, SourceKind};
use crate::error::Result;
use crate::types::{
    derive_display_name, non_empty, normalize_phone, Category, ContactDraft, ContactRecord,
    EmailAddress, PhoneNumber,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// Labeled value as address books store them ("mobile", "work", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub primary: bool,
}

/// Record shape of the device address book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceContact {
    /// Assigned by the address book on create
    pub id: Option<String>,
    pub display_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub note: Option<String>,
    pub phone_numbers: Vec<LabeledValue>,
    pub emails: Vec<LabeledValue>,
    pub postal_address: Option<String>,
    pub url: Option<String>,
    pub birthday: Option<String>,
    pub image_uri: Option<String>,
}

/// Capabilities the host's device address book provides
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn permission(&self) -> Result<PermissionStatus>;
    async fn request_permission(&self) -> Result<PermissionStatus>;
    async fn list_all(&self) -> Result<Vec<DeviceContact>>;
    async fn find_by_phone(&self, phone: &str) -> Result<Vec<DeviceContact>>;
    async fn create(&self, contact: DeviceContact) -> Result<String>;
    async fn update(&self, contact: DeviceContact) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct DeviceSource {
    id: String,
    book: Arc<dyn AddressBook>,
}

impl DeviceSource {
    pub fn new(id: impl Into<String>, book: Arc<dyn AddressBook>) -> Self {
        Self {
            id: id.into(),
            book,
        }
    }
}

#[async_trait]
impl ContactSource for DeviceSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Device
    }

    async fn check_access(&self) -> Result<bool> {
        Ok(self.book.permission().await? == PermissionStatus::Granted)
    }

    async fn request_access(&self) -> Result<bool> {
        Ok(self.book.request_permission().await? == PermissionStatus::Granted)
    }

    async fn list_all(&self) -> Result<Vec<ContactRecord>> {
        let contacts = self.book.list_all().await?;
        Ok(contacts
            .into_iter()
            .map(|c| device_to_record(&self.id, c))
            .collect())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<String>> {
        // The address book has no direct lookup; scan it.
        let contacts = self.book.list_all().await?;
        Ok(contacts
            .into_iter()
            .filter_map(|c| c.id)
            .find(|id| id == external_id))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<String>> {
        let wanted = normalize_phone(phone);
        let matches = self.book.find_by_phone(phone).await?;
        Ok(matches
            .into_iter()
            .find(|c| {
                c.phone_numbers
                    .iter()
                    .any(|p| normalize_phone(&p.value) == wanted)
            })
            .and_then(|c| c.id))
    }

    async fn create(&self, record: &ContactRecord) -> Result<String> {
        self.book.create(record_to_device(record, None)).await
    }

    async fn update(&self, external_id: &str, record: &ContactRecord) -> Result<()> {
        self.book
            .update(record_to_device(record, Some(external_id.to_string())))
            .await
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.book.delete(external_id).await
    }
}

pub fn record_to_device(record: &ContactRecord, id: Option<String>) -> DeviceContact {
    DeviceContact {
        id,
        display_name: record.name.clone(),
        given_name: record.first_name.clone(),
        family_name: record.last_name.clone(),
        company: record.organization.clone(),
        job_title: record.title.clone(),
        note: record.notes.clone(),
        phone_numbers: record
            .phones
            .iter()
            .map(|p| LabeledValue {
                label: p.category.as_str().to_string(),
                value: p.number.clone(),
                primary: p.primary,
            })
            .collect(),
        emails: record
            .emails
            .iter()
            .map(|e| LabeledValue {
                label: e.category.as_str().to_string(),
                value: e.address.clone(),
                primary: e.primary,
            })
            .collect(),
        postal_address: record.address.clone(),
        url: record.website.clone(),
        birthday: record.birthday.clone(),
        image_uri: record.photo_uri.clone(),
    }
}

pub fn device_to_record(source_id: &str, contact: DeviceContact) -> ContactRecord {
    let name = derive_display_name(
        Some(contact.display_name.as_str()),
        contact.given_name.as_deref(),
        contact.family_name.as_deref(),
        contact.company.as_deref(),
    );
    let draft = ContactDraft {
        name: Some(name),
        first_name: contact.given_name,
        last_name: contact.family_name,
        phones: contact
            .phone_numbers
            .into_iter()
            .map(|p| PhoneNumber {
                number: p.value,
                category: Category::from_str(&p.label),
                primary: p.primary,
            })
            .collect(),
        emails: contact
            .emails
            .into_iter()
            .map(|e| EmailAddress {
                address: e.value,
                category: Category::from_str(&e.label),
                primary: e.primary,
            })
            .collect(),
        organization: contact.company,
        title: contact.job_title,
        notes: contact.note,
        address: contact.postal_address,
        website: contact.url,
        birthday: contact.birthday,
        photo_uri: non_empty(contact.image_uri),
        ..Default::default()
    };
    // Local id and timestamps are reassigned by the store on insert.
    let mut record = ContactRecord::from_draft(String::new(), draft, Utc::now());
    if let Some(id) = contact.id {
        record.external_ids.insert(source_id.to_string(), id);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_keeps_phones_and_links_id() {
        let record = ContactRecord::from_draft(
            "local".to_string(),
            ContactDraft::named("Jane Doe")
                .with_phone("555-1234")
                .with_email("jane@x.com"),
            Utc::now(),
        );
        let device = record_to_device(&record, Some("dev-7".to_string()));
        assert_eq!(device.phone_numbers[0].label, "mobile");
        let back = device_to_record("device", device);
        assert_eq!(back.name, "Jane Doe");
        assert_eq!(back.phones, record.phones);
        assert_eq!(back.external_id("device"), Some("dev-7"));
    }
}
