//! Cloud contact directory adapter

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

/// Page size used when scanning the directory
pub const DIRECTORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryField {
    pub value: String,
    /// Free-form type tag ("mobile", "work", ...)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub primary: bool,
}

/// Record shape of the cloud directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryPerson {
    /// Stable identifier assigned by the directory
    pub resource_name: Option<String>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone_numbers: Vec<DirectoryField>,
    pub email_addresses: Vec<DirectoryField>,
    pub organization: Option<String>,
    pub job_title: Option<String>,
    pub biography: Option<String>,
    pub address: Option<String>,
    pub url: Option<String>,
    pub birthday: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryPage {
    pub people: Vec<DirectoryPerson>,
    pub next_page_token: Option<String>,
}

/// Capabilities of an authenticated cloud contact directory
#[async_trait]
pub trait CloudDirectory: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool>;
    async fn authenticate(&self) -> Result<bool>;
    async fn list_page(&self, page_token: Option<String>, page_size: usize)
        -> Result<DirectoryPage>;
    async fn get(&self, resource_name: &str) -> Result<Option<DirectoryPerson>>;
    async fn create(&self, person: DirectoryPerson) -> Result<String>;
    async fn update(&self, resource_name: &str, person: DirectoryPerson) -> Result<()>;
    async fn delete(&self, resource_name: &str) -> Result<()>;
}

pub struct CloudSource {
    id: String,
    directory: Arc<dyn CloudDirectory>,
}

impl CloudSource {
    pub fn new(id: impl Into<String>, directory: Arc<dyn CloudDirectory>) -> Self {
        Self {
            id: id.into(),
            directory,
        }
    }

    async fn list_people(&self) -> Result<Vec<DirectoryPerson>> {
        let mut people = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .directory
                .list_page(token.take(), DIRECTORY_PAGE_SIZE)
                .await?;
            people.extend(page.people);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(people)
    }
}

#[async_trait]
impl ContactSource for CloudSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cloud
    }

    async fn check_access(&self) -> Result<bool> {
        self.directory.is_authenticated().await
    }

    async fn request_access(&self) -> Result<bool> {
        self.directory.authenticate().await
    }

    async fn list_all(&self) -> Result<Vec<ContactRecord>> {
        let people = self.list_people().await?;
        Ok(people
            .into_iter()
            .map(|p| person_to_record(&self.id, p))
            .collect())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<String>> {
        Ok(self
            .directory
            .get(external_id)
            .await?
            .map(|_| external_id.to_string()))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<String>> {
        let wanted = normalize_phone(phone);
        if wanted.is_empty() {
            return Ok(None);
        }
        let people = self.list_people().await?;
        Ok(people
            .into_iter()
            .find(|p| {
                p.phone_numbers
                    .iter()
                    .any(|f| normalize_phone(&f.value) == wanted)
            })
            .and_then(|p| p.resource_name))
    }

    async fn create(&self, record: &ContactRecord) -> Result<String> {
        self.directory.create(record_to_person(record, None)).await
    }

    async fn update(&self, external_id: &str, record: &ContactRecord) -> Result<()> {
        self.directory
            .update(
                external_id,
                record_to_person(record, Some(external_id.to_string())),
            )
            .await
    }

    async fn delete(&self, external_id: &str) -> Result<()> {
        self.directory.delete(external_id).await
    }
}

pub fn record_to_person(record: &ContactRecord, resource_name: Option<String>) -> DirectoryPerson {
    DirectoryPerson {
        resource_name,
        display_name: Some(record.name.clone()),
        given_name: record.first_name.clone(),
        family_name: record.last_name.clone(),
        phone_numbers: record
            .phones
            .iter()
            .map(|p| DirectoryField {
                value: p.number.clone(),
                kind: p.category.as_str().to_string(),
                primary: p.primary,
            })
            .collect(),
        email_addresses: record
            .emails
            .iter()
            .map(|e| DirectoryField {
                value: e.address.clone(),
                kind: e.category.as_str().to_string(),
                primary: e.primary,
            })
            .collect(),
        organization: record.organization.clone(),
        job_title: record.title.clone(),
        biography: record.notes.clone(),
        address: record.address.clone(),
        url: record.website.clone(),
        birthday: record.birthday.clone(),
        photo_url: record.photo_uri.clone(),
    }
}

pub fn person_to_record(source_id: &str, person: DirectoryPerson) -> ContactRecord {
    let name = derive_display_name(
        person.display_name.as_deref(),
        person.given_name.as_deref(),
        person.family_name.as_deref(),
        person.organization.as_deref(),
    );
    let draft = ContactDraft {
        name: Some(name),
        first_name: person.given_name,
        last_name: person.family_name,
        phones: person
            .phone_numbers
            .into_iter()
            .map(|f| PhoneNumber {
                number: f.value,
                category: Category::from_str(&f.kind),
                primary: f.primary,
            })
            .collect(),
        emails: person
            .email_addresses
            .into_iter()
            .map(|f| EmailAddress {
                address: f.value,
                category: Category::from_str(&f.kind),
                primary: f.primary,
            })
            .collect(),
        organization: person.organization,
        title: person.job_title,
        notes: person.biography,
        address: person.address,
        website: person.url,
        birthday: person.birthday,
        photo_uri: non_empty(person.photo_url),
        ..Default::default()
    };
    let mut record = ContactRecord::from_draft(String::new(), draft, Utc::now());
    if let Some(resource_name) = person.resource_name {
        record.external_ids.insert(source_id.to_string(), resource_name);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_without_names_uses_organization() {
        let person = DirectoryPerson {
            resource_name: Some("people/c1".to_string()),
            organization: Some("Acme".to_string()),
            ..Default::default()
        };
        let record = person_to_record("cloud", person);
        assert_eq!(record.name, "Acme");
        assert_eq!(record.external_id("cloud"), Some("people/c1"));
    }
}
