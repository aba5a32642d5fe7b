//! Mock external sources
//!
//! In-memory address book and cloud directory with switches for going
//! offline and revoking access. Used by tests and by the CLI when no real
//! backend is wired in.

use super::cloud::{CloudDirectory, DirectoryPage, DirectoryPerson};
use super::device::{AddressBook, DeviceContact, PermissionStatus};
use crate::error::{ContactError, Result};
use crate::types::normalize_phone;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters of mutating calls that reached the backend
#[derive(Debug, Default)]
pub struct CallCounts {
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CallCounts {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

/// In-memory device address book
#[derive(Debug, Clone)]
pub struct MockAddressBook {
    contacts: Arc<Mutex<Vec<DeviceContact>>>,
    next_id: Arc<AtomicUsize>,
    permission: Arc<Mutex<PermissionStatus>>,
    /// Permission granted when requested
    grant_on_request: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
    calls: Arc<CallCounts>,
}

impl MockAddressBook {
    /// Empty book with permission already granted
    pub fn new() -> Self {
        Self {
            contacts: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            permission: Arc::new(Mutex::new(PermissionStatus::Granted)),
            grant_on_request: Arc::new(AtomicBool::new(true)),
            offline: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(CallCounts::default()),
        }
    }

    /// Seed a contact, assigning an id when it has none
    pub fn with_contact(self, mut contact: DeviceContact) -> Self {
        if contact.id.is_none() {
            contact.id = Some(self.allocate_id());
        }
        self.lock().push(contact);
        self
    }

    pub fn set_permission(&self, status: PermissionStatus) {
        *self.permission.lock().expect("permission mutex poisoned") = status;
    }

    pub fn set_grant_on_request(&self, grant: bool) {
        self.grant_on_request.store(grant, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn contacts(&self) -> Vec<DeviceContact> {
        self.lock().clone()
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    fn allocate_id(&self) -> String {
        format!("device-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeviceContact>> {
        self.contacts.lock().expect("address book mutex poisoned")
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContactError::unavailable("device", "address book offline"));
        }
        let status = *self.permission.lock().expect("permission mutex poisoned");
        if status != PermissionStatus::Granted {
            return Err(ContactError::PermissionDenied("device".to_string()));
        }
        Ok(())
    }
}

impl Default for MockAddressBook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressBook for MockAddressBook {
    async fn permission(&self) -> Result<PermissionStatus> {
        Ok(*self.permission.lock().expect("permission mutex poisoned"))
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        if self.grant_on_request.load(Ordering::SeqCst) {
            self.set_permission(PermissionStatus::Granted);
        } else {
            self.set_permission(PermissionStatus::Denied);
        }
        self.permission().await
    }

    async fn list_all(&self) -> Result<Vec<DeviceContact>> {
        self.ensure_reachable()?;
        Ok(self.contacts())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<DeviceContact>> {
        self.ensure_reachable()?;
        let wanted = normalize_phone(phone);
        Ok(self
            .lock()
            .iter()
            .filter(|c| {
                c.phone_numbers
                    .iter()
                    .any(|p| normalize_phone(&p.value) == wanted)
            })
            .cloned()
            .collect())
    }

    async fn create(&self, mut contact: DeviceContact) -> Result<String> {
        self.ensure_reachable()?;
        let id = self.allocate_id();
        contact.id = Some(id.clone());
        self.lock().push(contact);
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(&self, contact: DeviceContact) -> Result<()> {
        self.ensure_reachable()?;
        let mut contacts = self.lock();
        let slot = contacts
            .iter_mut()
            .find(|c| c.id.is_some() && c.id == contact.id)
            .ok_or_else(|| {
                ContactError::NotFound(contact.id.clone().unwrap_or_default())
            })?;
        *slot = contact;
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_reachable()?;
        self.lock().retain(|c| c.id.as_deref() != Some(id));
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory paginated cloud directory
#[derive(Debug, Clone)]
pub struct MockCloudDirectory {
    people: Arc<Mutex<Vec<DirectoryPerson>>>,
    next_id: Arc<AtomicUsize>,
    authenticated: Arc<AtomicBool>,
    /// Authentication succeeds when requested
    auth_on_request: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
    calls: Arc<CallCounts>,
}

impl MockCloudDirectory {
    /// Empty, authenticated directory
    pub fn new() -> Self {
        Self {
            people: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            authenticated: Arc::new(AtomicBool::new(true)),
            auth_on_request: Arc::new(AtomicBool::new(true)),
            offline: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(CallCounts::default()),
        }
    }

    pub fn with_person(self, mut person: DirectoryPerson) -> Self {
        if person.resource_name.is_none() {
            person.resource_name = Some(self.allocate_id());
        }
        self.lock().push(person);
        self
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn set_auth_on_request(&self, allow: bool) {
        self.auth_on_request.store(allow, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn people(&self) -> Vec<DirectoryPerson> {
        self.lock().clone()
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    fn allocate_id(&self) -> String {
        format!("people/c{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DirectoryPerson>> {
        self.people.lock().expect("directory mutex poisoned")
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContactError::unavailable("cloud", "directory unreachable"));
        }
        if !self.authenticated.load(Ordering::SeqCst) {
            return Err(ContactError::PermissionDenied("cloud".to_string()));
        }
        Ok(())
    }
}

impl Default for MockCloudDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudDirectory for MockCloudDirectory {
    async fn is_authenticated(&self) -> Result<bool> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ContactError::unavailable("cloud", "directory unreachable"));
        }
        Ok(self.authenticated.load(Ordering::SeqCst))
    }

    async fn authenticate(&self) -> Result<bool> {
        let granted = self.auth_on_request.load(Ordering::SeqCst);
        self.set_authenticated(granted);
        Ok(granted)
    }

    async fn list_page(
        &self,
        page_token: Option<String>,
        page_size: usize,
    ) -> Result<DirectoryPage> {
        self.ensure_reachable()?;
        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ContactError::unavailable("cloud", "invalid page token"))?,
            None => 0,
        };
        let people = self.lock();
        let end = (start + page_size.max(1)).min(people.len());
        let page = people.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < people.len()).then(|| end.to_string());
        Ok(DirectoryPage {
            people: page,
            next_page_token,
        })
    }

    async fn get(&self, resource_name: &str) -> Result<Option<DirectoryPerson>> {
        self.ensure_reachable()?;
        Ok(self
            .lock()
            .iter()
            .find(|p| p.resource_name.as_deref() == Some(resource_name))
            .cloned())
    }

    async fn create(&self, mut person: DirectoryPerson) -> Result<String> {
        self.ensure_reachable()?;
        let id = self.allocate_id();
        person.resource_name = Some(id.clone());
        self.lock().push(person);
        self.calls.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update(&self, resource_name: &str, mut person: DirectoryPerson) -> Result<()> {
        self.ensure_reachable()?;
        let mut people = self.lock();
        let slot = people
            .iter_mut()
            .find(|p| p.resource_name.as_deref() == Some(resource_name))
            .ok_or_else(|| ContactError::NotFound(resource_name.to_string()))?;
        person.resource_name = Some(resource_name.to_string());
        *slot = person;
        self.calls.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, resource_name: &str) -> Result<()> {
        self.ensure_reachable()?;
        self.lock()
            .retain(|p| p.resource_name.as_deref() != Some(resource_name));
        self.calls.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
