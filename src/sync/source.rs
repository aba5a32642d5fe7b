//! External Source Abstraction Layer
//!
//! The engine drives every external contact repository through
//! [`ContactSource`]. Concrete collaborators (device address book, cloud
//! directory) expose their own record shapes; [`super::device::DeviceSource`]
//! and [`super::cloud::CloudSource`] convert between those shapes and
//! [`ContactRecord`].

use crate::error::Result;
use crate::types::ContactRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Types of external sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Device,
    Cloud,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Device => "device",
            SourceKind::Cloud => "cloud",
        }
    }
}

/// Uniform interface over an external contact repository.
///
/// Records returned by [`ContactSource::list_all`] carry their external
/// identifier in `external_ids[self.id()]`. Adapter failures surface as
/// `ExternalUnavailable` or `PermissionDenied`; timeouts are the adapter's
/// responsibility.
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Stable identifier used for settings keys and `external_ids`
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Whether the source is currently reachable and authorized
    async fn check_access(&self) -> Result<bool>;

    /// Ask the user or service for access
    async fn request_access(&self) -> Result<bool>;

    async fn list_all(&self) -> Result<Vec<ContactRecord>>;

    /// Returns the external id back when the record still exists
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<String>>;

    /// Look a record up by phone number; returns its external id
    async fn find_by_phone(&self, phone: &str) -> Result<Option<String>>;

    /// Create the record externally and return the assigned external id
    async fn create(&self, record: &ContactRecord) -> Result<String>;

    async fn update(&self, external_id: &str, record: &ContactRecord) -> Result<()>;

    async fn delete(&self, external_id: &str) -> Result<()>;
}
