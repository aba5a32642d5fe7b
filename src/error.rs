//! Error taxonomy shared by the store and the synchronizer

use thiserror::Error;

/// Flat classification of [`ContactError`] for callers that branch on kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyInProgress,
    ExternalUnavailable,
    PersistenceFailure,
}

#[derive(Error, Debug)]
pub enum ContactError {
    /// A mutation or merge referenced an id absent from the store
    #[error("Contact not found: {0}")]
    NotFound(String),

    /// An external source reports missing authorization
    #[error("Permission denied by source '{0}'")]
    PermissionDenied(String),

    /// A bulk pass is already running against this source
    #[error("Bulk sync already in progress for source '{0}'")]
    AlreadyInProgress(String),

    /// Transient adapter failure (network, rate limit, expired credential)
    #[error("External source '{source_id}' unavailable: {message}")]
    ExternalUnavailable { source_id: String, message: String },

    /// Durable read or write failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl ContactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContactError::NotFound(_) => ErrorKind::NotFound,
            ContactError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ContactError::AlreadyInProgress(_) => ErrorKind::AlreadyInProgress,
            ContactError::ExternalUnavailable { .. } => ErrorKind::ExternalUnavailable,
            ContactError::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
        }
    }

    pub fn unavailable(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        ContactError::ExternalUnavailable {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ContactError {
    fn from(err: anyhow::Error) -> Self {
        ContactError::PersistenceFailure(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, ContactError>;
