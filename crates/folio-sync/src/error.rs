//! Sync engine errors.

use folio_directory::DirectoryError;
use thiserror::Error;

use crate::store::StoreError;

/// Error raised while orchestrating a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The external directory failed.
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// The local user store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A database operation outside the store failed (locking).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The sync configuration is unusable.
    #[error("invalid sync configuration: {message}")]
    Configuration { message: String },
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    /// Whether retrying the run later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Directory(error) => error.is_transient(),
            SyncError::Store(error) => error.is_transient(),
            SyncError::Database(_) => true,
            SyncError::Configuration { .. } => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_errors_convert() {
        let error: SyncError = DirectoryError::connection_failed("server gone").into();
        assert!(error.is_transient());
        assert!(error.to_string().contains("server gone"));
    }

    #[test]
    fn test_configuration_is_permanent() {
        let error = SyncError::configuration("batch_size must be positive");
        assert!(!error.is_transient());
        assert_eq!(
            error.to_string(),
            "invalid sync configuration: batch_size must be positive"
        );
    }

    #[test]
    fn test_store_error_message() {
        let error: SyncError = StoreError::NotFound { id: 7 }.into();
        assert!(!error.is_transient());
        assert!(error.to_string().starts_with("store error:"));
    }
}
