//! Directory error types.
//!
//! Errors carry a transient/permanent classification so callers can
//! decide whether waiting for the next scheduled run is likely to help.

use thiserror::Error;

/// Error that can occur while talking to a directory provider.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Failed to establish a connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection or request timed out.
    #[error("timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The directory rejected our credentials.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// Could not obtain or refresh an access token.
    #[error("token acquisition failed: {message}")]
    Token { message: String },

    /// The directory answered, but not in a form we understand.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A returned entry is missing required attributes.
    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },

    /// The adapter configuration is unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl DirectoryError {
    /// Check if this error is transient and the next run may succeed
    /// without intervention.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::Timeout { .. }
        )
    }

    /// Check if this error is permanent and needs configuration or
    /// credential changes.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        DirectoryError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source.
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a token error.
    pub fn token(message: impl Into<String>) -> Self {
        DirectoryError::Token {
            message: message.into(),
        }
    }

    /// Create an invalid entry error.
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        DirectoryError::InvalidEntry {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
