//! Error types for heartbeat ingestion and status storage

use crate::SiteId;
use thiserror::Error;

/// Result type for pulsar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the ingestion pipeline and its storage backends
///
/// The variants fall into two classes: client errors (`BadRequest`,
/// `SiteNotFound`, `UnknownSite`, `DuplicateSite`), which are expected during
/// normal operation, and storage failures (`Storage`, `Serialization`), which
/// mean the atomic write unit did not complete and nothing was persisted.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or incomplete heartbeat payload
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No registered site has this exact URL
    #[error("Site not found: {url}")]
    SiteNotFound { url: String },

    /// No registered site has this id
    #[error("Unknown site: {0}")]
    UnknownSite(SiteId),

    /// A site with this URL is already registered
    #[error("Site already registered: {url}")]
    DuplicateSite { url: String },

    /// The storage layer could not complete the operation
    #[error("Storage failure: {0}")]
    Storage(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a bad request error
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Error::BadRequest(message.into())
    }

    /// Create a site not found error
    pub fn site_not_found<S: Into<String>>(url: S) -> Self {
        Error::SiteNotFound { url: url.into() }
    }

    /// Create a storage failure
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage(message.into())
    }

    /// Whether the caller caused this error (never worth retrying as-is)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::BadRequest(_)
                | Error::SiteNotFound { .. }
                | Error::UnknownSite(_)
                | Error::DuplicateSite { .. }
        )
    }

    /// Whether a retry by the caller might succeed
    ///
    /// Only storage failures qualify; the pipeline itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Storage(format!("migration failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_is_client_error() {
        let err = Error::bad_request("siteUrl is required");
        assert!(err.is_client_error());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("siteUrl is required"));
    }

    #[test]
    fn test_site_not_found_carries_url() {
        let err = Error::site_not_found("https://gone.example");
        assert!(matches!(err, Error::SiteNotFound { .. }));
        assert!(err.is_client_error());
        assert!(err.to_string().contains("https://gone.example"));
    }

    #[test]
    fn test_storage_is_transient() {
        let err = Error::storage("database is locked");
        assert!(err.is_transient());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(!err.is_client_error());
    }
}
