use thiserror::Error;

use crate::tier::TierError;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive format error: {0}")]
    ArchiveFormat(String),

    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Primary tier failure: {0}")]
    PrimaryTier(#[source] TierError),

    #[error("Secondary tier failure: {0}")]
    SecondaryTier(#[source] TierError),

    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

/// What the user can do about a failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remediation {
    /// Shrink, repair or replace the uploaded archive.
    FixInput,
    /// The storage backend is unavailable; try again later.
    RetryLater,
    Internal,
}

impl SiteError {
    pub fn remediation(&self) -> Remediation {
        match self {
            SiteError::ArchiveFormat(_) | SiteError::DataUrl(_) | SiteError::Rejected(_) => {
                Remediation::FixInput
            }
            // Secondary capacity is the last stop: the bundle is simply too big.
            SiteError::SecondaryTier(TierError::CapacityExceeded { .. }) => Remediation::FixInput,
            SiteError::PrimaryTier(_) | SiteError::SecondaryTier(_) | SiteError::Io(_) => {
                Remediation::RetryLater
            }
            SiteError::Corrupt(_) | SiteError::Json(_) | SiteError::Config(_) => {
                Remediation::Internal
            }
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, SiteError>;
