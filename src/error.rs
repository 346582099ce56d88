//! Journal error types

use thiserror::Error;

use crate::types::TradeValidationError;

#[derive(Debug, Error)]
pub enum JournalError {
    /// Image payload could not be read or is not a valid data URI
    #[error("image decode error: {0}")]
    Decode(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage medium rejected a value (quota exceeded, backend failure)
    #[error("storage write failed for '{key}': {reason}")]
    StorageWrite { key: String, reason: String },

    #[error("storage read failed for '{key}': {reason}")]
    StorageRead { key: String, reason: String },

    /// CSV headers or row shape not recognized
    #[error("failed to import, check file format: {0}")]
    ImportFormat(String),

    #[error("csv export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Validation(#[from] TradeValidationError),

    #[error("config error: {0}")]
    Config(String),

    #[error("market data error: {0}")]
    MarketData(String),
}

impl JournalError {
    pub fn write(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::StorageWrite {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::StorageRead {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<csv::Error> for JournalError {
    fn from(err: csv::Error) -> Self {
        Self::ImportFormat(err.to_string())
    }
}

impl From<reqwest::Error> for JournalError {
    fn from(err: reqwest::Error) -> Self {
        Self::MarketData(err.to_string())
    }
}

pub type JournalResult<T> = Result<T, JournalError>;
