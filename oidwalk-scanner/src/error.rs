use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("No document for identifier {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Failures while turning a fetched page into a node record.
///
/// Only [`ExtractError::MissingDescriptionList`] is treated as fatal for a
/// whole crawl; the other variants drop the affected node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("page has no description list")]
    MissingDescriptionList,

    #[error("malformed children row {row}: {reason}")]
    MalformedChildRow { row: usize, reason: String },

    #[error("page has no table")]
    MissingTable,
}

impl ExtractError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractError::MissingDescriptionList)
    }
}
