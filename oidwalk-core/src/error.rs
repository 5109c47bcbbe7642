use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),

    #[error("store connection lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum CrawlError {
    /// The page did not carry the expected content. The crawl must be
    /// restarted manually from `root`.
    #[error("no description list at {identifier} (traversal root: {root})")]
    Fatal { root: String, identifier: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid drill path: {0}")]
    InvalidDrillPath(String),
}
