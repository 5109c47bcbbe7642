pub mod crawl;
pub mod data;
pub mod drill;
pub mod error;
pub mod policy;

pub use crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSummary, TraversalEngine, TraversalState,
    execute_crawl,
};
pub use data::{Database, NodeStore};
pub use drill::DrillPath;
pub use error::{CrawlError, StoreError};
pub use policy::{Dispatch, FanOutPolicy};
