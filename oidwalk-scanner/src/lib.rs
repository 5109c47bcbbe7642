pub mod convert;
pub mod enumerate;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod record;

pub use enumerate::{EnumeratedChild, enumerate_table};
pub use error::{ExtractError, ScanError};
pub use extract::{Extraction, extract};
pub use fetcher::{DEFAULT_BASE_URL, Fetcher, HttpFetcher, RawDocument};
pub use record::{ChildRef, NodeCode, NodeRecord};
