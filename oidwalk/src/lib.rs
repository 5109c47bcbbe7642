// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    collect_roots, format_summary, load_oids_from_file, load_seed_file, parse_oid_line,
    resolve_path, resume_roots,
};

// Re-export crawl functionality from oidwalk-core
pub use oidwalk_core::crawl::{
    CrawlOptions, CrawlProgressCallback, CrawlSummary, DEFAULT_MAX_DEPTH, DEFAULT_ROOTS,
    execute_crawl,
};
