//! Depth-bounded, resumable walk over the OID tree.
//!
//! Each visit fetches one page, extracts its record, persists it unless the
//! store already has it, then descends into the children found on the live
//! page. Children are visited sequentially or, where the [`FanOutPolicy`]
//! says so, as independent tokio tasks joined before the parent returns.
//!
//! Nothing is shared between visits except the immutable engine
//! configuration and one worker semaphore sized by the fan-out width. A
//! permit covers a node's own fetch, extract and persist work only, never the
//! wait on its children. Per-branch state ([`TraversalState`]) is passed down
//! and handed back, and counters ([`CrawlSummary`]) are merged on the way up.

use crate::data::NodeStore;
use crate::drill::DrillPath;
use crate::error::{CrawlError, StoreError};
use crate::policy::{Dispatch, FanOutPolicy};
use futures::future::{BoxFuture, FutureExt, join_all};
use oidwalk_scanner::record::NodeRecord;
use oidwalk_scanner::{ExtractError, Fetcher, extract};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub const DEFAULT_ROOTS: &[&str] = &["0", "1", "2"];
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub roots: Vec<String>,
    pub max_depth: usize,
    pub skip_list: HashSet<String>,
    pub drill_path: DrillPath,
    pub fan_out: FanOutPolicy,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            roots: DEFAULT_ROOTS.iter().map(|r| r.to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            skip_list: HashSet::new(),
            drill_path: DrillPath::default(),
            fan_out: FanOutPolicy::sequential(),
        }
    }
}

/// Callback invoked with each identifier about to be fetched
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Counters for one subtree, merged upwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub visited: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Nodes dropped because their page could not be fetched or extracted.
    pub failed: usize,
    pub store_failures: usize,
    pub skipped: usize,
    /// Children not entered because they are off the drill path.
    pub gated: usize,
    pub truncated: usize,
    /// Distinct description terms seen anywhere in the subtree.
    pub field_names: BTreeSet<String>,
}

impl CrawlSummary {
    pub fn merge(&mut self, other: CrawlSummary) {
        self.visited += other.visited;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.store_failures += other.store_failures;
        self.skipped += other.skipped;
        self.gated += other.gated;
        self.truncated += other.truncated;
        self.field_names.extend(other.field_names);
    }
}

/// Per-branch traversal state.
#[derive(Debug, Clone)]
pub struct TraversalState {
    pub depth: usize,
    /// Top-level identifier this branch started from; reported on fatal aborts.
    pub root: Arc<str>,
    /// Set once the drill path's last identifier has been visited.
    pub started: bool,
}

impl TraversalState {
    pub fn new(root: &str, started: bool) -> Self {
        Self {
            depth: 0,
            root: Arc::from(root),
            started,
        }
    }

    fn descend(&self) -> Self {
        Self {
            depth: self.depth + 1,
            root: Arc::clone(&self.root),
            started: self.started,
        }
    }
}

type VisitResult = Result<(TraversalState, CrawlSummary), CrawlError>;

pub struct TraversalEngine<F, S> {
    fetcher: Arc<F>,
    store: Arc<S>,
    max_depth: usize,
    skip_list: HashSet<String>,
    drill_path: DrillPath,
    fan_out: FanOutPolicy,
    workers: Semaphore,
    progress_callback: Option<CrawlProgressCallback>,
}

impl<F: Fetcher, S: NodeStore> TraversalEngine<F, S> {
    pub fn new(fetcher: Arc<F>, store: Arc<S>) -> Self {
        Self {
            fetcher,
            store,
            max_depth: DEFAULT_MAX_DEPTH,
            skip_list: HashSet::new(),
            drill_path: DrillPath::default(),
            fan_out: FanOutPolicy::sequential(),
            workers: Semaphore::new(1),
            progress_callback: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_skip_list(mut self, skip_list: HashSet<String>) -> Self {
        self.skip_list = skip_list;
        self
    }

    pub fn with_drill_path(mut self, drill_path: DrillPath) -> Self {
        self.drill_path = drill_path;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOutPolicy) -> Self {
        self.workers = Semaphore::new(fan_out.width());
        self.fan_out = fan_out;
        self
    }

    pub fn with_progress_callback(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Crawl each root in turn. Stops at the first fatal error.
    pub async fn run(self: Arc<Self>, roots: &[String]) -> Result<CrawlSummary, CrawlError> {
        let mut summary = CrawlSummary::default();
        let mut started = self.drill_path.is_empty();

        for root in roots {
            let state = TraversalState::new(root, started);
            if !self.admits(root, &state) {
                debug!("Root {} is off the drill path", root);
                summary.gated += 1;
                continue;
            }

            info!("Crawling root {}", root);
            let (state, root_summary) = Arc::clone(&self).visit(root.clone(), state).await?;
            started = state.started;
            summary.merge(root_summary);
        }

        info!(
            "Crawl complete. Visited {} nodes, stored {}, {} already present",
            summary.visited, summary.inserted, summary.duplicates
        );
        Ok(summary)
    }

    fn admits(&self, identifier: &str, state: &TraversalState) -> bool {
        state.started || self.drill_path.contains(identifier)
    }

    fn visit(self: Arc<Self>, identifier: String, mut state: TraversalState) -> BoxFuture<'static, VisitResult> {
        async move {
            let mut summary = CrawlSummary::default();

            if self.skip_list.contains(&identifier) {
                debug!("Skipping {} (skip list)", identifier);
                summary.skipped += 1;
                return Ok((state, summary));
            }

            if state.depth > self.max_depth {
                debug!("Not entering {} at depth {}", identifier, state.depth);
                summary.truncated += 1;
                return Ok((state, summary));
            }

            // released before descending; the semaphore is never closed
            let permit = self.workers.acquire().await.ok();

            if let Some(ref callback) = self.progress_callback {
                callback(identifier.clone());
            }

            let document = match self.fetcher.fetch(&identifier).await {
                Ok(document) => document,
                Err(e) => {
                    warn!("Fetch failed for {}: {}", identifier, e);
                    summary.failed += 1;
                    return Ok((state, summary));
                }
            };

            let extraction = match extract(&document) {
                Ok(extraction) => extraction,
                Err(ExtractError::MissingDescriptionList) => {
                    error!(
                        "No description list at {}; resume the crawl from root {}",
                        identifier, state.root
                    );
                    return Err(CrawlError::Fatal {
                        root: state.root.to_string(),
                        identifier,
                    });
                }
                Err(e) => {
                    warn!("Dropping {}: {}", identifier, e);
                    summary.failed += 1;
                    return Ok((state, summary));
                }
            };

            summary.visited += 1;
            summary.field_names.extend(extraction.field_names);
            let record = extraction.record;

            if !state.started
                && (self.drill_path.terminal() == Some(record.dot_oid.as_str())
                    || self.drill_path.terminal() == Some(identifier.as_str()))
            {
                info!("Reached drill path target {}, exploring all branches", identifier);
                state.started = true;
            }

            self.persist(&record, &mut summary);
            drop(permit);

            let children: Vec<String> = extraction
                .children
                .into_iter()
                .map(|child| child.identifier)
                .collect();

            match self.fan_out.dispatch(&record.dot_oid, state.depth) {
                Dispatch::Sequential => {
                    for child in children {
                        if !self.admits(&child, &state) {
                            summary.gated += 1;
                            continue;
                        }
                        let (child_state, child_summary) =
                            Arc::clone(&self).visit(child, state.descend()).await?;
                        state.started |= child_state.started;
                        summary.merge(child_summary);
                    }
                }
                Dispatch::Parallel(width) => {
                    debug!(
                        "Fanning out {} children of {} over {} workers",
                        children.len(),
                        identifier,
                        width
                    );
                    let (admitted, pending) = self.partition_gated(children, &state, &mut summary);
                    state.started |= self.join_subtrees(admitted, &state, &mut summary).await?;

                    // siblings after the on-path child follow once the target is reached
                    if state.started {
                        state.started |= self.join_subtrees(pending, &state, &mut summary).await?;
                    } else {
                        summary.gated += pending.len();
                    }
                }
            }

            Ok((state, summary))
        }
        .boxed()
    }

    /// Split children for fan-out while the gate is closed: children on the
    /// drill path, and the siblings after them that only run if the target
    /// is reached. Siblings before the first on-path child are gated.
    fn partition_gated(
        &self,
        children: Vec<String>,
        state: &TraversalState,
        summary: &mut CrawlSummary,
    ) -> (Vec<String>, Vec<String>) {
        if state.started {
            return (children, Vec::new());
        }

        let mut admitted = Vec::new();
        let mut pending = Vec::new();
        for child in children {
            if self.admits(&child, state) {
                admitted.push(child);
            } else if admitted.is_empty() {
                summary.gated += 1;
            } else {
                pending.push(child);
            }
        }
        (admitted, pending)
    }

    /// Spawn one task per child and wait for all of them. Every subtree runs
    /// to completion before the first error is reported. Returns whether any
    /// subtree reached the drill path target.
    async fn join_subtrees(
        self: &Arc<Self>,
        children: Vec<String>,
        state: &TraversalState,
        summary: &mut CrawlSummary,
    ) -> Result<bool, CrawlError> {
        let handles: Vec<_> = children
            .into_iter()
            .map(|child| tokio::spawn(Arc::clone(self).visit(child, state.descend())))
            .collect();

        let mut started = false;
        let mut first_error = None;
        for joined in join_all(handles).await {
            match joined.map_err(CrawlError::from).and_then(|result| result) {
                Ok((child_state, child_summary)) => {
                    started |= child_state.started;
                    summary.merge(child_summary);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(started),
        }
    }

    fn persist(&self, record: &NodeRecord, summary: &mut CrawlSummary) {
        match self.store.exists(&record.dot_oid) {
            Ok(true) => {
                warn!("{} is already stored, skipping insert", record.dot_oid);
                summary.duplicates += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Existence check failed for {}: {}", record.dot_oid, e),
        }

        match self.store.insert(record) {
            Ok(()) => {
                info!("Stored {}", record.dot_oid);
                summary.inserted += 1;
            }
            Err(StoreError::Duplicate(dot_oid)) => {
                warn!("Duplicate key {} on insert", dot_oid);
                summary.duplicates += 1;
            }
            Err(e) => {
                warn!("Failed to store {}: {}", record.dot_oid, e);
                summary.store_failures += 1;
            }
        }
    }
}

/// Execute a crawl with the given options
pub async fn execute_crawl<F: Fetcher, S: NodeStore>(
    options: CrawlOptions,
    fetcher: Arc<F>,
    store: Arc<S>,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlSummary, CrawlError> {
    let CrawlOptions {
        roots,
        max_depth,
        skip_list,
        drill_path,
        fan_out,
    } = options;

    let mut engine = TraversalEngine::new(fetcher, store)
        .with_max_depth(max_depth)
        .with_skip_list(skip_list)
        .with_drill_path(drill_path)
        .with_fan_out(fan_out);

    if let Some(callback) = progress_callback {
        engine = engine.with_progress_callback(callback);
    }

    Arc::new(engine).run(&roots).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_merge() {
        let mut total = CrawlSummary {
            visited: 2,
            inserted: 1,
            field_names: ["node_code".to_string()].into(),
            ..Default::default()
        };
        total.merge(CrawlSummary {
            visited: 3,
            duplicates: 1,
            field_names: ["node_code".to_string(), "parent".to_string()].into(),
            ..Default::default()
        });

        assert_eq!(total.visited, 5);
        assert_eq!(total.inserted, 1);
        assert_eq!(total.duplicates, 1);
        assert_eq!(total.field_names.len(), 2);
    }

    #[test]
    fn test_state_descend_keeps_root() {
        let state = TraversalState::new("1", false);
        let child = state.descend().descend();
        assert_eq!(child.depth, 2);
        assert_eq!(&*child.root, "1");
        assert!(!child.started);
    }

    #[test]
    fn test_default_options() {
        let options = CrawlOptions::default();
        assert_eq!(options.roots, vec!["0", "1", "2"]);
        assert!(options.drill_path.is_empty());
    }
}
