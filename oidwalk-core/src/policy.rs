use std::collections::{BTreeSet, HashSet};
use std::thread;

/// How a node's children are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sequential,
    /// Children run as independent tasks. `width` is the crawl-wide worker
    /// count, not a per-node limit.
    Parallel(usize),
}

/// Chooses between sequential recursion and bounded fan-out per node.
#[derive(Debug, Clone)]
pub struct FanOutPolicy {
    depths: BTreeSet<usize>,
    identifiers: HashSet<String>,
    width: usize,
}

impl FanOutPolicy {
    pub fn new(width: usize) -> Self {
        Self {
            depths: BTreeSet::new(),
            identifiers: HashSet::new(),
            width: width.max(1),
        }
    }

    /// Never fans out.
    pub fn sequential() -> Self {
        Self::new(1)
    }

    /// Width as a fraction of the available hardware parallelism, at least 1.
    pub fn width_from_fraction(fraction: f64) -> usize {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ((cores as f64 * fraction).floor() as usize).max(1)
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depths.insert(depth);
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifiers.insert(identifier.into());
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn dispatch(&self, identifier: &str, depth: usize) -> Dispatch {
        if self.depths.contains(&depth) || self.identifiers.contains(identifier) {
            Dispatch::Parallel(self.width)
        } else {
            Dispatch::Sequential
        }
    }
}

impl Default for FanOutPolicy {
    fn default() -> Self {
        Self::sequential()
    }
}
