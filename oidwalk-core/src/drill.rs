//! Resume paths for partially completed crawls.

use crate::error::CrawlError;
use oidwalk_scanner::record::{is_direct_child, is_dotted_identifier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered ancestor chain, e.g. `["0", "0.4", "0.4.0", "0.4.0.127"]`.
///
/// Until the last identifier has been visited, the traversal only descends
/// into nodes on the path. An empty path gates nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DrillPath(Vec<String>);

impl DrillPath {
    pub fn new(identifiers: Vec<String>) -> Result<Self, CrawlError> {
        let mut previous: Option<&str> = None;
        for identifier in &identifiers {
            if !is_dotted_identifier(identifier) {
                return Err(CrawlError::InvalidDrillPath(format!(
                    "{:?} is not a dotted identifier",
                    identifier
                )));
            }
            match previous {
                None if identifier.contains('.') => {
                    return Err(CrawlError::InvalidDrillPath(format!(
                        "path must start at a top-level arc, got {}",
                        identifier
                    )));
                }
                Some(parent) if !is_direct_child(parent, identifier) => {
                    return Err(CrawlError::InvalidDrillPath(format!(
                        "{} does not extend {} by one segment",
                        identifier, parent
                    )));
                }
                _ => {}
            }
            previous = Some(identifier);
        }
        Ok(Self(identifiers))
    }

    /// Every ancestor of `target`, top-level arc first, ending with `target`.
    pub fn to_target(target: &str) -> Result<Self, CrawlError> {
        let target = target.trim();
        if !is_dotted_identifier(target) {
            return Err(CrawlError::InvalidDrillPath(format!(
                "{:?} is not a dotted identifier",
                target
            )));
        }
        let segments: Vec<&str> = target.split('.').collect();
        let path = (1..=segments.len())
            .map(|i| segments[..i].join("."))
            .collect();
        Ok(Self(path))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.0.iter().any(|id| id == identifier)
    }

    pub fn terminal(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for DrillPath {
    type Error = CrawlError;

    fn try_from(identifiers: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(identifiers)
    }
}

impl From<DrillPath> for Vec<String> {
    fn from(path: DrillPath) -> Self {
        path.0
    }
}

impl fmt::Display for DrillPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.0.iter().map(|id| format!("\"{}\"", id)).collect();
        write!(f, "[{}]", quoted.join(", "))
    }
}
