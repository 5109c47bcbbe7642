use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric code of a node. Pages occasionally carry non-numeric codes, which
/// are kept verbatim instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeCode {
    Number(i64),
    Raw(String),
}

/// One row of a node's children table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub identifier: String,
    pub direct_children: u64,
    pub subnodes_total: u64,
}

/// Structured record extracted from a single registry page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub dot_oid: String,
    pub node_code: Option<NodeCode>,
    #[serde(default)]
    pub node_names: Vec<String>,
    pub parent: Option<String>,
    #[serde(default)]
    pub asn1_oid: Vec<String>,
    #[serde(default)]
    pub iri_oid: Vec<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub detailed_data: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ChildRef>,
    pub scrape_time: DateTime<Utc>,
    /// Description terms without a dedicated conversion rule.
    #[serde(flatten)]
    pub other_fields: BTreeMap<String, String>,
}

impl NodeRecord {
    pub fn new(dot_oid: String) -> Self {
        Self {
            dot_oid,
            node_code: None,
            node_names: Vec::new(),
            parent: None,
            asn1_oid: Vec::new(),
            iri_oid: Vec::new(),
            creation_date: None,
            modification_date: None,
            detailed_data: BTreeMap::new(),
            children: Vec::new(),
            scrape_time: Utc::now(),
            other_fields: BTreeMap::new(),
        }
    }
}

/// Number of dot-separated segments in an identifier.
pub fn segment_count(identifier: &str) -> usize {
    if identifier.is_empty() {
        0
    } else {
        identifier.split('.').count()
    }
}

/// True when `child` is `parent` plus exactly one more segment.
pub fn is_direct_child(parent: &str, child: &str) -> bool {
    match child.rsplit_once('.') {
        Some((prefix, last)) => prefix == parent && !last.is_empty(),
        None => false,
    }
}

/// True for dotted identifiers made only of decimal segments, e.g. `1.3.6.1`.
pub fn is_dotted_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_direct_child() {
        assert!(is_direct_child("0.4", "0.4.0"));
        assert!(is_direct_child("1", "1.3"));
        assert!(!is_direct_child("0.4", "0.4.0.127"));
        assert!(!is_direct_child("0.4", "0.40"));
        assert!(!is_direct_child("0.4", "0.4."));
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(""), 0);
        assert_eq!(segment_count("2"), 1);
        assert_eq!(segment_count("1.3.6.1.4.1"), 6);
    }

    #[test]
    fn test_is_dotted_identifier() {
        assert!(is_dotted_identifier("1.3.6.1"));
        assert!(is_dotted_identifier("0"));
        assert!(!is_dotted_identifier("1..3"));
        assert!(!is_dotted_identifier("OID"));
        assert!(!is_dotted_identifier(""));
    }

    #[test]
    fn test_record_serializes_other_fields_flat() {
        let mut record = NodeRecord::new("1.0".to_string());
        record
            .other_fields
            .insert("description".to_string(), "ISO standard".to_string());
        record.node_code = Some(NodeCode::Number(0));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["dot_oid"], "1.0");
        assert_eq!(value["node_code"], 0);
        assert_eq!(value["description"], "ISO standard");
        assert!(value["parent"].is_null());
    }
}
