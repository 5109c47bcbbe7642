//! Per-field normalization of description list entries.
//!
//! Every term of a node's description list is canonicalized into a
//! [`FieldName`] and its `<dd>` content converted into a typed [`Field`].
//! Conversion never fails: unparseable codes keep their raw text and
//! unparseable dates become `None`.

use crate::record::{NodeCode, NodeRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));

/// Lowercase and replace spaces with underscores.
pub fn canonicalize(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldName {
    DotOid,
    Parent,
    NodeCode,
    NodeNames,
    Asn1Oid,
    IriOid,
    CreationDate,
    ModificationDate,
    Other(String),
}

impl FieldName {
    pub fn from_term(term: &str) -> Self {
        match canonicalize(term).as_str() {
            "dot_oid" => FieldName::DotOid,
            "parent" => FieldName::Parent,
            "node_code" => FieldName::NodeCode,
            // some pages use the singular form
            "node_name" | "node_names" => FieldName::NodeNames,
            "asn1_oid" => FieldName::Asn1Oid,
            "iri_oid" => FieldName::IriOid,
            "creation_date" => FieldName::CreationDate,
            "modification_date" => FieldName::ModificationDate,
            other => FieldName::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldName::DotOid => "dot_oid",
            FieldName::Parent => "parent",
            FieldName::NodeCode => "node_code",
            FieldName::NodeNames => "node_names",
            FieldName::Asn1Oid => "asn1_oid",
            FieldName::IriOid => "iri_oid",
            FieldName::CreationDate => "creation_date",
            FieldName::ModificationDate => "modification_date",
            FieldName::Other(name) => name,
        }
    }
}

/// A converted description entry, ready to be applied to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    DotOid(String),
    Parent(Option<String>),
    NodeCode(Option<NodeCode>),
    NodeNames(Vec<String>),
    Asn1Oid(Vec<String>),
    IriOid(Vec<String>),
    CreationDate(Option<DateTime<Utc>>),
    ModificationDate(Option<DateTime<Utc>>),
    Other(String, String),
}

impl Field {
    pub fn apply(self, record: &mut NodeRecord) {
        match self {
            Field::DotOid(value) => record.dot_oid = value,
            Field::Parent(value) => record.parent = value,
            Field::NodeCode(value) => record.node_code = value,
            Field::NodeNames(value) => record.node_names = value,
            Field::Asn1Oid(value) => record.asn1_oid = value,
            Field::IriOid(value) => record.iri_oid = value,
            Field::CreationDate(value) => record.creation_date = value,
            Field::ModificationDate(value) => record.modification_date = value,
            Field::Other(name, value) => {
                record.other_fields.insert(name, value);
            }
        }
    }
}

/// Convert the `<dd>` content of a description term.
///
/// Returns `None` when the field must be left out of the record entirely,
/// which only happens for a `parent` entry without a link.
pub fn convert(name: &FieldName, content: ElementRef<'_>) -> Option<Field> {
    let field = match name {
        FieldName::Parent => {
            let anchor = content.select(&ANCHOR).next()?;
            Field::Parent(none_or_text(&element_text(anchor)))
        }
        FieldName::NodeCode => Field::NodeCode(convert_node_code(&element_text(content))),
        FieldName::NodeNames => Field::NodeNames(extract_list(content)),
        FieldName::Asn1Oid => Field::Asn1Oid(extract_list(content)),
        FieldName::IriOid => Field::IriOid(extract_list(content)),
        FieldName::CreationDate => {
            Field::CreationDate(parse_flexible_date(&element_text(content)))
        }
        FieldName::ModificationDate => {
            Field::ModificationDate(parse_flexible_date(&element_text(content)))
        }
        FieldName::DotOid => Field::DotOid(element_text(content)),
        FieldName::Other(other) => Field::Other(other.clone(), element_text(content)),
    };
    Some(field)
}

/// Concatenated, trimmed text of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn none_or_text(text: &str) -> Option<String> {
    if text == "None" {
        None
    } else {
        Some(text.to_string())
    }
}

pub fn convert_node_code(text: &str) -> Option<NodeCode> {
    let text = text.trim();
    if let Ok(number) = text.parse::<i64>() {
        return Some(NodeCode::Number(number));
    }
    none_or_text(text).map(NodeCode::Raw)
}

/// One entry per text-bearing child element. When the only child elements
/// are separators such as `<br>`, the text fragments between them are the
/// entries. Otherwise the whole trimmed text is a single entry.
pub fn extract_list(content: ElementRef<'_>) -> Vec<String> {
    let items: Vec<String> = content
        .children()
        .filter_map(ElementRef::wrap)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();
    if items.len() > 1 {
        return items;
    }

    if items.is_empty() {
        let fragments: Vec<String> = content
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect();
        if fragments.len() > 1 {
            return fragments;
        }
    }

    let text = element_text(content);
    if text.is_empty() { Vec::new() } else { vec![text] }
}

const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse the free-text dates found on registry pages, e.g. `Sept. 5, 2011`
/// or `June 13, 2009`. Returns `None` for anything unrecognised.
pub fn parse_flexible_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    let normalized = text.replace("Sept.", "Sep").replace('.', "");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    for format in DATE_FORMATS {
        if let Ok(nd) = NaiveDate::parse_from_str(&normalized, format) {
            return nd
                .and_hms_opt(0, 0, 0)
                .map(|ndt| Utc.from_utc_datetime(&ndt));
        }
    }

    None
}
