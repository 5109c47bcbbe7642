//! Turns a fetched registry page into a [`NodeRecord`] and its children.

use crate::convert::{self, FieldName, canonicalize, element_text};
use crate::error::ExtractError;
use crate::fetcher::RawDocument;
use crate::record::{ChildRef, NodeRecord, is_dotted_identifier};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

static DESCRIPTION_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl").expect("static selector"));
pub(crate) static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("static selector"));
static SECTION_HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h3").expect("static selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));

static NEXT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<\s*h3[\s>]").expect("static regex"));
static PARAGRAPH_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?\s*p\s*>").expect("static regex"));

/// Result of extracting one page.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: NodeRecord,
    pub children: Vec<ChildRef>,
    /// Canonical names of every description term seen on the page.
    pub field_names: Vec<String>,
}

/// Extract the node record and children list from a fetched page.
pub fn extract(document: &RawDocument) -> Result<Extraction, ExtractError> {
    let html = Html::parse_document(&document.body);

    let description_list = html
        .select(&DESCRIPTION_LIST)
        .next()
        .ok_or(ExtractError::MissingDescriptionList)?;

    let mut record = NodeRecord::new(String::new());
    let field_names = scrape_description_list(description_list, &mut record);

    if record.dot_oid.is_empty() {
        record.dot_oid = title_identifier(&html).unwrap_or_else(|| document.identifier.clone());
    }

    record.detailed_data = scrape_detailed_data(&html);

    let children = scrape_children(&html, &record.dot_oid)?;
    record.children = children.clone();

    debug!(
        "Extracted {} ({} fields, {} sections, {} children)",
        record.dot_oid,
        field_names.len(),
        record.detailed_data.len(),
        children.len()
    );

    Ok(Extraction {
        record,
        children,
        field_names,
    })
}

/// Walk `<dt>`/`<dd>` pairs in document order, applying each converted field.
fn scrape_description_list(list: ElementRef<'_>, record: &mut NodeRecord) -> Vec<String> {
    let mut field_names = Vec::new();
    let mut pending: Option<FieldName> = None;

    for element in list.children().filter_map(ElementRef::wrap) {
        match element.value().name() {
            "dt" => {
                let name = FieldName::from_term(&element_text(element));
                field_names.push(name.as_str().to_string());
                pending = Some(name);
            }
            "dd" => {
                if let Some(name) = pending.take()
                    && let Some(field) = convert::convert(&name, element)
                {
                    field.apply(record);
                }
            }
            _ => {}
        }
    }

    field_names
}

fn title_identifier(html: &Html) -> Option<String> {
    let title = html.select(&TITLE).next()?;
    let text = element_text(title);
    let last = text.split_whitespace().last()?;
    is_dotted_identifier(last).then(|| last.to_string())
}

/// First element sibling after `element`, skipping text and comments.
fn next_element_sibling<'a>(element: ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// Narrative sections keyed by canonical heading, up to the first
/// children/brothers heading.
pub fn scrape_detailed_data(html: &Html) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();

    for heading in html.select(&SECTION_HEADING) {
        let Some(block) = next_element_sibling(heading) else {
            continue;
        };
        let name = canonicalize(&element_text(heading));

        if name.contains("recovered") {
            continue;
        }

        if name.contains("registration_authority") {
            data.insert(name, render_registration_authority(block));
            continue;
        }

        if name.contains("children") || name.contains("brothers") {
            break;
        }

        data.insert(name, render_markdown(&block.html(), block));
    }

    data
}

/// The registration authority block is often left with an unclosed tag, so
/// the following heading ends up inside it. Cut at that heading.
fn render_registration_authority(block: ElementRef<'_>) -> String {
    let markup = block.html();
    let head = NEXT_HEADING
        .find(&markup)
        .map_or(markup.as_str(), |m| &markup[..m.start()]);
    let stripped = PARAGRAPH_TAG.replace_all(head, "");
    render_markdown(stripped.trim(), block)
}

fn render_markdown(markup: &str, fallback: ElementRef<'_>) -> String {
    match htmd::convert(markup) {
        Ok(markdown) => markdown.trim().to_string(),
        Err(e) => {
            debug!("Markdown rendering failed, using plain text: {}", e);
            element_text(fallback)
        }
    }
}

/// Rows of the table following the first "children" heading. Missing
/// headings or tables yield an empty list; malformed rows are an error.
pub fn scrape_children(html: &Html, dot_oid: &str) -> Result<Vec<ChildRef>, ExtractError> {
    let heading = html
        .select(&SECTION_HEADING)
        .find(|h| element_text(*h).to_lowercase().contains("children"));

    let Some(heading) = heading else {
        return Ok(Vec::new());
    };
    let Some(container) = next_element_sibling(heading) else {
        return Ok(Vec::new());
    };

    let mut children = Vec::new();
    // first row is the header
    for (index, row) in container.select(&ROW).skip(1).enumerate() {
        children.push(parse_child_row(row, index + 1, dot_oid)?);
    }
    Ok(children)
}

/// Cell texts of a table row (`td` and `th`).
pub(crate) fn row_cells(row: ElementRef<'_>) -> Vec<String> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
        .map(element_text)
        .collect()
}

pub(crate) fn parse_count(text: &str, row: usize, column: &str) -> Result<u64, ExtractError> {
    let digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    digits
        .parse::<u64>()
        .map_err(|_| ExtractError::MalformedChildRow {
            row,
            reason: format!("{} is not a number: {:?}", column, text),
        })
}

fn parse_child_row(row: ElementRef<'_>, index: usize, dot_oid: &str) -> Result<ChildRef, ExtractError> {
    let cells = row_cells(row);
    if cells.len() < 4 {
        return Err(ExtractError::MalformedChildRow {
            row: index,
            reason: format!("expected at least 4 cells, found {}", cells.len()),
        });
    }

    let segment = cells[0].rsplit('.').next().unwrap_or_default();
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ExtractError::MalformedChildRow {
            row: index,
            reason: format!("invalid identifier {:?}", cells[0]),
        });
    }

    Ok(ChildRef {
        identifier: format!("{}.{}", dot_oid, segment),
        direct_children: parse_count(&cells[2], index, "direct children")?,
        subnodes_total: parse_count(&cells[3], index, "subnodes total")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NodeCode, is_direct_child};

    fn document(identifier: &str, body: &str) -> RawDocument {
        RawDocument {
            identifier: identifier.to_string(),
            url: format!("https://oidref.com/{}", identifier),
            body: body.to_string(),
        }
    }

    const ITU_PAGE: &str = r#"<html><body>
        <h1>OID 0.4</h1>
        <dl>
            <dt>Node Code</dt><dd>4</dd>
            <dt>Node Name</dt><dd>identified-organization</dd>
            <dt>Dot OID</dt><dd>0.4</dd>
            <dt>ASN1 OID</dt><dd><ul><li>{itu-t(0) identified-organization(4)}</li></ul></dd>
            <dt>IRI OID</dt><dd>/ITU-T/Identified-Organization</dd>
            <dt>Parent</dt><dd><a href="/0">0</a></dd>
            <dt>Creation date</dt><dd>Sept. 5, 2011</dd>
            <dt>Modification date</dt><dd>not known</dd>
            <dt>Description</dt><dd>  Identified organization  </dd>
        </dl>
        <h3>Description</h3>
        <p>Used by <b>identified</b> organizations.</p>
        <h3>Recovered information</h3>
        <p>Stale archive copy</p>
        <h3>Children (2)</h3>
        <table>
            <tr><th>OID</th><th>Name</th><th>Sub children</th><th>Sub Nodes Total</th></tr>
            <tr><td><a href="/0.4.0">0.4.0</a></td><td>etsi</td><td>12</td><td>1,204</td></tr>
            <tr><td><a href="/0.4.1">0.4.1</a></td><td>other</td><td>0</td><td>0</td></tr>
        </table>
        <h3>Brothers (3)</h3>
        <table><tr><th>OID</th></tr></table>
    </body></html>"#;

    #[test]
    fn test_extract_full_page() {
        let extraction = extract(&document("0.4", ITU_PAGE)).unwrap();
        let record = &extraction.record;

        assert_eq!(record.dot_oid, "0.4");
        assert_eq!(record.node_code, Some(NodeCode::Number(4)));
        assert_eq!(record.node_names, vec!["identified-organization"]);
        assert_eq!(record.parent.as_deref(), Some("0"));
        assert_eq!(record.asn1_oid.len(), 1);
        assert!(record.creation_date.is_some());
        assert!(record.modification_date.is_none());
        assert_eq!(
            record.other_fields.get("description").map(String::as_str),
            Some("Identified organization")
        );
        assert!(extraction.field_names.contains(&"node_names".to_string()));
    }

    #[test]
    fn test_detailed_data_skips_recovered_and_stops_at_children() {
        let extraction = extract(&document("0.4", ITU_PAGE)).unwrap();
        let detailed = &extraction.record.detailed_data;

        assert_eq!(detailed.len(), 1);
        let description = detailed.get("description").unwrap();
        assert!(description.starts_with("Used by"));
        assert!(description.contains("identified"));
        assert!(!description.contains("<p>"));
        assert!(detailed.keys().all(|k| !k.contains("recovered")));
        assert!(detailed.keys().all(|k| !k.contains("children") && !k.contains("brothers")));
    }

    #[test]
    fn test_children_table() {
        let extraction = extract(&document("0.4", ITU_PAGE)).unwrap();

        assert_eq!(
            extraction.children,
            vec![
                ChildRef {
                    identifier: "0.4.0".to_string(),
                    direct_children: 12,
                    subnodes_total: 1204,
                },
                ChildRef {
                    identifier: "0.4.1".to_string(),
                    direct_children: 0,
                    subnodes_total: 0,
                },
            ]
        );
        assert_eq!(extraction.record.children, extraction.children);
        for child in &extraction.children {
            assert!(is_direct_child(&extraction.record.dot_oid, &child.identifier));
        }
    }

    #[test]
    fn test_missing_description_list() {
        let err = extract(&document("0", "<html><body><h1>Just a moment...</h1></body></html>"))
            .unwrap_err();
        assert_eq!(err, ExtractError::MissingDescriptionList);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_no_children_heading_gives_empty_list() {
        let page = "<html><body><dl><dt>Node Code</dt><dd>7</dd></dl></body></html>";
        let extraction = extract(&document("1.7", page)).unwrap();
        assert!(extraction.children.is_empty());
        assert!(extraction.record.detailed_data.is_empty());
    }

    #[test]
    fn test_malformed_child_row_is_an_error() {
        let page = r#"<html><body><dl><dt>Node Code</dt><dd>2</dd></dl>
            <h3>Children (1)</h3>
            <table>
                <tr><th>OID</th><th>Name</th><th>Sub children</th><th>Sub Nodes Total</th></tr>
                <tr><td>2.1</td><td>asn1</td></tr>
            </table></body></html>"#;
        let err = extract(&document("2", page)).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedChildRow { row: 1, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_dot_oid_falls_back_to_title_then_identifier() {
        let page = "<html><body><h1>OID 1.3.6</h1><dl><dt>Node Code</dt><dd>6</dd></dl></body></html>";
        assert_eq!(extract(&document("x", page)).unwrap().record.dot_oid, "1.3.6");

        let page = "<html><body><h1>Welcome</h1><dl><dt>Node Code</dt><dd>6</dd></dl></body></html>";
        assert_eq!(extract(&document("1.3.6", page)).unwrap().record.dot_oid, "1.3.6");
    }

    #[test]
    fn test_root_parent_none() {
        let page = r#"<html><body><h1>OID 0</h1><dl>
            <dt>Node Code</dt><dd>0</dd>
            <dt>Parent</dt><dd><a href="/">None</a></dd>
            </dl></body></html>"#;
        let record = extract(&document("0", page)).unwrap().record;
        assert_eq!(record.parent, None);
    }

    #[test]
    fn test_registration_authority_truncated_at_next_heading() {
        let page = r#"<html><body><h1>OID 1.2.840</h1>
            <dl><dt>Node Code</dt><dd>840</dd></dl>
            <h3>Registration Authority</h3>
            <div><p>ANSI<br>New York
            <div><p>unclosed contact block
            <h3>Children (1)</h3>
            <table>
                <tr><th>OID</th><th>Name</th><th>Sub children</th><th>Sub Nodes Total</th></tr>
                <tr><td>1.2.840.10003</td><td>ansi-z39-50</td><td>3</td><td>40</td></tr>
            </table>
            </body></html>"#;
        let extraction = extract(&document("1.2.840", page)).unwrap();

        let authority = extraction
            .record
            .detailed_data
            .get("registration_authority")
            .unwrap();
        assert!(authority.contains("ANSI"));
        assert!(authority.contains("unclosed contact block"));
        assert!(!authority.contains("Children"));
        assert!(!authority.contains("10003"));
        assert!(!authority.contains("ansi-z39-50"));

        assert_eq!(extraction.children.len(), 1);
        assert_eq!(extraction.children[0].identifier, "1.2.840.10003");
    }

    /// Write a record's description fields back out as a `<dl>` page.
    fn render_description_list(record: &NodeRecord) -> String {
        let list = |items: &[String]| -> String {
            items.iter().map(|item| format!("<li>{}</li>", item)).collect()
        };
        let date = |value: Option<chrono::DateTime<chrono::Utc>>| -> String {
            value.map_or("unknown".to_string(), |dt| dt.format("%Y-%m-%d").to_string())
        };

        let mut page = String::from("<html><body><dl>");
        page.push_str(&format!("<dt>Dot OID</dt><dd>{}</dd>", record.dot_oid));
        let code = match &record.node_code {
            Some(NodeCode::Number(n)) => n.to_string(),
            Some(NodeCode::Raw(raw)) => raw.clone(),
            None => "None".to_string(),
        };
        page.push_str(&format!("<dt>Node Code</dt><dd>{}</dd>", code));
        let names: String = record
            .node_names
            .iter()
            .map(|name| format!("<span>{}</span>", name))
            .collect();
        page.push_str(&format!("<dt>Node Names</dt><dd>{}</dd>", names));
        let parent = record.parent.as_deref().unwrap_or("None");
        page.push_str(&format!("<dt>Parent</dt><dd><a href=\"/{0}\">{0}</a></dd>", parent));
        page.push_str(&format!("<dt>ASN1 OID</dt><dd>{}</dd>", list(&record.asn1_oid)));
        page.push_str(&format!("<dt>IRI OID</dt><dd>{}</dd>", list(&record.iri_oid)));
        page.push_str(&format!("<dt>Creation date</dt><dd>{}</dd>", date(record.creation_date)));
        page.push_str(&format!(
            "<dt>Modification date</dt><dd>{}</dd>",
            date(record.modification_date)
        ));
        for (name, value) in &record.other_fields {
            page.push_str(&format!("<dt>{}</dt><dd>{}</dd>", name, value));
        }
        page.push_str("</dl></body></html>");
        page
    }

    #[test]
    fn test_converted_fields_survive_rendering_and_reextraction() {
        let page = r#"<html><body><h1>OID 2.16.840</h1>
            <dl>
                <dt>Node Code</dt><dd> 840 </dd>
                <dt>Node Names</dt><dd><span>us</span><span>usa</span></dd>
                <dt>Dot OID</dt><dd>2.16.840</dd>
                <dt>ASN1 OID</dt><dd><li>{joint-iso-itu-t(2) country(16) us(840)}</li><li>{2 16 840}</li></dd>
                <dt>IRI OID</dt><dd>/Country/US</dd>
                <dt>Parent</dt><dd><a href="/2.16">2.16</a></dd>
                <dt>Creation date</dt><dd>June 13, 2009</dd>
                <dt>Modification date</dt><dd>Sept. 5, 2011</dd>
                <dt>Information</dt><dd>  United States of America  </dd>
            </dl></body></html>"#;
        let first = extract(&document("2.16.840", page)).unwrap().record;
        assert_eq!(first.node_names, vec!["us", "usa"]);
        assert_eq!(first.asn1_oid.len(), 2);
        assert!(first.creation_date.is_some() && first.modification_date.is_some());

        let rendered = render_description_list(&first);
        let mut second = extract(&document("2.16.840", &rendered)).unwrap().record;
        second.scrape_time = first.scrape_time;

        assert_eq!(second, first);
    }
}
