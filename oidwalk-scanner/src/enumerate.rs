//! One-shot enumeration of a large children table, used to seed crawls of
//! branches too wide to walk from the top (e.g. the private enterprise arc).

use crate::convert::element_text;
use crate::error::ExtractError;
use crate::extract::{TITLE, parse_count, row_cells};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("static selector"));
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("static selector"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumeratedChild {
    pub identifier: String,
    pub link: String,
    pub names: Vec<String>,
    pub sub_children: u64,
    pub sub_nodes_total: u64,
}

/// Read every data row of the first table in `body`.
pub fn enumerate_table(body: &str, base_url: &str) -> Result<Vec<EnumeratedChild>, ExtractError> {
    let html = Html::parse_document(body);
    let table = html.select(&TABLE).next().ok_or(ExtractError::MissingTable)?;
    let base_url = base_url.trim_end_matches('/');

    let mut children = Vec::new();
    for (index, row) in table.select(&ROW).skip(1).enumerate() {
        let row_number = index + 1;
        let cells = row_cells(row);
        if cells.len() < 4 {
            return Err(ExtractError::MalformedChildRow {
                row: row_number,
                reason: format!("expected at least 4 cells, found {}", cells.len()),
            });
        }

        let identifier = cells[0].clone();
        children.push(EnumeratedChild {
            link: format!("{}/{}", base_url, identifier),
            identifier,
            names: cells[1]
                .split(", ")
                .map(str::to_string)
                .filter(|name| !name.is_empty())
                .collect(),
            sub_children: parse_count(&cells[2], row_number, "sub children")?,
            sub_nodes_total: parse_count(&cells[3], row_number, "sub nodes total")?,
        });
    }

    Ok(children)
}

/// Page title, useful for confirming which table was enumerated.
pub fn document_title(body: &str) -> Option<String> {
    let html = Html::parse_document(body);
    html.select(&TITLE).next().map(element_text)
}
