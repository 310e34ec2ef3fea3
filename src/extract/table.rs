// src/extract/table.rs

use anyhow::Result;
use tracing::{debug, trace, warn};
use url::Url;

use super::{extract_cell_links, find_year, map_row, CellLink, ColumnLayout, GazetteRow};
use crate::browser::{Browser, ElementHandle};
use crate::extract::row::YEAR_FIELD;

/// Column count assumed when a table has no recognisable header row.
pub const DEFAULT_COLUMNS: usize = 4;

/// Harvest every table inside `scope` (or `scope` itself if it is a table).
///
/// Rows that cannot be mapped are logged and skipped; they never abort the
/// rest of the table.
pub fn harvest_tables<B: Browser>(
    browser: &mut B,
    scope: ElementHandle,
    year: Option<&str>,
    base: Option<&Url>,
) -> Result<Vec<GazetteRow>> {
    let tables = if browser.tag_name(scope) == "table" {
        vec![scope]
    } else {
        outer_tables(browser, scope)?
    };
    if tables.is_empty() {
        debug!("no table in section");
    }

    let mut rows = Vec::new();
    for (i, table) in tables.into_iter().enumerate() {
        let found = harvest_table(browser, table, year, base)?;
        debug!(table = i + 1, rows = found.len(), "table harvested");
        rows.extend(found);
    }
    Ok(rows)
}

fn harvest_table<B: Browser>(
    browser: &mut B,
    table: ElementHandle,
    year: Option<&str>,
    base: Option<&Url>,
) -> Result<Vec<GazetteRow>> {
    let rows = own_rows(browser, table)?;
    let width = header_width(browser, &rows)?;
    if width.is_none() {
        debug!(columns = DEFAULT_COLUMNS, "no header row, assuming default width");
    }
    let layout = ColumnLayout::for_columns(width.unwrap_or(DEFAULT_COLUMNS));
    if layout.is_degraded() {
        warn!(
            columns = layout.width(),
            "unrecognised table layout, naming columns positionally"
        );
    }

    let year = match year {
        Some(y) => Some(y.to_string()),
        None => infer_year(browser, table)?,
    };

    let mut harvested = Vec::new();
    let body = rows.into_iter().filter(|r| !r.in_head).map(|r| r.tr);
    for (i, tr) in body.enumerate() {
        match harvest_row(browser, tr, &layout, year.as_deref(), base) {
            Ok(Some(row)) => harvested.push(row),
            Ok(None) => {}
            Err(e) => warn!(row = i + 1, error = %e, "skipping row"),
        }
    }
    Ok(harvested)
}

fn harvest_row<B: Browser>(
    browser: &mut B,
    tr: ElementHandle,
    layout: &ColumnLayout,
    year: Option<&str>,
    base: Option<&Url>,
) -> Result<Option<GazetteRow>> {
    let cells = own_cells(browser, tr)?;
    if !cells.iter().any(|&c| browser.tag_name(c) == "td") {
        trace!(cells = cells.len(), "header or empty row");
        return Ok(None);
    }

    let extracted = cells
        .iter()
        .map(|&c| extract_cell_links(browser, c, base))
        .collect::<Result<Vec<_>>>()?;
    if is_separator(&extracted) {
        trace!("separator row");
        return Ok(None);
    }

    let mapped = map_row(layout, &extracted)?;
    let mut row = GazetteRow::new();
    if let Some(y) = year {
        row.insert(YEAR_FIELD, y);
    }
    for (name, value) in mapped.iter() {
        row.insert(name, value);
    }
    Ok(Some(row))
}

fn is_separator(cells: &[Vec<CellLink>]) -> bool {
    cells
        .iter()
        .flatten()
        .all(|l| l.is_plain() && l.text.is_empty())
}

/// Width of the header row: the first non-empty `thead` row, else the first
/// row made only of `th` cells.
fn header_width<B: Browser>(browser: &mut B, rows: &[TableRow]) -> Result<Option<usize>> {
    for row in rows.iter().filter(|r| r.in_head) {
        let n = own_cells(browser, row.tr)?.len();
        if n > 0 {
            return Ok(Some(n));
        }
    }
    for row in rows {
        let cells = own_cells(browser, row.tr)?;
        if !cells.is_empty() && cells.iter().all(|&c| browser.tag_name(c) == "th") {
            return Ok(Some(cells.len()));
        }
    }
    Ok(None)
}

/// A `tr` of one table, and whether it sits in that table's `thead`.
struct TableRow {
    tr: ElementHandle,
    in_head: bool,
}

/// Rows of `table` itself, leaving out rows of tables nested in its cells.
fn own_rows<B: Browser>(browser: &mut B, table: ElementHandle) -> Result<Vec<TableRow>> {
    let mut rows = Vec::new();
    for tr in browser.find_within(table, "tr")? {
        let mut in_head = false;
        let mut current = browser.parent(tr);
        while let Some(el) = current {
            match browser.tag_name(el).as_str() {
                "table" => break,
                "thead" => in_head = true,
                _ => {}
            }
            current = browser.parent(el);
        }
        if current == Some(table) {
            rows.push(TableRow { tr, in_head });
        }
    }
    Ok(rows)
}

/// `td`/`th` children of `tr`.
fn own_cells<B: Browser>(browser: &mut B, tr: ElementHandle) -> Result<Vec<ElementHandle>> {
    let mut cells = Vec::new();
    for cell in browser.find_within(tr, "td, th")? {
        if browser.parent(cell) == Some(tr) {
            cells.push(cell);
        }
    }
    Ok(cells)
}

/// Closest `table` strictly above `element`.
pub fn enclosing_table<B: Browser>(browser: &mut B, element: ElementHandle) -> Option<ElementHandle> {
    let mut current = browser.parent(element);
    while let Some(el) = current {
        if browser.tag_name(el) == "table" {
            return Some(el);
        }
        current = browser.parent(el);
    }
    None
}

/// Tables under `scope` that are not nested in another table under `scope`.
fn outer_tables<B: Browser>(browser: &mut B, scope: ElementHandle) -> Result<Vec<ElementHandle>> {
    let tables = browser.find_within(scope, "table")?;
    let mut outer = Vec::new();
    for &table in &tables {
        match enclosing_table(browser, table) {
            Some(host) if tables.contains(&host) => {
                trace!(?table, "nested table, harvested with its host")
            }
            _ => outer.push(table),
        }
    }
    Ok(outer)
}

/// Look for a year in the table's caption, then in its header.
fn infer_year<B: Browser>(browser: &mut B, table: ElementHandle) -> Result<Option<String>> {
    for selector in ["caption", "thead"] {
        for el in browser.find_within(table, selector)? {
            if enclosing_table(browser, el) != Some(table) {
                continue;
            }
            if let Some(y) = find_year(&browser.text(el)) {
                debug!(year = %y, from = selector, "inferred year");
                return Ok(Some(y));
            }
        }
    }
    Ok(None)
}
