// src/schema/mod.rs

use std::collections::{BTreeMap, HashSet};

use crate::extract::row::{DATE_FIELD, YEAR_FIELD};
use crate::extract::GazetteRow;

pub mod write;

pub use write::write_csv;

/// Ordered output columns for a run: `Year`, `Date`, then every other field
/// in the order it was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<String>,
}

impl ColumnSchema {
    /// Union of the field names of all `rows`.
    pub fn from_rows(rows: &[GazetteRow]) -> Self {
        let mut seen = HashSet::new();
        let mut ordered: Vec<&str> = Vec::new();
        for name in rows.iter().flat_map(GazetteRow::field_names) {
            if seen.insert(name) {
                ordered.push(name);
            }
        }

        let mut columns = Vec::with_capacity(ordered.len());
        for lead in [YEAR_FIELD, DATE_FIELD] {
            if seen.contains(lead) {
                columns.push(lead.to_string());
            }
        }
        columns.extend(
            ordered
                .into_iter()
                .filter(|n| *n != YEAR_FIELD && *n != DATE_FIELD)
                .map(str::to_string),
        );
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// `row` laid out in schema order, missing fields as empty strings.
    pub fn project<'a>(&self, row: &'a GazetteRow) -> Vec<&'a str> {
        self.columns
            .iter()
            .map(|c| row.get(c).unwrap_or(""))
            .collect()
    }
}

/// Most links seen in a single cell, per document field.
///
/// A field counts once for its unsuffixed `_title` and once more for every
/// numbered `_title_N` beyond it.
pub fn max_links(rows: &[GazetteRow]) -> BTreeMap<String, usize> {
    let mut out: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        let mut per_row: BTreeMap<&str, usize> = BTreeMap::new();
        for name in row.field_names() {
            if let Some((field, _)) = name.split_once("_title") {
                *per_row.entry(field).or_default() += 1;
            }
        }
        for (field, n) in per_row {
            let best = out.entry(field.to_string()).or_default();
            *best = (*best).max(n);
        }
    }
    out
}
