// src/extract/row.rs

use anyhow::{ensure, Result};

use super::CellLink;

pub const YEAR_FIELD: &str = "Year";
pub const DATE_FIELD: &str = "Date";

const FOUR_COLUMNS: [&str; 4] = [DATE_FIELD, "ASIC Gazette", "Business Gazette", "Other / Notes"];
const FIVE_COLUMNS: [&str; 5] = [DATE_FIELD, "ASIC Gazette", "Business Gazette", "Other", "Notes"];

/// One extracted table row: field name → value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GazetteRow {
    fields: Vec<(String, String)>,
}

impl GazetteRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing an earlier value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GazetteRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = GazetteRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// How cell positions map to field names for a given column count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLayout {
    /// Date, ASIC Gazette, Business Gazette, Other / Notes.
    Four,
    /// Date, ASIC Gazette, Business Gazette, Other, Notes.
    Five,
    /// Unrecognised width; columns are named `Column_1..Column_k`.
    Positional(usize),
}

impl ColumnLayout {
    pub fn for_columns(count: usize) -> Self {
        match count {
            4 => ColumnLayout::Four,
            5 => ColumnLayout::Five,
            n => ColumnLayout::Positional(n),
        }
    }

    pub fn width(&self) -> usize {
        match self {
            ColumnLayout::Four => 4,
            ColumnLayout::Five => 5,
            ColumnLayout::Positional(n) => *n,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ColumnLayout::Positional(_))
    }

    pub fn field_names(&self) -> Vec<String> {
        match self {
            ColumnLayout::Four => FOUR_COLUMNS.iter().map(|s| s.to_string()).collect(),
            ColumnLayout::Five => FIVE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            ColumnLayout::Positional(n) => (1..=*n).map(|i| format!("Column_{}", i)).collect(),
        }
    }
}

/// Write one cell's pairs into `row` under `field`.
///
/// A lone plain-text pair becomes `<field>`; otherwise every pair gets a
/// `<field>_title`/`<field>_Url` couple, suffixed `_1`, `_2`, ... after the first.
fn put_field(row: &mut GazetteRow, field: &str, links: &[CellLink]) {
    match links {
        [] => row.insert(field, ""),
        [only] if only.is_plain() => row.insert(field, only.text.as_str()),
        _ => {
            for (i, link) in links.iter().enumerate() {
                let suffix = if i == 0 { String::new() } else { format!("_{}", i) };
                row.insert(format!("{}_title{}", field, suffix), link.text.as_str());
                row.insert(
                    format!("{}_Url{}", field, suffix),
                    link.href.as_deref().unwrap_or(""),
                );
            }
        }
    }
}

/// Map a row's extracted cells onto semantic fields.
///
/// Fails when the number of cells does not match the layout width.
pub fn map_row(layout: &ColumnLayout, cells: &[Vec<CellLink>]) -> Result<GazetteRow> {
    ensure!(
        cells.len() == layout.width(),
        "row has {} cells, expected {}",
        cells.len(),
        layout.width()
    );

    let mut row = GazetteRow::new();
    for (field, links) in layout.field_names().iter().zip(cells) {
        put_field(&mut row, field, links);
    }
    Ok(row)
}
