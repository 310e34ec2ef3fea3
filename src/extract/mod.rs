// src/extract/mod.rs

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub mod cell;
pub mod row;
pub mod table;

pub use cell::{extract_cell_links, CellLink};
pub use row::{map_row, ColumnLayout, GazetteRow};
pub use table::{enclosing_table, harvest_tables};

/// A standalone four-digit year from 1900 to 2099.
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("static regex"));

/// Collapse whitespace (including non-breaking spaces) and trim.
pub fn clean_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First year-looking token in `text`.
pub fn find_year(text: &str) -> Option<String> {
    YEAR.captures(text).map(|c| c[1].to_string())
}

/// True when `text`, once cleaned, is nothing but a year.
pub fn is_bare_year(text: &str) -> bool {
    let cleaned = clean_text(text);
    cleaned.len() == 4 && find_year(&cleaned).is_some()
}

/// Turn an href into an absolute URL against `base`.
///
/// Empty input stays empty and an href that cannot be joined is returned
/// as it was written.
pub fn resolve_url(base: Option<&Url>, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}
