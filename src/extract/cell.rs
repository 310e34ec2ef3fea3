// src/extract/cell.rs

use anyhow::Result;
use url::Url;

use super::{clean_text, resolve_url};
use crate::browser::{Browser, ElementHandle};

/// One piece of a cell: the visible text and, for links, where it points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellLink {
    pub text: String,
    /// `None` for plain text, `Some("")` for a link without an href.
    pub href: Option<String>,
}

impl CellLink {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: None,
        }
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            href: Some(href.into()),
        }
    }

    pub fn is_plain(&self) -> bool {
        self.href.is_none()
    }
}

/// Read a table cell as an ordered list of (text, absolute href) pairs.
///
/// A cell without links yields its whole text as a single plain pair, so an
/// empty cell still produces one (empty) entry.
pub fn extract_cell_links<B: Browser>(
    browser: &mut B,
    cell: ElementHandle,
    base: Option<&Url>,
) -> Result<Vec<CellLink>> {
    let anchors = browser.find_within(cell, "a")?;

    let links: Vec<CellLink> = anchors
        .into_iter()
        .filter_map(|a| {
            let text = clean_text(&browser.text(a));
            let href = browser
                .attribute(a, "href")
                .map(|h| resolve_url(base, &h))
                .unwrap_or_default();
            // named anchors with nothing to show
            if text.is_empty() && href.is_empty() {
                return None;
            }
            Some(CellLink::link(text, href))
        })
        .collect();

    if links.is_empty() {
        return Ok(vec![CellLink::plain(clean_text(&browser.text(cell)))]);
    }
    Ok(links)
}
