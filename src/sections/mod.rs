// src/sections/mod.rs

use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{Browser, ElementHandle};

pub mod strategy;

pub use strategy::Strategy;

/// One expandable region of the page and the year it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearSection {
    /// Four-digit year, when one could be read off the page.
    pub label: Option<String>,
    /// Element to click to open the section; `None` when there is nothing to click.
    pub toggle: Option<ElementHandle>,
    /// Subtree harvested for this section.
    pub scope: ElementHandle,
    expanded: bool,
}

/// What [`YearSection::expand`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expansion {
    /// A previous call already opened the section.
    AlreadyExpanded,
    /// Nothing to click.
    Static,
    /// Opened and rows became visible.
    Revealed,
    /// Opened (or tried to) but no row showed up in time.
    TimedOut,
}

impl YearSection {
    pub fn new(label: Option<String>, toggle: Option<ElementHandle>, scope: ElementHandle) -> Self {
        Self {
            label,
            toggle,
            scope,
            expanded: false,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Short name used in logs.
    pub fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("unlabelled")
    }

    /// Open the section and wait up to `wait` for a table row to show.
    ///
    /// Calling this again is a no-op. A timeout is logged, not returned as an
    /// error: harvesting goes ahead with whatever is on the page.
    pub fn expand<B: Browser>(&mut self, browser: &mut B, wait: Duration) -> Result<Expansion> {
        if self.expanded {
            return Ok(Expansion::AlreadyExpanded);
        }
        let Some(toggle) = self.toggle else {
            self.expanded = true;
            return Ok(Expansion::Static);
        };

        if browser.attribute(toggle, "aria-expanded").as_deref() == Some("true") {
            debug!(section = %self.name(), "already open");
        } else {
            info!(section = %self.name(), "expanding section");
            if let Err(e) = browser.click(toggle) {
                warn!(section = %self.name(), error = %e, "could not click section toggle");
            }
        }
        self.expanded = true;

        let scope = self.scope;
        let revealed = browser.wait_until(wait, |b| {
            b.find_within(scope, "tr")
                .map(|rows| rows.into_iter().any(|r| b.is_visible(r)))
                .unwrap_or(false)
        });
        if revealed {
            Ok(Expansion::Revealed)
        } else {
            warn!(section = %self.name(), ?wait, "no rows became visible, harvesting what is present");
            Ok(Expansion::TimedOut)
        }
    }
}

/// Run the strategy chain and return the first non-empty result, or a
/// single whole-page section when every strategy comes up empty.
pub fn locate_sections<B: Browser>(browser: &mut B) -> Result<Vec<YearSection>> {
    for strategy in Strategy::CHAIN {
        let found = match strategy.discover(browser) {
            Ok(found) => found,
            Err(e) => {
                warn!(strategy = strategy.name(), error = %e, "section strategy failed");
                continue;
            }
        };
        let sections = dedup_scopes(browser, found);
        if !sections.is_empty() {
            info!(
                strategy = strategy.name(),
                count = sections.len(),
                "found year sections"
            );
            return Ok(sections);
        }
        debug!(strategy = strategy.name(), "no sections");
    }

    whole_page(browser).map(|s| vec![s])
}

/// Keep the first section to claim a subtree. Later sections whose scope
/// repeats, contains or sits inside a claimed scope are dropped.
fn dedup_scopes<B: Browser>(browser: &mut B, sections: Vec<YearSection>) -> Vec<YearSection> {
    let mut kept: Vec<YearSection> = Vec::new();
    for section in sections {
        let clash = kept
            .iter()
            .position(|k| overlaps(browser, k.scope, section.scope));
        match clash {
            None => kept.push(section),
            Some(i) if kept[i].label == section.label => {
                debug!(section = %section.name(), "scope already claimed, skipping")
            }
            Some(i) => warn!(
                section = %section.name(),
                claimed_by = %kept[i].name(),
                "scope overlaps an earlier section, skipping"
            ),
        }
    }
    kept
}

fn overlaps<B: Browser>(browser: &mut B, a: ElementHandle, b: ElementHandle) -> bool {
    a == b || is_ancestor(browser, a, b) || is_ancestor(browser, b, a)
}

/// Whether `ancestor` is strictly above `element`.
fn is_ancestor<B: Browser>(browser: &mut B, ancestor: ElementHandle, element: ElementHandle) -> bool {
    let mut current = browser.parent(element);
    while let Some(el) = current {
        if el == ancestor {
            return true;
        }
        current = browser.parent(el);
    }
    false
}

/// The last resort: one unlabelled section covering the page body.
pub fn whole_page<B: Browser>(browser: &mut B) -> Result<YearSection> {
    let root = match browser.find_all("body")?.first() {
        Some(&body) => body,
        None => browser
            .find_all("html")?
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("page has no root element"))?,
    };

    let tables = browser.find_all("table")?.len();
    let classes = browser.attribute(root, "class").unwrap_or_default();
    warn!(
        title = ?browser.title(),
        body_classes = %classes,
        tables,
        "no year sections found, harvesting the whole page"
    );
    Ok(YearSection::new(None, None, root))
}
