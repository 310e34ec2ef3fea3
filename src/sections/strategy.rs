// src/sections/strategy.rs

use anyhow::Result;
use tracing::{debug, trace};

use super::YearSection;
use crate::browser::{Browser, ElementHandle};
use crate::extract::{clean_text, enclosing_table, find_year, is_bare_year};

const TOGGLE_SELECTOR: &str = r#"[aria-expanded], [data-bs-toggle="collapse"], [data-toggle="collapse"], .accordion-button, details > summary"#;
const CLICKABLE_SELECTOR: &str = r#"button, a, [role="button"]"#;
const TEXT_SELECTOR: &str = "body *";

/// Ways of finding year sections, tried in [`Strategy::CHAIN`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Accordion widgets exposing an expanded/collapsed toggle.
    AccordionToggles,
    /// Buttons and links whose text carries a year.
    ClickableYears,
    /// Any element whose own text is a bare year; nothing to click.
    YearText,
}

impl Strategy {
    pub const CHAIN: [Strategy; 3] = [
        Strategy::AccordionToggles,
        Strategy::ClickableYears,
        Strategy::YearText,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::AccordionToggles => "accordion-toggles",
            Strategy::ClickableYears => "clickable-years",
            Strategy::YearText => "year-text",
        }
    }

    /// Sections this strategy can see, in document order. May be empty.
    pub fn discover<B: Browser>(self, browser: &mut B) -> Result<Vec<YearSection>> {
        match self {
            Strategy::AccordionToggles => accordion_toggles(browser),
            Strategy::ClickableYears => clickable_years(browser),
            Strategy::YearText => year_text(browser),
        }
    }
}

fn accordion_toggles<B: Browser>(browser: &mut B) -> Result<Vec<YearSection>> {
    let toggles = browser.find_all(TOGGLE_SELECTOR)?;
    let labelled: Vec<(ElementHandle, Option<String>)> = toggles
        .into_iter()
        .map(|t| (t, find_year(&clean_text(&browser.text(t)))))
        .collect();

    // menus and other widgets share the markup; prefer the ones naming a year
    let any_year = labelled.iter().any(|(_, y)| y.is_some());
    let mut sections = Vec::new();
    for (toggle, label) in labelled {
        if any_year && label.is_none() {
            trace!(?toggle, "toggle without a year, ignored");
            continue;
        }
        if let Some(scope) = toggle_region(browser, toggle)? {
            sections.push(YearSection::new(label, Some(toggle), scope));
        }
    }
    Ok(sections)
}

fn clickable_years<B: Browser>(browser: &mut B) -> Result<Vec<YearSection>> {
    let mut sections = Vec::new();
    for el in browser.find_all(CLICKABLE_SELECTOR)? {
        let Some(label) = find_year(&clean_text(&browser.text(el))) else {
            continue;
        };
        if let Some(scope) = toggle_region(browser, el)? {
            sections.push(YearSection::new(Some(label), Some(el), scope));
        }
    }
    Ok(sections)
}

fn year_text<B: Browser>(browser: &mut B) -> Result<Vec<YearSection>> {
    let mut sections = Vec::new();
    for el in browser.find_all(TEXT_SELECTOR)? {
        if matches!(browser.tag_name(el).as_str(), "script" | "style" | "noscript") {
            continue;
        }
        let text = browser.own_text(el);
        if !is_bare_year(&text) {
            continue;
        }
        let label = clean_text(&text);
        match heading_region(browser, el)? {
            Some(scope) => sections.push(YearSection::new(Some(label), None, scope)),
            None => debug!(year = %label, "year text with no table around it"),
        }
    }
    Ok(sections)
}

/// The region a toggle opens: the element it names, else the table it
/// introduces, else the page body.
pub fn toggle_region<B: Browser>(
    browser: &mut B,
    toggle: ElementHandle,
) -> Result<Option<ElementHandle>> {
    if let Some(ids) = browser.attribute(toggle, "aria-controls") {
        for id in ids.split_whitespace() {
            if let Some(region) = element_by_id(browser, id)? {
                return Ok(Some(region));
            }
        }
    }
    for name in ["data-bs-target", "data-target"] {
        if let Some(selector) = browser.attribute(toggle, name) {
            // not every target is a valid selector
            if let Ok(found) = browser.find_all(&selector) {
                if let Some(&region) = found.first() {
                    return Ok(Some(region));
                }
            }
        }
    }
    if let Some(href) = browser.attribute(toggle, "href") {
        if let Some(id) = href.strip_prefix('#').filter(|id| !id.is_empty()) {
            if let Some(region) = element_by_id(browser, id)? {
                return Ok(Some(region));
            }
        }
    }
    if let Some(region) = heading_region(browser, toggle)? {
        return Ok(Some(region));
    }
    Ok(browser.find_all("body")?.first().copied())
}

/// Table belonging to a year heading: the table it sits in, else the first
/// table following it, else the closest ancestor holding a table.
pub fn heading_region<B: Browser>(
    browser: &mut B,
    heading: ElementHandle,
) -> Result<Option<ElementHandle>> {
    if let Some(table) = enclosing_table(browser, heading) {
        return Ok(Some(table));
    }
    if let Some(region) = following_table(browser, heading)? {
        return Ok(Some(region));
    }
    table_ancestor(browser, heading)
}

/// First later sibling that is or holds a table, climbing out of wrappers
/// that hold none. A sibling naming a bare year ends the search.
fn following_table<B: Browser>(
    browser: &mut B,
    element: ElementHandle,
) -> Result<Option<ElementHandle>> {
    let mut current = element;
    loop {
        let mut sibling = browser.next_sibling(current);
        while let Some(s) = sibling {
            if holds_table(browser, s)? {
                return Ok(Some(s));
            }
            if is_bare_year(&browser.text(s)) {
                return Ok(None);
            }
            sibling = browser.next_sibling(s);
        }
        match browser.parent(current) {
            Some(p) if !holds_table(browser, p)? => current = p,
            _ => return Ok(None),
        }
    }
}

fn holds_table<B: Browser>(browser: &mut B, element: ElementHandle) -> Result<bool> {
    Ok(browser.tag_name(element) == "table" || !browser.find_within(element, "table")?.is_empty())
}

/// Closest ancestor (or the element itself) that is or contains a table.
pub fn table_ancestor<B: Browser>(
    browser: &mut B,
    element: ElementHandle,
) -> Result<Option<ElementHandle>> {
    let mut current = Some(element);
    while let Some(el) = current {
        if holds_table(browser, el)? {
            return Ok(Some(el));
        }
        current = browser.parent(el);
    }
    Ok(None)
}

fn element_by_id<B: Browser>(browser: &mut B, id: &str) -> Result<Option<ElementHandle>> {
    if id.contains(['"', '\\']) {
        return Ok(None);
    }
    Ok(browser.find_all(&format!(r#"[id="{}"]"#, id))?.first().copied())
}
