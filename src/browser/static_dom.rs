// src/browser/static_dom.rs

use anyhow::{anyhow, bail, Context, Result};
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{node::Element, ElementRef, Html, Selector};
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tracing::{debug, trace};
use url::Url;

use super::{Browser, ElementHandle};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

static WITH_ID: Lazy<Selector> = Lazy::new(|| Selector::parse("[id]").expect("static selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("static selector"));

/// One parsed page plus the state clicks have applied to it.
struct Page {
    html: Html,
    nodes: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    /// Toggles that have been clicked.
    expanded: HashSet<NodeId>,
    /// Regions opened by a clicked toggle.
    revealed: HashSet<NodeId>,
}

impl Page {
    fn new(html: Html) -> Self {
        Self {
            html,
            nodes: Vec::new(),
            index: HashMap::new(),
            expanded: HashSet::new(),
            revealed: HashSet::new(),
        }
    }

    fn intern(&mut self, id: NodeId) -> ElementHandle {
        if let Some(&i) = self.index.get(&id) {
            return ElementHandle(i);
        }
        let i = self.nodes.len();
        self.nodes.push(id);
        self.index.insert(id, i);
        ElementHandle(i)
    }

    fn node(&self, handle: ElementHandle) -> Option<NodeId> {
        self.nodes.get(handle.0).copied()
    }

    fn element(&self, handle: ElementHandle) -> Option<ElementRef<'_>> {
        let id = self.node(handle)?;
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.html
            .select(&WITH_ID)
            .find(|e| e.value().id() == Some(id))
            .map(|e| e.id())
    }

    /// Open whatever region `toggle` controls.
    fn reveal_targets(&mut self, toggle: NodeId) {
        let Some(el) = self.html.tree.get(toggle).and_then(ElementRef::wrap) else {
            return;
        };
        let attrs = el.value();
        let mut targets = Vec::new();

        if let Some(ids) = attrs.attr("aria-controls") {
            targets.extend(ids.split_whitespace().filter_map(|id| self.element_by_id(id)));
        }
        for name in ["data-bs-target", "data-target"] {
            if let Some(sel) = attrs.attr(name).and_then(|s| Selector::parse(s).ok()) {
                targets.extend(self.html.select(&sel).map(|e| e.id()));
            }
        }
        if let Some(fragment) = attrs.attr("href").and_then(|h| h.strip_prefix('#')) {
            if !fragment.is_empty() {
                targets.extend(self.element_by_id(fragment));
            }
        }
        if attrs.name() == "summary" {
            if let Some(parent) = el.parent().and_then(ElementRef::wrap) {
                if parent.value().name() == "details" {
                    targets.push(parent.id());
                }
            }
        }

        trace!(count = targets.len(), "revealing regions");
        self.revealed.extend(targets);
    }
}

fn hidden_by_markup(el: &Element) -> bool {
    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }
    let inline_none = el
        .attr("style")
        .map(|s| {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase()
                .contains("display:none")
        })
        .unwrap_or(false);
    if inline_none {
        return true;
    }
    let mut collapse = false;
    let mut shown = false;
    for class in el.classes() {
        match class {
            "collapse" => collapse = true,
            "show" | "in" => shown = true,
            _ => {}
        }
    }
    collapse && !shown
}

/// In-memory DOM backend. Pages come from a plain HTTP fetch or from a
/// snapshot handed over by a rendering backend.
pub struct StaticBrowser {
    client: Option<Client>,
    page: Option<Page>,
    closed: bool,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self {
            client: None,
            page: None,
            closed: false,
        }
    }

    /// Build a browser already showing `html`, as if loaded from `url`.
    pub fn from_html(html: &str, url: Option<&str>) -> Self {
        let mut browser = Self::new();
        browser.load_html(html, url.and_then(|u| Url::parse(u).ok()));
        browser
    }

    /// Replace the current page with `html`. Outstanding handles go stale.
    pub fn load_html(&mut self, html: &str, url: Option<Url>) {
        let doc = Html::parse_document(html);
        debug!(bytes = html.len(), url = ?url.as_ref().map(Url::as_str), "page loaded");
        self.page = Some(Page::new(doc));
    }

    fn client(&mut self) -> Result<Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .gzip(true)
            .build()
            .context("building HTTP client")?;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn page_mut(&mut self) -> Result<&mut Page> {
        if self.closed {
            bail!("browser has already quit");
        }
        self.page.as_mut().ok_or_else(|| anyhow!("no page loaded"))
    }

    fn parse_selector(selector: &str) -> Result<Selector> {
        Selector::parse(selector).map_err(|e| anyhow!("invalid CSS selector {:?}: {:?}", selector, e))
    }
}

impl Default for StaticBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Browser for StaticBrowser {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        if self.closed {
            bail!("browser has already quit");
        }
        let target = Url::parse(url).with_context(|| format!("parsing URL {}", url))?;

        // saved snapshots load straight from disk
        if target.scheme() == "file" {
            let path = target
                .to_file_path()
                .map_err(|_| anyhow!("not a local path: {}", target))?;
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {:?}", path))?;
            self.load_html(&body, Some(target));
            return Ok(());
        }

        let client = self.client()?;
        debug!(%target, ?timeout, "fetching page");
        let body = client
            .get(target.clone())
            .timeout(timeout)
            .send()
            .with_context(|| format!("GET {} failed", target))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", target))?
            .text()
            .with_context(|| format!("Reading text from {}", target))?;
        self.load_html(&body, Some(target));
        Ok(())
    }

    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        let sel = Self::parse_selector(selector)?;
        let page = self.page_mut()?;
        let ids: Vec<NodeId> = page.html.select(&sel).map(|e| e.id()).collect();
        Ok(ids.into_iter().map(|id| page.intern(id)).collect())
    }

    fn find_within(&mut self, scope: ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        let sel = Self::parse_selector(selector)?;
        let page = self.page_mut()?;
        let root = page
            .element(scope)
            .ok_or_else(|| anyhow!("stale element handle {:?}", scope))?;
        let root_id = root.id();
        let ids: Vec<NodeId> = root
            .select(&sel)
            .map(|e| e.id())
            .filter(|&id| id != root_id)
            .collect();
        Ok(ids.into_iter().map(|id| page.intern(id)).collect())
    }

    fn click(&mut self, element: ElementHandle) -> Result<()> {
        let page = self.page_mut()?;
        let id = page
            .node(element)
            .ok_or_else(|| anyhow!("stale element handle {:?}", element))?;
        if !page.expanded.insert(id) {
            trace!(?element, "already expanded");
            return Ok(());
        }
        page.reveal_targets(id);
        Ok(())
    }

    fn text(&self, element: ElementHandle) -> String {
        self.page
            .as_ref()
            .and_then(|p| p.element(element))
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default()
    }

    fn own_text(&self, element: ElementHandle) -> String {
        self.page
            .as_ref()
            .and_then(|p| p.element(element))
            .map(|e| {
                e.children()
                    .filter_map(|c| c.value().as_text())
                    .map(|t| &**t)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<String> {
        let page = self.page.as_ref()?;
        let el = page.element(element)?;
        if name == "aria-expanded" && page.expanded.contains(&el.id()) {
            return Some("true".to_string());
        }
        el.value().attr(name).map(str::to_string)
    }

    fn tag_name(&self, element: ElementHandle) -> String {
        self.page
            .as_ref()
            .and_then(|p| p.element(element))
            .map(|e| e.value().name().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn parent(&mut self, element: ElementHandle) -> Option<ElementHandle> {
        let page = self.page.as_mut()?;
        let parent = page
            .element(element)?
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| p.id())?;
        Some(page.intern(parent))
    }

    fn next_sibling(&mut self, element: ElementHandle) -> Option<ElementHandle> {
        let page = self.page.as_mut()?;
        let next = page
            .element(element)?
            .next_siblings()
            .find_map(ElementRef::wrap)
            .map(|e| e.id())?;
        Some(page.intern(next))
    }

    fn is_visible(&self, element: ElementHandle) -> bool {
        let Some(page) = self.page.as_ref() else {
            return false;
        };
        let Some(el) = page.element(element) else {
            return false;
        };

        let mut current = Some(el);
        while let Some(e) = current {
            if hidden_by_markup(e.value()) && !page.revealed.contains(&e.id()) {
                return false;
            }
            let parent = e.parent().and_then(ElementRef::wrap);
            if let Some(p) = parent {
                let closed_details = p.value().name() == "details"
                    && p.value().attr("open").is_none()
                    && !page.revealed.contains(&p.id());
                if closed_details && e.value().name() != "summary" {
                    return false;
                }
            }
            current = parent;
        }
        true
    }

    fn title(&self) -> Option<String> {
        let page = self.page.as_ref()?;
        page.html
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    fn quit(&mut self) -> Result<()> {
        self.page = None;
        self.client = None;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCORDION: &str = r##"
        <html><head><title>Gazettes</title></head><body>
          <button id="t1" aria-expanded="false" aria-controls="c1">2020</button>
          <div id="c1" class="collapse"><table><tr><td>x</td></tr></table></div>
          <a id="t2" href="#c2">2019</a>
          <div id="c2" hidden><p>inside</p></div>
          <details><summary>2018</summary><p id="d">body</p></details>
        </body></html>
    "##;

    #[test]
    fn finds_elements_in_document_order() {
        let mut b = StaticBrowser::from_html(ACCORDION, None);
        let toggles = b.find_all("#t1, #t2").unwrap();
        assert_eq!(toggles.len(), 2);
        assert_eq!(b.text(toggles[0]), "2020");
        assert_eq!(b.tag_name(toggles[1]), "a");
        assert_eq!(b.title().as_deref(), Some("Gazettes"));
    }

    #[test]
    fn find_within_excludes_the_scope_itself() {
        let mut b = StaticBrowser::from_html("<div id='o'><div id='i'></div></div>", None);
        let outer = b.find_all("#o").unwrap()[0];
        let inner = b.find_within(outer, "div").unwrap();
        assert_eq!(inner.len(), 1);
        assert_eq!(b.attribute(inner[0], "id").as_deref(), Some("i"));
    }

    #[test]
    fn click_reveals_controlled_region() {
        let mut b = StaticBrowser::from_html(ACCORDION, None);
        let toggle = b.find_all("#t1").unwrap()[0];
        let cell = b.find_all("td").unwrap()[0];
        assert!(!b.is_visible(cell));
        assert_eq!(b.attribute(toggle, "aria-expanded").as_deref(), Some("false"));

        b.click(toggle).unwrap();
        assert!(b.is_visible(cell));
        assert_eq!(b.attribute(toggle, "aria-expanded").as_deref(), Some("true"));

        // second click keeps it open
        b.click(toggle).unwrap();
        assert!(b.is_visible(cell));
    }

    #[test]
    fn click_follows_fragment_links_and_summaries() {
        let mut b = StaticBrowser::from_html(ACCORDION, None);
        let inside = b.find_all("#c2 p").unwrap()[0];
        let body = b.find_all("#d").unwrap()[0];
        assert!(!b.is_visible(inside));
        assert!(!b.is_visible(body));

        let link = b.find_all("#t2").unwrap()[0];
        b.click(link).unwrap();
        assert!(b.is_visible(inside));

        let summary = b.find_all("summary").unwrap()[0];
        assert!(b.is_visible(summary));
        b.click(summary).unwrap();
        assert!(b.is_visible(body));
    }

    #[test]
    fn own_text_skips_nested_elements() {
        let mut b = StaticBrowser::from_html("<p id='p'>2020 <b>bold</b> tail</p>", None);
        let p = b.find_all("#p").unwrap()[0];
        assert_eq!(b.own_text(p), "2020  tail");
        assert_eq!(b.text(p), "2020 bold tail");
    }

    #[test]
    fn next_sibling_skips_text_nodes() {
        let mut b = StaticBrowser::from_html("<div><h3 id='h'>2014</h3> text <table></table></div>", None);
        let heading = b.find_all("#h").unwrap()[0];
        let table = b.next_sibling(heading).unwrap();
        assert_eq!(b.tag_name(table), "table");
        assert_eq!(b.next_sibling(table), None);
    }

    #[test]
    fn parent_walks_up_to_html() {
        let mut b = StaticBrowser::from_html("<table><tr><td id='c'>1</td></tr></table>", None);
        let cell = b.find_all("#c").unwrap()[0];
        let mut tags = Vec::new();
        let mut cur = b.parent(cell);
        while let Some(p) = cur {
            tags.push(b.tag_name(p));
            cur = b.parent(p);
        }
        assert_eq!(tags, vec!["tr", "tbody", "table", "body", "html"]);
    }

    #[test]
    fn quit_invalidates_the_page() {
        let mut b = StaticBrowser::from_html(ACCORDION, None);
        b.quit().unwrap();
        assert!(b.find_all("button").is_err());
        assert!(b.navigate("https://example.com", Duration::from_secs(1)).is_err());
        assert_eq!(b.title(), None);
    }

    #[test]
    fn navigate_reads_file_urls() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("page.html");
        std::fs::write(&path, ACCORDION).unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let mut b = StaticBrowser::new();
        b.navigate(url.as_str(), Duration::from_secs(1)).unwrap();
        assert_eq!(b.find_all("button").unwrap().len(), 1);
    }

    #[test]
    fn navigate_to_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(tmp.path().join("absent.html")).unwrap();
        let mut b = StaticBrowser::new();
        assert!(b.navigate(url.as_str(), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let mut b = StaticBrowser::from_html(ACCORDION, None);
        assert!(b.find_all("[[").is_err());
    }
}
