// src/browser/chrome.rs

use anyhow::{anyhow, bail, Context, Result};
use headless_chrome::{Browser as Chrome, LaunchOptions, Tab};
use std::{ffi::OsStr, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

use super::{Browser, ElementHandle, StaticBrowser};

/// Renders the page in headless Chrome, then serves every query from a
/// snapshot of the rendered DOM.
pub struct ChromeBrowser {
    chrome: Option<(Chrome, Arc<Tab>)>,
    snapshot: StaticBrowser,
}

impl ChromeBrowser {
    pub fn launch(headless: bool) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
            ])
            .build()
            .map_err(|e| anyhow!("building Chrome launch options: {}", e))?;
        let chrome = Chrome::new(options).map_err(|e| anyhow!("Failed to launch Chrome: {}", e))?;
        let tab = chrome
            .new_tab()
            .map_err(|e| anyhow!("Failed to create tab: {}", e))?;
        info!(headless, "Chrome initialized");
        Ok(Self {
            chrome: Some((chrome, tab)),
            snapshot: StaticBrowser::new(),
        })
    }
}

impl Browser for ChromeBrowser {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let Some((_, tab)) = &self.chrome else {
            bail!("browser has already quit");
        };
        let target = Url::parse(url).with_context(|| format!("parsing URL {}", url))?;
        tab.set_default_timeout(timeout);
        tab.navigate_to(target.as_str())
            .map_err(|e| anyhow!("Navigation failed: {}", e))?;
        tab.wait_until_navigated()
            .map_err(|e| anyhow!("Page load failed: {}", e))?;
        let html = tab
            .get_content()
            .map_err(|e| anyhow!("Reading rendered DOM failed: {}", e))?;
        debug!(%target, bytes = html.len(), "rendered page captured");
        self.snapshot.load_html(&html, Some(target));
        Ok(())
    }

    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        self.snapshot.find_all(selector)
    }

    fn find_within(&mut self, scope: ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
        self.snapshot.find_within(scope, selector)
    }

    fn click(&mut self, element: ElementHandle) -> Result<()> {
        self.snapshot.click(element)
    }

    fn text(&self, element: ElementHandle) -> String {
        self.snapshot.text(element)
    }

    fn own_text(&self, element: ElementHandle) -> String {
        self.snapshot.own_text(element)
    }

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<String> {
        self.snapshot.attribute(element, name)
    }

    fn tag_name(&self, element: ElementHandle) -> String {
        self.snapshot.tag_name(element)
    }

    fn parent(&mut self, element: ElementHandle) -> Option<ElementHandle> {
        self.snapshot.parent(element)
    }

    fn next_sibling(&mut self, element: ElementHandle) -> Option<ElementHandle> {
        self.snapshot.next_sibling(element)
    }

    fn is_visible(&self, element: ElementHandle) -> bool {
        self.snapshot.is_visible(element)
    }

    fn title(&self) -> Option<String> {
        self.snapshot.title()
    }

    fn quit(&mut self) -> Result<()> {
        // dropping the handle kills the Chrome process
        if self.chrome.take().is_some() {
            info!("Chrome closed");
        }
        self.snapshot.quit()
    }
}
