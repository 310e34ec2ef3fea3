// src/browser/mod.rs

use anyhow::Result;
use std::{
    ops::{Deref, DerefMut},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod static_dom;

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use static_dom::StaticBrowser;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque reference to one element of the currently loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub(crate) usize);

/// The narrow slice of a browser the scraper depends on.
///
/// Handles returned by one page load are only meaningful until the next
/// `navigate` or `quit`.
pub trait Browser {
    /// Load `url`, failing if the page is not available within `timeout`.
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// All elements on the page matching a CSS selector, in document order.
    fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Descendants of `scope` matching a CSS selector, in document order.
    fn find_within(&mut self, scope: ElementHandle, selector: &str) -> Result<Vec<ElementHandle>>;

    fn click(&mut self, element: ElementHandle) -> Result<()>;

    /// Full text content of the element and its descendants.
    fn text(&self, element: ElementHandle) -> String;

    /// Only the text nodes that are direct children of the element.
    fn own_text(&self, element: ElementHandle) -> String;

    fn attribute(&self, element: ElementHandle, name: &str) -> Option<String>;

    /// Lower-case tag name, empty for a stale handle.
    fn tag_name(&self, element: ElementHandle) -> String;

    fn parent(&mut self, element: ElementHandle) -> Option<ElementHandle>;

    /// Next sibling that is an element, skipping text in between.
    fn next_sibling(&mut self, element: ElementHandle) -> Option<ElementHandle>;

    fn is_visible(&self, element: ElementHandle) -> bool;

    /// Document title, if the page has one.
    fn title(&self) -> Option<String>;

    /// Release every resource held by the browser.
    fn quit(&mut self) -> Result<()>;

    /// Poll `condition` until it holds or `timeout` elapses.
    fn wait_until<F>(&mut self, timeout: Duration, mut condition: F) -> bool
    where
        Self: Sized,
        F: FnMut(&mut Self) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(self) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Owns the browser for the length of one run and quits it exactly once.
///
/// Call [`BrowserSession::release`] on the happy path; every other exit
/// (an early `?`, a panic unwinding) is covered by `Drop`.
pub struct BrowserSession<B: Browser> {
    browser: B,
    released: bool,
}

impl<B: Browser> BrowserSession<B> {
    pub fn new(browser: B) -> Self {
        Self {
            browser,
            released: false,
        }
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        debug!("releasing browser");
        self.browser.quit()
    }
}

impl<B: Browser> Deref for BrowserSession<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.browser
    }
}

impl<B: Browser> DerefMut for BrowserSession<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.browser
    }
}

impl<B: Browser> Drop for BrowserSession<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!("releasing browser on early exit");
        if let Err(e) = self.browser.quit() {
            warn!(error = %e, "browser did not shut down cleanly");
        }
    }
}
