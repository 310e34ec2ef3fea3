// src/scrape.rs

use anyhow::{ensure, Context, Result};
use std::{collections::BTreeMap, path::PathBuf, thread};
use tracing::{info, instrument, warn};
use url::Url;

use crate::browser::{Browser, BrowserSession};
use crate::config::ScraperConfig;
use crate::extract::{harvest_tables, GazetteRow};
use crate::schema::{max_links, write_csv, ColumnSchema};
use crate::sections::{locate_sections, YearSection};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sections: usize,
    pub rows: usize,
    pub columns: usize,
    /// Most links seen in one cell, per document field.
    pub max_links: BTreeMap<String, usize>,
    /// `None` when there was nothing to write.
    pub output: Option<PathBuf>,
}

/// Scrape `config.target_url` with `browser` and write the CSV.
///
/// The browser is quit exactly once whichever way this returns. The only
/// error is a page that never loads; in that case no file is written.
pub fn run<B: Browser>(config: &ScraperConfig, browser: B) -> Result<RunSummary> {
    let mut session = BrowserSession::new(browser);
    let (sections, rows) = scrape_rows(config, &mut *session)?;
    if let Err(e) = session.release() {
        warn!(error = %e, "browser did not shut down cleanly");
    }

    let schema = ColumnSchema::from_rows(&rows);
    let links = max_links(&rows);
    info!(?links, "Max links found");

    let output = if rows.is_empty() {
        warn!("No data to save");
        None
    } else {
        write_csv(&config.csv_filename, &schema, &rows)?;
        Some(config.csv_filename.clone())
    };

    Ok(RunSummary {
        sections,
        rows: rows.len(),
        columns: schema.len(),
        max_links: links,
        output,
    })
}

/// Load the page, find its year sections and harvest them in order.
///
/// Returns the number of sections visited and every row collected.
pub fn scrape_rows<B: Browser>(
    config: &ScraperConfig,
    browser: &mut B,
) -> Result<(usize, Vec<GazetteRow>)> {
    info!(url = %config.target_url, "Starting scrape");
    load_page(config, browser)?;

    let mut sections = locate_sections(browser)?;
    let base = config.link_base();

    let mut all_rows = Vec::new();
    for (i, section) in sections.iter_mut().enumerate() {
        match harvest_section(config, browser, section, base.as_ref()) {
            Ok(rows) => {
                info!(
                    section = %section.name(),
                    index = i + 1,
                    rows = rows.len(),
                    "Extracted rows"
                );
                all_rows.extend(rows);
            }
            Err(e) => warn!(section = %section.name(), error = %e, "section skipped"),
        }
    }

    info!(rows = all_rows.len(), "Total rows extracted");
    Ok((sections.len(), all_rows))
}

fn load_page<B: Browser>(config: &ScraperConfig, browser: &mut B) -> Result<()> {
    let timeout = config.page_load_timeout();
    browser
        .navigate(&config.target_url, timeout)
        .with_context(|| format!("loading {}", config.target_url))?;
    let ready = browser.wait_until(timeout, |b| {
        b.find_all("body").map(|found| !found.is_empty()).unwrap_or(false)
    });
    ensure!(ready, "{} never produced a page body", config.target_url);
    info!(title = ?browser.title(), "page loaded");
    Ok(())
}

#[instrument(level = "info", skip_all, fields(section = %section.name()))]
fn harvest_section<B: Browser>(
    config: &ScraperConfig,
    browser: &mut B,
    section: &mut YearSection,
    base: Option<&Url>,
) -> Result<Vec<GazetteRow>> {
    section.expand(browser, config.element_wait_timeout())?;
    thread::sleep(config.delay_between_years());
    harvest_tables(browser, section.scope, section.label.as_deref(), base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ElementHandle, StaticBrowser};
    use std::{cell::Cell, fs, rc::Rc, time::Duration};
    use tempfile::tempdir;

    const GAZETTE_PAGE: &str = r#"
        <html><head><title>ASIC Gazettes 2011-2020</title></head><body>
        <div class="accordion">
          <h3><button class="accordion-button" aria-expanded="false" aria-controls="c2020">2020</button></h3>
          <div id="c2020" class="collapse">
            <table>
              <thead><tr><th>Date</th><th>ASIC Gazette</th><th>Business Gazette</th><th>Other / Notes</th></tr></thead>
              <tbody>
                <tr><td>01 Jan 2020</td>
                    <td><a href="/media/a01-20.pdf">ASIC Gazette A01/20</a></td>
                    <td><a href="/media/b01-20.pdf">Business Gazette B01/20</a></td>
                    <td>Notice text, no link</td></tr>
              </tbody>
            </table>
          </div>
          <h3><button class="accordion-button" aria-expanded="false" aria-controls="c2019">2019</button></h3>
          <div id="c2019" class="collapse">
            <table>
              <thead><tr><th>Date</th><th>ASIC</th><th>Business</th><th>Other</th><th>Notes</th></tr></thead>
              <tbody>
                <tr><td>05 Mar 2019</td>
                    <td><a href="/media/a05-19.pdf">A05/19</a><br><a href="/media/a05-19s.pdf">A05/19 supplement</a></td>
                    <td></td>
                    <td><a href="/media/doc-a.pdf">Doc A</a> <a href="/media/doc-b.pdf">Doc B</a></td>
                    <td>Replaces earlier issue</td></tr>
                <tr><td>broken row</td></tr>
              </tbody>
            </table>
          </div>
        </div>
        </body></html>
    "#;

    fn config_for(dir: &std::path::Path, page: &str) -> ScraperConfig {
        let page_path = dir.join("page.html");
        fs::write(&page_path, page).unwrap();
        ScraperConfig {
            target_url: Url::from_file_path(&page_path).unwrap().to_string(),
            csv_filename: dir.join("out.csv"),
            element_wait_timeout: 1,
            page_load_timeout: 1,
            delay_between_years: 0.0,
            ..ScraperConfig::default()
        }
    }

    #[test]
    fn end_to_end_writes_unified_csv() {
        let tmp = tempdir().unwrap();
        let config = config_for(tmp.path(), GAZETTE_PAGE);

        let summary = run(&config, StaticBrowser::new()).unwrap();
        assert_eq!(summary.sections, 2);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.output.as_deref(), Some(config.csv_filename.as_path()));
        assert_eq!(summary.max_links.get("ASIC Gazette"), Some(&2));
        assert_eq!(summary.max_links.get("Other"), Some(&2));

        let mut reader = csv::Reader::from_path(&config.csv_filename).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(&headers[..2], &["Year", "Date"]);
        assert_eq!(headers.len(), summary.columns);

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();

        assert_eq!(&rows[0][col("Year")], "2020");
        assert_eq!(&rows[0][col("Other / Notes")], "Notice text, no link");
        assert_eq!(
            &rows[0][col("ASIC Gazette_Url")],
            "https://asic.gov.au/media/a01-20.pdf"
        );
        // fields only the 2019 layout has are blank for 2020
        assert_eq!(&rows[0][col("Other_title_1")], "");

        assert_eq!(&rows[1][col("Year")], "2019");
        assert_eq!(&rows[1][col("ASIC Gazette_title_1")], "A05/19 supplement");
        assert_eq!(&rows[1][col("Other_title")], "Doc A");
        assert_eq!(&rows[1][col("Other_Url_1")], "https://asic.gov.au/media/doc-b.pdf");
        assert_eq!(&rows[1][col("Notes")], "Replaces earlier issue");
        assert_eq!(&rows[1][col("Other / Notes")], "");
    }

    #[test]
    fn harvesting_twice_gives_the_same_rows() {
        let tmp = tempdir().unwrap();
        let config = config_for(tmp.path(), GAZETTE_PAGE);
        let mut browser = StaticBrowser::new();
        load_page(&config, &mut browser).unwrap();
        let mut sections = locate_sections(&mut browser).unwrap();
        let base = config.link_base();

        let first = harvest_section(&config, &mut browser, &mut sections[0], base.as_ref()).unwrap();
        let second = harvest_section(&config, &mut browser, &mut sections[0], base.as_ref()).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn page_without_sections_is_harvested_whole() {
        let tmp = tempdir().unwrap();
        let page = r#"<html><body>
            <table><tr><td>1 Jan</td><td>a</td><td>b</td><td>n</td></tr></table>
        </body></html>"#;
        let config = config_for(tmp.path(), page);
        let mut browser = StaticBrowser::new();
        let (sections, rows) = scrape_rows(&config, &mut browser).unwrap();
        assert_eq!(sections, 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Year"), None);
    }

    #[test]
    fn flat_year_headings_keep_their_own_years() {
        let tmp = tempdir().unwrap();
        let page = r#"<html><body><div class="content">
            <h3>2014</h3>
            <table><tr><td>1 Jan 2014</td><td>a</td><td>b</td><td>n</td></tr></table>
            <h3>2013</h3>
            <table><tr><td>1 Jan 2013</td><td>a</td><td>b</td><td>n</td></tr></table>
        </div></body></html>"#;
        let config = config_for(tmp.path(), page);
        let mut browser = StaticBrowser::new();
        let (sections, rows) = scrape_rows(&config, &mut browser).unwrap();
        assert_eq!(sections, 2);
        let pairs: Vec<_> = rows
            .iter()
            .map(|r| (r.get("Year").unwrap(), r.get("Date").unwrap()))
            .collect();
        assert_eq!(pairs, vec![("2014", "1 Jan 2014"), ("2013", "1 Jan 2013")]);
    }

    #[test]
    fn empty_page_writes_nothing() {
        let tmp = tempdir().unwrap();
        let config = config_for(tmp.path(), "<html><body><p>maintenance</p></body></html>");
        let summary = run(&config, StaticBrowser::new()).unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.output, None);
        assert!(!config.csv_filename.exists());
    }

    /// Fails every navigation and counts how often it is shut down.
    struct Unreachable {
        quits: Rc<Cell<usize>>,
    }

    impl Browser for Unreachable {
        fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
            anyhow::bail!("timed out after {:?} loading {}", timeout, url)
        }
        fn find_all(&mut self, _selector: &str) -> Result<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
        fn find_within(&mut self, _scope: ElementHandle, _selector: &str) -> Result<Vec<ElementHandle>> {
            Ok(Vec::new())
        }
        fn click(&mut self, _element: ElementHandle) -> Result<()> {
            Ok(())
        }
        fn text(&self, _element: ElementHandle) -> String {
            String::new()
        }
        fn own_text(&self, _element: ElementHandle) -> String {
            String::new()
        }
        fn attribute(&self, _element: ElementHandle, _name: &str) -> Option<String> {
            None
        }
        fn tag_name(&self, _element: ElementHandle) -> String {
            String::new()
        }
        fn parent(&mut self, _element: ElementHandle) -> Option<ElementHandle> {
            None
        }
        fn next_sibling(&mut self, _element: ElementHandle) -> Option<ElementHandle> {
            None
        }
        fn is_visible(&self, _element: ElementHandle) -> bool {
            false
        }
        fn title(&self) -> Option<String> {
            None
        }
        fn quit(&mut self) -> Result<()> {
            self.quits.set(self.quits.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn page_load_failure_aborts_and_releases_once() {
        let tmp = tempdir().unwrap();
        let config = ScraperConfig {
            csv_filename: tmp.path().join("never.csv"),
            ..ScraperConfig::default()
        };
        let quits = Rc::new(Cell::new(0));

        let err = run(&config, Unreachable { quits: quits.clone() }).unwrap_err();

        assert!(format!("{:#}", err).contains("timed out"));
        assert_eq!(quits.get(), 1);
        assert!(!config.csv_filename.exists());
    }

    #[test]
    fn successful_run_also_releases_once() {
        let tmp = tempdir().unwrap();
        let config = config_for(tmp.path(), GAZETTE_PAGE);

        struct Tracked {
            inner: StaticBrowser,
            quits: Rc<Cell<usize>>,
        }
        impl Browser for Tracked {
            fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
                self.inner.navigate(url, timeout)
            }
            fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
                self.inner.find_all(selector)
            }
            fn find_within(&mut self, scope: ElementHandle, selector: &str) -> Result<Vec<ElementHandle>> {
                self.inner.find_within(scope, selector)
            }
            fn click(&mut self, element: ElementHandle) -> Result<()> {
                self.inner.click(element)
            }
            fn text(&self, element: ElementHandle) -> String {
                self.inner.text(element)
            }
            fn own_text(&self, element: ElementHandle) -> String {
                self.inner.own_text(element)
            }
            fn attribute(&self, element: ElementHandle, name: &str) -> Option<String> {
                self.inner.attribute(element, name)
            }
            fn tag_name(&self, element: ElementHandle) -> String {
                self.inner.tag_name(element)
            }
            fn parent(&mut self, element: ElementHandle) -> Option<ElementHandle> {
                self.inner.parent(element)
            }
            fn next_sibling(&mut self, element: ElementHandle) -> Option<ElementHandle> {
                self.inner.next_sibling(element)
            }
            fn is_visible(&self, element: ElementHandle) -> bool {
                self.inner.is_visible(element)
            }
            fn title(&self) -> Option<String> {
                self.inner.title()
            }
            fn quit(&mut self) -> Result<()> {
                self.quits.set(self.quits.get() + 1);
                self.inner.quit()
            }
        }

        let quits = Rc::new(Cell::new(0));
        let browser = Tracked {
            inner: StaticBrowser::new(),
            quits: quits.clone(),
        };
        run(&config, browser).unwrap();
        assert_eq!(quits.get(), 1);
    }
}
