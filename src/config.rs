// src/config.rs

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;
use url::Url;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "GAZSCRAPER_CONFIG";
const ENV_PREFIX: &str = "GAZSCRAPER_";

const DEFAULT_TARGET_URL: &str =
    "https://asic.gov.au/about-asic/corporate-publications/asic-gazette/asic-gazettes-2011-2020/";

/// Everything a run needs to know. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Page to scrape.
    pub target_url: String,
    /// Where the CSV goes.
    pub csv_filename: PathBuf,
    /// Base for resolving relative links.
    pub base_url: String,
    /// Only meaningful for the Chrome backend.
    pub headless: bool,
    /// Seconds to wait for the initial page load.
    pub page_load_timeout: u64,
    /// Seconds to wait for an expanded section to show rows.
    pub element_wait_timeout: u64,
    /// Seconds slept between sections.
    pub delay_between_years: f64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            csv_filename: PathBuf::from("asic_gazettes.csv"),
            base_url: "https://asic.gov.au".to_string(),
            headless: true,
            page_load_timeout: 30,
            element_wait_timeout: 10,
            delay_between_years: 1.0,
        }
    }
}

impl ScraperConfig {
    /// Defaults, overlaid with `path` (YAML) if given, then with
    /// `GAZSCRAPER_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        let config: Self =
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {:?}", path))?;
        debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Apply overrides looked up by upper-case option name (`TARGET_URL`, ...).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TARGET_URL") {
            self.target_url = v;
        }
        if let Some(v) = lookup("CSV_FILENAME") {
            self.csv_filename = PathBuf::from(v);
        }
        if let Some(v) = lookup("BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("HEADLESS") {
            self.headless = parse_bool(&v).with_context(|| format!("HEADLESS={}", v))?;
        }
        if let Some(v) = lookup("PAGE_LOAD_TIMEOUT") {
            self.page_load_timeout = v
                .trim()
                .parse()
                .with_context(|| format!("PAGE_LOAD_TIMEOUT={}", v))?;
        }
        if let Some(v) = lookup("ELEMENT_WAIT_TIMEOUT") {
            self.element_wait_timeout = v
                .trim()
                .parse()
                .with_context(|| format!("ELEMENT_WAIT_TIMEOUT={}", v))?;
        }
        if let Some(v) = lookup("DELAY_BETWEEN_YEARS") {
            self.delay_between_years = v
                .trim()
                .parse()
                .with_context(|| format!("DELAY_BETWEEN_YEARS={}", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.target_url)
            .with_context(|| format!("target_url {:?} is not an absolute URL", self.target_url))?;
        ensure!(self.page_load_timeout > 0, "page_load_timeout must be positive");
        ensure!(self.element_wait_timeout > 0, "element_wait_timeout must be positive");
        ensure!(
            self.delay_between_years.is_finite() && self.delay_between_years >= 0.0,
            "delay_between_years must be a non-negative number of seconds"
        );
        ensure!(
            !self.csv_filename.as_os_str().is_empty(),
            "csv_filename must not be empty"
        );
        Ok(())
    }

    /// Base for link resolution: `base_url`, else the target page itself.
    pub fn link_base(&self) -> Option<Url> {
        Url::parse(&self.base_url)
            .or_else(|_| Url::parse(&self.target_url))
            .ok()
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout)
    }

    pub fn element_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.element_wait_timeout)
    }

    pub fn delay_between_years(&self) -> Duration {
        Duration::from_secs_f64(self.delay_between_years.max(0.0))
    }
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("not a boolean: {}", other),
    }
}
