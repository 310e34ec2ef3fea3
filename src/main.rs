use anyhow::Result;
use gazscraper::{config::CONFIG_ENV, scrape, ScraperConfig};
use std::{env, path::PathBuf, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = ScraperConfig::load(config_path.as_deref())?;
    info!(
        url = %config.target_url,
        output = %config.csv_filename.display(),
        "config loaded"
    );

    // ─── 3) scrape ───────────────────────────────────────────────────
    let start = Instant::now();
    let summary = scrape::run(&config, launch(&config)?)?;

    info!(
        sections = summary.sections,
        rows = summary.rows,
        columns = summary.columns,
        elapsed = ?start.elapsed(),
        "Scraping completed successfully"
    );
    Ok(())
}

#[cfg(feature = "chrome")]
fn launch(config: &ScraperConfig) -> Result<gazscraper::browser::ChromeBrowser> {
    gazscraper::browser::ChromeBrowser::launch(config.headless)
}

#[cfg(not(feature = "chrome"))]
fn launch(config: &ScraperConfig) -> Result<gazscraper::browser::StaticBrowser> {
    if !config.headless {
        info!("headless=false has no effect without the chrome feature");
    }
    Ok(gazscraper::browser::StaticBrowser::new())
}
