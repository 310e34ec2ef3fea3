pub mod browser;
pub mod config;
pub mod extract;
pub mod schema;
pub mod scrape;
pub mod sections;

pub use config::ScraperConfig;
pub use scrape::{run, RunSummary};
