//! Command-line interface definitions.
//!
//! Global options select the configuration file and the WebDriver endpoint;
//! the subcommand selects which kind of entity is scraped. Global options can
//! also be provided through environment variables.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Command-line arguments for the review scraper.
///
/// # Examples
///
/// ```sh
/// # Scrape one business listing and its reviews
/// contrib_scraper business --name "Cafe Uno"
///
/// # Scrape every reviewer of that business, resuming at a given contributor
/// contrib_scraper contributors --source entityreviews.csv --target "Cafe Uno" --resume 1234567890
///
/// # Use a YAML config and a remote headless browser
/// contrib_scraper --config scraper.yaml --webdriver-url http://grid:4444 --headless business --name "Cafe Uno"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, env = "SCRAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// WebDriver endpoint (overrides the configuration file)
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Scrape contributor profiles listed in a source table
    Contributors {
        /// Source table with reviewer identifiers (defaults to the configured one)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Only take reviewers of these businesses (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Start at the first occurrence of this contributor id
        #[arg(short, long)]
        resume: Option<String>,

        /// Archive stitched screenshots of each contributor's reviews
        #[arg(long)]
        screenshots: bool,
    },
    /// Scrape one business listing and its reviews
    Business {
        /// Business name as shown on the listing
        #[arg(short, long)]
        name: String,

        /// Skip the stitched screenshot of the review list
        #[arg(long)]
        no_screenshots: bool,
    },
}

impl Cli {
    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.webdriver_url {
            config.driver.webdriver_url = url.clone();
        }
        if self.headless {
            config.driver.headless = true;
        }
        if let Command::Contributors {
            source: Some(source),
            ..
        } = &self.command
        {
            config.paths.source_table = source.clone();
        }
    }
}
