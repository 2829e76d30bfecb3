//! Immutable run configuration.
//!
//! A [`Config`] is assembled once in `main` (defaults, then an optional YAML
//! file, then CLI overrides) and handed to each component by reference. No
//! component reads paths, schemas or markup signatures from anywhere else.
//!
//! # YAML overrides
//!
//! Every section and field is optional; missing fields keep their defaults.
//!
//! ```yaml
//! wait:
//!   settle_ms: 1500
//!   max_scroll_rounds: 400
//! paths:
//!   image_dir: ./shots
//! selectors:
//!   review_block: { class: WNxzHc }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};
use crate::page::Locator;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub columns: SourceColumns,
    pub schemas: Schemas,
    pub selectors: Selectors,
    pub wait: WaitConfig,
    pub urls: Urls,
    pub driver: DriverConfig,
}

/// Output and input locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Source table for the contributor queue (the business reviews table).
    pub source_table: PathBuf,
    pub contributor_summary: PathBuf,
    pub contribution_detail: PathBuf,
    pub business_summary: PathBuf,
    pub business_reviews: PathBuf,
    pub image_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            source_table: PathBuf::from("entityreviews.csv"),
            contributor_summary: PathBuf::from("contributorsummary.csv"),
            contribution_detail: PathBuf::from("contributordetails.csv"),
            business_summary: PathBuf::from("entitysummary.csv"),
            business_reviews: PathBuf::from("entityreviews.csv"),
            image_dir: PathBuf::from("images"),
        }
    }
}

/// Column names the identifier queue requires in its source table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceColumns {
    pub identifier: String,
    pub owning_entity: String,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            identifier: "Reviewer_ID".into(),
            owning_entity: "BusinessName".into(),
        }
    }
}

/// Header rows of every output table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Schemas {
    /// Leading columns of the contributor summary, before the counts.
    pub summary_prefix: Vec<String>,
    /// Contribution-type labels, in the order the profile page lists them.
    pub contribution_types: Vec<String>,
    pub detail: Vec<String>,
    pub business_summary: Vec<String>,
    pub business_reviews: Vec<String>,
}

impl Schemas {
    /// Full contributor summary header: prefix followed by the type counts.
    pub fn summary(&self) -> Vec<String> {
        self.summary_prefix
            .iter()
            .chain(self.contribution_types.iter())
            .cloned()
            .collect()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Schemas {
    fn default() -> Self {
        Self {
            summary_prefix: strings(&["Reviewer_ID", "Name", "Localguide", "ScrapedDate"]),
            contribution_types: strings(&[
                "Reviews", "Ratings", "Photos", "Videos", "Captions", "Answers", "Edits",
                "Reported", "Places", "Roads", "Facts", "Q&A",
            ]),
            detail: strings(&[
                "Reviewer_ID",
                "ContributionType",
                "BusinessName",
                "BusinessAddress",
                "Ratings",
                "ContributionDate",
                "ScrapedDate",
                "Reviews",
            ]),
            business_summary: strings(&[
                "BusinessName",
                "BusinessAddress",
                "Category",
                "Ratings",
                "#Reviews",
                "ScrapedDate",
            ]),
            business_reviews: strings(&[
                "BusinessName",
                "BusinessAddress",
                "Reviewer_ID",
                "Name",
                "Ratings",
                "ContributionDate",
                "ScrapedDate",
                "Reviews",
            ]),
        }
    }
}

/// Markup signatures located on the review pages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub contributor_name: Locator,
    pub contributions_entry: Locator,
    pub contribution_type: Locator,
    pub contribution_count: Locator,
    pub dialog_close: Locator,
    pub tab: Locator,
    pub reviews_region: Locator,
    pub photos_region: Locator,
    /// Class carried by a direct child of a region that has no content.
    pub empty_marker: String,
    pub see_more: Locator,
    pub review_block: Locator,
    pub photo_block: Locator,
    pub rating_date_group: Locator,
    pub rating_tag: String,
    pub date_tag: String,
    pub review_text: Locator,
    pub search_box: Locator,
    pub search_option: Locator,
    pub business_name: Locator,
    pub business_address: Locator,
    pub business_category: Locator,
    pub business_rating: Locator,
    pub main_region: Locator,
    /// Position of the scrollable reviews pane among the main region's children.
    pub business_review_pane_index: usize,
    pub business_review_list: Locator,
    pub reviewer_link: Locator,
    pub reviewer_link_attribute: String,
    pub reviewer_name: Locator,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            contributor_name: Locator::class("geAzIe"),
            contributions_entry: Locator::class("FNyx3"),
            contribution_type: Locator::class("FM5HI"),
            contribution_count: Locator::class("AyEQdd"),
            dialog_close: Locator::xpath(r#"//*[@id="modal-dialog"]/div/div[2]/div/button/span"#),
            tab: Locator::class("Gpq6kf"),
            reviews_region: Locator::css("[aria-label='Reviews']"),
            photos_region: Locator::css("[aria-label='Photos']"),
            empty_marker: "OEnQgb".into(),
            see_more: Locator::css("[aria-label='See more']"),
            review_block: Locator::class("WNxzHc"),
            photo_block: Locator::class("UwKPnd"),
            rating_date_group: Locator::class("DU9Pgb"),
            rating_tag: "kvMYJc".into(),
            date_tag: "rsqaWe".into(),
            review_text: Locator::xpath("//div[@class='DU9Pgb']/following-sibling::div[1]"),
            search_box: Locator::class("xiQnY"),
            search_option: Locator::class("ZHeE1b"),
            business_name: Locator::class("lfPIob"),
            business_address: Locator::class("Io6YTe"),
            business_category: Locator::class("DkEaL"),
            business_rating: Locator::class("F7nice"),
            main_region: Locator::css("[role='main']"),
            business_review_pane_index: 1,
            business_review_list: Locator::class("m6QErb XiKgde"),
            reviewer_link: Locator::class("al6Kxe"),
            reviewer_link_attribute: "data-href".into(),
            reviewer_name: Locator::class("d4r55"),
        }
    }
}

/// Timing policy for every wait in the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Pause after each scroll step before re-measuring.
    pub settle_ms: u64,
    /// Upper bound for an element to become visible.
    pub visible_timeout_ms: u64,
    pub poll_ms: u64,
    /// Scroll rounds allowed before a region is declared non-convergent.
    pub max_scroll_rounds: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            visible_timeout_ms: 10_000,
            poll_ms: 250,
            max_scroll_rounds: 200,
        }
    }
}

impl WaitConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn visible(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.visible_timeout_ms),
            poll: Duration::from_millis(self.poll_ms),
        }
    }
}

/// Timeout and poll interval for one wait-for-condition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Urls {
    pub contributor_base: String,
    pub maps_base: String,
}

impl Default for Urls {
    fn default() -> Self {
        Self {
            contributor_base: "https://google.com/maps/contrib/".into(),
            maps_base: "https://google.com/maps/".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub webdriver_url: String,
    pub browser: String,
    pub headless: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            browser: "chrome".into(),
            headless: false,
        }
    }
}

impl Config {
    /// Load defaults, overlaid with the YAML file at `path` when given.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::FileMissing`] when `path` does not exist, or a YAML
    /// error when it cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("No config file given; using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ScrapeError::FileMissing(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.schemas.contribution_types.is_empty() {
            return Err(ScrapeError::Configuration(
                "at least one contribution type must be configured".into(),
            ));
        }
        if self.wait.max_scroll_rounds == 0 {
            return Err(ScrapeError::Configuration(
                "wait.max_scroll_rounds must be positive".into(),
            ));
        }
        if self.wait.poll_ms == 0 {
            return Err(ScrapeError::Configuration("wait.poll_ms must be positive".into()));
        }
        Ok(())
    }
}
