//! Per-entity page drivers.
//!
//! Each driver walks one kind of entity page through the same sequence:
//! navigate, wait for the content region, converge its scroll extent,
//! extract and align attribute streams, stage rows, and optionally archive a
//! stitched screenshot of the region.
//!
//! | Entity | Module | Tables written |
//! |--------|--------|----------------|
//! | Contributor profile | [`contributor`] | contributor summary, contribution detail |
//! | Business listing | [`business`] | business summary, business reviews |
//!
//! Drivers stage everything for one entity in an [`EntityBatch`] that the
//! caller commits once the entity is complete.
//!
//! [`EntityBatch`]: crate::sink::EntityBatch

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use crate::align::{StreamAligner, TagGroup, TaggedElement};
use crate::config::Config;
use crate::dates;
use crate::error::{Result, ScrapeError};
use crate::page::{Clock, ElementRef, Locator, PageAccessor, wait_all_visible};
use crate::scroll::ScrollConvergence;
use crate::stitch::{ScreenshotStitcher, StitchOutcome};

pub mod business;
pub mod contributor;

/// Everything a driver needs for one run: the page, the clock, the
/// configuration and the run's anchor date.
#[derive(Debug)]
pub struct Session<'a, P, C> {
    page: &'a P,
    clock: &'a C,
    config: &'a Config,
    anchor: NaiveDate,
}

impl<'a, P: PageAccessor, C: Clock> Session<'a, P, C> {
    pub fn new(page: &'a P, clock: &'a C, config: &'a Config, anchor: NaiveDate) -> Self {
        Self {
            page,
            clock,
            config,
            anchor,
        }
    }

    /// The anchor date as written in the `ScrapedDate` column.
    fn scraped(&self) -> String {
        dates::format_date(self.anchor)
    }

    fn aligner(&self) -> StreamAligner<'a> {
        let config: &'a Config = self.config;
        let selectors = &config.selectors;
        StreamAligner::new(self.anchor, &selectors.rating_tag, &selectors.date_tag)
    }

    /// Whether `region` shows the "nothing here" placeholder.
    async fn is_empty_section(&self, region: &ElementRef) -> Result<bool> {
        let marker = self.config.selectors.empty_marker.as_str();
        for child in self.page.children(region).await? {
            let class = self.page.class_of(&child).await?;
            if class.split_whitespace().any(|c| c == marker) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn converge(&self, region: &ElementRef) -> Result<u64> {
        let wait = &self.config.wait;
        ScrollConvergence::new(self.clock, wait.settle(), wait.max_scroll_rounds)
            .converge(self.page, region)
            .await
    }

    /// Click every "See more" affordance so truncated texts are read in full.
    ///
    /// The markup snapshot is checked first; when no affordance is present
    /// nothing is awaited.
    #[instrument(level = "debug", skip_all)]
    async fn expand_truncated(&self) -> Result<usize> {
        let locator = &self.config.selectors.see_more;
        let markup = self.page.markup_snapshot().await?;
        if !markup_contains(&markup, locator)? {
            debug!("No truncated entries");
            return Ok(0);
        }
        let buttons =
            wait_all_visible(self.page, self.clock, self.config.wait.visible(), locator).await?;
        for button in &buttons {
            self.page.click(button).await?;
        }
        info!(expanded = buttons.len(), "Expanded truncated entries");
        Ok(buttons.len())
    }

    /// The children of every rating/date group, in document order.
    async fn read_tag_groups(&self) -> Result<Vec<TagGroup>> {
        let mut groups = Vec::new();
        for group in self
            .page
            .locate_all(&self.config.selectors.rating_date_group)
            .await?
        {
            let mut members = Vec::new();
            for child in self.page.children(&group).await? {
                members.push(TaggedElement {
                    tags: self.page.class_of(&child).await?,
                    label: self.page.attribute(&child, "aria-label").await?,
                    text: self.page.text(&child).await?,
                });
            }
            groups.push(members);
        }
        Ok(groups)
    }

    async fn stitch(&self, region: &ElementRef, dir: &Path) -> Result<StitchOutcome> {
        let outcome = ScreenshotStitcher::new(dir, true)
            .capture(self.page, region)
            .await?;
        debug!(
            tiles = outcome.tile_files.len(),
            trimmed = outcome.trimmed,
            height = outcome.composite_height,
            "Archived review list"
        );
        Ok(outcome)
    }

    /// `<image_dir>/<key>/reviews`
    fn review_image_dir(&self, key: &str) -> PathBuf {
        self.config.paths.image_dir.join(key).join("reviews")
    }
}

/// Whether the page markup holds an element matching `locator`.
///
/// # Errors
///
/// [`ScrapeError::Configuration`] for XPath locators (the snapshot is matched
/// with CSS selectors) and for selectors that do not parse.
pub fn markup_contains(markup: &str, locator: &Locator) -> Result<bool> {
    let (using, value) = locator.strategy();
    if using != "css selector" {
        return Err(ScrapeError::Configuration(format!(
            "{locator} cannot be matched against a markup snapshot"
        )));
    }
    let selector = Selector::parse(&value).map_err(|e| {
        ScrapeError::Configuration(format!("invalid selector {value:?}: {e}"))
    })?;
    let document = Html::parse_document(markup);
    Ok(document.select(&selector).next().is_some())
}
