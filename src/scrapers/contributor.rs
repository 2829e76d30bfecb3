//! Contributor profile driver.
//!
//! For each contributor the profile page yields one summary row (name, local
//! guide status and per-type contribution counts) and one detail row per
//! review or photo. A review or photo section without content yields a
//! single sentinel detail row instead.

use tracing::{debug, info, instrument, warn};

use crate::align::check_contribution_types;
use crate::error::{Result, ScrapeError};
use crate::models::{Contribution, ContributionKind, ContributorSummary};
use crate::page::{Clock, ElementRef, PageAccessor, wait_all_visible, wait_visible};
use crate::queue::IdQueue;
use crate::scrapers::Session;
use crate::sink::{EntityBatch, RecordSink};

const REVIEWS_TAB: &str = "Reviews";
const PHOTOS_TAB: &str = "Photos";

impl<P: PageAccessor, C: Clock> Session<'_, P, C> {
    /// Scrape every contributor in `queue`, committing each one as it completes.
    ///
    /// Processing stops at the first failing contributor; contributors
    /// committed before it stay in the tables.
    ///
    /// # Returns
    ///
    /// The number of contributors committed.
    #[instrument(level = "info", skip_all, fields(queued = queue.len()))]
    pub async fn run_contributors(
        &self,
        queue: &IdQueue,
        sink: &mut RecordSink,
        screenshots: bool,
    ) -> Result<usize> {
        let mut done = 0;
        for id in queue.iter() {
            let batch = self.scrape_contributor(id, screenshots).await.inspect_err(|e| {
                warn!(entity = %id, kind = %e.kind(), error = %e, "Contributor failed; nothing staged for it is written");
            })?;
            let rows = sink.commit(batch)?;
            done += 1;
            info!(entity = %id, rows, done, remaining = queue.len() - done, "Contributor committed");
        }
        Ok(done)
    }

    /// Scrape one contributor profile into a batch of summary and detail rows.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::SchemaMismatch`] when the contribution types on the
    ///   page differ from the configured ones, or streams fail to align
    /// - [`ScrapeError::NotFound`] when the Reviews/Photos tabs are not laid
    ///   out as expected
    /// - [`ScrapeError::Timeout`] when an awaited element never shows
    #[instrument(level = "info", skip_all, fields(entity = %id))]
    pub async fn scrape_contributor(&self, id: &str, screenshots: bool) -> Result<EntityBatch> {
        let selectors = &self.config.selectors;
        let visible = self.config.wait.visible();
        let mut batch = EntityBatch::new();

        let url = format!("{}{}", self.config.urls.contributor_base, id);
        self.page.navigate(&url).await?;
        let name_el = wait_visible(self.page, self.clock, visible, &selectors.contributor_name).await?;
        let name = self.page.text(&name_el).await?;

        let summary = self.read_summary(id, name).await?;
        debug!(name = %summary.name, local_guide = summary.local_guide, "Read contributor summary");
        batch.stage(&summary);

        let (reviews_tab, photos_tab) = self.profile_tabs().await?;

        self.page.click(&reviews_tab).await?;
        let region = wait_visible(self.page, self.clock, visible, &selectors.reviews_region).await?;
        if self.is_empty_section(&region).await? {
            info!("No reviews");
            batch.stage(&Contribution::sentinel(id, ContributionKind::Review, &self.scraped()));
        } else {
            let reviews = self.read_reviews(id, &region).await?;
            info!(reviews = reviews.len(), "Read reviews");
            for review in &reviews {
                batch.stage(review);
            }
            if screenshots {
                let outcome = self.stitch(&region, &self.review_image_dir(id)).await?;
                debug!(tiles = outcome.tile_files.len(), extent = outcome.extent, "Archived review screenshots");
            }
        }

        self.page.click(&photos_tab).await?;
        let region = wait_visible(self.page, self.clock, visible, &selectors.photos_region).await?;
        if self.is_empty_section(&region).await? {
            info!("No photos");
            batch.stage(&Contribution::sentinel(id, ContributionKind::Photo, &self.scraped()));
        } else {
            self.converge(&region).await?;
            let blocks = self.page.texts(&selectors.photo_block).await?;
            let rows = self.aligner().align(&blocks, None, None)?;
            info!(photos = rows.len(), "Read photos");
            for row in rows {
                batch.stage(&Contribution::from_aligned(id, ContributionKind::Photo, &self.scraped(), row));
            }
        }

        Ok(batch)
    }

    /// Read name, local-guide status and contribution counts from the
    /// contributions dialog, then close it.
    async fn read_summary(&self, id: &str, name: String) -> Result<ContributorSummary> {
        let selectors = &self.config.selectors;
        let visible = self.config.wait.visible();

        let entry = wait_visible(self.page, self.clock, visible, &selectors.contributions_entry).await?;
        let local_guide = self
            .page
            .text(&entry)
            .await?
            .to_lowercase()
            .contains("local guide");
        self.page.click(&entry).await?;

        let mut labels = Vec::new();
        for el in wait_all_visible(self.page, self.clock, visible, &selectors.contribution_type).await? {
            labels.push(self.page.text(&el).await?);
        }
        let mut counts = Vec::new();
        for el in wait_all_visible(self.page, self.clock, visible, &selectors.contribution_count).await? {
            counts.push(self.page.text(&el).await?);
        }

        check_contribution_types(&self.config.schemas.contribution_types, &labels)?;
        if counts.len() != labels.len() {
            return Err(ScrapeError::schema(format!(
                "{} contribution counts for {} contribution types",
                counts.len(),
                labels.len()
            )));
        }

        let close = self.page.locate(&selectors.dialog_close).await?;
        self.page.click(&close).await?;

        Ok(ContributorSummary {
            entity_id: id.to_string(),
            name,
            local_guide,
            scraped: self.scraped(),
            counts,
        })
    }

    /// The Reviews and Photos tabs, which must be the only two tabs.
    async fn profile_tabs(&self) -> Result<(ElementRef, ElementRef)> {
        let tabs = self.page.locate_all(&self.config.selectors.tab).await?;
        let mut labels = Vec::new();
        for tab in &tabs {
            labels.push(self.page.text(tab).await?);
        }
        match (tabs.as_slice(), labels.as_slice()) {
            ([reviews, photos], [r, p]) if r == REVIEWS_TAB && p == PHOTOS_TAB => {
                Ok((reviews.clone(), photos.clone()))
            }
            _ => Err(ScrapeError::not_found(format!(
                "{REVIEWS_TAB} and {PHOTOS_TAB} tabs (found [{}])",
                labels.join(", ")
            ))),
        }
    }

    async fn read_reviews(&self, id: &str, region: &ElementRef) -> Result<Vec<Contribution>> {
        let selectors = &self.config.selectors;
        let extent = self.converge(region).await?;
        self.expand_truncated().await?;

        let blocks = self.page.texts(&selectors.review_block).await?;
        let groups = self.read_tag_groups().await?;
        let texts = self.page.texts(&selectors.review_text).await?;
        debug!(extent, blocks = blocks.len(), groups = groups.len(), texts = texts.len(), "Extracted review streams");

        let scraped = self.scraped();
        Ok(self
            .aligner()
            .align(&blocks, Some(&groups), Some(&texts))?
            .into_iter()
            .map(|row| Contribution::from_aligned(id, ContributionKind::Review, &scraped, row))
            .collect())
    }
}
