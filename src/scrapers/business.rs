//! Business listing driver.
//!
//! Finds a business through the maps search box, records its headline facts
//! and every review left on it. The reviews table this writes is the source
//! table that feeds the contributor queue.

use tracing::{debug, info, instrument};

use crate::error::{Result, ScrapeError};
use crate::models::{BusinessReview, BusinessSummary};
use crate::page::{Clock, ElementRef, PageAccessor, wait_all_visible, wait_visible};
use crate::scrapers::Session;
use crate::sink::{EntityBatch, RecordSink};
use crate::stitch::StitchOutcome;
use crate::utils::{first_digit_run, slugify};

const REVIEWS_TAB: &str = "Reviews";
const LISTING_TABS: usize = 3;

/// Average rating and review count from a rating block such as `"4.5\n(1,234)"`.
fn split_rating(block: &str) -> Result<(String, String)> {
    let mut lines = block.lines().map(str::trim);
    match (lines.next(), lines.next()) {
        (Some(avg), Some(count)) => Ok((avg.to_string(), count.replace(['(', ')'], ""))),
        _ => Err(ScrapeError::schema(format!(
            "rating block {block:?} lacks a review count"
        ))),
    }
}

/// Result of one business run.
#[derive(Debug)]
pub struct BusinessRun {
    pub name: String,
    pub rows: usize,
    pub screenshots: Option<StitchOutcome>,
}

impl<P: PageAccessor, C: Clock> Session<'_, P, C> {
    /// Scrape the business named `query`, commit its rows, then optionally
    /// archive a stitched screenshot of its review list.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::NotFound`] when the first search suggestion is a
    ///   different business, the Reviews tab is missing, or a reviewer link
    ///   carries no identifier
    /// - [`ScrapeError::SchemaMismatch`] when review streams fail to align
    /// - [`ScrapeError::Timeout`] when an awaited element never shows
    #[instrument(level = "info", skip_all, fields(business = %query))]
    pub async fn run_business(
        &self,
        query: &str,
        sink: &mut RecordSink,
        screenshots: bool,
    ) -> Result<BusinessRun> {
        let (summary, pane, batch) = self.scrape_business(query).await?;
        let rows = sink.commit(batch)?;
        info!(business = %summary.name, rows, "Business committed");

        let screenshots = if screenshots {
            let dir = self.review_image_dir(&slugify(&summary.name));
            Some(self.stitch(&pane, &dir).await?)
        } else {
            None
        };
        Ok(BusinessRun {
            name: summary.name,
            rows,
            screenshots,
        })
    }

    /// Stage the summary and review rows for `query`.
    ///
    /// # Returns
    ///
    /// The summary, the scrollable reviews pane and the staged batch.
    async fn scrape_business(&self, query: &str) -> Result<(BusinessSummary, ElementRef, EntityBatch)> {
        let mut batch = EntityBatch::new();
        let summary = self.open_listing(query).await?;
        batch.stage(&summary);

        let pane = self.open_reviews_pane().await?;
        let list = self.page.locate(&self.config.selectors.business_review_list).await?;
        if self.page.children(&list).await?.is_empty() {
            info!("No reviews");
            batch.stage(&BusinessReview::sentinel(&summary.name, &summary.address, &self.scraped()));
        } else {
            let reviews = self.read_business_reviews(&summary, &pane).await?;
            info!(reviews = reviews.len(), "Read reviews");
            for review in &reviews {
                batch.stage(review);
            }
        }
        Ok((summary, pane, batch))
    }

    /// Search for `query`, pick the first suggestion and read the listing header.
    async fn open_listing(&self, query: &str) -> Result<BusinessSummary> {
        let selectors = &self.config.selectors;
        let visible = self.config.wait.visible();

        self.page.navigate(&self.config.urls.maps_base).await?;
        let search = wait_visible(self.page, self.clock, visible, &selectors.search_box).await?;
        self.page.type_text(&search, &query.to_lowercase()).await?;
        let options = wait_all_visible(self.page, self.clock, visible, &selectors.search_option).await?;
        if let Some(first) = options.first() {
            self.page.click(first).await?;
        }

        let name_el = wait_visible(self.page, self.clock, visible, &selectors.business_name).await?;
        let name = self.page.text(&name_el).await?;
        if name.to_lowercase() != query.to_lowercase() {
            return Err(ScrapeError::not_found(format!(
                "business {query:?} (search returned {name:?})"
            )));
        }

        let address = self
            .page
            .texts(&selectors.business_address)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::not_found(format!("address of {name}")))?;
        let category_el = self.page.locate(&selectors.business_category).await?;
        let category = self.page.text(&category_el).await?;
        let rating_el = self.page.locate(&selectors.business_rating).await?;
        let (average_rating, review_count) = split_rating(&self.page.text(&rating_el).await?)?;
        debug!(%address, %category, %average_rating, %review_count, "Read listing header");

        Ok(BusinessSummary {
            name,
            address,
            category,
            average_rating,
            review_count,
            scraped: self.scraped(),
        })
    }

    /// Open the Reviews tab and return the scrollable pane holding the list.
    async fn open_reviews_pane(&self) -> Result<ElementRef> {
        let selectors = &self.config.selectors;
        let tabs = self.page.locate_all(&selectors.tab).await?;
        let missing = || {
            ScrapeError::not_found(format!("{REVIEWS_TAB} tab among {} listing tabs", tabs.len()))
        };
        let reviews_tab = tabs.get(1).filter(|_| tabs.len() == LISTING_TABS).ok_or_else(missing)?;
        if self.page.text(reviews_tab).await? != REVIEWS_TAB {
            return Err(missing());
        }
        self.page.click(reviews_tab).await?;

        let main = wait_visible(self.page, self.clock, self.config.wait.visible(), &selectors.main_region).await?;
        let index = selectors.business_review_pane_index;
        let pane = self
            .page
            .children(&main)
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| ScrapeError::not_found(format!("reviews pane (child {index} of {})", selectors.main_region)))?;
        self.clock.sleep(self.config.wait.settle()).await;
        Ok(pane)
    }

    async fn read_business_reviews(
        &self,
        summary: &BusinessSummary,
        pane: &ElementRef,
    ) -> Result<Vec<BusinessReview>> {
        let selectors = &self.config.selectors;
        let extent = self.converge(pane).await?;
        self.expand_truncated().await?;

        let mut reviewer_ids = Vec::new();
        for (i, link) in self.page.locate_all(&selectors.reviewer_link).await?.iter().enumerate() {
            let href = self
                .page
                .attribute(link, &selectors.reviewer_link_attribute)
                .await?
                .unwrap_or_default();
            let id = first_digit_run(&href)
                .ok_or_else(|| ScrapeError::not_found(format!("reviewer id of review {i} ({href:?})")))?;
            reviewer_ids.push(id.to_string());
        }
        let names = self.page.texts(&selectors.reviewer_name).await?;
        let groups = self.read_tag_groups().await?;
        let texts = self.page.texts(&selectors.review_text).await?;
        debug!(extent, ids = reviewer_ids.len(), names = names.len(), groups = groups.len(), "Extracted review streams");

        if reviewer_ids.len() != names.len() {
            return Err(ScrapeError::schema(format!(
                "{} reviewer ids for {} reviewer names",
                reviewer_ids.len(),
                names.len()
            )));
        }

        let scraped = self.scraped();
        let rows = self.aligner().align(&names, Some(&groups), Some(&texts))?;
        Ok(rows
            .into_iter()
            .zip(reviewer_ids)
            .map(|(row, reviewer_id)| BusinessReview {
                business_name: summary.name.clone(),
                business_address: summary.address.clone(),
                reviewer_id,
                reviewer_name: row.name,
                rating: row.rating,
                date: row.date,
                scraped: scraped.clone(),
                text: row.text,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::page::mock::{FakePage, ManualClock};
    use crate::sink::Table;
    use crate::stitch::COMPOSITE_FILE;
    use chrono::NaiveDate;
    use std::path::Path;

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.paths.business_summary = dir.join("entitysummary.csv");
        config.paths.business_reviews = dir.join("entityreviews.csv");
        config.paths.image_dir = dir.join("images");
        config
    }

    /// "Cafe Uno" with two reviews; the second has no date.
    fn listing(config: &Config) -> FakePage {
        let s = &config.selectors;
        let page = FakePage::new();

        page.element("search", "");
        page.place(s.search_box.clone(), &["search"]);
        page.element("opt1", "Cafe Uno, Springfield");
        page.place(s.search_option.clone(), &["opt1"]);
        page.element("title", "Cafe Uno");
        page.place(s.business_name.clone(), &["title"]);
        page.element("addr", "12 Main St");
        page.element("phone", "555-0100");
        page.place(s.business_address.clone(), &["addr", "phone"]);
        page.element("cat", "Coffee shop");
        page.place(s.business_category.clone(), &["cat"]);
        page.element("rating", "4.5\n(1,234)");
        page.place(s.business_rating.clone(), &["rating"]);

        page.element("tab0", "Overview");
        page.element("tab1", "Reviews");
        page.element("tab2", "About");
        page.place(s.tab.clone(), &["tab0", "tab1", "tab2"]);

        page.element("main", "").children(&["header", "pane"]);
        page.place(s.main_region.clone(), &["main"]);
        page.element("header", "");
        page.element("pane", "");
        page.script_extents("pane", &[250, 250]);
        page.element("list", "").children(&["r1", "r2"]);
        page.place(s.business_review_list.clone(), &["list"]);
        page.element("r1", "");
        page.element("r2", "");

        page.element("l1", "").attr("data-href", "https://www.google.com/maps/contrib/111/reviews");
        page.element("l2", "").attr("data-href", "https://www.google.com/maps/contrib/222/reviews");
        page.place(s.reviewer_link.clone(), &["l1", "l2"]);
        page.element("n1", "Ann");
        page.element("n2", "Ben");
        page.place(s.reviewer_name.clone(), &["n1", "n2"]);
        page.element("g1", "").children(&["g1r", "g1d"]);
        page.element("g1r", "").class("kvMYJc").attr("aria-label", "4 stars");
        page.element("g1d", "3 days ago").class("rsqaWe");
        page.element("g2", "").children(&["g2r"]);
        page.element("g2r", "").class("kvMYJc").attr("aria-label", "1 star");
        page.place(s.rating_date_group.clone(), &["g1", "g2"]);
        page.element("t1", "Lovely, quiet");
        page.element("t2", "Cold");
        page.place(s.review_text.clone(), &["t1", "t2"]);

        page
    }

    #[test]
    fn rating_block_splits_into_average_and_count() {
        assert_eq!(
            split_rating("4.5\n(1,234)").unwrap(),
            ("4.5".to_string(), "1,234".to_string())
        );
        assert!(split_rating("4.5").is_err());
    }

    #[tokio::test]
    async fn writes_summary_and_aligned_reviews() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let page = listing(&config);
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());
        let mut sink = RecordSink::open(&config, &[Table::BusinessSummary, Table::BusinessReviews]).unwrap();

        let run = session.run_business("CAFE UNO", &mut sink, true).await.unwrap();

        assert_eq!(run.name, "Cafe Uno");
        assert_eq!(run.rows, 3);
        assert_eq!(*page.typed.borrow(), vec![("search".to_string(), "cafe uno".to_string())]);
        assert_eq!(*page.clicks.borrow(), vec!["opt1", "tab1"]);

        let summary = std::fs::read_to_string(&config.paths.business_summary).unwrap();
        assert_eq!(
            summary.lines().nth(1),
            Some("Cafe Uno,12 Main St,Coffee shop,4.5,\"1,234\",01 Mar 2024")
        );

        let mut reader = csv::Reader::from_path(&config.paths.business_reviews).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].iter().collect::<Vec<_>>(),
            vec!["Cafe Uno", "12 Main St", "111", "Ann", "4 stars", "27 Feb 2024", "01 Mar 2024", "Lovely, quiet"]
        );
        assert_eq!(
            rows[1].iter().collect::<Vec<_>>(),
            vec!["Cafe Uno", "12 Main St", "222", "Ben", "1 star", "", "01 Mar 2024", "Cold"]
        );

        let shots = run.screenshots.unwrap();
        assert_eq!(shots.composite, Some(config.paths.image_dir.join("cafe-uno/reviews").join(COMPOSITE_FILE)));
    }

    #[tokio::test]
    async fn a_listing_without_reviews_gets_a_sentinel_row() {
        let config = Config::default();
        let page = listing(&config);
        page.element("list", "");
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());

        let (_, _, batch) = session.scrape_business("Cafe Uno").await.unwrap();
        let rows = batch.rows();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].0, Table::BusinessReviews);
        assert_eq!(rows[1].1, vec!["Cafe Uno", "12 Main St", "", "", "", "", "01 Mar 2024", ""]);
        assert!(page.drives.borrow().is_empty());
    }

    #[tokio::test]
    async fn a_different_search_hit_is_not_found() {
        let config = Config::default();
        let page = listing(&config);
        page.element("title", "Cafe Duo");
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());

        let err = session.scrape_business("Cafe Uno").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Cafe Duo"));
    }

    #[tokio::test]
    async fn a_reviewer_link_without_digits_is_not_found() {
        let config = Config::default();
        let page = listing(&config);
        page.element("l2", "").attr("data-href", "https://www.google.com/maps/contrib/");
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());

        let err = session.scrape_business("Cafe Uno").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("reviewer id of review 1"));
    }

    #[tokio::test]
    async fn a_missing_reviews_tab_is_not_found() {
        let config = Config::default();
        let page = listing(&config);
        page.place(config.selectors.tab.clone(), &["tab0", "tab2"]);
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());

        let err = session.scrape_business("Cafe Uno").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn the_reviews_pane_is_settled_before_reading() {
        let config = Config::default();
        let page = listing(&config);
        let clock = ManualClock::new();
        let session = Session::new(&page, &clock, &config, anchor());

        session.scrape_business("Cafe Uno").await.unwrap();
        assert_eq!(*page.drives.borrow(), vec![("pane".to_string(), 250)]);
        assert_eq!(clock.elapsed(), config.wait.settle() * 2);
    }
}
