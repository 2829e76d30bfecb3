//! # contrib_scraper
//!
//! Scrapes business listings and contributor profiles from a maps review site
//! through a WebDriver-controlled browser, writing CSV tables and stitched
//! full-height screenshots of the review lists.
//!
//! ## Usage
//!
//! ```sh
//! contrib_scraper business --name "Cafe Uno"
//! contrib_scraper contributors --target "Cafe Uno" --screenshots
//! ```
//!
//! ## Architecture
//!
//! 1. **Setup**: load the configuration, build the identifier queue and open
//!    the output tables. Nothing is browsed if any of this fails.
//! 2. **Browse**: one WebDriver session drives the entity pages in order,
//!    converging each lazily loaded list before reading it.
//! 3. **Record**: each entity's rows are committed together once it is done.
//! 4. **Archive**: review lists are photographed tile by tile and stitched.
//!
//! The browsing session is closed on every exit path.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod align;
mod cli;
mod config;
mod dates;
mod error;
mod models;
mod page;
mod queue;
mod scrapers;
mod scroll;
mod sink;
mod stitch;
mod utils;

use cli::{Cli, Command};
use config::Config;
use error::{Result, ScrapeError};
use page::webdriver::WebDriverPage;
use page::{PageAccessor, TokioClock};
use queue::IdQueue;
use scrapers::Session;
use sink::{RecordSink, Table};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("contrib_scraper starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    match run(args).await {
        Ok(()) => {
            let elapsed = start_time.elapsed();
            info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "info", skip_all)]
async fn run(args: Cli) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    let anchor = Local::now().date_naive();
    info!(%anchor, "Anchor date");

    match args.command {
        Command::Contributors {
            targets,
            resume,
            screenshots,
            ..
        } => {
            let queue = IdQueue::load(
                &config.paths.source_table,
                &config.columns,
                &targets,
                resume.as_deref(),
            )?;
            let mut sink = RecordSink::open(
                &config,
                &[Table::ContributorSummary, Table::ContributionDetail],
            )?;
            if screenshots {
                ensure_writable_dir(&config.paths.image_dir).await?;
            }
            if queue.is_empty() {
                warn!("Identifier queue is empty; nothing to scrape");
                return Ok(());
            }

            let page = WebDriverPage::connect(&config.driver).await?;
            let clock = TokioClock::new();
            let session = Session::new(&page, &clock, &config, anchor);
            let done =
                guarded(&page, session.run_contributors(&queue, &mut sink, screenshots)).await?;
            info!(contributors = done, "Contributor scrape complete");
        }
        Command::Business {
            name,
            no_screenshots,
        } => {
            let mut sink = RecordSink::open(
                &config,
                &[Table::BusinessSummary, Table::BusinessReviews],
            )?;
            if !no_screenshots {
                ensure_writable_dir(&config.paths.image_dir).await?;
            }

            let page = WebDriverPage::connect(&config.driver).await?;
            let clock = TokioClock::new();
            let session = Session::new(&page, &clock, &config, anchor);
            let run =
                guarded(&page, session.run_business(&name, &mut sink, !no_screenshots)).await?;
            info!(
                business = %run.name,
                rows = run.rows,
                composite = ?run.screenshots.as_ref().and_then(|s| s.composite.as_ref()),
                "Business scrape complete"
            );
        }
    }
    Ok(())
}

/// Run `work` against an open session and close the session afterwards.
///
/// The session is closed when `work` finishes, when it panics and when the
/// process receives Ctrl-C. A panic is re-raised once the session is closed.
async fn guarded<P, T>(page: &P, work: impl Future<Output = Result<T>>) -> Result<T>
where
    P: PageAccessor,
{
    let outcome = tokio::select! {
        outcome = AssertUnwindSafe(work).catch_unwind() => outcome,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted; closing browsing session");
            Ok(Err(ScrapeError::Interrupted))
        }
    };
    close(page).await;
    outcome.unwrap_or_else(|payload| panic::resume_unwind(payload))
}

/// End the browsing session; a failure here is logged, not propagated.
async fn close<P: PageAccessor>(page: &P) {
    if let Err(e) = page.quit().await {
        warn!(kind = %e.kind(), error = %e, "Failed to close browsing session");
    }
}
