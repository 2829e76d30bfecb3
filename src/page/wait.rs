//! Time source and wait-for-condition polling.
//!
//! The pipeline never sleeps directly. Settling after a scroll step and
//! waiting for elements both go through a [`Clock`], so tests can run the
//! same code against virtual time.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::config::WaitPolicy;
use crate::error::{ErrorKind, Result, ScrapeError};
use crate::page::{ElementRef, Locator, PageAccessor};

pub trait Clock {
    /// Monotonic time since the clock was created.
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time via tokio's timer.
#[derive(Debug)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll `probe` until it yields a value or `policy.timeout` elapses.
///
/// A probe that fails with a not-found error counts as "not yet"; any other
/// error ends the wait immediately.
///
/// # Arguments
///
/// * `clock` - Time source for measuring and sleeping
/// * `policy` - Overall timeout and interval between probes
/// * `awaited` - Description of what is awaited, used in the timeout error
/// * `probe` - Async check returning `Some` once the condition holds
///
/// # Errors
///
/// [`ScrapeError::Timeout`] naming `awaited` when the condition never holds.
pub async fn wait_for<C, T>(
    clock: &C,
    policy: WaitPolicy,
    awaited: &str,
    mut probe: impl AsyncFnMut() -> Result<Option<T>>,
) -> Result<T>
where
    C: Clock,
{
    let start = clock.elapsed();
    loop {
        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(%awaited, error = %e, "Probe found nothing yet");
            }
            Err(e) => return Err(e),
        }

        let waited = clock.elapsed().saturating_sub(start);
        if waited >= policy.timeout {
            return Err(ScrapeError::Timeout {
                awaited: awaited.to_string(),
                waited,
            });
        }
        clock.sleep(policy.poll.min(policy.timeout - waited)).await;
    }
}

/// Wait until the first element matching `locator` is displayed.
#[instrument(level = "debug", skip_all, fields(%locator))]
pub async fn wait_visible<P, C>(
    page: &P,
    clock: &C,
    policy: WaitPolicy,
    locator: &Locator,
) -> Result<ElementRef>
where
    P: PageAccessor,
    C: Clock,
{
    let awaited = format!("visibility of {locator}");
    wait_for(clock, policy, &awaited, async || -> Result<Option<ElementRef>> {
        let Some(first) = page.locate_all(locator).await?.into_iter().next() else {
            return Ok(None);
        };
        Ok(page.is_displayed(&first).await?.then_some(first))
    })
    .await
}

/// Wait until at least one element matches `locator` and all matches are displayed.
#[instrument(level = "debug", skip_all, fields(%locator))]
pub async fn wait_all_visible<P, C>(
    page: &P,
    clock: &C,
    policy: WaitPolicy,
    locator: &Locator,
) -> Result<Vec<ElementRef>>
where
    P: PageAccessor,
    C: Clock,
{
    let awaited = format!("visibility of all {locator}");
    wait_for(clock, policy, &awaited, async || -> Result<Option<Vec<ElementRef>>> {
        let elements = page.locate_all(locator).await?;
        if elements.is_empty() {
            return Ok(None);
        }
        for element in &elements {
            if !page.is_displayed(element).await? {
                return Ok(None);
            }
        }
        Ok(Some(elements))
    })
    .await
}
