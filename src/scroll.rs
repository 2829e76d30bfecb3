//! Scroll convergence for lazily rendered lists.
//!
//! Review and photo lists only render entries near the bottom of their
//! scroll position. Driving the region to its last known height, letting the
//! page settle and re-measuring reveals the next batch; the list is complete
//! once two consecutive measurements agree.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ScrapeError};
use crate::page::{Clock, ElementRef, ScrollSurface};

/// Drives a region until its extent stops growing.
#[derive(Debug)]
pub struct ScrollConvergence<'a, C> {
    clock: &'a C,
    settle: Duration,
    max_rounds: u32,
}

impl<'a, C: Clock> ScrollConvergence<'a, C> {
    /// # Arguments
    ///
    /// * `clock` - Time source used for the settle pause
    /// * `settle` - Pause after each scroll before the extent is re-read
    /// * `max_rounds` - Scroll steps allowed before giving up
    pub fn new(clock: &'a C, settle: Duration, max_rounds: u32) -> Self {
        Self {
            clock,
            settle,
            max_rounds,
        }
    }

    /// Scroll `region` until two consecutive extent reads are equal.
    ///
    /// # Returns
    ///
    /// The final, stable extent. A region whose first extent is zero returns
    /// zero without scrolling.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Timeout`] when the extent is still changing after
    /// `max_rounds` scroll steps; accessor errors are passed through.
    #[instrument(level = "info", skip_all, fields(%region))]
    pub async fn converge<S: ScrollSurface>(&self, surface: &S, region: &ElementRef) -> Result<u64> {
        let mut previous = 0;
        let mut current = surface.extent(region).await?;
        let mut rounds = 0u32;

        while current != previous {
            if rounds == self.max_rounds {
                warn!(rounds, extent = current, "Region still growing; giving up");
                return Err(ScrapeError::Timeout {
                    awaited: format!(
                        "scroll convergence of {region} (extent {current} after {rounds} rounds)"
                    ),
                    waited: self.settle * rounds,
                });
            }
            surface.drive_to(region, current).await?;
            self.clock.sleep(self.settle).await;
            previous = current;
            current = surface.extent(region).await?;
            rounds += 1;
            debug!(rounds, previous, current, "Scroll step");
        }

        info!(rounds, extent = current, "Region converged");
        Ok(current)
    }
}
