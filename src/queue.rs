//! Resumable work queue of contributor identifiers.
//!
//! The queue is read from a source table of `(identifier, owning entity)`
//! rows, typically the business reviews table written by a `business` run.
//! Rows can be restricted to a set of owning entities, and a run can resume
//! from the first occurrence of a given identifier.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::config::SourceColumns;
use crate::error::{Result, ScrapeError};
use crate::utils::first_digit_run;

/// Ordered identifiers still to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdQueue {
    ids: Vec<String>,
}

impl IdQueue {
    /// Build the queue from the CSV table at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Source table with a header row
    /// * `columns` - Names of the identifier and owning-entity columns
    /// * `targets` - Owning entities to keep; empty keeps every row
    /// * `resume` - Identifier to resume from, inclusive
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::FileMissing`] when `path` does not exist
    /// - [`ScrapeError::Configuration`] when a required column is absent or a
    ///   non-blank identifier carries no digits
    /// - [`ScrapeError::NotFound`] when `resume` is not in the filtered queue
    #[instrument(level = "info", skip_all, fields(path = %path.display(), targets = targets.len(), resume = ?resume))]
    pub fn load(
        path: &Path,
        columns: &SourceColumns,
        targets: &[String],
        resume: Option<&str>,
    ) -> Result<Self> {
        if !path.exists() {
            return Err(ScrapeError::FileMissing(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                ScrapeError::Configuration(format!(
                    "column {name:?} not found in {}",
                    path.display()
                ))
            })
        };
        let id_at = column(&columns.identifier)?;
        let entity_at = column(&columns.owning_entity)?;

        let wanted: HashSet<&str> = targets.iter().map(String::as_str).collect();
        let mut ids = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let entity = record.get(entity_at).unwrap_or_default();
            if !wanted.is_empty() && !wanted.contains(entity) {
                continue;
            }
            let raw = record.get(id_at).unwrap_or_default().trim();
            if raw.is_empty() {
                debug!(row = line + 1, %entity, "Skipping row without identifier");
                continue;
            }
            let id = first_digit_run(raw).ok_or_else(|| {
                ScrapeError::Configuration(format!(
                    "row {} of {}: identifier {raw:?} carries no digits",
                    line + 1,
                    path.display()
                ))
            })?;
            ids.push(id.to_string());
        }
        if !wanted.is_empty() && ids.is_empty() {
            warn!(targets = ?targets, "No rows matched the requested entities");
        }

        let queue = Self { ids }.resume_from(resume)?;
        info!(len = queue.len(), "Built identifier queue");
        Ok(queue)
    }

    /// Drop every entry before the first occurrence of `resume`.
    pub fn resume_from(self, resume: Option<&str>) -> Result<Self> {
        let Some(resume) = resume else {
            return Ok(self);
        };
        let start = self
            .ids
            .iter()
            .position(|id| id == resume)
            .ok_or_else(|| ScrapeError::not_found(format!("resume identifier {resume} in queue")))?;
        debug!(resume, skipped = start, "Resuming queue");
        Ok(Self {
            ids: self.ids[start..].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for IdQueue {
    fn from(ids: Vec<String>) -> Self {
        Self { ids }
    }
}
