//! Append-only CSV tables.
//!
//! A table file is created with its header row on first use and only ever
//! appended to afterwards. Rows for one entity are staged in an
//! [`EntityBatch`] and committed together, so an entity that fails part-way
//! leaves nothing behind while earlier entities stay committed.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::{Result, ScrapeError};
use crate::models::Record;

/// The output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    ContributorSummary,
    ContributionDetail,
    BusinessSummary,
    BusinessReviews,
}

impl Table {
    /// Path and header row for this table under `config`.
    pub fn layout(self, config: &Config) -> (PathBuf, Vec<String>) {
        let paths = &config.paths;
        let schemas = &config.schemas;
        match self {
            Table::ContributorSummary => (paths.contributor_summary.clone(), schemas.summary()),
            Table::ContributionDetail => (paths.contribution_detail.clone(), schemas.detail.clone()),
            Table::BusinessSummary => (paths.business_summary.clone(), schemas.business_summary.clone()),
            Table::BusinessReviews => (paths.business_reviews.clone(), schemas.business_reviews.clone()),
        }
    }
}

/// One CSV file opened for appending.
#[derive(Debug)]
pub struct CsvTable {
    path: PathBuf,
    width: usize,
    writer: csv::Writer<File>,
}

impl CsvTable {
    /// Open `path` for appending, writing `header` if the file is new or empty.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Configuration`] when an existing file's header differs
    /// from `header`; I/O and CSV errors otherwise.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path, header: &[String]) -> Result<Self> {
        let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        if !is_new {
            let existing = read_header(path)?;
            if existing != header {
                return Err(ScrapeError::Configuration(format!(
                    "{} has header [{}] but [{}] is configured",
                    path.display(),
                    existing.join(", "),
                    header.join(", ")
                )));
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(header)?;
            writer.flush()?;
            info!(path = %path.display(), "Initialised table");
        }

        Ok(Self {
            path: path.to_path_buf(),
            width: header.len(),
            writer,
        })
    }

    fn check(&self, row: &[String]) -> Result<()> {
        if row.len() == self.width {
            Ok(())
        } else {
            Err(ScrapeError::schema(format!(
                "row with {} fields for {} ({} columns)",
                row.len(),
                self.path.display(),
                self.width
            )))
        }
    }

    fn append(&mut self, row: &[String]) -> Result<()> {
        self.writer.write_record(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let first = reader.records().next().transpose()?.unwrap_or_default();
    Ok(first.iter().map(str::to_string).collect())
}

/// Rows staged for one entity, written only on [`RecordSink::commit`].
#[derive(Debug, Default)]
pub struct EntityBatch {
    rows: Vec<(Table, Vec<String>)>,
}

impl EntityBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage<R: Record>(&mut self, record: &R) {
        self.rows.push((R::TABLE, record.fields()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[(Table, Vec<String>)] {
        &self.rows
    }
}

/// The set of tables a run writes to.
#[derive(Debug)]
pub struct RecordSink {
    tables: Vec<(Table, CsvTable)>,
}

impl RecordSink {
    /// Open (or initialise) every table in `tables`.
    pub fn open(config: &Config, tables: &[Table]) -> Result<Self> {
        let tables = tables
            .iter()
            .map(|&table| {
                let (path, header) = table.layout(config);
                CsvTable::open(&path, &header).map(|t| (table, t))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tables })
    }

    fn table_mut(&mut self, table: Table) -> Result<&mut CsvTable> {
        self.tables
            .iter_mut()
            .find(|(t, _)| *t == table)
            .map(|(_, csv)| csv)
            .ok_or_else(|| ScrapeError::Configuration(format!("table {table:?} is not open")))
    }

    /// Write every staged row, then flush.
    ///
    /// Every row is checked against its table's width before the first one
    /// is written, so a malformed batch writes nothing.
    pub fn commit(&mut self, batch: EntityBatch) -> Result<usize> {
        for (table, row) in &batch.rows {
            self.table_mut(*table)?.check(row)?;
        }
        for (table, row) in &batch.rows {
            self.table_mut(*table)?.append(row)?;
        }
        for (_, csv) in &mut self.tables {
            csv.flush()?;
        }
        debug!(rows = batch.len(), "Committed entity batch");
        Ok(batch.len())
    }
}
