//! Mapped batch loading: normalize rows from a delimited file and insert
//! them into a target table, one transaction with per-row isolation.
//!
//! The loader itself never touches the network. It drives a [`RowSink`],
//! which owns the connection, the prepared insert and the transaction
//! machinery, so the whole pipeline runs against an in-memory sink in tests.

pub mod mapping;
pub mod normalize;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::tabular::Table;
use mapping::{Mapping, MappingError};
use normalize::{normalize, NormalizedValue};

/// A dedupe key: the key text of each designated column, in mapping order.
/// NULL keys as `None`, everything else as its wire text.
pub type DedupeKey = Vec<Option<String>>;

/// Callback for load progress updates, called with rows processed so far.
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Errors that abort a load run. Individual row rejections are not errors;
/// they are collected in the [`LoadReport`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid table name \"{0}\"")]
    InvalidTableIdent(String),

    #[error(
        "source file is missing mapped column(s): {}. Available columns: {}",
        .missing.join(", "),
        .available.join(", ")
    )]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("dedupe column \"{0}\" is not a mapping target")]
    DedupeColumnNotMapped(String),

    #[error("dedupe is enabled but no dedupe columns were given")]
    NoDedupeColumns,

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("database error: {0}")]
    Database(String),
}

/// Where normalized rows go. One implementation speaks PostgreSQL; tests
/// substitute an in-memory sink.
#[async_trait]
pub trait RowSink {
    /// Keys already present in the target table for the given columns.
    /// Called once, before the first insert, when dedupe is enabled.
    async fn existing_keys(&mut self, columns: &[String]) -> Result<HashSet<DedupeKey>, LoadError>;

    /// Insert one normalized row. A rejection is a per-row outcome; an
    /// `Err` is fatal and aborts the run.
    async fn insert_row(&mut self, values: &[NormalizedValue]) -> Result<RowStatus, LoadError>;

    /// Commit everything inserted since the last commit.
    async fn commit(&mut self) -> Result<(), LoadError>;
}

/// Outcome of a single insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Inserted,
    /// The database rejected the row; the message explains why. The sink
    /// has already rolled the row back and the transaction remains usable.
    Rejected(String),
}

/// Tuning knobs for a load run.
#[derive(Debug)]
pub struct LoadOptions {
    /// Convert blank-like values to NULL.
    pub null_blank: bool,
    /// Table columns that define row uniqueness; `None` disables dedupe.
    pub dedupe_columns: Option<Vec<String>>,
    /// Commit after this many inserted rows; 0 means one final commit.
    pub commit_every: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            null_blank: false,
            dedupe_columns: None,
            commit_every: 1000,
        }
    }
}

/// A mapped value attached to its target column, for failure reporting.
#[derive(Debug, Serialize)]
pub struct MappedValue {
    pub column: String,
    pub value: NormalizedValue,
}

/// One rejected row: where it was, what was sent, and what the database said.
#[derive(Debug, Serialize)]
pub struct RowFailure {
    /// 1-based data row number in the source file (header excluded).
    pub row_number: usize,
    pub error: String,
    /// Normalized values in mapping order.
    pub values: Vec<NormalizedValue>,
    pub mapped: Vec<MappedValue>,
}

/// What a load run did.
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub total_rows: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failures: Vec<RowFailure>,
}

/// Run every fail-fast check without touching the sink: mapped columns must
/// exist in the source header and dedupe columns must be mapping targets.
pub fn validate(source: &Table, mapping: &Mapping, options: &LoadOptions) -> Result<(), LoadError> {
    source_indices(source, mapping)?;
    if let Some(columns) = &options.dedupe_columns {
        dedupe_indices(mapping, columns)?;
    }
    Ok(())
}

/// Load a source table through a mapping into a sink.
///
/// Validation failures return an error before any database work. After
/// that, each data row is normalized and inserted; rejected rows are
/// recorded and the run continues. Commits happen on the configured
/// cadence and always once at the end.
pub async fn load<S: RowSink + Send>(
    sink: &mut S,
    source: &Table,
    mapping: &Mapping,
    options: &LoadOptions,
    progress: Option<ProgressCallback>,
) -> Result<LoadReport, LoadError> {
    let indices = source_indices(source, mapping)?;

    let mut dedupe = match &options.dedupe_columns {
        Some(columns) => {
            let positions = dedupe_indices(mapping, columns)?;
            let existing = sink.existing_keys(columns).await?;
            Some((positions, existing))
        }
        None => None,
    };

    let mut report = LoadReport {
        total_rows: source.rows.len(),
        ..LoadReport::default()
    };
    let mut uncommitted = 0usize;

    for (i, row) in source.rows.iter().enumerate() {
        let row_number = i + 1;
        let values: Vec<NormalizedValue> = indices
            .iter()
            .map(|&idx| normalize(row.get(idx).map(String::as_str), options.null_blank))
            .collect();

        if let Some((positions, seen)) = &dedupe {
            let key: DedupeKey = positions.iter().map(|&p| values[p].as_key()).collect();
            if seen.contains(&key) {
                report.skipped += 1;
                if let Some(cb) = &progress {
                    cb(row_number);
                }
                continue;
            }
        }

        if row_number <= 5 {
            debug!(row = row_number, values = ?values, "normalized row");
        }

        match sink.insert_row(&values).await? {
            RowStatus::Inserted => {
                report.inserted += 1;
                uncommitted += 1;
                if let Some((positions, existing)) = &mut dedupe {
                    let key: DedupeKey = positions.iter().map(|&p| values[p].as_key()).collect();
                    existing.insert(key);
                }
                if options.commit_every > 0 && uncommitted >= options.commit_every {
                    sink.commit().await?;
                    uncommitted = 0;
                }
            }
            RowStatus::Rejected(error) => {
                let mapped = mapping
                    .entries()
                    .iter()
                    .zip(&values)
                    .map(|(entry, value)| MappedValue {
                        column: entry.table_column.clone(),
                        value: value.clone(),
                    })
                    .collect();
                report.failures.push(RowFailure {
                    row_number,
                    error,
                    values,
                    mapped,
                });
            }
        }

        if let Some(cb) = &progress {
            cb(row_number);
        }
    }

    sink.commit().await?;

    debug!(
        inserted = report.inserted,
        skipped = report.skipped,
        failed = report.failures.len(),
        "load finished"
    );
    Ok(report)
}

/// Source-header index for each mapping entry, failing with the complete
/// list of missing columns rather than the first one.
fn source_indices(source: &Table, mapping: &Mapping) -> Result<Vec<usize>, LoadError> {
    let mut indices = Vec::with_capacity(mapping.len());
    let mut missing = Vec::new();
    for entry in mapping.entries() {
        match source.column_index(&entry.source_column) {
            Some(idx) => indices.push(idx),
            None => missing.push(entry.source_column.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            missing,
            available: source.headers.clone(),
        });
    }
    Ok(indices)
}

/// Position of each dedupe column within the mapped value vector.
fn dedupe_indices(mapping: &Mapping, columns: &[String]) -> Result<Vec<usize>, LoadError> {
    if columns.is_empty() {
        return Err(LoadError::NoDedupeColumns);
    }
    columns
        .iter()
        .map(|column| {
            mapping
                .target_index(column)
                .ok_or_else(|| LoadError::DedupeColumnNotMapped(column.clone()))
        })
        .collect()
}
