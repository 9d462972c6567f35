//! Mapping files: which source column feeds which table column.
//!
//! A mapping file is itself CSV. Each data row pairs a target table column
//! with a source header name; extra cells are ignored. Blank rows are
//! skipped, and an optional header row is detected heuristically unless the
//! caller forces it one way.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

/// One target-column/source-column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Column in the target table.
    pub table_column: String,
    /// Header name in the source file.
    pub source_column: String,
}

/// How to treat the first non-blank row of a mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Skip the first row only when it reads like column labels.
    #[default]
    Auto,
    /// Always skip the first row.
    Skip,
    /// Treat every row as data.
    Keep,
}

/// Problems reading or validating a mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapping file is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("mapping row {row} has {found} column(s); expected table column, source column")]
    ShortRow { row: usize, found: usize },

    #[error("mapping row {row} has a blank column name")]
    BlankField { row: usize },

    #[error("mapping row {row} repeats table column \"{column}\"")]
    DuplicateTarget { row: usize, column: String },

    #[error("mapping file has no column pairs")]
    Empty,
}

/// An ordered, validated set of mapping entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

impl Mapping {
    /// Read and parse a mapping file.
    pub fn from_path(path: &Path, mode: HeaderMode) -> Result<Self, MappingError> {
        let text = fs::read_to_string(path)?;
        Self::from_csv(&text, mode)
    }

    /// Parse mapping CSV text.
    ///
    /// Rows are numbered from 1 over data rows, after blank rows and any
    /// header row are dropped, so error positions line up with what an
    /// operator sees when they delete the header in a spreadsheet.
    pub fn from_csv(text: &str, mode: HeaderMode) -> Result<Self, MappingError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut entries: Vec<MappingEntry> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut header_checked = false;
        let mut row = 0usize;

        for record in reader.records() {
            let record = record?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            if !header_checked {
                header_checked = true;
                let skip = match mode {
                    HeaderMode::Skip => true,
                    HeaderMode::Keep => false,
                    HeaderMode::Auto => looks_like_header(&record),
                };
                if skip {
                    continue;
                }
            }

            row += 1;

            if record.len() < 2 {
                return Err(MappingError::ShortRow {
                    row,
                    found: record.len(),
                });
            }

            let table_column = strip_outer_quotes(record.get(0).unwrap_or("")).to_string();
            let source_column = record.get(1).unwrap_or("").trim().to_string();

            if table_column.is_empty() || source_column.is_empty() {
                return Err(MappingError::BlankField { row });
            }
            if !seen.insert(table_column.clone()) {
                return Err(MappingError::DuplicateTarget {
                    row,
                    column: table_column,
                });
            }

            entries.push(MappingEntry {
                table_column,
                source_column,
            });
        }

        if entries.is_empty() {
            return Err(MappingError::Empty);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target table columns, in mapping order.
    pub fn table_columns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.table_column.as_str()).collect()
    }

    /// Source header names, in mapping order.
    pub fn source_columns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.source_column.as_str()).collect()
    }

    /// Position of a target column within the mapping.
    pub fn target_index(&self, table_column: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.table_column == table_column)
    }
}

/// Strip whitespace and one pair of surrounding double quotes.
///
/// Only a single pair comes off, so a target column whose real name includes
/// quotes can still be written as `"""odd""name"""` in the mapping file.
pub fn strip_outer_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// True when a first row reads like column labels rather than data:
/// the first cell mentions the table side and the second the source side.
fn looks_like_header(record: &StringRecord) -> bool {
    if record.len() < 2 {
        return false;
    }
    let first = record.get(0).unwrap_or("").trim().to_lowercase();
    let second = record.get(1).unwrap_or("").trim().to_lowercase();
    (first.contains("table") || first.contains("postgres") || first.contains("db"))
        && (second.contains("csv") || second.contains("source"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_mode_skips_a_label_row() {
        let mapping = Mapping::from_csv(
            "table_column,csv_column\nSite_Name,SITE NAME\nRevisits,REVISITS\n",
            HeaderMode::Auto,
        )
        .expect("parses");
        assert_eq!(mapping.table_columns(), ["Site_Name", "Revisits"]);
        assert_eq!(mapping.source_columns(), ["SITE NAME", "REVISITS"]);
    }

    #[test]
    fn auto_mode_keeps_a_data_first_row() {
        let mapping = Mapping::from_csv(
            "Site_Name,SITE NAME\nRevisits,REVISITS\n",
            HeaderMode::Auto,
        )
        .expect("parses");
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.entries()[0].table_column, "Site_Name");
    }

    #[test]
    fn explicit_modes_override_the_heuristic() {
        let skipped = Mapping::from_csv(
            "Site_Name,SITE NAME\nRevisits,REVISITS\n",
            HeaderMode::Skip,
        )
        .expect("parses");
        assert_eq!(skipped.table_columns(), ["Revisits"]);

        let kept = Mapping::from_csv(
            "db_column,source_column\nSite_Name,SITE NAME\n",
            HeaderMode::Keep,
        )
        .expect("parses");
        assert_eq!(kept.table_columns(), ["db_column", "Site_Name"]);
    }

    #[test]
    fn blank_rows_are_ignored_everywhere() {
        let mapping = Mapping::from_csv(
            "\n,\ntable_column,csv_column\n\nSite_Name,SITE NAME\n  ,  \n",
            HeaderMode::Auto,
        )
        .expect("parses");
        assert_eq!(mapping.table_columns(), ["Site_Name"]);
    }

    #[test]
    fn quoted_target_keeps_inner_text() {
        // The CSV layer eats one level of quoting, so a doubled form
        // in the file arrives here as "Site Name" with quotes around it.
        let mapping = Mapping::from_csv(
            "\"\"\"Site Name\"\"\",SITE NAME\n",
            HeaderMode::Keep,
        )
        .expect("parses");
        assert_eq!(mapping.table_columns(), ["Site Name"]);
    }

    #[test]
    fn extra_cells_are_ignored() {
        let mapping = Mapping::from_csv(
            "Site_Name,SITE NAME,comment here\n",
            HeaderMode::Keep,
        )
        .expect("parses");
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.entries()[0].source_column, "SITE NAME");
    }

    #[test]
    fn short_row_position_counts_data_rows_only() {
        let err = Mapping::from_csv(
            "table_column,csv_column\nSite_Name,SITE NAME\n\nlonely\n",
            HeaderMode::Auto,
        )
        .expect_err("short row");
        assert!(matches!(err, MappingError::ShortRow { row: 2, found: 1 }));
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = Mapping::from_csv("Site_Name,   \n", HeaderMode::Keep).expect_err("blank");
        assert!(matches!(err, MappingError::BlankField { row: 1 }));

        let err = Mapping::from_csv("\"\"\"\"\"\",SITE NAME\n", HeaderMode::Keep)
            .expect_err("quoted-empty target");
        assert!(matches!(err, MappingError::BlankField { row: 1 }));
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let err = Mapping::from_csv(
            "Site_Name,SITE NAME\nSite_Name,OTHER\n",
            HeaderMode::Keep,
        )
        .expect_err("duplicate");
        match err {
            MappingError::DuplicateTarget { row, column } => {
                assert_eq!(row, 2);
                assert_eq!(column, "Site_Name");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            Mapping::from_csv("", HeaderMode::Auto),
            Err(MappingError::Empty)
        ));
        assert!(matches!(
            Mapping::from_csv("\n\n", HeaderMode::Auto),
            Err(MappingError::Empty)
        ));
        assert!(matches!(
            Mapping::from_csv("table_column,csv_column\n", HeaderMode::Auto),
            Err(MappingError::Empty)
        ));
    }

    #[test]
    fn target_index_follows_mapping_order() {
        let mapping = Mapping::from_csv(
            "Site_Name,SITE NAME\nRevisits,REVISITS\n",
            HeaderMode::Keep,
        )
        .expect("parses");
        assert_eq!(mapping.target_index("Revisits"), Some(1));
        assert_eq!(mapping.target_index("Missing"), None);
    }

    #[test]
    fn strips_one_quote_pair_only() {
        assert_eq!(strip_outer_quotes("  plain  "), "plain");
        assert_eq!(strip_outer_quotes("\"Site Name\""), "Site Name");
        assert_eq!(strip_outer_quotes("\"\"x\"\""), "\"x\"");
        assert_eq!(strip_outer_quotes("\""), "\"");
        assert_eq!(strip_outer_quotes("\"\""), "");
    }
}
