//! Delimited-file reading and writing shared by the loader and the merger.
//!
//! Tables are fully materialized: a header row plus data rows of raw,
//! untrimmed fields. Rows may be shorter or longer than the header, so
//! access fields by index and treat anything out of range as absent.

use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use thiserror::Error;

/// Errors from reading or writing delimited files.
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("{}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {}", .path.display(), .source)]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: not valid UTF-8", .path.display())]
    Utf8 { path: PathBuf },

    #[error("{}: no header row", .path.display())]
    NoHeader { path: PathBuf },
}

/// How file bytes become text before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decoding {
    /// Reject files that are not valid UTF-8.
    Strict,
    /// Replace invalid UTF-8 sequences with U+FFFD.
    #[default]
    Lossy,
}

/// A fully materialized delimited table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Index of a named column, if the header contains it.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Read a delimited file into a [`Table`].
///
/// A leading UTF-8 BOM is stripped and fields keep their raw text.
pub fn read_table(path: &Path, delimiter: u8, decoding: Decoding) -> Result<Table, TabularError> {
    let bytes = fs::read(path).map_err(|source| TabularError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode(bytes, path, decoding)?;
    let table = parse_table(&text, delimiter).map_err(|source| TabularError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if table.headers.is_empty() {
        return Err(TabularError::NoHeader {
            path: path.to_path_buf(),
        });
    }
    Ok(table)
}

/// Parse delimited text; the first record becomes the header.
pub fn parse_table(text: &str, delimiter: u8) -> Result<Table, csv::Error> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if i == 0 {
            headers = fields;
        } else {
            rows.push(fields);
        }
    }

    Ok(Table { headers, rows })
}

/// Write a table with minimal quoting and a trailing newline per record.
pub fn write_table(path: &Path, table: &Table, delimiter: u8) -> Result<(), TabularError> {
    let csv_err = |source| TabularError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(&table.headers).map_err(csv_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| TabularError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Interpret a delimiter argument: one ASCII character, or "tab" / "\t".
pub fn delimiter_byte(arg: &str) -> Option<u8> {
    match arg {
        "tab" | "\\t" | "\t" => Some(b'\t'),
        _ => {
            let mut chars = arg.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Some(c as u8),
                _ => None,
            }
        }
    }
}

fn decode(bytes: Vec<u8>, path: &Path, decoding: Decoding) -> Result<String, TabularError> {
    let text = match decoding {
        Decoding::Strict => String::from_utf8(bytes).map_err(|_| TabularError::Utf8 {
            path: path.to_path_buf(),
        })?,
        Decoding::Lossy => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        },
    };
    // Spreadsheet exports often carry a BOM
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}
