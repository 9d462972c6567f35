//! Mapped load command: delimited file to PostgreSQL table.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::db::{build_insert_sql, redact_url_password, PostgresSink, TableIdent};
use crate::loader::mapping::{HeaderMode, Mapping};
use crate::loader::{load, validate, LoadOptions, LoadReport, ProgressCallback};
use crate::tabular::{self, Decoding};

use super::{Encoding, MappingHeader};

#[allow(clippy::too_many_arguments)]
pub async fn cmd_load(
    csv_file: &Path,
    table: &str,
    conn: &str,
    mapping_csv: &Path,
    delimiter: &str,
    encoding: Encoding,
    null_blank: bool,
    dry_run: bool,
    commit_every: usize,
    dedupe_skip: bool,
    dedupe_cols: &str,
    mapping_header: MappingHeader,
    report_json: Option<&Path>,
) -> anyhow::Result<()> {
    let delimiter = tabular::delimiter_byte(delimiter).ok_or_else(|| {
        anyhow::anyhow!("--delimiter must be a single ASCII character or \"tab\"")
    })?;
    let decoding = match encoding {
        Encoding::Utf8 => Decoding::Strict,
        Encoding::Utf8Lossy => Decoding::Lossy,
    };
    let header_mode = match mapping_header {
        MappingHeader::Auto => HeaderMode::Auto,
        MappingHeader::Yes => HeaderMode::Skip,
        MappingHeader::No => HeaderMode::Keep,
    };
    let dedupe_columns = if dedupe_skip {
        Some(
            dedupe_cols
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let table_ident = TableIdent::parse(table)?;
    let mapping = Mapping::from_path(mapping_csv, header_mode)?;
    let source = tabular::read_table(csv_file, delimiter, decoding)?;

    println!("{} Loading {}:", style("→").cyan(), csv_file.display());
    println!("  Table: {}", table_ident.quoted());
    println!("  Database: {}", redact_url_password(conn));
    println!("  Mapped columns: {}", mapping.len());
    println!("  Source rows: {}", source.rows.len());
    println!("  Commit every: {}", commit_every);
    if let Some(columns) = &dedupe_columns {
        println!("  Dedupe on: {}", columns.join(", "));
    }

    let options = LoadOptions {
        null_blank,
        dedupe_columns,
        commit_every,
    };

    // Fail-fast checks run before a connection is opened
    validate(&source, &mapping, &options)?;

    if dry_run {
        println!("\n  Insert: {}", build_insert_sql(&table_ident, &mapping.table_columns()));
        println!(
            "\n{} Dry run complete. Validated {} row(s); nothing inserted.",
            style("✓").green(),
            source.rows.len()
        );
        return Ok(());
    }

    let mut sink = PostgresSink::connect(conn, table_ident, &mapping.table_columns()).await?;

    let pb = make_progress_bar(source.rows.len() as u64);
    let cb = make_progress_callback(pb.clone());
    let report = load(&mut sink, &source, &mapping, &options, Some(cb)).await?;
    pb.finish();

    print_report(&report, table, dedupe_skip);

    if let Some(path) = report_json {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("  Report written to {}", path.display());
    }

    Ok(())
}

fn make_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/dim} {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_progress_callback(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |count| {
        pb.set_position(count as u64);
    })
}

fn print_report(report: &LoadReport, table: &str, dedupe: bool) {
    println!(
        "\n{} Done. Inserted {} row(s) into {}.",
        style("✓").green(),
        report.inserted,
        table
    );
    if dedupe {
        println!("  Skipped duplicates: {}", report.skipped);
    }

    if report.failures.is_empty() {
        println!("  No failed rows.");
        return;
    }

    println!("\n{}", style("=== FAILED ROWS REPORT ===").red().bold());
    println!("Failed rows: {}", report.failures.len());
    for failure in &report.failures {
        println!(
            "{} Row {}: {}",
            style("✗").red(),
            failure.row_number,
            failure.error
        );
        println!(
            "    values: {}",
            failure
                .values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!(
            "    mapped: {}",
            failure
                .mapped
                .iter()
                .map(|m| format!("{}={}", m.column, m.value))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
}
