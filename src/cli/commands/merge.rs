//! Merge command: photo rows into a widened site table.

use std::path::Path;

use console::style;

use crate::merge::{merge, MergeKeys};
use crate::tabular::{self, Decoding};

#[allow(clippy::too_many_arguments)]
pub fn cmd_merge(
    sites_file: &Path,
    photos_file: &Path,
    out_file: &Path,
    delimiter: &str,
    site_key: &str,
    photo_key: &str,
    type_field: &str,
    value_fields: &str,
) -> anyhow::Result<()> {
    let delimiter = tabular::delimiter_byte(delimiter).ok_or_else(|| {
        anyhow::anyhow!("--delimiter must be a single ASCII character or \"tab\"")
    })?;
    let value_fields = parse_value_fields(value_fields)?;

    println!("{} Merging photo data:", style("→").cyan());
    println!("  Sites:  {}", sites_file.display());
    println!("  Photos: {}", photos_file.display());
    println!("  Output: {}", out_file.display());

    let sites = tabular::read_table(sites_file, delimiter, Decoding::Lossy)?;
    let photos = tabular::read_table(photos_file, delimiter, Decoding::Lossy)?;

    let keys = MergeKeys {
        site_key: site_key.to_string(),
        photo_key: photo_key.to_string(),
        type_field: type_field.to_string(),
        value_fields,
    };
    let (merged, diagnostics) = merge(&sites, &photos, &keys);

    tabular::write_table(out_file, &merged, delimiter)?;

    eprintln!(
        "Read {} site rows from {}",
        diagnostics.site_rows,
        sites_file.display()
    );
    eprintln!(
        "Read {} sites-with-photos entries from {}",
        diagnostics.groups,
        photos_file.display()
    );
    eprintln!(
        "Found {} values (in order): {}",
        type_field,
        diagnostics.type_order.join(", ")
    );

    eprintln!(
        "Sites with no photos (present in {} only): {}",
        sites_file.display(),
        diagnostics.sites_without_photos.len()
    );
    if !diagnostics.sites_without_photos.is_empty() {
        eprintln!("  These sites have no photo rows:");
        for site in &diagnostics.sites_without_photos {
            eprintln!("    {}", site);
        }
    }
    eprintln!(
        "Sites present in photos but missing from {}: {}",
        sites_file.display(),
        diagnostics.unmatched_photo_keys.len()
    );
    if !diagnostics.unmatched_photo_keys.is_empty() {
        eprintln!("  These sites appear only in the photo table:");
        for site in &diagnostics.unmatched_photo_keys {
            eprintln!("    {}", site);
        }
    }

    println!(
        "\n{} Wrote {} row(s), {} column(s) to {}",
        style("✓").green(),
        merged.rows.len(),
        merged.headers.len(),
        out_file.display()
    );

    Ok(())
}

fn parse_value_fields(arg: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut fields = Vec::new();
    for pair in arg.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((source, suffix)) = pair.split_once(':') else {
            anyhow::bail!("--value-fields entries must be source:SUFFIX, got \"{pair}\"");
        };
        let source = source.trim();
        let suffix = suffix.trim();
        if source.is_empty() || suffix.is_empty() {
            anyhow::bail!("--value-fields entries must be source:SUFFIX, got \"{pair}\"");
        }
        fields.push((source.to_string(), suffix.to_string()));
    }
    if fields.is_empty() {
        anyhow::bail!("--value-fields needs at least one source:SUFFIX pair");
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_trims() {
        let fields = parse_value_fields(" FILENAME_s:FILENAME_ss , THUMBNAIL_ss:THUMBNAILS_ss ")
            .expect("parses");
        assert_eq!(
            fields,
            [
                ("FILENAME_s".to_string(), "FILENAME_ss".to_string()),
                ("THUMBNAIL_ss".to_string(), "THUMBNAILS_ss".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(parse_value_fields("FILENAME_s").is_err());
        assert!(parse_value_fields("FILENAME_s:").is_err());
        assert!(parse_value_fields(":SUFFIX").is_err());
        assert!(parse_value_fields("").is_err());
    }
}
