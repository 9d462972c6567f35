//! Site/photo merging: widen a site table with photo columns grouped by
//! photo type.
//!
//! Photo rows are aggregated by (site, type); each group becomes a set of
//! pipe-joined columns appended to the matching site row. Types appear in
//! first-seen order, so column layout follows the photo file. Sites keep
//! their row even with no photos, and photo rows pointing at unknown sites
//! only show up in the diagnostics.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::tabular::Table;

/// Column names that tie the two tables together.
#[derive(Debug, PartialEq, Eq)]
pub struct MergeKeys {
    /// Site-table column holding the site name.
    pub site_key: String,
    /// Photo-table column referencing the site name.
    pub photo_key: String,
    /// Photo-table column holding the photo type.
    pub type_field: String,
    /// Photo columns to collect: (source column, output suffix).
    pub value_fields: Vec<(String, String)>,
}

impl Default for MergeKeys {
    fn default() -> Self {
        Self {
            site_key: "site_name_s".to_string(),
            photo_key: "SITE_s".to_string(),
            type_field: "TYPE_s".to_string(),
            value_fields: vec![
                ("FILENAME_s".to_string(), "FILENAME_ss".to_string()),
                ("THUMBNAIL_ss".to_string(), "THUMBNAILS_ss".to_string()),
            ],
        }
    }
}

/// Counts and set differences from a merge run.
#[derive(Debug, Default)]
pub struct MergeDiagnostics {
    /// Data rows read from the site table.
    pub site_rows: usize,
    /// Distinct (site, type) groups found in the photo table.
    pub groups: usize,
    /// Photo types in first-seen order.
    pub type_order: Vec<String>,
    /// Site names with no photo rows, sorted.
    pub sites_without_photos: Vec<String>,
    /// Photo site keys with no matching site row, sorted.
    pub unmatched_photo_keys: Vec<String>,
}

/// Merge photo rows into a widened copy of the site table.
///
/// Output columns are the site columns followed by
/// `<TYPE>_<suffix>` pairs for every type in first-seen order. Rows are
/// sorted by the raw (untrimmed) site key; group lookup uses the trimmed
/// key. Rows shorter than the header are padded with empty fields, wider
/// rows lose their extras.
pub fn merge(sites: &Table, photos: &Table, keys: &MergeKeys) -> (Table, MergeDiagnostics) {
    let site_key_idx = sites.column_index(&keys.site_key);
    if site_key_idx.is_none() {
        warn!(column = %keys.site_key, "site table is missing the key column");
    }
    let photo_key_idx = photos.column_index(&keys.photo_key);
    let type_idx = photos.column_index(&keys.type_field);
    for (name, idx) in [(&keys.photo_key, photo_key_idx), (&keys.type_field, type_idx)] {
        if idx.is_none() {
            warn!(column = %name, "photo table is missing a merge column");
        }
    }
    let value_idx: Vec<Option<usize>> = keys
        .value_fields
        .iter()
        .map(|(source, _)| {
            let idx = photos.column_index(source);
            if idx.is_none() {
                warn!(column = %source, "photo table is missing a value column");
            }
            idx
        })
        .collect();

    // Aggregate photo rows by site, then by type. A row with a type but no
    // site still registers the type so the column layout is complete.
    let mut type_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, HashMap<String, Vec<Vec<String>>>> = HashMap::new();
    for row in &photos.rows {
        let site = field(row, photo_key_idx).trim().to_string();
        let photo_type = field(row, type_idx).trim().to_string();

        if !photo_type.is_empty() && !type_order.iter().any(|t| t == &photo_type) {
            type_order.push(photo_type.clone());
        }
        if site.is_empty() || photo_type.is_empty() {
            continue;
        }

        let lists = groups
            .entry(site)
            .or_default()
            .entry(photo_type)
            .or_insert_with(|| vec![Vec::new(); keys.value_fields.len()]);
        for (list, idx) in lists.iter_mut().zip(&value_idx) {
            list.push(field(row, *idx).trim().to_string());
        }
    }

    let mut headers = sites.headers.clone();
    for photo_type in &type_order {
        for (_, suffix) in &keys.value_fields {
            headers.push(format!("{photo_type}_{suffix}"));
        }
    }

    let mut site_names: HashSet<String> = HashSet::new();
    let mut keyed_rows: Vec<(String, Vec<String>)> = Vec::with_capacity(sites.rows.len());
    let mut truncated = 0usize;
    for row in &sites.rows {
        let raw_key = field(row, site_key_idx).to_string();
        let site = raw_key.trim();
        site_names.insert(site.to_string());

        if row.len() > sites.headers.len() {
            truncated += 1;
        }
        let mut out = row.clone();
        out.resize(sites.headers.len(), String::new());

        let site_groups = groups.get(site);
        for photo_type in &type_order {
            match site_groups.and_then(|by_type| by_type.get(photo_type)) {
                Some(lists) => out.extend(lists.iter().map(|list| join_nonempty(list))),
                None => out.extend(keys.value_fields.iter().map(|_| String::new())),
            }
        }
        keyed_rows.push((raw_key, out));
    }
    if truncated > 0 {
        warn!(rows = truncated, "site rows wider than the header; extra fields dropped");
    }

    keyed_rows.sort_by(|a, b| a.0.cmp(&b.0));
    let rows: Vec<Vec<String>> = keyed_rows.into_iter().map(|(_, row)| row).collect();

    let photo_sites: HashSet<String> = groups.keys().cloned().collect();
    let mut sites_without_photos: Vec<String> =
        site_names.difference(&photo_sites).cloned().collect();
    sites_without_photos.sort();
    let mut unmatched_photo_keys: Vec<String> =
        photo_sites.difference(&site_names).cloned().collect();
    unmatched_photo_keys.sort();

    let diagnostics = MergeDiagnostics {
        site_rows: sites.rows.len(),
        groups: groups.values().map(|by_type| by_type.len()).sum(),
        type_order,
        sites_without_photos,
        unmatched_photo_keys,
    };

    (Table { headers, rows }, diagnostics)
}

fn field(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

/// Join with `|`, skipping empty values.
fn join_nonempty(values: &[String]) -> String {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|f| f.to_string()).collect())
                .collect(),
        }
    }

    fn photo_headers() -> [&'static str; 4] {
        ["SITE_s", "TYPE_s", "FILENAME_s", "THUMBNAIL_ss"]
    }

    #[test]
    fn concatenates_per_site_and_type() {
        let sites = table(&["site_name_s"], &[&["Alpha"]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "Map", "a.jpg", "a_t.jpg"],
                &["Alpha", "Map", "b.jpg", "b_t.jpg"],
            ],
        );

        let (out, diagnostics) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.headers, ["site_name_s", "Map_FILENAME_ss", "Map_THUMBNAILS_ss"]);
        assert_eq!(out.rows[0], ["Alpha", "a.jpg|b.jpg", "a_t.jpg|b_t.jpg"]);
        assert_eq!(diagnostics.groups, 1);
        assert_eq!(diagnostics.site_rows, 1);
    }

    #[test]
    fn types_keep_first_seen_order() {
        let sites = table(&["site_name_s"], &[&["Alpha"]]);
        let photos = table(
            &photo_headers(),
            &[
                // no site, but the type still claims its columns
                &["", "Sketch", "stray.jpg", ""],
                &["Alpha", "Map", "a.jpg", "a_t.jpg"],
                &["Alpha", "Sketch", "s.jpg", "s_t.jpg"],
            ],
        );

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(
            out.headers,
            [
                "site_name_s",
                "Sketch_FILENAME_ss",
                "Sketch_THUMBNAILS_ss",
                "Map_FILENAME_ss",
                "Map_THUMBNAILS_ss",
            ]
        );
        assert_eq!(out.rows[0], ["Alpha", "s.jpg", "s_t.jpg", "a.jpg", "a_t.jpg"]);
    }

    #[test]
    fn rows_without_site_or_type_join_nothing() {
        let sites = table(&["site_name_s"], &[&["Alpha"]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "", "untyped.jpg", ""],
                &["", "", "orphan.jpg", ""],
            ],
        );

        let (out, diagnostics) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.headers, ["site_name_s"]);
        assert_eq!(diagnostics.groups, 0);
        assert_eq!(diagnostics.sites_without_photos, ["Alpha"]);
    }

    #[test]
    fn rows_sort_by_raw_key() {
        let sites = table(
            &["site_name_s"],
            &[&["Bravo"], &[" Alpha"], &["Alpha"]],
        );
        let photos = table(&photo_headers(), &[]);

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        let order: Vec<&str> = out.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(order, [" Alpha", "Alpha", "Bravo"]);
    }

    #[test]
    fn lookup_uses_the_trimmed_key() {
        let sites = table(&["site_name_s"], &[&["  Alpha  "]]);
        let photos = table(&photo_headers(), &[&["Alpha", "Map", "a.jpg", "a_t.jpg"]]);

        let (out, diagnostics) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.rows[0], ["  Alpha  ", "a.jpg", "a_t.jpg"]);
        assert!(diagnostics.sites_without_photos.is_empty());
        assert!(diagnostics.unmatched_photo_keys.is_empty());
    }

    #[test]
    fn missing_groups_leave_empty_columns() {
        let sites = table(&["site_name_s"], &[&["Alpha"], &["Bravo"]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "Map", "a.jpg", "a_t.jpg"],
                &["Bravo", "Sketch", "s.jpg", "s_t.jpg"],
            ],
        );

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.rows[0], ["Alpha", "a.jpg", "a_t.jpg", "", ""]);
        assert_eq!(out.rows[1], ["Bravo", "", "", "s.jpg", "s_t.jpg"]);
    }

    #[test]
    fn empty_values_drop_out_of_the_join() {
        let sites = table(&["site_name_s"], &[&["Alpha"]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "Map", "a.jpg", ""],
                &["Alpha", "Map", "", "b_t.jpg"],
                &["Alpha", "Map", "c.jpg", "c_t.jpg"],
            ],
        );

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.rows[0], ["Alpha", "a.jpg|c.jpg", "b_t.jpg|c_t.jpg"]);
    }

    #[test]
    fn set_differences_are_sorted() {
        let sites = table(&["site_name_s"], &[&["Delta"], &["Alpha"], &[""]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "Map", "a.jpg", ""],
                &["Zulu", "Map", "z.jpg", ""],
                &["Echo", "Map", "e.jpg", ""],
            ],
        );

        let (_, diagnostics) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(diagnostics.sites_without_photos, ["", "Delta"]);
        assert_eq!(diagnostics.unmatched_photo_keys, ["Echo", "Zulu"]);
    }

    #[test]
    fn ragged_site_rows_are_squared_up() {
        let sites = table(
            &["site_name_s", "region_s"],
            &[
                &["Alpha"],
                &["Bravo", "north", "stray extra"],
            ],
        );
        let photos = table(&photo_headers(), &[&["Alpha", "Map", "a.jpg", "a_t.jpg"]]);

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.rows[0], ["Alpha", "", "a.jpg", "a_t.jpg"]);
        assert_eq!(out.rows[1], ["Bravo", "north", "", ""]);
    }

    #[test]
    fn no_photos_keeps_site_columns_unchanged() {
        let sites = table(&["site_name_s", "region_s"], &[&["Bravo", "n"], &["Alpha", "s"]]);
        let photos = table(&photo_headers(), &[]);

        let (out, diagnostics) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.headers, ["site_name_s", "region_s"]);
        assert_eq!(out.rows[0], ["Alpha", "s"]);
        assert_eq!(out.rows[1], ["Bravo", "n"]);
        assert!(diagnostics.type_order.is_empty());
        assert_eq!(diagnostics.sites_without_photos, ["Alpha", "Bravo"]);
    }

    #[test]
    fn duplicate_detail_rows_both_appear() {
        let sites = table(&["site_name_s"], &[&["Alpha"]]);
        let photos = table(
            &photo_headers(),
            &[
                &["Alpha", "Map", "a.jpg", "a_t.jpg"],
                &["Alpha", "Map", "a.jpg", "a_t.jpg"],
            ],
        );

        let (out, _) = merge(&sites, &photos, &MergeKeys::default());
        assert_eq!(out.rows[0], ["Alpha", "a.jpg|a.jpg", "a_t.jpg|a_t.jpg"]);
    }

    #[test]
    fn custom_key_columns() {
        let sites = table(&["name"], &[&["Alpha"]]);
        let photos = table(
            &["PLACE", "KIND", "FILE"],
            &[&["Alpha", "Aerial", "x.png"]],
        );
        let keys = MergeKeys {
            site_key: "name".to_string(),
            photo_key: "PLACE".to_string(),
            type_field: "KIND".to_string(),
            value_fields: vec![("FILE".to_string(), "FILES_ss".to_string())],
        };

        let (out, _) = merge(&sites, &photos, &keys);
        assert_eq!(out.headers, ["name", "Aerial_FILES_ss"]);
        assert_eq!(out.rows[0], ["Alpha", "x.png"]);
    }
}
