//! Canonical entry selection
//!
//! When a listing carries both `X` and `X.gz`, only `X.gz` is downloaded. The
//! shadowing is exact: `example.txt.gz` hides `example.txt` but not
//! `example.csv`.

use crate::decompress::Compression;
use crate::types::RemoteEntry;
use std::collections::HashMap;

/// Split a name into `(base, extension)`, the extension including its dot
///
/// The extension starts at the last `.` of the final path element; names
/// without a dot have an empty extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    match name[file_start..].rfind('.') {
        Some(dot) => name.split_at(file_start + dot),
        None => (name, ""),
    }
}

/// Reduce a raw listing to the entries that should be processed
///
/// Keeps every compressed entry, keeps a plain entry only when no compressed
/// variant of the exact same name exists, and drops `.` / `..`. Input order is
/// preserved.
pub fn filter_canonical(entries: &[RemoteEntry]) -> Vec<RemoteEntry> {
    let compressed_ext = Compression::COMPRESSED_EXTENSION;

    // First pass: which logical names have a compressed variant
    let mut has_compressed: HashMap<String, bool> = HashMap::with_capacity(entries.len());
    for entry in entries {
        let (base, ext) = split_extension(&entry.name);
        if ext == compressed_ext {
            has_compressed.insert(base.to_string(), true);
        } else {
            has_compressed.entry(entry.name.clone()).or_insert(false);
        }
    }

    // Second pass: keep compressed entries and unshadowed plain entries
    entries
        .iter()
        .filter(|entry| !entry.is_pseudo())
        .filter(|entry| {
            let (_, ext) = split_extension(&entry.name);
            ext == compressed_ext || !has_compressed.get(&entry.name).copied().unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Order entries largest first so long downloads start early
///
/// Stable: entries of equal size keep their listing order.
pub fn sort_largest_first(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| b.size.cmp(&a.size));
}
