//! `LIST` output parsing for Unix (`ls -l`) and DOS/IIS style listings.

use crate::types::RemoteEntry;

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parse a whole `LIST` response body
///
/// Lines that are not entries (`total 42`, blanks, unrecognised formats) are skipped.
pub(crate) fn parse_listing(body: &str) -> Vec<RemoteEntry> {
    body.lines()
        .filter_map(|line| {
            let entry = parse_list_line(line);
            if entry.is_none() && !line.trim().is_empty() {
                tracing::trace!(line, "Skipping unrecognised listing line");
            }
            entry
        })
        .collect()
}

/// Parse one listing line
pub(crate) fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let first = line.split_whitespace().next()?;

    if first.eq_ignore_ascii_case("total") {
        return None;
    }
    if is_dos_date(first) {
        return parse_dos_line(line);
    }
    parse_unix_line(line)
}

/// `-rw-r--r--   1 owner group   1234 Jan 15 10:30 com.zone.gz`
fn parse_unix_line(line: &str) -> Option<RemoteEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let perms = *fields.first()?;
    let kind = perms.chars().next()?;
    if perms.len() < 10 || !"-dlbcps".contains(kind) {
        return None;
    }

    // The size is the field right before the month name; the group column is optional
    let month_idx = (2..fields.len()).find(|&i| {
        MONTHS.contains(&fields[i].to_ascii_lowercase().as_str())
            && fields[i - 1].parse::<u64>().is_ok()
    })?;
    let size: u64 = fields[month_idx - 1].parse().ok()?;

    // month, day, time-or-year, then the name (which may contain spaces)
    let name = skip_fields(line, month_idx + 3)?;
    let name = match kind {
        'l' => name.split(" -> ").next().unwrap_or(name),
        _ => name,
    };
    if name.is_empty() {
        return None;
    }

    Some(RemoteEntry {
        name: name.to_string(),
        size,
        is_directory: kind == 'd',
    })
}

/// `01-15-24  10:30AM       <DIR>          archive`
fn parse_dos_line(line: &str) -> Option<RemoteEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let size_field = *fields.get(2)?;
    let name = skip_fields(line, 3)?;
    if name.is_empty() {
        return None;
    }

    if size_field.eq_ignore_ascii_case("<DIR>") {
        return Some(RemoteEntry::directory(name));
    }
    let size = size_field.replace(',', "").parse().ok()?;
    Some(RemoteEntry::file(name, size))
}

fn is_dos_date(field: &str) -> bool {
    let parts: Vec<&str> = field.split(['-', '/']).collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Return what follows the first `n` whitespace-separated fields
fn skip_fields(line: &str, n: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    Some(rest)
}
