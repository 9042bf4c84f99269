//! Ordering and duplicate detection for listings.
//!
//! These helpers never change record contents; they only decide an order or
//! report positions, leaving presentation to the caller.

use std::{cmp::Ordering, collections::HashSet};

use crate::protocol::response::Record;

/// Compares two strings ignoring case.
fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Display order of two records: kind, then primary value, then title, each
/// compared case-insensitively.
#[must_use]
pub fn compare(a: &Record, b: &Record) -> Ordering {
    cmp_ignore_case(&a.kind, &b.kind)
        .then_with(|| cmp_ignore_case(&a.primary, &b.primary))
        .then_with(|| cmp_ignore_case(a.get("Title"), b.get("Title")))
}

/// Sorts records for display. The sort is stable.
pub fn sort(records: &mut [Record]) {
    records.sort_by(compare);
}

/// Returns the indices of records that repeat an earlier one.
///
/// Two records are the same entry when kind and primary value match
/// exactly; attributes such as queue position or id are ignored. Indices
/// are in encounter order.
#[must_use]
pub fn detect_duplicates(records: &[Record]) -> Vec<usize> {
    let mut seen = HashSet::new();
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| !seen.insert((record.kind.as_str(), record.primary.as_str())))
        .map(|(i, _)| i)
        .collect()
}

/// Formats the `Time` attribute as `m:ss`.
///
/// Returns an empty string when the attribute is missing, zero or not a
/// number.
#[must_use]
pub fn time_text(record: &Record) -> String {
    match record.get("Time").trim().parse::<u32>() {
        Ok(secs) if secs > 0 => format!("{}:{:02}", secs / 60, secs % 60),
        _ => String::new(),
    }
}
