//! Structured views of a response body.
//!
//! A response body is the list of lines a server sent before its `OK`
//! terminator. Every line is split once on its first `:` into a key and a
//! value, and the value is trimmed. Lines without a `:` or with an empty key
//! are skipped in every mode.
//!
//! Three shapes are offered, chosen by what the caller needs:
//!
//! * [`parse_records`] groups lines into [`Record`]s (listings)
//! * [`parse_pairs`] keeps every pair in order ([`KeyValue`])
//! * [`parse_map`] folds pairs into a [`StringMap`], last value wins
//!
//! # Record boundaries
//!
//! The server names entry-type fields in lower case (`file`, `directory`,
//! `playlist`) and metadata fields capitalized (`Title`, `Artist`, `Time`).
//! A key starting with a lower-case letter therefore opens a new record; all
//! following capitalized keys belong to it. No particular field name is
//! assumed.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;

/// A single `key: value` pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Insertion-ordered attributes of a [`Record`].
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value of `key`, or an empty string when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One listing entry: a directory, file or playlist and its metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Lower-case key that opened the record, e.g. `file`.
    pub kind: String,
    /// Value of that key, typically a path.
    pub primary: String,
    pub attributes: Attributes,
}

impl Record {
    #[must_use]
    pub fn new(kind: impl Into<String>, primary: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            primary: primary.into(),
            attributes: Attributes::new(),
        }
    }

    /// Shorthand for `attributes.get(key)`.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.kind == "directory"
    }

    #[must_use]
    pub fn is_playlist(&self) -> bool {
        self.kind == "playlist"
    }

    /// Whether the entry is a stream URL rather than a library path.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.primary.find("://").is_some_and(|i| i > 0)
    }

    fn is_blank(&self) -> bool {
        self.kind.is_empty() && self.attributes.is_empty()
    }
}

/// Unique-key view of a response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StringMap(HashMap<String, String>);

impl StringMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of `key`, or an empty string when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Splits a line on its first `:`.
///
/// Returns `None` for lines without a `:` or with an empty key.
fn split_line(line: &str) -> Option<(&str, &str)> {
    match line.split_once(':') {
        Some((key, value)) if !key.is_empty() => Some((key, value.trim())),
        _ => None,
    }
}

fn opens_record(key: &str) -> bool {
    key.chars().next().is_some_and(char::is_lowercase)
}

/// Groups a response body into records.
///
/// Capitalized keys seen before the first lower-case key are collected in a
/// record with an empty `kind`, which is kept only when it has attributes.
pub fn parse_records<S: AsRef<str>>(lines: &[S]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::default();

    for (key, value) in lines.iter().filter_map(|line| split_line(line.as_ref())) {
        if opens_record(key) {
            let finished = std::mem::replace(&mut current, Record::new(key, value));
            if !finished.is_blank() {
                records.push(finished);
            }
        } else {
            current.attributes.insert(key, value);
        }
    }

    if !current.is_blank() {
        records.push(current);
    }

    records
}

/// Returns every well-formed pair in response order.
pub fn parse_pairs<S: AsRef<str>>(lines: &[S]) -> Vec<KeyValue> {
    lines
        .iter()
        .filter_map(|line| split_line(line.as_ref()))
        .map(|(key, value)| KeyValue::new(key, value))
        .collect()
}

/// Folds a response body into a map; on duplicate keys the last value wins.
pub fn parse_map<S: AsRef<str>>(lines: &[S]) -> StringMap {
    let mut map = StringMap::new();
    for KeyValue { key, value } in parse_pairs(lines) {
        map.insert(key, value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_open_on_lower_case_keys() {
        let lines = ["file: a.mp3", "Title: Song", "Artist: Band", "file: b.mp3"];
        let records = parse_records(&lines);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "file");
        assert_eq!(records[0].primary, "a.mp3");
        assert_eq!(
            records[0].attributes,
            [("Title", "Song"), ("Artist", "Band")]
                .into_iter()
                .collect::<Attributes>()
        );
        assert_eq!(records[1], Record::new("file", "b.mp3"));
    }

    #[test]
    fn parsing_is_repeatable() {
        let lines = [
            "directory: Albums",
            "Last-Modified: 2024-01-01T00:00:00Z",
            "file: Albums/x.flac",
            "Time: 215",
            "playlist: Favorites",
        ];
        assert_eq!(parse_records(&lines), parse_records(&lines));
        assert_eq!(parse_records(&lines).len(), 3);
    }

    #[test]
    fn lsinfo_fixture() {
        let lines = [
            "directory: Jazz",
            "Last-Modified: 2023-11-02T10:00:00Z",
            "directory: Rock",
            "Last-Modified: 2023-11-03T10:00:00Z",
            "file: intro.mp3",
            "Last-Modified: 2023-11-04T10:00:00Z",
            "Time: 62",
            "duration: 61.834",
            "Title: Intro",
            "playlist: Road Trip",
        ];
        let records = parse_records(&lines);
        let kinds: Vec<_> = records.iter().map(|r| r.kind.as_str()).collect();

        // `duration` is a lower-case metadata field and opens its own record.
        assert_eq!(
            kinds,
            ["directory", "directory", "file", "duration", "playlist"]
        );
        assert_eq!(records[2].get("Time"), "62");
        assert_eq!(records[3].primary, "61.834");
        assert_eq!(records[3].get("Title"), "Intro");
    }

    #[test]
    fn playlistinfo_fixture() {
        let lines = [
            "file: a.mp3",
            "Title: A",
            "Pos: 0",
            "Id: 11",
            "file: b.mp3",
            "Pos: 1",
            "Id: 12",
        ];
        let records = parse_records(&lines);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Id"), "11");
        assert_eq!(records[1].get("Pos"), "1");
        assert_eq!(records[1].get("Title"), "");
    }

    #[test]
    fn leading_attributes_form_anonymous_record() {
        let records = parse_records(&["Title: orphan", "file: a.mp3"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, "");
        assert_eq!(records[0].get("Title"), "orphan");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let lines = ["garbage", ": no key", "file: a.mp3", "also garbage", "Title: T"];
        let records = parse_records(&lines);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("Title"), "T");

        assert_eq!(parse_pairs(&lines).len(), 2);
        assert!(parse_records::<&str>(&[]).is_empty());
    }

    #[test]
    fn values_split_on_first_colon_and_trim() {
        let pairs = parse_pairs(&["file: http://radio.example/stream  ", "time:12:34"]);
        assert_eq!(pairs[0], KeyValue::new("file", "http://radio.example/stream"));
        assert_eq!(pairs[1], KeyValue::new("time", "12:34"));
    }

    #[test]
    fn map_keeps_last_value() {
        let map = parse_map(&["volume: 40", "state: play", "volume: 55"]);
        assert_eq!(map.get("volume"), "55");
        assert_eq!(map.get("state"), "play");
        assert_eq!(map.get("missing"), "");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn attributes_keep_insertion_order() {
        let mut attributes = Attributes::new();
        attributes.insert("Title", "x");
        attributes.insert("Artist", "y");
        attributes.insert("Title", "z");

        let keys: Vec<_> = attributes.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Title", "Artist"]);
        assert_eq!(attributes.get("Title"), "z");
    }

    #[test]
    fn remote_entries() {
        assert!(Record::new("file", "http://radio.example/live").is_remote());
        assert!(!Record::new("file", "Music/a.mp3").is_remote());
        assert!(!Record::new("file", "://odd").is_remote());
    }

    #[test]
    fn records_serialize_in_response_order() {
        let records = parse_records(&["file: a.mp3", "Title: A", "Artist: B"]);
        let json = serde_json::to_string(&records[0]).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"file","primary":"a.mp3","attributes":{"Title":"A","Artist":"B"}}"#
        );
    }
}
