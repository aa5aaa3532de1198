//! Tag values, tag sets, and tag name canonicalization
//!
//! Every tag name is canonicalized before it is stored or looked up, so
//! `disk`, `cd`, `TPOS` and `discnumber` all address the same `disc` entry.

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// One known tag: its aliases (canonical first) and container IDs
struct TagAlias {
    names: &'static [&'static str],
    /// ID3v2 frame, `TXXX:DESC` for user text frames
    id3: &'static str,
    /// Vorbis comment field
    vorbis: &'static str,
}

const fn alias(names: &'static [&'static str], id3: &'static str, vorbis: &'static str) -> TagAlias {
    TagAlias { names, id3, vorbis }
}

static TAG_TABLE: &[TagAlias] = &[
    alias(&["picture", "cover", "artwork"], "APIC", "metadata_block_picture"),
    alias(&["comment"], "COMM", "comment"),
    alias(&["grouping", "contentgroup"], "TIT1", "grouping"),
    alias(&["arranger", "involvedpeople"], "TIPL", "arranger"),
    alias(&["movement", "movementnumber"], "MVIN", "movement"),
    alias(&["movementname"], "MVNM", "movementname"),
    alias(&["album"], "TALB", "album"),
    alias(&["bpm", "beatsperminute", "tempo"], "TBPM", "bpm"),
    alias(&["compilation"], "TCMP", "compilation"),
    alias(&["composer"], "TCOM", "composer"),
    alias(&["genres", "genre"], "TCON", "genre"),
    alias(&["copyright"], "TCOP", "copyright"),
    alias(&["date", "recordingdate", "recordingtime"], "TDRC", "date"),
    alias(&["year"], "TYER", "year"),
    alias(&["encodedby", "encoder"], "TENC", "encodedby"),
    alias(&["lyricist"], "TEXT", "lyricist"),
    alias(&["title"], "TIT2", "title"),
    alias(&["subtitle"], "TIT3", "subtitle"),
    alias(&["initialkey", "key"], "TKEY", "initialkey"),
    alias(&["language"], "TLAN", "language"),
    alias(&["length"], "TLEN", "length"),
    alias(&["media"], "TMED", "media"),
    alias(&["originalalbum", "origalbum"], "TOAL", "originalalbum"),
    alias(&["originalartist", "origartist"], "TOPE", "originalartist"),
    alias(&["originallyricist"], "TOLY", "originallyricist"),
    alias(&["originalfilename"], "TOFN", "originalfilename"),
    alias(&["originalreleaseyear", "originaldate"], "TDOR", "originaldate"),
    alias(&["artist"], "TPE1", "artist"),
    alias(&["band", "albumartist"], "TPE2", "albumartist"),
    alias(&["conductor"], "TPE3", "conductor"),
    alias(&["remixer", "interpretedby"], "TPE4", "remixer"),
    alias(
        &["disc", "disk", "cd", "discnumber", "disknumber", "partofset"],
        "TPOS",
        "discnumber",
    ),
    alias(&["publisher", "organization", "label"], "TPUB", "organization"),
    alias(&["track", "tracknumber"], "TRCK", "tracknumber"),
    alias(&["isrc"], "TSRC", "isrc"),
    alias(&["encodersettings"], "TSSE", "encodersettings"),
    alias(&["license", "copyrighturl"], "WCOP", "license"),
    alias(&["artisturl", "website"], "WOAR", "website"),
    alias(&["sourceurl", "source"], "WOAS", "source"),
    alias(
        &["discs", "disks", "totaldiscs", "totaldisks", "disctotal"],
        "TXXX:TOTALDISCS",
        "totaldiscs",
    ),
    alias(&["tracks", "totaltracks", "tracktotal"], "TXXX:TOTALTRACKS", "totaltracks"),
    alias(&["lyrics", "unsyncedlyrics"], "USLT", "lyrics"),
    alias(&["mood"], "TMOO", "mood"),
    alias(&["keywords"], "TKWD", "keywords"),
    alias(&["albumartistsort", "albumartistsortorder"], "TSO2", "albumartistsort"),
    alias(&["albumsort", "albumsortorder"], "TSOA", "albumsort"),
    alias(&["composersort", "composersortorder"], "TSOC", "composersort"),
    alias(&["artistsort", "artistsortorder"], "TSOP", "artistsort"),
    alias(&["titlesort", "titlesortorder"], "TSOT", "titlesort"),
    alias(&["setsubtitle", "discsubtitle"], "TSST", "discsubtitle"),
];

/// Map any known alias or container ID to its canonical tag name
///
/// Lookup is case-insensitive and ignores a `:desc` suffix unless the
/// container ID itself carries one (`TXXX:TOTALDISCS`). Unknown names are
/// returned unchanged.
pub fn canonicalize(name: &str) -> String {
    let trimmed = name.trim();
    let (base, desc) = match trimmed.split_once(':') {
        Some((base, desc)) => (base, desc),
        None => (trimmed, ""),
    };
    let lower = base.to_lowercase();

    if let Some(entry) = TAG_TABLE.iter().find(|e| e.names.contains(&lower.as_str())) {
        return entry.names[0].to_string();
    }

    // ID3 frame IDs, preferring an exact `ID:DESC` match
    let mut frame_match = None;
    for entry in TAG_TABLE {
        let (id, id_desc) = match entry.id3.split_once(':') {
            Some((id, id_desc)) => (id, id_desc),
            None => (entry.id3, ""),
        };
        if !id.eq_ignore_ascii_case(base) {
            continue;
        }
        if id_desc.eq_ignore_ascii_case(desc) {
            return entry.names[0].to_string();
        }
        if id_desc.is_empty() {
            frame_match = frame_match.or(Some(entry.names[0]));
        }
    }
    if let Some(canonical) = frame_match {
        return canonical.to_string();
    }

    if let Some(entry) = TAG_TABLE.iter().find(|e| e.vorbis == lower) {
        return entry.names[0].to_string();
    }

    trimmed.to_string()
}

/// ID3 frame ID for a canonical name, if known
pub fn id3_frame(name: &str) -> Option<&'static str> {
    let canonical = canonicalize(name);
    TAG_TABLE
        .iter()
        .find(|e| e.names[0] == canonical)
        .map(|e| e.id3)
}

/// A tag value: integer, float, text, or a list of texts
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl TagValue {
    /// Total parse: integer, then finite float, else text
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return TagValue::Int(n);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() && !trimmed.is_empty() => TagValue::Float(f),
            _ => TagValue::Text(text.to_string()),
        }
    }

    /// Convert a config JSON value; `null` has no tag value
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(TagValue::Text(b.to_string())),
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => TagValue::Int(i),
                None => TagValue::Float(n.as_f64().unwrap_or(0.0)),
            }),
            Value::String(s) => Some(TagValue::Text(s.clone())),
            Value::Array(items) => Some(TagValue::List(
                items
                    .iter()
                    .filter_map(TagValue::from_json)
                    .map(|v| v.to_string())
                    .collect(),
            )),
            Value::Object(_) => Some(TagValue::Text(value.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            TagValue::Int(i) => Value::from(*i),
            TagValue::Float(f) => Value::from(*f),
            TagValue::Text(s) => Value::from(s.as_str()),
            TagValue::List(items) => Value::from(items.clone()),
        }
    }

    /// Empty text or an empty list
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Text(s) => s.trim().is_empty(),
            TagValue::List(items) => items.iter().all(|s| s.trim().is_empty()),
            _ => false,
        }
    }

    /// Leading integer: `3`, `"3"`, `"3/12"`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Int(i) => Some(*i),
            TagValue::Float(f) => Some(*f as i64),
            TagValue::Text(s) => s.split('/').next()?.trim().parse().ok(),
            TagValue::List(items) => items.first().and_then(|s| TagValue::parse(s).as_i64()),
        }
    }

    /// Number after a `/`, as in `"3/12"`
    pub fn total(&self) -> Option<i64> {
        match self {
            TagValue::Text(s) => s.split_once('/')?.1.trim().parse().ok(),
            _ => None,
        }
    }

    /// Values as a list of texts
    pub fn to_list(&self) -> Vec<String> {
        match self {
            TagValue::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(i) => write!(f, "{i}"),
            TagValue::Float(v) => write!(f, "{v}"),
            TagValue::Text(s) => f.write_str(s),
            TagValue::List(items) => f.write_str(&items.join("; ")),
        }
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<i64> for TagValue {
    fn from(i: i64) -> Self {
        TagValue::Int(i)
    }
}

/// JPEG-encoded cover art
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Canonical tag name -> value, in insertion order, plus an optional picture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    entries: Vec<(String, TagValue)>,
    picture: Option<Picture>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, canonical: &str) -> Option<usize> {
        self.entries.iter().position(|(name, _)| name == canonical)
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        let canonical = canonicalize(name);
        self.position(&canonical).map(|i| &self.entries[i].1)
    }

    /// Value as text, if present and non-empty
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    }

    /// Present with a non-empty value
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Set, replacing any existing value
    pub fn set(&mut self, name: &str, value: impl Into<TagValue>) {
        let canonical = canonicalize(name);
        let value = value.into();
        match self.position(&canonical) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((canonical, value)),
        }
    }

    /// Set only if absent or empty; returns whether the value was stored
    pub fn set_default(&mut self, name: &str, value: impl Into<TagValue>) -> bool {
        let value = value.into();
        if self.has(name) || value.is_empty() {
            return false;
        }
        self.set(name, value);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<TagValue> {
        let canonical = canonicalize(name);
        self.position(&canonical).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn picture(&self) -> Option<&Picture> {
        self.picture.as_ref()
    }

    pub fn set_picture(&mut self, picture: Picture) {
        self.picture = Some(picture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_aliases() {
        for alias in ["disc", "Disk", "CD", "discnumber", "partofset", "TPOS"] {
            assert_eq!(canonicalize(alias), "disc");
        }
        assert_eq!(canonicalize("albumartist"), "band");
        assert_eq!(canonicalize("TRACKNUMBER"), "track");
        assert_eq!(canonicalize("genre"), "genres");
        assert_eq!(canonicalize("TIT2"), "title");
        assert_eq!(canonicalize("COMM:description"), "comment");
        assert_eq!(canonicalize("TXXX:TOTALDISCS"), "discs");
        assert_eq!(canonicalize("txxx:totaltracks"), "tracks");
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(canonicalize("MyCustomTag"), "MyCustomTag");
        assert_eq!(canonicalize("TXXX:SOMETHING"), "TXXX:SOMETHING");
    }

    #[test]
    fn test_canonicalize_idempotent() {
        let names = TAG_TABLE.iter().flat_map(|e| {
            e.names
                .iter()
                .copied()
                .chain([e.id3, e.vorbis])
        });
        for name in names.chain(["unknown", "Weird:Name"]) {
            let once = canonicalize(name);
            assert_eq!(canonicalize(&once), once, "{name}");
        }
        for entry in TAG_TABLE {
            assert_eq!(canonicalize(entry.names[0]), entry.names[0]);
        }
    }

    #[test]
    fn test_aliases_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in TAG_TABLE.iter().flat_map(|e| e.names.iter()) {
            assert!(seen.insert(*name), "duplicate alias {name}");
        }
    }

    #[test]
    fn test_parse_is_total() {
        assert_eq!(TagValue::parse("12"), TagValue::Int(12));
        assert_eq!(TagValue::parse(" 1.5 "), TagValue::Float(1.5));
        assert_eq!(TagValue::parse("1/12"), TagValue::Text("1/12".into()));
        assert_eq!(TagValue::parse(""), TagValue::Text(String::new()));
        assert_eq!(TagValue::parse("inf"), TagValue::Text("inf".into()));
    }

    #[test]
    fn test_numeric_views() {
        let disc = TagValue::from("2/3");
        assert_eq!(disc.as_i64(), Some(2));
        assert_eq!(disc.total(), Some(3));
        assert_eq!(TagValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(TagValue::from("side A").as_i64(), None);
    }

    #[test]
    fn test_tag_set_canonical_keys() {
        let mut tags = TagSet::new();
        tags.set("disk", "1");
        assert_eq!(tags.text("cd").as_deref(), Some("1"));
        tags.set("TPOS", "2");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.text("disc").as_deref(), Some("2"));
    }

    #[test]
    fn test_set_default_is_first_writer_wins() {
        let mut tags = TagSet::new();
        assert!(tags.set_default("artist", "A"));
        assert!(!tags.set_default("artist", "B"));
        assert_eq!(tags.text("artist").as_deref(), Some("A"));

        // Empty values count as absent
        tags.set("album", "");
        assert!(tags.set_default("album", "X"));
        assert!(!tags.set_default("genre", ""));
        assert!(!tags.has("genre"));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(TagValue::from_json(&json!(3)), Some(TagValue::Int(3)));
        assert_eq!(
            TagValue::from_json(&json!(["a", 1])),
            Some(TagValue::List(vec!["a".into(), "1".into()]))
        );
        assert_eq!(TagValue::from_json(&Value::Null), None);
    }
}
