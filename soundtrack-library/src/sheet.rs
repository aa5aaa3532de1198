//! CSV side sheets: per-track tag rows and per-track effect rows
//!
//! The first column of a tag sheet is the reference: its header names the
//! tag to match on (or `filename`), and each row's first cell is the value
//! to match. Remaining columns become tags after the sheet's
//! `ignore`/`map`/`copy` rules are applied.

use crate::tags::{canonicalize, TagSet};
use serde_json::{Map, Value};
use soundtrack_audio::EffectDescriptor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Sheet '{key}' must be a map of column -> tag, got {value}")]
    InvalidMapping { key: String, value: String },
    #[error("Sheet config must be a path or an object, got {0}")]
    InvalidConfig(String),
}

impl SheetError {
    /// Errors that abort the run instead of degrading to "no sheet tags"
    pub fn is_fatal(&self) -> bool {
        matches!(self, SheetError::InvalidMapping { .. } | SheetError::InvalidConfig(_))
    }
}

/// Which file to read and how to rename its columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetConfig {
    pub file: PathBuf,
    /// Columns to drop
    pub ignore: Vec<String>,
    /// Column -> tag renames
    pub map: Vec<(String, String)>,
    /// Column -> additional tag that receives a copy
    pub copy: Vec<(String, String)>,
}

impl SheetConfig {
    /// Decode `"path.csv"` or `{file, ignore, map, copy}`
    ///
    /// Relative paths resolve against `base_dir`.
    pub fn from_value(value: &Value, base_dir: &Path) -> Result<Self, SheetError> {
        match value {
            Value::String(file) => Ok(Self {
                file: base_dir.join(file),
                ..Self::default()
            }),
            Value::Object(map) => {
                let file = map
                    .get("file")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SheetError::InvalidConfig(value.to_string()))?;
                let ignore = match map.get("ignore") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::String(s)) => vec![s.clone()],
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    Some(other) => {
                        return Err(SheetError::InvalidMapping {
                            key: "ignore".into(),
                            value: other.to_string(),
                        })
                    }
                };
                Ok(Self {
                    file: base_dir.join(file),
                    ignore,
                    map: pairs("map", map.get("map"))?,
                    copy: pairs("copy", map.get("copy"))?,
                })
            }
            other => Err(SheetError::InvalidConfig(other.to_string())),
        }
    }

    fn is_ignored(&self, column: &str) -> bool {
        let column = canonicalize(column);
        self.ignore.iter().any(|c| canonicalize(c) == column)
    }

    fn renamed<'a>(&'a self, column: &'a str) -> &'a str {
        self.map
            .iter()
            .find(|(from, _)| from.trim().eq_ignore_ascii_case(column))
            .map(|(_, to)| to.as_str())
            .unwrap_or(column)
    }

    fn copies<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.copy
            .iter()
            .filter(move |(from, _)| from.trim().eq_ignore_ascii_case(column))
            .map(|(_, to)| to.as_str())
    }
}

fn pairs(key: &str, value: Option<&Value>) -> Result<Vec<(String, String)>, SheetError> {
    let invalid = |v: &Value| SheetError::InvalidMapping {
        key: key.to_string(),
        value: v.to_string(),
    };
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(from, to)| match to {
                Value::String(to) => Ok((from.clone(), to.clone())),
                other => Err(invalid(other)),
            })
            .collect(),
        Some(other) => Err(invalid(other)),
    }
}

/// One row: the reference cell plus `(tag, value)` pairs
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub key: String,
    pub tags: Vec<(String, String)>,
}

/// A loaded tag sheet
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    reference: String,
    rows: Vec<SheetRow>,
}

impl Sheet {
    pub fn load(config: &SheetConfig) -> Result<Self, SheetError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&config.file)?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let reference = headers.first().cloned().unwrap_or_default();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let Some(key) = record.get(0) else { continue };
            let mut tags = Vec::new();

            for (column, value) in headers.iter().zip(record.iter()).skip(1) {
                if value.is_empty() || column.is_empty() || config.is_ignored(column) {
                    continue;
                }
                tags.push((config.renamed(column).to_string(), value.to_string()));
                for target in config.copies(column) {
                    tags.push((target.to_string(), value.to_string()));
                }
            }

            rows.push(SheetRow {
                key: key.to_string(),
                tags,
            });
        }

        tracing::debug!(file = %config.file.display(), rows = rows.len(), reference = %reference, "Loaded sheet");
        Ok(Self { reference, rows })
    }

    /// Header of the first column
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.rows
    }

    /// First row whose reference cell matches, case-insensitively
    ///
    /// A `filename` reference matches the file's name with or without its
    /// extension; any other reference is compared against that tag.
    pub fn find(&self, file: Option<&Path>, tags: &TagSet) -> Option<&SheetRow> {
        let reference = self.reference.trim();
        let candidates: Vec<String> = if reference.eq_ignore_ascii_case("filename") {
            let Some(file) = file else { return None };
            [file.file_name(), file.file_stem()]
                .into_iter()
                .flatten()
                .map(|s| s.to_string_lossy().to_lowercase())
                .collect()
        } else {
            match tags.text(reference) {
                Some(value) => vec![value.to_lowercase()],
                None => return None,
            }
        };

        self.rows
            .iter()
            .find(|row| candidates.contains(&row.key.to_lowercase()))
    }
}

/// Effects listed per track title
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EffectSheet {
    rows: Vec<(String, EffectDescriptor)>,
}

impl EffectSheet {
    /// Columns: title, `effect`, optional `start`/`length`, then options
    pub fn load(path: &Path) -> Result<Self, SheetError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_lowercase()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let Some(title) = record.get(0).filter(|t| !t.is_empty()) else {
                continue;
            };

            let mut name = None;
            let mut raw = Map::new();
            let mut options = Map::new();
            for (column, value) in headers.iter().zip(record.iter()).skip(1) {
                if value.is_empty() {
                    continue;
                }
                match column.as_str() {
                    "effect" | "name" => name = Some(value.to_string()),
                    "start" | "length" => {
                        raw.insert(column.clone(), Value::from(value));
                    }
                    _ => {
                        options.insert(column.clone(), Value::from(value));
                    }
                }
            }

            let Some(name) = name else {
                tracing::warn!(file = %path.display(), title, "Effect sheet row has no effect name");
                continue;
            };
            raw.insert("name".into(), Value::from(name));
            raw.insert("options".into(), Value::Object(options));

            match EffectDescriptor::from_value(&Value::Object(raw)) {
                Ok(descriptor) => rows.push((title.to_string(), descriptor)),
                Err(e) => tracing::warn!(file = %path.display(), title, error = %e, "Skipping effect sheet row"),
            }
        }

        Ok(Self { rows })
    }

    /// Effects for `title`, in sheet order
    pub fn effects_for(&self, title: &str) -> Vec<EffectDescriptor> {
        let title = title.to_lowercase();
        self.rows
            .iter()
            .filter(|(t, _)| t.to_lowercase() == title)
            .map(|(_, d)| d.clone())
            .collect()
    }
}

/// Sheets loaded at most once per batch
///
/// A sheet that fails to load is remembered as missing, so the warning is
/// logged once.
#[derive(Debug, Default)]
pub struct SheetCache {
    sheets: HashMap<PathBuf, Option<Sheet>>,
    effect_sheets: HashMap<PathBuf, Option<EffectSheet>>,
}

impl SheetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&mut self, config: &SheetConfig) -> Option<&Sheet> {
        self.sheets
            .entry(config.file.clone())
            .or_insert_with(|| match Sheet::load(config) {
                Ok(sheet) => Some(sheet),
                Err(e) => {
                    tracing::warn!(file = %config.file.display(), error = %e, "Ignoring unreadable sheet");
                    None
                }
            })
            .as_ref()
    }

    pub fn effect_sheet(&mut self, path: &Path) -> Option<&EffectSheet> {
        self.effect_sheets
            .entry(path.to_path_buf())
            .or_insert_with(|| match EffectSheet::load(path) {
                Ok(sheet) => Some(sheet),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Ignoring unreadable effect sheet");
                    None
                }
            })
            .as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_filename_reference_matches_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "sheet.csv", "Filename , artist , disc\ntrack 1.mp3, A1, 1\nTrack 2 , A2 , 2\n");
        let config = SheetConfig::from_value(&json!("sheet.csv"), dir.path()).unwrap();
        let sheet = Sheet::load(&config).unwrap();

        let row = sheet.find(Some(Path::new("/x/track 2.wav")), &TagSet::new()).unwrap();
        assert_eq!(row.tags, vec![("artist".into(), "A2".into()), ("disc".into(), "2".into())]);

        let row = sheet.find(Some(Path::new("/x/TRACK 1.mp3")), &TagSet::new()).unwrap();
        assert_eq!(row.key, "track 1.mp3");
        assert!(sheet.find(Some(Path::new("/x/other.wav")), &TagSet::new()).is_none());
    }

    #[test]
    fn test_tag_reference() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "s.csv", "title,composer\nOverworld,Someone\n");
        let sheet = Sheet::load(&SheetConfig::from_value(&json!("s.csv"), dir.path()).unwrap()).unwrap();

        let mut tags = TagSet::new();
        tags.set("TIT2", "overworld");
        assert_eq!(sheet.find(None, &tags).unwrap().tags[0].1, "Someone");
        assert!(sheet.find(None, &TagSet::new()).is_none());
    }

    #[test]
    fn test_ignore_map_copy() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "s.csv", "title,notes,who,year\nA,skip me,Bob,1999\n");
        let config = SheetConfig::from_value(
            &json!({
                "file": "s.csv",
                "ignore": ["notes"],
                "map": {"who": "artist"},
                "copy": {"year": "date"}
            }),
            dir.path(),
        )
        .unwrap();
        let sheet = Sheet::load(&config).unwrap();
        assert_eq!(
            sheet.rows()[0].tags,
            vec![
                ("artist".into(), "Bob".into()),
                ("year".into(), "1999".into()),
                ("date".into(), "1999".into()),
            ]
        );
    }

    #[test]
    fn test_malformed_mapping_is_fatal() {
        let err = SheetConfig::from_value(&json!({"file": "s.csv", "map": ["who"]}), Path::new(".")).unwrap_err();
        assert!(err.is_fatal());
        let err = SheetConfig::from_value(&json!({"file": "s.csv", "copy": "year"}), Path::new(".")).unwrap_err();
        assert!(matches!(err, SheetError::InvalidMapping { key, .. } if key == "copy"));
    }

    #[test]
    fn test_unreadable_sheet_degrades() {
        let mut cache = SheetCache::new();
        let config = SheetConfig::from_value(&json!("missing.csv"), Path::new("/nonexistent")).unwrap();
        assert!(cache.sheet(&config).is_none());
        assert!(!Sheet::load(&config).unwrap_err().is_fatal());
    }

    #[test]
    fn test_effect_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "fx.csv",
            "title,effect,start,length,cutoff,gain\nMain,lowpass,1,2,800,\nmain,gain,,,,0.5\nOther,fade,,,,\n",
        );
        let sheet = EffectSheet::load(&path).unwrap();
        let effects = sheet.effects_for("MAIN");
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0].name, "lowpass");
        assert_eq!(effects[0].options, json!({"cutoff": "800"}));
        assert!(effects[0].start.is_some());
        assert_eq!(effects[1].options, json!({"gain": "0.5"}));
        assert!(effects[1].start.is_none());
        assert!(sheet.effects_for("none").is_empty());
    }
}
