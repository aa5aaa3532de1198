//! Per-track metadata resolution
//!
//! Tag sources are applied "set if absent", so the first source to provide
//! a non-empty value wins:
//!
//! 1. explicit tags from the track entry
//! 2. `metadata.tracks[title]`
//! 3. the matching sheet row
//! 4. global `metadata.tags` templates
//!
//! The title is settled before everything else because the per-title
//! overrides and sheet lookups key off it. A sheet row's `title` column is
//! the one exception to first-writer-wins: it replaces the resolved title.

use crate::cover::{CoverCache, CoverConfig};
use crate::sheet::{SheetCache, SheetConfig};
use crate::tags::{canonicalize, TagSet, TagValue};
use crate::template::format_tags;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// The `metadata` section of a config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataConfig {
    pub sheet: Option<SheetConfig>,
    /// Title -> tag overrides
    pub tracks: Map<String, Value>,
    /// Tag name -> template (or literal value)
    pub tags: Vec<(String, Value)>,
    pub cover: Option<CoverConfig>,
}

/// Resolves tag sets for a batch of tracks
///
/// Sheets and covers are loaded on first use and kept for the whole batch.
#[derive(Debug)]
pub struct MetadataResolver {
    config: MetadataConfig,
    sheets: SheetCache,
    covers: CoverCache,
    /// Compiled patterns for globals with no placeholders, by canonical name
    patterns: HashMap<String, Regex>,
}

impl MetadataResolver {
    pub fn new(config: MetadataConfig) -> Self {
        let mut patterns = HashMap::new();
        for (name, value) in &config.tags {
            if let Value::String(template) = value {
                if !template.contains(['{', '}']) {
                    if let Ok(re) = Regex::new(template) {
                        patterns.entry(canonicalize(name)).or_insert(re);
                    }
                }
            }
        }
        Self {
            config,
            sheets: SheetCache::new(),
            covers: CoverCache::new(),
            patterns,
        }
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    /// Resolve the tag set for one track
    ///
    /// `file` is the track's primary source file, used for filename
    /// patterns and `filename` sheet lookups.
    pub fn resolve(
        &mut self,
        file: Option<&Path>,
        explicit_title: Option<&str>,
        track_tags: &Map<String, Value>,
    ) -> TagSet {
        let mut tags = TagSet::new();
        let stem = file
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned());

        // Explicit tags come first; the title is pinned before anything else
        let explicit = tag_set_from(track_tags);
        let title = explicit_title
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| explicit.text("title"))
            .or_else(|| {
                self.global_value("title", &explicit, stem.as_deref())
                    .map(|v| v.to_string())
            })
            .or_else(|| stem.clone());
        if let Some(title) = &title {
            tags.set("title", title.as_str());
        }
        merge_defaults(&mut tags, &explicit);

        if let Some(title) = &title {
            if let Some(overrides) = self.title_overrides(title) {
                merge_defaults(&mut tags, &overrides);
            }
        }

        if let Some(sheet_config) = &self.config.sheet {
            // A sheet can key off a global, so globals join the lookup only
            let mut lookup = tags.clone();
            merge_defaults(&mut lookup, &self.globals(&tags, stem.as_deref()));
            if let Some(row) = self
                .sheets
                .sheet(sheet_config)
                .and_then(|sheet| sheet.find(file, &lookup))
            {
                tracing::debug!(title = ?title, row = %row.key, "Matched sheet row");
                for (name, value) in &row.tags {
                    if canonicalize(name) == "title" {
                        tags.set("title", value.as_str());
                    } else {
                        tags.set_default(name, value.as_str());
                    }
                }
            }
        }

        // Filled again so templates see the sheet's columns
        let globals = self.globals(&tags, stem.as_deref());
        merge_defaults(&mut tags, &globals);

        if let Some(cover) = &self.config.cover {
            match self.covers.load(cover, &tags) {
                Ok(picture) => tags.set_picture(picture),
                Err(e) => {
                    tracing::warn!(file = %cover.path_for(&tags).display(), error = %e, "Cover not loaded");
                }
            }
        }

        tags
    }

    fn title_overrides(&self, title: &str) -> Option<TagSet> {
        let entry = self.config.tracks.get(title).or_else(|| {
            self.config
                .tracks
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(title))
                .map(|(_, v)| v)
        })?;
        entry.as_object().map(tag_set_from)
    }

    /// Every global tag, filled against `known` and matched on `stem`
    fn globals(&self, known: &TagSet, stem: Option<&str>) -> TagSet {
        let mut globals = TagSet::new();
        for (name, _) in &self.config.tags {
            if let Some(value) = self.global_value(name, known, stem) {
                globals.set_default(name, value);
            }
        }
        globals
    }

    /// A global tag: templates are filled, then searched for in the file stem
    fn global_value(&self, name: &str, known: &TagSet, stem: Option<&str>) -> Option<TagValue> {
        let canonical = canonicalize(name);
        let (_, raw) = self
            .config
            .tags
            .iter()
            .find(|(n, _)| canonicalize(n) == canonical)?;

        let Value::String(template) = raw else {
            return TagValue::from_json(raw);
        };
        let filled = format_tags(template, known);

        let matched = stem.and_then(|stem| {
            let found = |re: &Regex| re.find(stem).map(|m| m.as_str().to_string());
            match self.patterns.get(&canonical) {
                Some(re) => found(re),
                None => Regex::new(&filled).ok().and_then(|re| found(&re)),
            }
        });
        Some(TagValue::Text(matched.unwrap_or(filled)))
    }
}

fn tag_set_from(map: &Map<String, Value>) -> TagSet {
    let mut tags = TagSet::new();
    for (name, value) in map {
        if let Some(value) = TagValue::from_json(value) {
            tags.set_default(name, value);
        }
    }
    tags
}

fn merge_defaults(tags: &mut TagSet, source: &TagSet) {
    for (name, value) in source.iter() {
        tags.set_default(name, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn config(tags: Value) -> MetadataConfig {
        MetadataConfig {
            tags: object(tags).into_iter().collect(),
            ..MetadataConfig::default()
        }
    }

    fn sheet(dir: &Path, contents: &str) -> SheetConfig {
        let path = dir.join("sheet.csv");
        std::fs::write(&path, contents).unwrap();
        SheetConfig {
            file: path,
            ..SheetConfig::default()
        }
    }

    #[test]
    fn test_title_from_filename_pattern() {
        let mut resolver = MetadataResolver::new(config(json!({
            "title": r"[A-Za-z]+$",
            "track": r"^\d+",
        })));
        let file = PathBuf::from("/music/03 - Overworld.wav");
        let tags = resolver.resolve(Some(&file), None, &Map::new());
        assert_eq!(tags.text("title").as_deref(), Some("Overworld"));
        assert_eq!(tags.text("track").as_deref(), Some("03"));
    }

    #[test]
    fn test_globals_filled_with_sheet_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(json!({"comment": "by {composer}"}));
        cfg.sheet = Some(sheet(dir.path(), "title,composer\nOverworld,Koji\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let file = PathBuf::from("/music/Overworld.wav");
        let tags = resolver.resolve(Some(&file), None, &Map::new());
        assert_eq!(tags.text("composer").as_deref(), Some("Koji"));
        assert_eq!(tags.text("comment").as_deref(), Some("by Koji"));
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let mut resolver = MetadataResolver::new(MetadataConfig::default());
        let file = PathBuf::from("/music/Boss Battle.flac");
        let tags = resolver.resolve(Some(&file), None, &Map::new());
        assert_eq!(tags.text("title").as_deref(), Some("Boss Battle"));
    }

    #[test]
    fn test_template_filled_before_match() {
        let mut resolver = MetadataResolver::new(config(json!({
            "album": "Game OST",
            "comment": "{title} from {album}",
        })));
        let tags = resolver.resolve(None, Some("Intro"), &object(json!({"album": "Other"})));
        assert_eq!(tags.text("album").as_deref(), Some("Other"));
        assert_eq!(tags.text("comment").as_deref(), Some("Intro from Other"));
    }

    #[test]
    fn test_explicit_beats_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = MetadataConfig::default();
        cfg.sheet = Some(sheet(dir.path(), "title,artist,composer\nMain,B,C\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let tags = resolver.resolve(None, Some("Main"), &object(json!({"artist": "A"})));
        assert_eq!(tags.text("artist").as_deref(), Some("A"));
        assert_eq!(tags.text("composer").as_deref(), Some("C"));
    }

    #[test]
    fn test_per_title_overrides_beat_sheet_and_globals() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(json!({"artist": "Global", "genre": "Chiptune"}));
        cfg.tracks = object(json!({"main": {"artist": "Override"}}));
        cfg.sheet = Some(sheet(dir.path(), "title,artist,genre\nMain,Sheet,Rock\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let tags = resolver.resolve(None, Some("Main"), &Map::new());
        assert_eq!(tags.text("artist").as_deref(), Some("Override"));
        assert_eq!(tags.text("genres").as_deref(), Some("Rock"));
    }

    #[test]
    fn test_explicit_beats_per_title() {
        let mut cfg = MetadataConfig::default();
        cfg.tracks = object(json!({"Main": {"artist": "Override", "album": "Per Title"}}));
        let mut resolver = MetadataResolver::new(cfg);

        let tags = resolver.resolve(None, Some("Main"), &object(json!({"artist": "Explicit"})));
        assert_eq!(tags.text("artist").as_deref(), Some("Explicit"));
        assert_eq!(tags.text("album").as_deref(), Some("Per Title"));
    }

    #[test]
    fn test_sheet_beats_globals() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(json!({"composer": "Global", "album": "Game OST"}));
        cfg.sheet = Some(sheet(dir.path(), "title,composer\nMain,Sheet\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let tags = resolver.resolve(None, Some("Main"), &Map::new());
        assert_eq!(tags.text("composer").as_deref(), Some("Sheet"));
        assert_eq!(tags.text("album").as_deref(), Some("Game OST"));
    }

    #[test]
    fn test_cached_pattern_matches_each_file() {
        let mut resolver = MetadataResolver::new(config(json!({"track": r"^\d+"})));
        for (file, track) in [("/m/01 A.wav", "01"), ("/m/12 B.wav", "12")] {
            let tags = resolver.resolve(Some(Path::new(file)), None, &Map::new());
            assert_eq!(tags.text("track").as_deref(), Some(track));
        }
    }

    #[test]
    fn test_sheet_title_replaces_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = MetadataConfig::default();
        cfg.sheet = Some(sheet(dir.path(), "filename,title\nbgm_01,Overworld Theme\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let file = PathBuf::from("/music/bgm_01.wav");
        let tags = resolver.resolve(Some(&file), Some("bgm_01"), &Map::new());
        assert_eq!(tags.text("title").as_deref(), Some("Overworld Theme"));
    }

    #[test]
    fn test_sheet_keys_off_global_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(json!({"track": r"^\d+"}));
        cfg.sheet = Some(sheet(dir.path(), "track,composer\n07,Someone\n"));
        let mut resolver = MetadataResolver::new(cfg);

        let file = PathBuf::from("/music/07 Forest.wav");
        let tags = resolver.resolve(Some(&file), None, &Map::new());
        assert_eq!(tags.text("composer").as_deref(), Some("Someone"));
        assert_eq!(tags.text("track").as_deref(), Some("07"));
    }

    #[test]
    fn test_missing_sheet_degrades() {
        let mut cfg = MetadataConfig::default();
        cfg.sheet = Some(SheetConfig {
            file: PathBuf::from("/nonexistent/sheet.csv"),
            ..SheetConfig::default()
        });
        let mut resolver = MetadataResolver::new(cfg);
        let tags = resolver.resolve(None, Some("Main"), &object(json!({"artist": "A"})));
        assert_eq!(tags.text("artist").as_deref(), Some("A"));
    }

    #[test]
    fn test_non_string_globals_pass_through() {
        let mut resolver = MetadataResolver::new(config(json!({"disc": 2, "genre": ["a", "b"]})));
        let tags = resolver.resolve(None, Some("X"), &Map::new());
        assert_eq!(tags.get("disc"), Some(&TagValue::Int(2)));
        assert_eq!(tags.get("genres"), Some(&TagValue::List(vec!["a".into(), "b".into()])));
    }
}
