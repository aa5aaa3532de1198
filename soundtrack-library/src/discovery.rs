//! Track discovery
//!
//! Turns the `tracks` section into an ordered list of [`TrackEntry`]s:
//! `track.json` files found under a folder, bare audio files, or an inline
//! map in the config itself.

use crate::config::{read_json5, Config, ConfigError, DiscoveryKind, TrackSource};
use serde_json::{Map, Value};
use soundtrack_audio::{EffectDescriptor, LoopSource, SourceSpec};
use std::path::{Path, PathBuf};

/// Extensions picked up by `type: "audio"`
pub const AUDIO_EXTENSIONS: [&str; 8] = ["wav", "flac", "mp3", "ogg", "m4a", "aac", "aiff", "aif"];

/// One track to build
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEntry {
    /// The entry's key, or its `metadata.title`
    pub title: Option<String>,
    /// Raw source spec
    pub track: Value,
    pub metadata: Map<String, Value>,
    pub effects: Vec<EffectDescriptor>,
    pub loop_override: Option<Value>,
    pub silence_override: Option<Value>,
    /// Directory source paths are relative to
    pub base_dir: PathBuf,
    /// File the entry was declared in
    pub config: PathBuf,
}

impl TrackEntry {
    /// The track's first source file, used for filename-derived tags
    pub fn primary_file(&self) -> Option<PathBuf> {
        let spec = SourceSpec::from_value(&self.track).ok()?;
        first_file(&spec).map(|p| self.base_dir.join(p))
    }

    /// Entry for one bare audio file
    fn audio(path: &Path, config: &Path) -> Self {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            title: None,
            track: Value::String(name),
            metadata: Map::new(),
            effects: Vec::new(),
            loop_override: None,
            silence_override: None,
            base_dir,
            config: config.to_path_buf(),
        }
    }

    /// Decode `title: {track, metadata, effects, loop, silence}`
    ///
    /// A bare string or list is taken as the track itself.
    fn decode(key: &str, value: &Value, base_dir: &Path, config: &Path) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: config.to_path_buf(),
            message,
        };

        let (track, fields) = match value {
            Value::String(_) | Value::Array(_) => (value.clone(), Map::new()),
            Value::Object(map) => {
                let track = map
                    .get("track")
                    .cloned()
                    .ok_or_else(|| invalid(format!("track '{key}' has no 'track'")))?;
                (track, map.clone())
            }
            other => return Err(invalid(format!("track '{key}' must be an object, got {other}"))),
        };

        let metadata = match fields.get("metadata") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => return Err(invalid(format!("'{key}.metadata' must be an object, got {other}"))),
        };

        let effects = match fields.get("effects") {
            Some(raw) => EffectDescriptor::list_from_value(raw).map_err(|e| invalid(e.to_string()))?,
            None => Vec::new(),
        };

        let title = metadata
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(key)
            .to_string();

        Ok(Self {
            title: Some(title),
            track,
            metadata,
            effects,
            loop_override: fields.get("loop").cloned(),
            silence_override: fields.get("silence").cloned(),
            base_dir: base_dir.to_path_buf(),
            config: config.to_path_buf(),
        })
    }
}

fn first_file(spec: &SourceSpec) -> Option<&Path> {
    match spec {
        SourceSpec::File(path) => Some(path.as_path()),
        SourceSpec::Mix(items) => items.iter().find_map(first_file),
        SourceSpec::Composite(composite) => composite
            .head
            .as_deref()
            .and_then(first_file)
            .or_else(|| match &composite.looped {
                Some(LoopSource::Source(spec)) => first_file(spec),
                _ => None,
            }),
    }
}

/// Every track the config describes, in build order
pub fn discover(config: &Config) -> Result<Vec<TrackEntry>, ConfigError> {
    let entries = match &config.tracks.source {
        TrackSource::Inline(map) => decode_entries(map, &config.base_dir, &config.path)?,
        TrackSource::Folder { path, kind, filename } => {
            if !path.is_dir() {
                return Err(ConfigError::Invalid {
                    path: config.path.clone(),
                    message: format!("track folder {} does not exist", path.display()),
                });
            }
            match kind {
                DiscoveryKind::Audio => collect_files(path, |p| has_extension(p, &AUDIO_EXTENSIONS))
                    .iter()
                    .map(|file| TrackEntry::audio(file, &config.path))
                    .collect(),
                DiscoveryKind::Json => {
                    let mut entries = Vec::new();
                    for file in collect_files(path, |p| matches_name(p, filename)) {
                        let dir = file
                            .parent()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| path.clone());
                        let value = read_json5(&file)?;
                        let Value::Object(map) = value else {
                            return Err(ConfigError::Invalid {
                                path: file,
                                message: "track file must be an object".into(),
                            });
                        };
                        entries.extend(decode_entries(&map, &dir, &file)?);
                    }
                    entries
                }
            }
        }
    };

    tracing::info!(tracks = entries.len(), "Discovered tracks");
    Ok(entries)
}

fn decode_entries(map: &Map<String, Value>, base_dir: &Path, config: &Path) -> Result<Vec<TrackEntry>, ConfigError> {
    map.iter()
        .map(|(key, value)| TrackEntry::decode(key, value, base_dir, config))
        .collect()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn matches_name(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

/// Files under `dir` accepted by `keep`, recursively, sorted by path
fn collect_files(dir: &Path, keep: impl Fn(&Path) -> bool + Copy) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot read directory");
            return files;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() {
            if keep(&path) {
                files.push(path);
            }
        } else if path.is_dir() {
            files.extend(collect_files(&path, keep));
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn folder_config(dir: &Path, kind: &str) -> Config {
        Config::from_value(
            &json!({"tracks": {"files": "music", "type": kind}}),
            &dir.join("soundtrack.json"),
        )
        .unwrap()
    }

    #[test]
    fn test_json_tracks_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        fs::create_dir_all(music.join("b")).unwrap();
        fs::create_dir_all(music.join("a")).unwrap();
        fs::write(
            music.join("a/track.json"),
            r#"{"Zeta": {"track": "z.wav"}, "Alpha": {"track": {"file": "a.wav", "loop": 5}, "metadata": {"artist": "X"}}}"#,
        )
        .unwrap();
        fs::write(music.join("b/track.json"), r#"{"Beta": "b.wav"}"#).unwrap();
        fs::write(music.join("b/notes.json"), r#"{"Ignored": "x.wav"}"#).unwrap();

        let entries = discover(&folder_config(dir.path(), "json")).unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.clone().unwrap()).collect();
        assert_eq!(titles, vec!["Zeta", "Alpha", "Beta"]);
        assert_eq!(entries[1].base_dir, music.join("a"));
        assert_eq!(entries[1].config, music.join("a/track.json"));
        assert_eq!(entries[1].metadata.get("artist"), Some(&json!("X")));
        assert_eq!(entries[1].primary_file(), Some(music.join("a/a.wav")));
    }

    #[test]
    fn test_audio_tracks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        fs::create_dir_all(music.join("disc2")).unwrap();
        fs::write(music.join("02 Two.wav"), b"").unwrap();
        fs::write(music.join("01 One.FLAC"), b"").unwrap();
        fs::write(music.join("cover.png"), b"").unwrap();
        fs::write(music.join("disc2/01 Three.mp3"), b"").unwrap();

        let entries = discover(&folder_config(dir.path(), "audio")).unwrap();
        let files: Vec<_> = entries.iter().filter_map(TrackEntry::primary_file).collect();
        assert_eq!(
            files,
            vec![
                music.join("01 One.FLAC"),
                music.join("02 Two.wav"),
                music.join("disc2/01 Three.mp3"),
            ]
        );
        assert!(entries.iter().all(|e| e.title.is_none()));
    }

    #[test]
    fn test_inline_tracks_and_title_override() {
        let config = Config::from_value(
            &json!({"tracks": {"files": {
                "key": {"track": ["a.wav", "b.wav"], "metadata": {"title": "Shown"}, "loop": {"count": 4}},
                "plain": "c.wav",
            }}}),
            Path::new("/project/soundtrack.json"),
        )
        .unwrap();

        let entries = discover(&config).unwrap();
        assert_eq!(entries[0].title.as_deref(), Some("Shown"));
        assert_eq!(entries[0].loop_override, Some(json!({"count": 4})));
        assert_eq!(entries[0].primary_file(), Some(PathBuf::from("/project/a.wav")));
        assert_eq!(entries[1].title.as_deref(), Some("plain"));
    }

    #[test]
    fn test_entry_without_track_rejected() {
        let config = Config::from_value(
            &json!({"tracks": {"files": {"broken": {"metadata": {}}}}}),
            Path::new("/project/soundtrack.json"),
        )
        .unwrap();
        assert!(matches!(discover(&config), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_loop_only_primary_file() {
        let entry = TrackEntry::decode(
            "x",
            &json!({"track": {"loop": "loop.wav"}}),
            Path::new("/m"),
            Path::new("/m/track.json"),
        )
        .unwrap();
        assert_eq!(entry.primary_file(), Some(PathBuf::from("/m/loop.wav")));
    }
}
