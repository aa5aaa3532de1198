//! Soundtrack configuration
//!
//! Configs are JSON5 files decoded into typed sections. Relative paths are
//! resolved against the directory of the file that declared them, and a
//! leading `~/` expands to the home directory.

use crate::cover::{CoverConfig, CoverError};
use crate::manifest::ManifestConfig;
use crate::metadata::MetadataConfig;
use crate::output::{DEFAULT_FORMAT, DEFAULT_TEMPLATE};
use crate::sheet::{SheetConfig, SheetError};
use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Value};
use soundtrack_audio::{EffectDescriptor, EncodeOptions, FadeSettings, Silence, TrackSettings};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SAMPLE_THRESHOLD: f64 = 1000.0;
pub const DEFAULT_LOOP_COUNT: usize = 2;
pub const DEFAULT_TRACK_FILENAME: &str = "track.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("Invalid config in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
    #[error("Cannot merge '{key}': default is {default}, override is {overriding}")]
    MergeType {
        key: String,
        default: &'static str,
        overriding: &'static str,
    },
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Cover(#[from] CoverError),
}

/// Read a JSON5 file into a JSON value
pub fn read_json5(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Resolve a configured path against `base_dir`, expanding `~/`
pub fn expand_path(raw: &str, base_dir: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    base_dir.join(raw)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep-merge `overriding` over `default`
///
/// Objects merge key by key; any other value is replaced. `null` keeps the
/// default. Values of different JSON types cannot be merged.
pub fn merge(default: &Value, overriding: &Value, key: &str) -> Result<Value, ConfigError> {
    match (default, overriding) {
        (_, Value::Null) => Ok(default.clone()),
        (Value::Null, _) => Ok(overriding.clone()),
        (Value::Object(base), Value::Object(top)) => {
            let mut merged = base.clone();
            for (name, value) in top {
                let path = if key.is_empty() {
                    name.clone()
                } else {
                    format!("{key}.{name}")
                };
                let value = match base.get(name) {
                    Some(existing) => merge(existing, value, &path)?,
                    None => value.clone(),
                };
                merged.insert(name.clone(), value);
            }
            Ok(Value::Object(merged))
        }
        (a, b) if type_name(a) == type_name(b) => Ok(b.clone()),
        (a, b) => Err(ConfigError::MergeType {
            key: key.to_string(),
            default: type_name(a),
            overriding: type_name(b),
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LoopSection {
    #[serde(deserialize_with = "whole_count")]
    count: Option<usize>,
    fade: FadeSection,
}

/// A loop count, written as an integer or as a float with no fraction
fn whole_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(n as usize)),
        Some(n) => Err(de::Error::custom(format!("loop count must be a whole number, got {n}"))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FadeSection {
    #[serde(rename = "type")]
    kind: String,
    duration: f64,
    options: FadeOptions,
}

impl Default for FadeSection {
    fn default() -> Self {
        Self {
            kind: "linear".to_string(),
            duration: FadeSettings::default().duration,
            options: FadeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct FadeOptions {
    start: f32,
    end: f32,
    fade_adjust: f32,
}

impl Default for FadeOptions {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: 0.0,
            fade_adjust: 0.0,
        }
    }
}

/// How `tracks.files` should be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// `track.json` files, searched recursively
    Json,
    /// Plain audio files, one track each
    Audio,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    Folder {
        path: PathBuf,
        kind: DiscoveryKind,
        filename: String,
    },
    /// Title -> track entry, in file order
    Inline(Map<String, Value>),
}

/// The `tracks` section
#[derive(Debug, Clone, PartialEq)]
pub struct TracksConfig {
    pub source: TrackSource,
    pub effect_sheet: Option<PathBuf>,
    /// Applied to every track, after its own effects
    pub effects: Vec<EffectDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegConfig {
    pub path: Option<PathBuf>,
    /// Format -> extra encoder arguments
    pub args: BTreeMap<String, Vec<String>>,
}

/// A loaded soundtrack config
#[derive(Debug, Clone)]
pub struct Config {
    /// The config file itself
    pub path: PathBuf,
    pub base_dir: PathBuf,
    pub tracks: TracksConfig,
    pub metadata: MetadataConfig,
    pub manifest: Option<ManifestConfig>,
    /// Base directory for metadata-relative paths
    pub metadata_dir: PathBuf,
    pub output: String,
    pub output_root: PathBuf,
    pub formats: Vec<String>,
    pub ffmpeg: FfmpegConfig,
    pub sample_threshold: f64,
    pub sample_rate: Option<u32>,
    loop_section: Value,
    silence_section: Value,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let value = read_json5(path)?;
        Self::from_value(&value, path)
    }

    /// Decode an already-parsed config that lives at `path`
    pub fn from_value(value: &Value, path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        };
        let Value::Object(root) = value else {
            return Err(invalid("top level must be an object".into()));
        };

        let tracks = decode_tracks(root.get("tracks"), &base_dir).map_err(invalid)?;

        let (metadata_value, metadata_dir) = match root.get("metadata") {
            Some(Value::String(file)) => {
                let file = expand_path(file, &base_dir);
                let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| base_dir.clone());
                (read_json5(&file)?, dir)
            }
            Some(other) => (other.clone(), base_dir.clone()),
            None => (Value::Null, base_dir.clone()),
        };
        let (metadata, manifest) = decode_metadata(&metadata_value, &metadata_dir, path)?;

        let output = match root.get("output") {
            None | Some(Value::Null) => DEFAULT_TEMPLATE.to_string(),
            Some(Value::String(template)) => template.clone(),
            Some(other) => return Err(invalid(format!("'output' must be a string, got {other}"))),
        };

        let formats = match root.get("format") {
            None | Some(Value::Null) => vec![DEFAULT_FORMAT.to_string()],
            Some(Value::String(format)) => vec![format.to_lowercase()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_lowercase))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("'format' entries must be strings".into()))?,
            Some(other) => return Err(invalid(format!("'format' must be a string or list, got {other}"))),
        };

        let ffmpeg = match root.get("ffmpeg") {
            None | Some(Value::Null) => FfmpegConfig::default(),
            Some(Value::String(binary)) => FfmpegConfig {
                path: Some(expand_path(binary, &base_dir)),
                args: BTreeMap::new(),
            },
            Some(Value::Object(map)) => {
                let args = match map.get("args") {
                    Some(args) => serde_json::from_value(args.clone())
                        .map_err(|e| invalid(format!("'ffmpeg.args': {e}")))?,
                    None => BTreeMap::new(),
                };
                FfmpegConfig {
                    path: map
                        .get("path")
                        .and_then(Value::as_str)
                        .map(|p| expand_path(p, &base_dir)),
                    args,
                }
            }
            Some(other) => return Err(invalid(format!("'ffmpeg' must be a path or object, got {other}"))),
        };

        let sample_threshold = match root.get("sample_threshold") {
            None | Some(Value::Null) => DEFAULT_SAMPLE_THRESHOLD,
            Some(v) => v
                .as_f64()
                .filter(|t| *t >= 0.0)
                .ok_or_else(|| invalid(format!("'sample_threshold' must be a positive number, got {v}")))?,
        };

        let sample_rate = match root.get("sample_rate") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                v.as_u64()
                    .and_then(|r| u32::try_from(r).ok())
                    .filter(|r| *r > 0)
                    .ok_or_else(|| invalid(format!("'sample_rate' must be a positive integer, got {v}")))?,
            ),
        };

        let config = Self {
            path: path.to_path_buf(),
            base_dir: base_dir.clone(),
            tracks,
            metadata,
            manifest,
            metadata_dir,
            output,
            output_root: base_dir,
            formats,
            ffmpeg,
            sample_threshold,
            sample_rate,
            loop_section: root.get("loop").cloned().unwrap_or(Value::Null),
            silence_section: root.get("silence").cloned().unwrap_or(Value::Null),
        };
        // Fail early on a bad global loop/silence section
        config.track_settings(None, None, path)?;
        Ok(config)
    }

    /// Resolution settings for one track, its overrides merged over the globals
    pub fn track_settings(
        &self,
        loop_override: Option<&Value>,
        silence_override: Option<&Value>,
        config: &Path,
    ) -> Result<TrackSettings, ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: config.to_path_buf(),
            message,
        };

        let loop_value = merge(&self.loop_section, loop_override.unwrap_or(&Value::Null), "loop")?;
        let silence_value = merge(&self.silence_section, silence_override.unwrap_or(&Value::Null), "silence")?;

        let section: LoopSection = match loop_value {
            Value::Null => LoopSection::default(),
            v => serde_json::from_value(v).map_err(|e| invalid(format!("'loop': {e}")))?,
        };
        let silence: Silence = match silence_value {
            Value::Null => Silence::default(),
            v => serde_json::from_value(v).map_err(|e| invalid(format!("'silence': {e}")))?,
        };

        if section.fade.kind != "linear" {
            tracing::warn!(kind = %section.fade.kind, "Unknown fade type, using linear");
        }

        Ok(TrackSettings {
            config: config.to_path_buf(),
            loop_count: section.count.unwrap_or(DEFAULT_LOOP_COUNT),
            fade: FadeSettings {
                duration: section.fade.duration,
                gain0: section.fade.options.start,
                gain1: section.fade.options.end,
                curve_ratio: section.fade.options.fade_adjust,
            },
            silence,
        })
    }

    /// Encoder settings for one output format
    pub fn encode_options(&self, format: &str) -> EncodeOptions {
        EncodeOptions {
            ffmpeg: self.ffmpeg.path.clone(),
            args: self.ffmpeg.args.get(format).cloned().unwrap_or_default(),
            ..EncodeOptions::default()
        }
    }
}

fn decode_tracks(value: Option<&Value>, base_dir: &Path) -> Result<TracksConfig, String> {
    let Some(Value::Object(map)) = value else {
        return Err("'tracks' must be an object".into());
    };

    let source = match map.get("files") {
        Some(Value::String(folder)) => {
            let kind = match map.get("type").and_then(Value::as_str).unwrap_or("json") {
                "json" => DiscoveryKind::Json,
                "audio" => DiscoveryKind::Audio,
                other => return Err(format!("unknown 'tracks.type' '{other}'")),
            };
            TrackSource::Folder {
                path: expand_path(folder, base_dir),
                kind,
                filename: map
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_TRACK_FILENAME)
                    .to_string(),
            }
        }
        Some(Value::Object(entries)) => TrackSource::Inline(entries.clone()),
        Some(other) => return Err(format!("'tracks.files' must be a folder or an object, got {other}")),
        None => return Err("'tracks.files' is required".into()),
    };

    let effect_sheet = map
        .get("effect_sheet")
        .and_then(Value::as_str)
        .map(|p| expand_path(p, base_dir));

    let effects = match map.get("effects") {
        Some(raw) => EffectDescriptor::list_from_value(raw).map_err(|e| e.to_string())?,
        None => Vec::new(),
    };

    Ok(TracksConfig {
        source,
        effect_sheet,
        effects,
    })
}

fn decode_metadata(
    value: &Value,
    base_dir: &Path,
    config: &Path,
) -> Result<(MetadataConfig, Option<ManifestConfig>), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        path: config.to_path_buf(),
        message,
    };
    let map = match value {
        Value::Null => return Ok((MetadataConfig::default(), None)),
        Value::Object(map) => map,
        other => return Err(invalid(format!("'metadata' must be an object or a path, got {other}"))),
    };

    let sheet = match map.get("sheet") {
        None | Some(Value::Null) => None,
        Some(sheet) => Some(SheetConfig::from_value(sheet, base_dir)?),
    };

    let tracks = match map.get("tracks") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(tracks)) => tracks.clone(),
        Some(other) => return Err(invalid(format!("'metadata.tracks' must be an object, got {other}"))),
    };

    let tags = match map.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(tags)) => tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(other) => return Err(invalid(format!("'metadata.tags' must be an object, got {other}"))),
    };

    let cover = match map.get("cover") {
        None | Some(Value::Null) => None,
        Some(cover) => Some(CoverConfig::from_value(cover, base_dir)?),
    };

    let manifest = match map.get("manifest") {
        None | Some(Value::Null) => None,
        Some(manifest) => Some(
            serde_json::from_value(manifest.clone())
                .map_err(|e| invalid(format!("'metadata.manifest': {e}")))?,
        ),
    };

    Ok((
        MetadataConfig {
            sheet,
            tracks,
            tags,
            cover,
        },
        manifest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Result<Config, ConfigError> {
        Config::from_value(&value, Path::new("/project/soundtrack.json5"))
    }

    #[test]
    fn test_merge_deep() {
        let merged = merge(
            &json!({"count": 2, "fade": {"duration": 10, "options": {"start": 1}}}),
            &json!({"fade": {"duration": 2.5}}),
            "loop",
        )
        .unwrap();
        assert_eq!(merged, json!({"count": 2, "fade": {"duration": 2.5, "options": {"start": 1}}}));
    }

    #[test]
    fn test_merge_null_keeps_default() {
        let merged = merge(&json!({"count": 3}), &json!({"count": null}), "loop").unwrap();
        assert_eq!(merged, json!({"count": 3}));
    }

    #[test]
    fn test_merge_type_mismatch() {
        let err = merge(&json!({"fade": {"duration": 10}}), &json!({"fade": "long"}), "loop").unwrap_err();
        match err {
            ConfigError::MergeType { key, default, overriding } => {
                assert_eq!(key, "loop.fade");
                assert_eq!(default, "object");
                assert_eq!(overriding, "string");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = config(json!({"tracks": {"files": "music"}})).unwrap();
        assert_eq!(config.output, DEFAULT_TEMPLATE);
        assert_eq!(config.formats, vec!["wav"]);
        assert_eq!(config.sample_threshold, DEFAULT_SAMPLE_THRESHOLD);
        assert_eq!(
            config.tracks.source,
            TrackSource::Folder {
                path: PathBuf::from("/project/music"),
                kind: DiscoveryKind::Json,
                filename: DEFAULT_TRACK_FILENAME.into(),
            }
        );

        let settings = config.track_settings(None, None, &config.path).unwrap();
        assert_eq!(settings.loop_count, 2);
        assert_eq!(settings.fade, FadeSettings::default());
        assert_eq!(settings.silence, Silence::default());
    }

    #[test]
    fn test_track_overrides_merge() {
        let config = config(json!({
            "tracks": {"files": {}},
            "loop": {"count": 3, "fade": {"duration": 4, "options": {"fade_adjust": 0.25}}},
            "silence": {"start": 1.0, "end": -0.5},
        }))
        .unwrap();

        let settings = config
            .track_settings(
                Some(&json!({"count": 1, "fade": {"options": {"end": 0.5}}})),
                Some(&json!({"end": 2})),
                Path::new("/project/a/track.json"),
            )
            .unwrap();
        assert_eq!(settings.loop_count, 1);
        assert_eq!(settings.fade.duration, 4.0);
        assert_eq!(settings.fade.gain0, 1.0);
        assert_eq!(settings.fade.gain1, 0.5);
        assert_eq!(settings.fade.curve_ratio, 0.25);
        assert_eq!(settings.silence, Silence { start: 1.0, end: 2.0 });
        assert_eq!(settings.config, PathBuf::from("/project/a/track.json"));
    }

    #[test]
    fn test_loop_count_accepts_whole_float() {
        let config = config(json!({"tracks": {"files": {}}, "loop": {"count": 2.0}})).unwrap();
        assert_eq!(config.track_settings(None, None, &config.path).unwrap().loop_count, 2);

        let result = config.track_settings(Some(&json!({"count": 1.5})), None, &config.path);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_track_override_type_mismatch_is_fatal() {
        let config = config(json!({"tracks": {"files": {}}, "loop": {"count": 2}})).unwrap();
        let result = config.track_settings(Some(&json!({"count": "two"})), None, &config.path);
        assert!(matches!(result, Err(ConfigError::MergeType { .. })));
    }

    #[test]
    fn test_format_list_and_ffmpeg() {
        let config = config(json!({
            "tracks": {"files": {}},
            "format": ["WAV", "mp3"],
            "ffmpeg": {"path": "bin/ffmpeg", "args": {"mp3": ["-b:a", "320k"]}},
        }))
        .unwrap();
        assert_eq!(config.formats, vec!["wav", "mp3"]);
        let options = config.encode_options("mp3");
        assert_eq!(options.ffmpeg, Some(PathBuf::from("/project/bin/ffmpeg")));
        assert_eq!(options.args, vec!["-b:a", "320k"]);
        assert!(config.encode_options("wav").args.is_empty());
    }

    #[test]
    fn test_metadata_sections() {
        let config = config(json!({
            "tracks": {"files": {}},
            "metadata": {
                "sheet": {"file": "sheet.csv", "ignore": ["notes"]},
                "tags": {"album": "OST", "track": "^\\d+"},
                "cover": {"file": "{album}.png", "size": 300},
                "manifest": {"title": "Collection", "albums": {"name": ["album", "grouping"]}},
            },
        }))
        .unwrap();
        assert_eq!(config.metadata.tags.len(), 2);
        assert_eq!(config.metadata.tags[0].0, "album");
        assert_eq!(config.metadata.sheet.as_ref().map(|s| s.file.clone()), Some(PathBuf::from("/project/sheet.csv")));
        assert_eq!(config.metadata.cover.as_ref().and_then(|c| c.size), Some((300, 300)));
        assert_eq!(config.manifest.as_ref().and_then(|m| m.title.clone()), Some("Collection".into()));
    }

    #[test]
    fn test_invalid_sheet_mapping_is_fatal() {
        let result = config(json!({
            "tracks": {"files": {}},
            "metadata": {"sheet": {"file": "sheet.csv", "map": ["bad"]}},
        }));
        assert!(matches!(result, Err(ConfigError::Sheet(SheetError::InvalidMapping { .. }))));
    }

    #[test]
    fn test_missing_tracks_rejected() {
        assert!(matches!(config(json!({"format": "wav"})), Err(ConfigError::Invalid { .. })));
        assert!(matches!(
            config(json!({"tracks": {"files": "x", "type": "midi"}})),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_json5_file_with_metadata_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("metadata.json5"),
            "{ tags: { album: 'OST', }, // trailing comma\n }",
        )
        .unwrap();
        fs::write(
            dir.path().join("soundtrack.json5"),
            "{ tracks: { files: 'music' }, metadata: 'metadata.json5', loop: { count: 4 } }",
        )
        .unwrap();

        let config = Config::load(&dir.path().join("soundtrack.json5")).unwrap();
        assert_eq!(config.metadata.tags, vec![("album".to_string(), json!("OST"))]);
        assert_eq!(config.metadata_dir, dir.path());
        assert_eq!(config.track_settings(None, None, &config.path).unwrap().loop_count, 4);
    }

    #[test]
    fn test_home_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/music", Path::new("/base")), home.join("music"));
        }
        assert_eq!(expand_path("music", Path::new("/base")), PathBuf::from("/base/music"));
        assert_eq!(expand_path("/abs", Path::new("/base")), PathBuf::from("/abs"));
    }
}
