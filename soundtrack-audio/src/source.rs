//! Declarative source specs
//!
//! A track's audio is described by a nested spec decoded once from config
//! JSON into [`SourceSpec`]:
//!
//! ```text
//! "music.wav"                                    -> File
//! [spec, spec, ...]                              -> Mix
//! {"file"|"intro": spec, "loop": spec|offset,
//!  "outro": spec, "start": n, "end": n,
//!  "effects": [...]}                             -> Composite
//! ```

use crate::effects::EffectDescriptor;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// A config object that matches no known shape
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid config: {message} in {object}")]
pub struct SpecError {
    pub message: String,
    /// The offending sub-object, as JSON text
    pub object: String,
}

impl SpecError {
    pub fn new(message: impl Into<String>, object: &Value) -> Self {
        Self {
            message: message.into(),
            object: object.to_string(),
        }
    }
}

/// A position or duration that is either seconds or raw samples
///
/// Magnitudes below the configured threshold are seconds; anything else is
/// a sample count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset(pub f64);

impl Offset {
    /// Parse a JSON number or numeric string
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Offset),
            Value::String(s) => parse_number(s).map(Offset),
            _ => None,
        }
    }

    /// Whether this offset is read as seconds under `threshold`
    pub fn is_seconds(&self, threshold: f64) -> bool {
        self.0.abs() < threshold
    }

    /// Signed frame count at `sample_rate`
    pub fn to_signed_samples(&self, sample_rate: u32, threshold: f64) -> i64 {
        if self.is_seconds(threshold) {
            (self.0 * sample_rate as f64) as i64
        } else {
            self.0 as i64
        }
    }

    /// Frame count at `sample_rate`; negative values become zero
    pub fn to_samples(&self, sample_rate: u32, threshold: f64) -> usize {
        self.to_signed_samples(sample_rate, threshold).max(0) as usize
    }

    /// Absolute frame position in a buffer of `len` frames
    ///
    /// Negative offsets count back from the end. The result is clamped to
    /// `0..=len`.
    pub fn resolve(&self, sample_rate: u32, threshold: f64, len: usize) -> usize {
        let frames = self.to_signed_samples(sample_rate, threshold);
        if frames < 0 {
            len.saturating_sub(frames.unsigned_abs() as usize)
        } else {
            (frames as usize).min(len)
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Where the repeated section of a loop comes from
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSource {
    /// Split the head source at this point: before is intro, after is loop
    Split(Offset),
    /// A separate source
    Source(Box<SourceSpec>),
}

/// A map-shaped source: head + optional loop, outro, trims and effects
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeSpec {
    /// `file` or `intro`
    pub head: Option<Box<SourceSpec>>,
    pub looped: Option<LoopSource>,
    pub outro: Option<Box<SourceSpec>>,
    pub start: Option<Offset>,
    pub end: Option<Offset>,
    pub effects: Vec<EffectDescriptor>,
}

/// How to obtain one piece of audio
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSpec {
    /// Audio file relative to the owning config's directory
    File(PathBuf),
    /// Sources summed together
    Mix(Vec<SourceSpec>),
    Composite(CompositeSpec),
}

const COMPOSITE_KEYS: [&str; 7] = ["file", "intro", "loop", "outro", "start", "end", "effects"];

impl SourceSpec {
    /// Decode a spec from config JSON
    pub fn from_value(value: &Value) -> Result<Self, SpecError> {
        match value {
            Value::String(path) if !path.trim().is_empty() => Ok(SourceSpec::File(PathBuf::from(path))),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(Self::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(SourceSpec::Mix),
            Value::Object(map) => {
                if map.contains_key("file") && map.contains_key("intro") {
                    return Err(SpecError::new("'file' and 'intro' are mutually exclusive", value));
                }
                if let Some(key) = map.keys().find(|k| !COMPOSITE_KEYS.contains(&k.as_str())) {
                    return Err(SpecError::new(format!("unknown key '{key}'"), value));
                }

                let head = map
                    .get("file")
                    .or_else(|| map.get("intro"))
                    .map(|v| Self::from_value(v).map(Box::new))
                    .transpose()?;

                let looped = match map.get("loop") {
                    None | Some(Value::Null) => None,
                    Some(raw) => Some(match Offset::from_value(raw) {
                        Some(offset) => LoopSource::Split(offset),
                        None => LoopSource::Source(Box::new(Self::from_value(raw)?)),
                    }),
                };

                if head.is_none() && looped.is_none() {
                    return Err(SpecError::new("expected 'file', 'intro' or 'loop'", value));
                }
                if head.is_none() && matches!(looped, Some(LoopSource::Split(_))) {
                    return Err(SpecError::new("a loop split point needs a 'file' to split", value));
                }

                let outro = map
                    .get("outro")
                    .filter(|v| !v.is_null())
                    .map(|v| Self::from_value(v).map(Box::new))
                    .transpose()?;

                let offset = |key: &str| -> Result<Option<Offset>, SpecError> {
                    match map.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(raw) => Offset::from_value(raw)
                            .map(Some)
                            .ok_or_else(|| SpecError::new(format!("'{key}' is not a number"), value)),
                    }
                };

                let effects = match map.get("effects") {
                    Some(raw) => EffectDescriptor::list_from_value(raw)?,
                    None => Vec::new(),
                };

                Ok(SourceSpec::Composite(CompositeSpec {
                    head,
                    looped,
                    outro,
                    start: offset("start")?,
                    end: offset("end")?,
                    effects,
                }))
            }
            _ => Err(SpecError::new("expected a file path, a list of sources, or an object", value)),
        }
    }
}
