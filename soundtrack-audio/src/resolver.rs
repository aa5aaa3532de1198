//! Recursive audio source resolution
//!
//! Turns a decoded [`SourceSpec`] into one [`AudioBuffer`]:
//! files are loaded through an [`AudioCodec`], lists are mixed, composites
//! are trimmed and looped. Silence padding applies only to the outermost
//! spec; effects apply at every level that declares them.

use crate::buffer::{AudioBuffer, BufferError};
use crate::codec::{AudioCodec, CodecError};
use crate::effects::{EffectDescriptor, EffectError, EffectRegistry};
use crate::looper::{loop_track, FadeSettings};
use crate::source::{CompositeSpec, LoopSource, Offset, SourceSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving a track's audio
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid config in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
    #[error("Cannot load {} (from {}): {source}", path.display(), config.display())]
    Resource {
        path: PathBuf,
        config: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("Effect failed in {}: {source}", config.display())]
    Effect {
        config: PathBuf,
        #[source]
        source: EffectError,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Leading/trailing silence in seconds; negative values trim instead
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Silence {
    pub start: f64,
    pub end: f64,
}

impl Silence {
    pub fn apply(&self, audio: AudioBuffer) -> AudioBuffer {
        let audio = if self.start >= 0.0 {
            let frames = audio.seconds_to_samples(self.start);
            audio.insert_silence(0, frames)
        } else {
            let frames = audio.seconds_to_samples(-self.start);
            audio.trim_start(frames)
        };
        if self.end >= 0.0 {
            let frames = audio.seconds_to_samples(self.end);
            audio.pad_end(frames)
        } else {
            let frames = audio.seconds_to_samples(-self.end);
            audio.trim_end(frames)
        }
    }
}

/// Per-track resolution settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSettings {
    /// Config file the spec came from, attached to errors
    pub config: PathBuf,
    pub loop_count: usize,
    pub fade: FadeSettings,
    pub silence: Silence,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            config: PathBuf::new(),
            loop_count: 2,
            fade: FadeSettings::default(),
            silence: Silence::default(),
        }
    }
}

/// Resolves source specs into sample buffers
pub struct SourceResolver {
    codec: Box<dyn AudioCodec>,
    effects: EffectRegistry,
    sample_threshold: f64,
}

impl SourceResolver {
    /// `sample_threshold`: offsets with a smaller magnitude are seconds
    pub fn new(codec: Box<dyn AudioCodec>, effects: EffectRegistry, sample_threshold: f64) -> Self {
        Self {
            codec,
            effects,
            sample_threshold,
        }
    }

    pub fn codec(&self) -> &dyn AudioCodec {
        self.codec.as_ref()
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    pub fn sample_threshold(&self) -> f64 {
        self.sample_threshold
    }

    /// Decode a raw config value and resolve it
    pub fn resolve_value(
        &self,
        value: &Value,
        base_dir: &Path,
        settings: &TrackSettings,
    ) -> Result<AudioBuffer, ResolveError> {
        let spec = SourceSpec::from_value(value).map_err(|e| ResolveError::Config {
            path: settings.config.clone(),
            message: e.to_string(),
        })?;
        self.resolve(&spec, base_dir, settings)
    }

    /// Resolve `spec`, with file paths relative to `base_dir`
    pub fn resolve(
        &self,
        spec: &SourceSpec,
        base_dir: &Path,
        settings: &TrackSettings,
    ) -> Result<AudioBuffer, ResolveError> {
        self.resolve_level(spec, base_dir, settings, true)
    }

    fn resolve_level(
        &self,
        spec: &SourceSpec,
        base_dir: &Path,
        settings: &TrackSettings,
        outermost: bool,
    ) -> Result<AudioBuffer, ResolveError> {
        let (audio, effects) = match spec {
            SourceSpec::File(path) => (self.load(path, base_dir, settings)?, &[][..]),
            SourceSpec::Mix(items) => (self.mix(items, base_dir, settings)?, &[][..]),
            SourceSpec::Composite(composite) => (
                self.compose(composite, base_dir, settings)?,
                composite.effects.as_slice(),
            ),
        };

        let audio = if outermost {
            settings.silence.apply(audio)
        } else {
            audio
        };

        self.apply_effects(audio, effects)
            .map_err(|source| ResolveError::Effect {
                config: settings.config.clone(),
                source,
            })
    }

    /// Apply `effects` in order
    pub fn apply_effects(
        &self,
        audio: AudioBuffer,
        effects: &[EffectDescriptor],
    ) -> Result<AudioBuffer, EffectError> {
        effects.iter().try_fold(audio, |audio, descriptor| {
            self.effects.apply(audio, descriptor, self.sample_threshold)
        })
    }

    fn load(&self, path: &Path, base_dir: &Path, settings: &TrackSettings) -> Result<AudioBuffer, ResolveError> {
        let full = base_dir.join(path);
        self.codec.load(&full).map_err(|source| ResolveError::Resource {
            path: full,
            config: settings.config.clone(),
            source,
        })
    }

    fn mix(&self, items: &[SourceSpec], base_dir: &Path, settings: &TrackSettings) -> Result<AudioBuffer, ResolveError> {
        let mut items = items.iter();
        let Some(first) = items.next() else {
            return Err(ResolveError::Config {
                path: settings.config.clone(),
                message: "empty source list".to_string(),
            });
        };
        let mut mixed = self.resolve_level(first, base_dir, settings, false)?;
        for item in items {
            let next = self.resolve_level(item, base_dir, settings, false)?;
            mixed = mixed.mix(next)?;
        }
        Ok(mixed)
    }

    fn compose(
        &self,
        spec: &CompositeSpec,
        base_dir: &Path,
        settings: &TrackSettings,
    ) -> Result<AudioBuffer, ResolveError> {
        let head = spec
            .head
            .as_deref()
            .map(|s| self.resolve_level(s, base_dir, settings, false))
            .transpose()?;

        let (intro, looped) = match (&spec.looped, head) {
            (Some(LoopSource::Split(at)), Some(head)) => {
                let head = self.trim(head, spec.start, spec.end);
                let at = at.resolve(head.sample_rate(), self.sample_threshold, head.len());
                let (intro, looped) = head.split(at);
                (Some(intro), Some(looped))
            }
            (Some(LoopSource::Source(source)), head) => {
                let looped = self.resolve_level(source, base_dir, settings, false)?;
                match head {
                    Some(head) => (Some(self.trim(head, spec.start, spec.end)), Some(looped)),
                    None => (None, Some(self.trim(looped, spec.start, spec.end))),
                }
            }
            (None, Some(head)) => (Some(self.trim(head, spec.start, spec.end)), None),
            (Some(LoopSource::Split(_)), None) | (None, None) => {
                return Err(ResolveError::Config {
                    path: settings.config.clone(),
                    message: "source needs 'file', 'intro' or 'loop'".to_string(),
                });
            }
        };

        let outro = spec
            .outro
            .as_deref()
            .map(|s| self.resolve_level(s, base_dir, settings, false))
            .transpose()?;

        match looped {
            Some(looped) => Ok(loop_track(
                intro,
                looped,
                settings.loop_count,
                outro,
                &settings.fade,
            )?),
            None => {
                // `intro` is always present when there is no loop
                let body = intro.unwrap_or_else(|| AudioBuffer::silence(0, 0, 0));
                match outro {
                    Some(outro) => Ok(body.append(outro)?),
                    None => Ok(body),
                }
            }
        }
    }

    /// Keep `[start, end)`; negative bounds count from the end
    fn trim(&self, audio: AudioBuffer, start: Option<Offset>, end: Option<Offset>) -> AudioBuffer {
        if start.is_none() && end.is_none() {
            return audio;
        }
        let rate = audio.sample_rate();
        let len = audio.len();
        let from = start
            .map(|o| o.resolve(rate, self.sample_threshold, len))
            .unwrap_or(0);
        let to = end
            .map(|o| o.resolve(rate, self.sample_threshold, len))
            .unwrap_or(len);
        audio.trim(from, to.saturating_sub(from))
    }
}
