//! Effects applied to resolved tracks
//!
//! Effects are looked up by name in an [`EffectRegistry`]. Each descriptor
//! carries options plus an optional `[start, start + length)` window.

mod fade;
mod filter;
mod gain;

pub use fade::AdjustableFade;
pub use filter::{Filter, FilterType};
pub use gain::Gain;

use crate::buffer::AudioBuffer;
use crate::source::{Offset, SpecError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised while building or applying effects
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Unknown effect '{0}'")]
    UnknownEffect(String),
    #[error("Effect '{effect}' requires option '{option}'")]
    MissingOption { effect: String, option: String },
    #[error("Effect '{effect}' option '{option}' is not a number: {value}")]
    InvalidOption {
        effect: String,
        option: String,
        value: String,
    },
}

/// Trait for offline audio effects
pub trait Effect: Send {
    /// Process one channel's samples in place
    fn process(&mut self, samples: &mut [f32], sample_rate: u32);

    /// Reset per-channel state before the next channel
    fn reset(&mut self);

    /// Get effect name
    fn name(&self) -> &'static str;
}

/// Numeric effect options keyed by lowercase name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectOptions {
    effect: String,
    values: BTreeMap<String, f64>,
}

impl EffectOptions {
    pub fn new(effect: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, option: &str, value: f64) -> Self {
        self.values.insert(option.to_lowercase(), value);
        self
    }

    /// Option value, if present
    pub fn get(&self, option: &str) -> Option<f64> {
        self.values.get(option).copied()
    }

    /// Option value or `default`
    pub fn get_or(&self, option: &str, default: f64) -> f64 {
        self.get(option).unwrap_or(default)
    }

    /// Option value or [`EffectError::MissingOption`]
    pub fn require(&self, option: &str) -> Result<f64, EffectError> {
        self.get(option).ok_or_else(|| EffectError::MissingOption {
            effect: self.effect.clone(),
            option: option.to_string(),
        })
    }

    /// Decode raw descriptor options
    ///
    /// A scalar maps onto `default_option`; a map is taken key by key.
    /// Numeric strings are accepted.
    fn from_value(effect: &str, default_option: &str, raw: &Value) -> Result<Self, EffectError> {
        let mut options = Self::new(effect);
        match raw {
            Value::Null => {}
            Value::Object(map) => {
                for (key, value) in map {
                    options
                        .values
                        .insert(key.to_lowercase(), option_number(effect, key, value)?);
                }
            }
            scalar => {
                options.values.insert(
                    default_option.to_string(),
                    option_number(effect, default_option, scalar)?,
                );
            }
        }
        Ok(options)
    }
}

fn option_number(effect: &str, option: &str, value: &Value) -> Result<f64, EffectError> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.ok_or_else(|| EffectError::InvalidOption {
        effect: effect.to_string(),
        option: option.to_string(),
        value: value.to_string(),
    })
}

/// One effect invocation: `{name, options, start?, length?}`
#[derive(Debug, Clone, PartialEq)]
pub struct EffectDescriptor {
    pub name: String,
    pub options: Value,
    pub start: Option<Offset>,
    pub length: Option<Offset>,
}

impl EffectDescriptor {
    pub fn new(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
            start: None,
            length: None,
        }
    }

    /// Decode a descriptor from config JSON
    ///
    /// A bare string is an effect name with no options.
    pub fn from_value(value: &Value) -> Result<Self, SpecError> {
        match value {
            Value::String(name) => Ok(Self::new(name.clone(), Value::Null)),
            Value::Object(map) => {
                let name = map
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SpecError::new("effect is missing 'name'", value))?;
                let offset = |key: &str| -> Result<Option<Offset>, SpecError> {
                    match map.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(raw) => Offset::from_value(raw)
                            .map(Some)
                            .ok_or_else(|| SpecError::new(format!("effect '{key}' is not a number"), value)),
                    }
                };
                Ok(Self {
                    name: name.to_string(),
                    options: map.get("options").cloned().unwrap_or(Value::Null),
                    start: offset("start")?,
                    length: offset("length")?,
                })
            }
            _ => Err(SpecError::new("effect must be a name or an object", value)),
        }
    }

    /// Decode a list of descriptors (a single descriptor is accepted too)
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, SpecError> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }
}

/// Builds an effect from decoded options
pub type EffectConstructor = fn(&EffectOptions) -> Result<Box<dyn Effect>, EffectError>;

struct RegisteredEffect {
    default_option: &'static str,
    build: EffectConstructor,
}

/// Name -> constructor lookup for effects
pub struct EffectRegistry {
    effects: HashMap<String, RegisteredEffect>,
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl EffectRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            effects: HashMap::new(),
        }
    }

    /// Registry with the built-in effects
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("fade", AdjustableFade::DEFAULT_OPTION, AdjustableFade::build);
        registry.register("adjustable_fade", AdjustableFade::DEFAULT_OPTION, AdjustableFade::build);
        registry.register("gain", Gain::DEFAULT_OPTION, Gain::build);
        registry.register("amplify", Gain::DEFAULT_OPTION, Gain::build);
        registry.register("lowpass", Filter::DEFAULT_OPTION, |o| {
            Filter::build(FilterType::LowPass, o)
        });
        registry.register("highpass", Filter::DEFAULT_OPTION, |o| {
            Filter::build(FilterType::HighPass, o)
        });
        registry.register("bandpass", Filter::DEFAULT_OPTION, |o| {
            Filter::build(FilterType::BandPass, o)
        });
        registry
    }

    /// Register (or replace) an effect under `name`
    pub fn register(&mut self, name: &str, default_option: &'static str, build: EffectConstructor) {
        self.effects.insert(
            name.to_lowercase(),
            RegisteredEffect {
                default_option,
                build,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.effects.contains_key(&name.to_lowercase())
    }

    /// Construct the effect a descriptor names
    pub fn create(&self, descriptor: &EffectDescriptor) -> Result<Box<dyn Effect>, EffectError> {
        let key = descriptor.name.to_lowercase();
        let entry = self
            .effects
            .get(&key)
            .ok_or_else(|| EffectError::UnknownEffect(descriptor.name.clone()))?;
        let options = EffectOptions::from_value(&key, entry.default_option, &descriptor.options)?;
        (entry.build)(&options)
    }

    /// Apply a descriptor to `audio` within its window
    ///
    /// `threshold` decides whether window values are seconds or samples.
    pub fn apply(
        &self,
        mut audio: AudioBuffer,
        descriptor: &EffectDescriptor,
        threshold: f64,
    ) -> Result<AudioBuffer, EffectError> {
        let mut effect = self.create(descriptor)?;
        let rate = audio.sample_rate();
        let len = audio.len();

        let start = descriptor
            .start
            .map(|o| o.resolve(rate, threshold, len))
            .unwrap_or(0)
            .min(len);
        let length = descriptor
            .length
            .map(|o| o.to_samples(rate, threshold))
            .unwrap_or(len - start);
        let end = start.saturating_add(length).min(len);

        tracing::debug!(
            effect = effect.name(),
            start,
            end,
            "Applying effect"
        );

        for channel in audio.channels_mut() {
            effect.reset();
            effect.process(&mut channel[start..end], rate);
        }
        Ok(audio)
    }
}
