//! Loop synthesis: `[intro][loop]...[loop][faded loop | outro]`

use crate::buffer::{seconds_to_samples, AudioBuffer, BufferError};
use crate::fade::curve;
use serde::{Deserialize, Serialize};

/// Fade-out applied after the last loop repetition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeSettings {
    /// Fade length in seconds
    pub duration: f64,
    /// Gain at the start of the fade
    pub gain0: f32,
    /// Gain at the end of the fade
    pub gain1: f32,
    /// Shape parameter for [`crate::fade::curve`]
    pub curve_ratio: f32,
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            duration: 10.0,
            gain0: 1.0,
            gain1: 0.0,
            curve_ratio: 0.0,
        }
    }
}

impl FadeSettings {
    /// Fade length in frames at `sample_rate`, capped at `limit`
    pub fn length(&self, sample_rate: u32, limit: usize) -> usize {
        seconds_to_samples(self.duration, sample_rate).min(limit)
    }
}

/// Concatenate `intro`, `count` copies of `looped`, then `outro` or a fade
///
/// Without an outro the tail is the first `fade.duration` seconds of the
/// loop multiplied by a fade envelope.
pub fn loop_track(
    intro: Option<AudioBuffer>,
    looped: AudioBuffer,
    count: usize,
    outro: Option<AudioBuffer>,
    fade: &FadeSettings,
) -> Result<AudioBuffer, BufferError> {
    tracing::debug!(
        intro = intro.as_ref().map(AudioBuffer::len).unwrap_or(0),
        looped = looped.len(),
        count,
        outro = outro.is_some(),
        "Synthesizing loop"
    );

    let rate = intro
        .as_ref()
        .map(AudioBuffer::sample_rate)
        .unwrap_or(looped.sample_rate());
    let mut track = intro.unwrap_or_else(|| AudioBuffer::silence(looped.channel_count(), 0, rate));

    for _ in 0..count {
        track = track.append(looped.clone())?;
    }

    let tail = match outro {
        Some(outro) => outro,
        None => {
            let length = fade.length(looped.sample_rate(), looped.len());
            let envelope = curve(fade.gain0, fade.gain1, fade.curve_ratio, length);
            looped.trim(0, length).apply_envelope(&envelope, 0)
        }
    };

    track.append(tail)
}
