//! Planar multi-channel sample buffer
//!
//! Every composition call returns a new buffer (or consumes `self`), so a
//! buffer still referenced elsewhere is never modified behind its owner's back.

use crate::resample::{resample, ResampleError};
use thiserror::Error;

/// Errors raised while combining buffers
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("Cannot combine buffers: {0}")]
    Resample(#[from] ResampleError),
}

/// A multi-channel block of audio (channels x frames, f32 in -1.0..=1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data
    ///
    /// Shorter channels are padded with silence so every channel has the
    /// same number of frames.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Silent buffer of the given shape
    pub fn silence(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            sample_rate,
        }
    }

    /// Deinterleave `samples` (L,R,L,R,...) into a planar buffer
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let planar = (0..channels)
            .map(|ch| (0..frames).map(|f| samples[f * channels + ch]).collect())
            .collect();
        Self::new(planar, sample_rate)
    }

    /// Interleave the buffer (L,R,L,R,...)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.len();
        let mut interleaved = Vec::with_capacity(frames * self.channel_count());
        for frame in 0..frames {
            for channel in &self.channels {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Planar channel data
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Length in frames (samples per channel)
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Convert seconds to frames at this buffer's rate (truncating)
    pub fn seconds_to_samples(&self, seconds: f64) -> usize {
        seconds_to_samples(seconds, self.sample_rate)
    }

    /// Copy `length` frames starting at `start`, clamped to the buffer
    pub fn trim(&self, start: usize, length: usize) -> Self {
        let start = start.min(self.len());
        let end = start.saturating_add(length).min(self.len());
        let channels = self
            .channels
            .iter()
            .map(|ch| ch[start..end].to_vec())
            .collect();
        Self {
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Split into `[0, at)` and `[at, len)`
    pub fn split(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.len());
        (self.trim(0, at), self.trim(at, self.len() - at))
    }

    /// Drop `frames` from the start
    pub fn trim_start(self, frames: usize) -> Self {
        let len = self.len();
        self.trim(frames, len)
    }

    /// Drop `frames` from the end
    pub fn trim_end(self, frames: usize) -> Self {
        let keep = self.len().saturating_sub(frames);
        self.trim(0, keep)
    }

    /// Insert `length` frames of silence at frame `at`
    pub fn insert_silence(mut self, at: usize, length: usize) -> Self {
        let at = at.min(self.len());
        for channel in &mut self.channels {
            channel.splice(at..at, std::iter::repeat(0.0).take(length));
        }
        self
    }

    /// Append `length` frames of silence
    pub fn pad_end(self, length: usize) -> Self {
        let len = self.len();
        self.insert_silence(len, length)
    }

    /// Change the channel count
    ///
    /// Upmixing duplicates existing channels in order; downmixing to mono
    /// sums all channels; any other reduction keeps the leading channels.
    pub fn with_channels(self, count: usize) -> Self {
        let current = self.channel_count();
        if count == current || current == 0 || count == 0 {
            return self;
        }

        let sample_rate = self.sample_rate;
        let mut channels = self.channels;

        if count > current {
            for i in 0..(count - current) {
                let copy = channels[i % current].clone();
                channels.push(copy);
            }
        } else if count == 1 {
            let frames = channels[0].len();
            let mono = (0..frames)
                .map(|f| channels.iter().map(|ch| ch[f]).sum())
                .collect();
            channels = vec![mono];
        } else {
            channels.truncate(count);
        }

        Self {
            channels,
            sample_rate,
        }
    }

    /// Resample to `sample_rate`
    pub fn resampled(self, sample_rate: u32) -> Result<Self, BufferError> {
        if sample_rate == self.sample_rate || self.is_empty() {
            return Ok(Self {
                channels: self.channels,
                sample_rate,
            });
        }
        let channels = resample(&self.channels, self.sample_rate, sample_rate)?;
        Ok(Self::new(channels, sample_rate))
    }

    /// Bring `other` to this buffer's sample rate and channel count
    ///
    /// Channel counts are reconciled upward: whichever side has fewer
    /// channels is upmixed.
    fn reconcile(self, other: Self) -> Result<(Self, Self), BufferError> {
        let other = if other.sample_rate != self.sample_rate {
            tracing::debug!(
                from = other.sample_rate,
                to = self.sample_rate,
                "Resampling operand to match"
            );
            other.resampled(self.sample_rate)?
        } else {
            other
        };

        let channels = self.channel_count().max(other.channel_count());
        Ok((self.with_channels(channels), other.with_channels(channels)))
    }

    /// Concatenate `other` after this buffer
    pub fn append(self, other: Self) -> Result<Self, BufferError> {
        if self.channel_count() == 0 {
            return Ok(other);
        }
        if other.channel_count() == 0 {
            return Ok(self);
        }
        let (mut head, tail) = self.reconcile(other)?;
        for (channel, extra) in head.channels.iter_mut().zip(tail.channels) {
            channel.extend(extra);
        }
        Ok(head)
    }

    /// Sample-wise sum, clipped to -1.0..=1.0
    ///
    /// The shorter operand is padded with trailing silence, so the result is
    /// as long as the longer one.
    pub fn mix(self, other: Self) -> Result<Self, BufferError> {
        if self.channel_count() == 0 {
            return Ok(other);
        }
        if other.channel_count() == 0 {
            return Ok(self);
        }
        let (a, b) = self.reconcile(other)?;
        let frames = a.len().max(b.len());
        let pad = frames - a.len();
        let mut a = a.pad_end(pad);
        for (dst, src) in a.channels.iter_mut().zip(&b.channels) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = (*d + *s).clamp(-1.0, 1.0);
            }
        }
        Ok(a)
    }

    /// Multiply every sample by `gain`
    pub fn scaled(mut self, gain: f32) -> Self {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
        self
    }

    /// Multiply the frames starting at `start` by `envelope`, sample by sample
    ///
    /// Envelope values past the end of the buffer are ignored.
    pub fn apply_envelope(mut self, envelope: &[f32], start: usize) -> Self {
        for channel in &mut self.channels {
            let start = start.min(channel.len());
            for (sample, gain) in channel[start..].iter_mut().zip(envelope) {
                *sample *= gain;
            }
        }
        self
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

/// Convert seconds to frames at `sample_rate` (truncating, never negative)
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds * sample_rate as f64) as usize
}
