//! Audio engine for soundtrack - buffers, fades, effects, and source resolution
//!
//! This module provides the track assembly pipeline:
//! - Buffer: planar sample matrix with trim, split, silence, and mixing
//! - Fade: the adjustable fade curve family
//! - Effects: name-keyed effect registry (fade, gain, biquad filters)
//! - Source: declarative source specs decoded from config JSON
//! - Resolver: recursive spec resolution with loop synthesis
//! - Codec: symphonia decoding, WAV encoding, ffmpeg transcoding

mod buffer;
mod codec;
mod effects;
pub mod fade;
mod looper;
mod resample;
mod resolver;
mod source;

pub use buffer::{seconds_to_samples, AudioBuffer, BufferError};
pub use codec::{AudioCodec, CodecError, EncodeOptions, FileCodec};
pub use effects::{
    AdjustableFade, Effect, EffectConstructor, EffectDescriptor, EffectError, EffectOptions,
    EffectRegistry, Filter, FilterType, Gain,
};
pub use looper::{loop_track, FadeSettings};
pub use resample::{resample, ResampleError};
pub use resolver::{ResolveError, Silence, SourceResolver, TrackSettings};
pub use source::{CompositeSpec, LoopSource, Offset, SourceSpec, SpecError};
