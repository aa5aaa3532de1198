//! Sample-rate conversion for planar buffers

use rubato::{FftFixedInOut, Resampler};
use thiserror::Error;

/// Frames fed to the resampler per chunk
const CHUNK_FRAMES: usize = 1024;

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Resampler setup failed: {0}")]
    Construction(String),
    #[error("Resampling failed: {0}")]
    Process(String),
}

/// Resample planar `channels` from `source_rate` to `target_rate`
///
/// The output length is `frames * target_rate / source_rate` (rounded down)
/// and the resampler's delay is removed, so output stays aligned with input.
pub fn resample(
    channels: &[Vec<f32>],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<Vec<f32>>, ResampleError> {
    let channel_count = channels.len();
    let frames = channels.first().map(Vec::len).unwrap_or(0);
    if channel_count == 0 || frames == 0 || source_rate == target_rate {
        return Ok(channels.to_vec());
    }

    let mut resampler = FftFixedInOut::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_FRAMES,
        channel_count,
    )
    .map_err(|e| ResampleError::Construction(e.to_string()))?;

    let chunk_size = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = (frames as u64 * target_rate as u64 / source_rate as u64) as usize;
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channel_count];

    // Zero chunks past the end flush the resampler's delay line
    let mut pos = 0;
    while output[0].len() < delay + expected {
        let chunk: Vec<Vec<f32>> = channels
            .iter()
            .map(|ch| {
                let start = pos.min(frames);
                let end = (pos + chunk_size).min(frames);
                let mut v = ch[start..end].to_vec();
                v.resize(chunk_size, 0.0);
                v
            })
            .collect();
        let input_refs: Vec<&[f32]> = chunk.iter().map(|v| v.as_slice()).collect();

        let resampled = resampler
            .process(&input_refs, None)
            .map_err(|e| ResampleError::Process(e.to_string()))?;
        for (ch, data) in resampled.into_iter().enumerate() {
            output[ch].extend(data);
        }

        pos += chunk_size;
    }

    for channel in &mut output {
        channel.drain(..delay);
        channel.truncate(expected);
    }

    Ok(output)
}
