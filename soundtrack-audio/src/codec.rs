//! Audio file decoding and encoding

use crate::buffer::{AudioBuffer, BufferError};
use std::path::{Path, PathBuf};
use std::process::Command;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur while reading or writing audio files
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
    #[error("Unsupported output format '{0}' (configure ffmpeg to transcode)")]
    UnsupportedFormat(String),
    #[error("ffmpeg failed: {0}")]
    Transcode(String),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

impl From<hound::Error> for CodecError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => CodecError::Io(io),
            other => CodecError::Encode(other.to_string()),
        }
    }
}

/// Encoder settings for one output format
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    /// WAV sample width: 16, 24 or 32 (float)
    pub bits_per_sample: u16,
    /// ffmpeg binary used for formats other than WAV
    pub ffmpeg: Option<PathBuf>,
    /// Extra ffmpeg arguments placed before the output path
    pub args: Vec<String>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bits_per_sample: 16,
            ffmpeg: None,
            args: Vec::new(),
        }
    }
}

/// Load/save of sample buffers
pub trait AudioCodec: Send {
    fn load(&self, path: &Path) -> Result<AudioBuffer, CodecError>;

    fn save(
        &self,
        audio: &AudioBuffer,
        path: &Path,
        format: &str,
        options: &EncodeOptions,
    ) -> Result<(), CodecError>;
}

/// Symphonia decoder + hound WAV encoder, with ffmpeg for everything else
#[derive(Debug, Clone, Default)]
pub struct FileCodec {
    target_sample_rate: Option<u32>,
}

impl FileCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resample every loaded file to `sample_rate`
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            target_sample_rate: Some(sample_rate),
        }
    }

    fn decode(path: &Path) -> Result<AudioBuffer, CodecError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(CodecError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    tracing::debug!(file = %path.display(), error = %e, "Stopped reading packets");
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    tracing::warn!(file = %path.display(), error = e, "Skipping corrupt packet");
                    continue;
                }
                Err(e) => return Err(CodecError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count();

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        Ok(AudioBuffer::from_interleaved(&samples, channels, sample_rate))
    }

    fn write_wav(audio: &AudioBuffer, path: &Path, bits_per_sample: u16) -> Result<(), CodecError> {
        let float = bits_per_sample >= 32;
        let spec = hound::WavSpec {
            channels: audio.channel_count().max(1) as u16,
            sample_rate: audio.sample_rate(),
            bits_per_sample: if float { 32 } else { bits_per_sample },
            sample_format: if float {
                hound::SampleFormat::Float
            } else {
                hound::SampleFormat::Int
            },
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        let interleaved = audio.to_interleaved();
        match bits_per_sample {
            16 => {
                for sample in interleaved {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
                }
            }
            24 => {
                const MAX_24: f32 = 8_388_607.0;
                for sample in interleaved {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * MAX_24) as i32)?;
                }
            }
            b if b >= 32 => {
                for sample in interleaved {
                    writer.write_sample(sample)?;
                }
            }
            other => {
                return Err(CodecError::Encode(format!("unsupported WAV sample width {other}")));
            }
        }
        writer.finalize()?;
        Ok(())
    }

    fn transcode(
        audio: &AudioBuffer,
        path: &Path,
        ffmpeg: &Path,
        options: &EncodeOptions,
    ) -> Result<(), CodecError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let intermediate = tempfile::Builder::new()
            .prefix(".soundtrack-")
            .suffix(".wav")
            .tempfile_in(dir)?;
        Self::write_wav(audio, intermediate.path(), 32)?;

        tracing::debug!(ffmpeg = %ffmpeg.display(), output = %path.display(), "Transcoding");
        let output = Command::new(ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(intermediate.path())
            .args(&options.args)
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(CodecError::Transcode(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

impl AudioCodec for FileCodec {
    fn load(&self, path: &Path) -> Result<AudioBuffer, CodecError> {
        let audio = Self::decode(path)?;
        tracing::debug!(
            file = %path.display(),
            frames = audio.len(),
            channels = audio.channel_count(),
            sample_rate = audio.sample_rate(),
            "Loaded source"
        );
        match self.target_sample_rate {
            Some(rate) if rate != audio.sample_rate() => Ok(audio.resampled(rate)?),
            _ => Ok(audio),
        }
    }

    fn save(
        &self,
        audio: &AudioBuffer,
        path: &Path,
        format: &str,
        options: &EncodeOptions,
    ) -> Result<(), CodecError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        match (format.to_lowercase().as_str(), &options.ffmpeg) {
            ("wav" | "wave", _) => Self::write_wav(audio, path, options.bits_per_sample)?,
            (_, Some(ffmpeg)) => Self::transcode(audio, path, ffmpeg, options)?,
            (other, None) => return Err(CodecError::UnsupportedFormat(other.to_string())),
        }

        tracing::info!(file = %path.display(), format, "Saved");
        Ok(())
    }
}
