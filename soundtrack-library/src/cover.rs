//! Cover art loading and resizing

use crate::tags::{Picture, TagSet};
use crate::template::format_tags;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

const JPEG_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum CoverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid cover size {0}")]
    InvalidSize(String),
    #[error("Cover config must be a path or an object, got {0}")]
    InvalidConfig(String),
}

/// Where the cover comes from and what size it should be
#[derive(Debug, Clone, PartialEq)]
pub struct CoverConfig {
    /// Path template, expanded with the track's tags
    pub file: String,
    pub base_dir: PathBuf,
    pub size: Option<(u32, u32)>,
}

impl CoverConfig {
    /// Decode `"cover.png"` or `{file, size}`
    pub fn from_value(value: &Value, base_dir: &Path) -> Result<Self, CoverError> {
        match value {
            Value::String(file) => Ok(Self {
                file: file.clone(),
                base_dir: base_dir.to_path_buf(),
                size: None,
            }),
            Value::Object(map) => {
                let file = map
                    .get("file")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoverError::InvalidConfig(value.to_string()))?;
                let size = match map.get("size") {
                    None | Some(Value::Null) => None,
                    Some(size) => Some(parse_size(size)?),
                };
                Ok(Self {
                    file: file.to_string(),
                    base_dir: base_dir.to_path_buf(),
                    size,
                })
            }
            other => Err(CoverError::InvalidConfig(other.to_string())),
        }
    }

    /// Cover path for a track
    pub fn path_for(&self, tags: &TagSet) -> PathBuf {
        self.base_dir.join(format_tags(&self.file, tags))
    }

    /// Load, resize, and JPEG-encode the cover for a track
    pub fn load(&self, tags: &TagSet) -> Result<Picture, CoverError> {
        let path = self.path_for(tags);
        let image = image::open(&path)?;
        let image = match self.size {
            Some((width, height)) => image.resize_exact(width, height, FilterType::Lanczos3),
            None => image,
        };
        tracing::debug!(file = %path.display(), width = image.width(), height = image.height(), "Loaded cover");
        encode_jpeg(&image)
    }
}

/// Encoded covers keyed by resolved path and target size
///
/// Albums usually share one cover, so each file is decoded once per batch.
#[derive(Debug, Default)]
pub struct CoverCache {
    pictures: HashMap<(PathBuf, Option<(u32, u32)>), Picture>,
}

impl CoverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, config: &CoverConfig, tags: &TagSet) -> Result<Picture, CoverError> {
        let key = (config.path_for(tags), config.size);
        if let Some(picture) = self.pictures.get(&key) {
            return Ok(picture.clone());
        }
        let picture = config.load(tags)?;
        self.pictures.insert(key, picture.clone());
        Ok(picture)
    }
}

/// JPEG-encode an image (alpha is dropped)
pub fn encode_jpeg(image: &DynamicImage) -> Result<Picture, CoverError> {
    let rgb = image.to_rgb8();
    let mut data = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(Picture {
        data,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Decode an encoded picture
pub fn decode(picture: &Picture) -> Result<DynamicImage, CoverError> {
    Ok(image::load_from_memory_with_format(&picture.data, ImageFormat::Jpeg)?)
}

/// Target size from `300`, `"300x200"`, `[300, 200]` or `{width, height}`
///
/// A missing dimension copies the other one.
pub fn parse_size(value: &Value) -> Result<(u32, u32), CoverError> {
    let invalid = || CoverError::InvalidSize(value.to_string());
    let dimension = |v: Option<&Value>| -> Result<Option<u32>, CoverError> {
        match v {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|f| *f >= 1.0)
                .map(|f| Some(f as u32))
                .ok_or_else(invalid),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| *f >= 1.0)
                .map(|f| Some(f as u32))
                .ok_or_else(invalid),
            Some(_) => Err(invalid()),
        }
    };

    let (width, height) = match value {
        Value::Number(_) => {
            let side = dimension(Some(value))?;
            (side, side)
        }
        Value::String(s) => {
            let lower = s.to_lowercase();
            match lower.split_once('x') {
                Some((w, h)) => (
                    dimension(Some(&Value::from(w)))?,
                    dimension(Some(&Value::from(h)))?,
                ),
                None => {
                    let side = dimension(Some(value))?;
                    (side, side)
                }
            }
        }
        Value::Array(items) => (dimension(items.first())?, dimension(items.get(1))?),
        Value::Object(map) => {
            let pick = |keys: [&str; 3]| keys.iter().find_map(|k| map.get(*k));
            (
                dimension(pick(["width", "w", "x"]))?,
                dimension(pick(["height", "h", "y"]))?,
            )
        }
        _ => return Err(invalid()),
    };

    match (width, height) {
        (Some(w), Some(h)) => Ok((w, h)),
        (Some(side), None) | (None, Some(side)) => Ok((side, side)),
        (None, None) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_size_forms() {
        assert_eq!(parse_size(&json!(300)).unwrap(), (300, 300));
        assert_eq!(parse_size(&json!("300x200")).unwrap(), (300, 200));
        assert_eq!(parse_size(&json!("640X")).unwrap(), (640, 640));
        assert_eq!(parse_size(&json!([100, 50])).unwrap(), (100, 50));
        assert_eq!(parse_size(&json!([100])).unwrap(), (100, 100));
        assert_eq!(parse_size(&json!({"w": 20, "y": 10})).unwrap(), (20, 10));
        assert_eq!(parse_size(&json!({"height": 64})).unwrap(), (64, 64));
        assert!(parse_size(&json!({})).is_err());
        assert!(parse_size(&json!("big")).is_err());
        assert!(parse_size(&json!(true)).is_err());
    }

    #[test]
    fn test_resize_ignores_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let source = DynamicImage::new_rgb8(640, 480);
        source.save(dir.path().join("Overworld.png")).unwrap();

        let config = CoverConfig::from_value(&json!({"file": "{title}.png", "size": "300x300"}), dir.path()).unwrap();
        let mut tags = TagSet::new();
        tags.set("title", "Overworld");

        let picture = config.load(&tags).unwrap();
        assert_eq!((picture.width, picture.height), (300, 300));
        let decoded = decode(&picture).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 300));
    }

    #[test]
    fn test_cache_reuses_decoded_cover() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cover.png");
        DynamicImage::new_rgb8(64, 64).save(&file).unwrap();
        let config = CoverConfig::from_value(&json!({"file": "cover.png", "size": 32}), dir.path()).unwrap();

        let mut cache = CoverCache::new();
        let first = cache.load(&config, &TagSet::new()).unwrap();
        std::fs::remove_file(&file).unwrap();
        let second = cache.load(&config, &TagSet::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!((second.width, second.height), (32, 32));

        let other = CoverConfig::from_value(&json!({"file": "cover.png", "size": 16}), dir.path()).unwrap();
        assert!(cache.load(&other, &TagSet::new()).is_err());
    }

    #[test]
    fn test_missing_cover_is_error() {
        let config = CoverConfig::from_value(&json!("none.png"), Path::new("/nonexistent")).unwrap();
        assert!(config.load(&TagSet::new()).is_err());
    }
}
