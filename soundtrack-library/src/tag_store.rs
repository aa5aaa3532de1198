//! Reading and writing tags in audio containers

use crate::tags::{canonicalize, Picture, TagSet, TagValue};
use lofty::config::WriteOptions;
use lofty::file::TaggedFile;
use lofty::picture::{MimeType, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemValue, Tag, TagItem};
use std::path::Path;
use thiserror::Error;

/// Errors from the tag store
#[derive(Error, Debug)]
pub enum TagStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tag error: {0}")]
    Lofty(#[from] lofty::error::LoftyError),
}

/// Container-agnostic tag access
pub trait TagStore {
    /// An opened audio file
    type Handle;

    fn load(&self, path: &Path) -> Result<Self::Handle, TagStoreError>;
    fn save(&self, handle: &mut Self::Handle, path: &Path) -> Result<(), TagStoreError>;

    fn get_tag(&self, handle: &Self::Handle, name: &str) -> Option<TagValue>;
    /// Returns false when the container cannot hold `name`
    fn set_tag(&self, handle: &mut Self::Handle, name: &str, value: &TagValue) -> bool;
    fn remove_tag(&self, handle: &mut Self::Handle, name: &str);

    /// Encoded front cover, if any
    fn picture(&self, handle: &Self::Handle) -> Option<Vec<u8>>;
    fn set_picture(&self, handle: &mut Self::Handle, picture: &Picture);

    fn canonicalize(&self, name: &str) -> String {
        canonicalize(name)
    }

    /// Write every tag in `tags` (and its picture) into the file at `path`
    fn write_tags(&self, path: &Path, tags: &TagSet) -> Result<(), TagStoreError> {
        let mut handle = self.load(path)?;
        for (name, value) in tags.iter() {
            if value.is_empty() {
                continue;
            }
            if !self.set_tag(&mut handle, name, value) {
                tracing::warn!(file = %path.display(), tag = name, "Container rejected tag");
            }
        }
        if let Some(picture) = tags.picture() {
            self.set_picture(&mut handle, picture);
        }
        self.save(&mut handle, path)
    }
}

/// [`TagStore`] backed by lofty
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagStore;

impl LoftyTagStore {
    pub fn new() -> Self {
        Self
    }

    /// The file's primary tag, created empty when missing
    fn primary_tag_mut(file: &mut TaggedFile) -> Option<&mut Tag> {
        let tag_type = file.primary_tag_type();
        if file.tag(tag_type).is_none() {
            file.insert_tag(Tag::new(tag_type));
        }
        file.tag_mut(tag_type)
    }
}

/// lofty item key for a canonical tag name
fn item_key(name: &str) -> ItemKey {
    match canonicalize(name).as_str() {
        "title" => ItemKey::TrackTitle,
        "subtitle" => ItemKey::TrackSubtitle,
        "album" => ItemKey::AlbumTitle,
        "setsubtitle" => ItemKey::SetSubtitle,
        "artist" => ItemKey::TrackArtist,
        "band" => ItemKey::AlbumArtist,
        "track" => ItemKey::TrackNumber,
        "tracks" => ItemKey::TrackTotal,
        "disc" => ItemKey::DiscNumber,
        "discs" => ItemKey::DiscTotal,
        "genres" => ItemKey::Genre,
        "comment" => ItemKey::Comment,
        "composer" => ItemKey::Composer,
        "conductor" => ItemKey::Conductor,
        "lyricist" => ItemKey::Lyricist,
        "arranger" => ItemKey::Arranger,
        "remixer" => ItemKey::Remixer,
        "publisher" => ItemKey::Publisher,
        "copyright" => ItemKey::CopyrightMessage,
        "license" => ItemKey::License,
        "year" => ItemKey::Year,
        "date" => ItemKey::RecordingDate,
        "originalreleaseyear" => ItemKey::OriginalReleaseDate,
        "bpm" => ItemKey::Bpm,
        "initialkey" => ItemKey::InitialKey,
        "mood" => ItemKey::Mood,
        "language" => ItemKey::Language,
        "isrc" => ItemKey::Isrc,
        "encodedby" => ItemKey::EncodedBy,
        "encodersettings" => ItemKey::EncoderSettings,
        "grouping" => ItemKey::ContentGroup,
        "lyrics" => ItemKey::Lyrics,
        "compilation" => ItemKey::FlagCompilation,
        "originalalbum" => ItemKey::OriginalAlbumTitle,
        "originalartist" => ItemKey::OriginalArtist,
        "originallyricist" => ItemKey::OriginalLyricist,
        "albumsort" => ItemKey::AlbumTitleSortOrder,
        "titlesort" => ItemKey::TrackTitleSortOrder,
        "albumartistsort" => ItemKey::AlbumArtistSortOrder,
        "artistsort" => ItemKey::TrackArtistSortOrder,
        "composersort" => ItemKey::ComposerSortOrder,
        other => ItemKey::Unknown(other.to_uppercase()),
    }
}

impl TagStore for LoftyTagStore {
    type Handle = TaggedFile;

    fn load(&self, path: &Path) -> Result<TaggedFile, TagStoreError> {
        Ok(Probe::open(path)?.read()?)
    }

    fn save(&self, handle: &mut TaggedFile, path: &Path) -> Result<(), TagStoreError> {
        handle.save_to_path(path, WriteOptions::default())?;
        tracing::debug!(file = %path.display(), "Wrote tags");
        Ok(())
    }

    fn get_tag(&self, handle: &TaggedFile, name: &str) -> Option<TagValue> {
        let tag = handle.primary_tag()?;
        let key = item_key(name);
        let values: Vec<String> = tag.get_strings(&key).map(str::to_string).collect();
        match values.len() {
            0 => None,
            1 => values.into_iter().next().map(|v| TagValue::parse(&v)),
            _ => Some(TagValue::List(values)),
        }
    }

    fn set_tag(&self, handle: &mut TaggedFile, name: &str, value: &TagValue) -> bool {
        let canonical = canonicalize(name);
        if canonical == "picture" {
            return false;
        }
        let Some(tag) = Self::primary_tag_mut(handle) else {
            return false;
        };

        // "1/12" style numbers carry their total
        if let ("track" | "disc", Some(number), Some(total)) =
            (canonical.as_str(), value.as_i64(), value.total())
        {
            let total_key = if canonical == "track" {
                ItemKey::TrackTotal
            } else {
                ItemKey::DiscTotal
            };
            return tag.insert_text(item_key(&canonical), number.to_string())
                && tag.insert_text(total_key, total.to_string());
        }

        let key = item_key(&canonical);
        let mut values = value.to_list().into_iter();
        let Some(first) = values.next() else {
            return true;
        };
        if !tag.insert_text(key.clone(), first) {
            return false;
        }
        for extra in values {
            tag.push(TagItem::new(key.clone(), ItemValue::Text(extra)));
        }
        true
    }

    fn remove_tag(&self, handle: &mut TaggedFile, name: &str) {
        let key = item_key(name);
        let tag_type = handle.primary_tag_type();
        if let Some(tag) = handle.tag_mut(tag_type) {
            tag.remove_key(&key);
        }
    }

    fn picture(&self, handle: &TaggedFile) -> Option<Vec<u8>> {
        let tag = handle.primary_tag()?;
        tag.pictures()
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| tag.pictures().first())
            .map(|p| p.data().to_vec())
    }

    fn set_picture(&self, handle: &mut TaggedFile, picture: &Picture) {
        let Some(tag) = Self::primary_tag_mut(handle) else {
            tracing::warn!("No tag available for cover art");
            return;
        };
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(lofty::picture::Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            picture.data.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_keys_follow_aliases() {
        assert_eq!(item_key("albumartist"), ItemKey::AlbumArtist);
        assert_eq!(item_key("disk"), ItemKey::DiscNumber);
        assert_eq!(item_key("TRCK"), ItemKey::TrackNumber);
        assert_eq!(item_key("genre"), ItemKey::Genre);
        assert_eq!(item_key("my_tag"), ItemKey::Unknown("MY_TAG".to_string()));
    }

    #[test]
    fn test_wav_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagged.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let store = LoftyTagStore::new();
        let mut tags = TagSet::new();
        tags.set("title", "Overworld");
        tags.set("artist", "Composer");
        store.write_tags(&path, &tags).unwrap();

        let handle = store.load(&path).unwrap();
        assert_eq!(
            store.get_tag(&handle, "TIT2"),
            Some(TagValue::Text("Overworld".into()))
        );
        assert_eq!(
            store.get_tag(&handle, "artist"),
            Some(TagValue::Text("Composer".into()))
        );
    }
}
