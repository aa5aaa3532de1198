//! Album / disc / track manifest for the audio player
//!
//! The manifest is rewritten in full after every track, through a temp file
//! and rename, so the file on disk is always a complete document.

use crate::tags::{canonicalize, Picture, TagSet, TagValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MANIFEST_VERSION: u32 = 1;
pub const DEFAULT_MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to replace manifest: {0}")]
    Persist(#[from] tempfile::PersistError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<i64>,
    /// Format -> path relative to the manifest
    #[serde(rename = "path", default)]
    pub paths: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "length", default, skip_serializing_if = "Option::is_none")]
    pub length_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(rename = "tracks", default)]
    pub discs: Vec<Disc>,
}

/// One or more tag names, first present wins
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagNames {
    One(String),
    Many(Vec<String>),
}

impl TagNames {
    fn names(&self) -> Vec<&str> {
        match self {
            TagNames::One(name) => vec![name.as_str()],
            TagNames::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// The `metadata.manifest` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    /// Text, or a path to a text file
    pub description: Option<String>,
    pub author: Option<String>,
    /// An object, or a path to a JSON file
    pub credits: Option<Value>,
    pub main_color: Option<String>,
    pub text_color: Option<String>,
    pub version: Option<Value>,
    pub albums: BTreeMap<String, TagNames>,
    pub tracks: BTreeMap<String, TagNames>,
}

/// Document-level fields, as written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Document {
    #[serde(rename = "_version")]
    format_version: u32,
    ia_audio_player_manifest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credits: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    main_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text_color: Option<String>,
    #[serde(default)]
    albums: Vec<Album>,
}

/// Builds the manifest one track at a time
#[derive(Debug)]
pub struct ManifestAggregator {
    path: PathBuf,
    document: Document,
    album_fields: BTreeMap<String, TagNames>,
    track_fields: BTreeMap<String, TagNames>,
    pictures_written: usize,
}

impl ManifestAggregator {
    /// `base_dir` resolves `description`/`credits` paths; the manifest
    /// itself lands in `output_root` unless `file` says otherwise.
    pub fn new(config: &ManifestConfig, base_dir: &Path, output_root: &Path) -> Result<Self, ManifestError> {
        let path = match &config.file {
            Some(file) => output_root.join(file),
            None => output_root.join(DEFAULT_MANIFEST_FILE),
        };

        let description = match &config.description {
            Some(text) => {
                let candidate = base_dir.join(text);
                if candidate.is_file() {
                    Some(std::fs::read_to_string(&candidate)?)
                } else {
                    Some(text.clone())
                }
            }
            None => None,
        };

        let credits = match &config.credits {
            Some(Value::String(file)) => {
                let text = std::fs::read_to_string(base_dir.join(file))?;
                Some(serde_json::from_str(&text)?)
            }
            other => other.clone(),
        };

        Ok(Self {
            path,
            document: Document {
                format_version: MANIFEST_VERSION,
                ia_audio_player_manifest: true,
                version: config.version.clone(),
                title: config.title.clone(),
                description,
                author: config.author.clone(),
                credits,
                main_color: config.main_color.clone(),
                text_color: config.text_color.clone(),
                albums: Vec::new(),
            },
            album_fields: config.albums.clone(),
            track_fields: config.tracks.clone(),
            pictures_written: 0,
        })
    }

    /// Keep the albums of an existing manifest, if there is one
    pub fn resume(&mut self) -> Result<(), ManifestError> {
        if !self.path.is_file() {
            return Ok(());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let existing: Document = serde_json::from_str(&text)?;
        self.pictures_written = existing.albums.iter().filter(|a| a.picture.is_some()).count();
        self.document.albums = existing.albums;
        self.sort();
        tracing::info!(file = %self.path.display(), albums = self.document.albums.len(), "Resumed manifest");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn albums(&self) -> &[Album] {
        &self.document.albums
    }

    /// Whether any disc lists a track with this title
    pub fn contains(&self, title: &str) -> bool {
        self.document
            .albums
            .iter()
            .flat_map(|a| &a.discs)
            .flat_map(|d| &d.tracks)
            .any(|t| t.title == title)
    }

    /// Record a finished track, then rewrite the manifest
    pub fn add(&mut self, tags: &TagSet, length_seconds: f64, paths: &[(String, PathBuf)]) -> Result<(), ManifestError> {
        let mut fields = FieldPicker::new(tags);

        let album_name = fields
            .pick(self.album_fields.get("name"), &["album"])
            .or_else(|| self.document.title.clone())
            .unwrap_or_default();
        let album_sort = fields.pick(self.album_fields.get("sort_name"), &["albumsort"]);
        let album_artist = fields
            .pick(self.album_fields.get("artist"), &["band"])
            .or_else(|| self.document.author.clone());
        let album_sort_artist = fields.pick(self.album_fields.get("sort_artist"), &["albumartistsort"]);

        let disc_number = fields.take("disc").and_then(|v| v.as_i64());
        let disc_title = fields
            .pick(None, &["setsubtitle"])
            .or_else(|| disc_number.map(|n| format!("Disc {n}")))
            .unwrap_or_default();

        let mut track = Track {
            title: fields.pick(self.track_fields.get("title"), &["title"]).unwrap_or_default(),
            sort_title: fields.pick(None, &["titlesort"]),
            artist: fields.pick(None, &["artist"]),
            track_number: fields.take("track").and_then(|v| v.as_i64()),
            comment: fields.pick(self.track_fields.get("comment"), &["comment"]),
            genres: fields
                .pick_value(self.track_fields.get("genres"), &["genres"])
                .map(|v| v.to_list())
                .unwrap_or_default(),
            length_seconds: Some(length_seconds),
            ..Track::default()
        };
        let link_names: Vec<String> = match self.track_fields.get("links") {
            Some(names) => names.names().into_iter().map(str::to_string).collect(),
            None => vec!["artisturl".to_string(), "sourceurl".to_string()],
        };
        for name in link_names {
            if let Some(value) = fields.take(&name) {
                track.links.insert(canonicalize(&name), value.to_string());
            }
        }
        for (format, path) in paths {
            track.paths.insert(format.clone(), self.relative(path));
        }
        track.metadata = fields.unused();

        let picture = match tags.picture() {
            Some(picture) if !self.album_has_picture(&album_name) => Some(self.write_picture(picture)?),
            _ => None,
        };

        let album = Album {
            name: album_name,
            sort_name: album_sort,
            artist: album_artist,
            sort_artist: album_sort_artist,
            picture,
            discs: vec![Disc {
                number: disc_number,
                title: disc_title,
                tracks: vec![track],
            }],
        };
        tracing::debug!(album = %album.name, "Adding track to manifest");
        merge_album(&mut self.document.albums, album);

        self.sort();
        self.save()
    }

    /// Atomically rewrite the manifest file
    pub fn save(&self) -> Result<(), ManifestError> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut file, &self.document)?;
        file.write_all(b"\n")?;
        file.persist(&self.path)?;
        tracing::debug!(file = %self.path.display(), "Wrote manifest");
        Ok(())
    }

    fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn relative(&self, path: &Path) -> String {
        let dir = self.dir();
        let rel = path.strip_prefix(&dir).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn album_has_picture(&self, name: &str) -> bool {
        self.document
            .albums
            .iter()
            .any(|a| a.name == name && a.picture.is_some())
    }

    fn write_picture(&mut self, picture: &Picture) -> Result<String, ManifestError> {
        let name = match self.pictures_written {
            0 => "cover.jpg".to_string(),
            n => format!("cover-{}.jpg", n + 1),
        };
        let dir = self.dir();
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(&name), &picture.data)?;
        self.pictures_written += 1;
        Ok(name)
    }

    fn sort(&mut self) {
        let albums = &mut self.document.albums;
        albums.sort_by_key(|a| a.sort_name.as_deref().unwrap_or(&a.name).to_lowercase());
        for album in albums.iter_mut() {
            album.discs.sort_by(|a, b| option_order(a.number, b.number));
            for disc in album.discs.iter_mut() {
                disc.tracks.sort_by(|a, b| {
                    option_order(a.track_number, b.track_number).then_with(|| {
                        let key = |t: &Track| t.sort_title.clone().unwrap_or_else(|| t.title.clone());
                        key(a).to_lowercase().cmp(&key(b).to_lowercase())
                    })
                });
            }
        }
    }
}

/// Numbered entries first, in order
fn option_order(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Marks every tag it hands out, so the rest can go into `metadata`
struct FieldPicker<'a> {
    tags: &'a TagSet,
    used: HashSet<String>,
}

impl<'a> FieldPicker<'a> {
    fn new(tags: &'a TagSet) -> Self {
        let mut used = HashSet::new();
        used.insert("picture".to_string());
        Self { tags, used }
    }

    fn take(&mut self, name: &str) -> Option<TagValue> {
        let canonical = canonicalize(name);
        let value = self.tags.get(&canonical).filter(|v| !v.is_empty())?.clone();
        self.used.insert(canonical);
        Some(value)
    }

    fn pick_value(&mut self, configured: Option<&TagNames>, defaults: &[&str]) -> Option<TagValue> {
        let names = configured.map(TagNames::names).unwrap_or_else(|| defaults.to_vec());
        names.into_iter().find_map(|name| self.take(name))
    }

    fn pick(&mut self, configured: Option<&TagNames>, defaults: &[&str]) -> Option<String> {
        self.pick_value(configured, defaults).map(|v| v.to_string())
    }

    fn unused(&self) -> Map<String, Value> {
        self.tags
            .iter()
            .filter(|(name, value)| !self.used.contains(*name) && !value.is_empty())
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn merge_album(albums: &mut Vec<Album>, new: Album) {
    let Some(album) = albums.iter_mut().find(|a| a.name == new.name) else {
        albums.push(new);
        return;
    };
    overwrite(&mut album.sort_name, new.sort_name);
    overwrite(&mut album.artist, new.artist);
    overwrite(&mut album.sort_artist, new.sort_artist);
    overwrite(&mut album.picture, new.picture);

    for disc in new.discs {
        match album.discs.iter_mut().find(|d| d.title == disc.title) {
            Some(existing) => {
                overwrite(&mut existing.number, disc.number);
                for track in disc.tracks {
                    merge_track(&mut existing.tracks, track);
                }
            }
            None => album.discs.push(disc),
        }
    }
}

fn merge_track(tracks: &mut Vec<Track>, new: Track) {
    let Some(track) = tracks.iter_mut().find(|t| t.title == new.title) else {
        tracks.push(new);
        return;
    };
    overwrite(&mut track.sort_title, new.sort_title);
    overwrite(&mut track.artist, new.artist);
    overwrite(&mut track.track_number, new.track_number);
    overwrite(&mut track.comment, new.comment);
    overwrite(&mut track.length_seconds, new.length_seconds);
    track.paths.extend(new.paths);
    track.links.extend(new.links);
    track.metadata.extend(new.metadata);
    if !new.genres.is_empty() {
        track.genres = new.genres;
    }
}
