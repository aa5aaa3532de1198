//! Track library for soundtrack - tags, metadata, manifest, and batch builds
//!
//! This crate turns a soundtrack config into finished, tagged files:
//! - Config: JSON5 loading, deep merging, typed sections
//! - Discovery: `track.json` files, audio folders, inline track maps
//! - Tags: alias canonicalization and the lofty-backed tag store
//! - Metadata: layered tag resolution with CSV sheets and cover art
//! - Manifest: the album/disc/track document for the audio player
//! - Builder: the per-track pipeline with progress reporting

mod builder;
mod config;
mod cover;
mod discovery;
mod manifest;
mod metadata;
mod output;
mod sheet;
mod tag_store;
mod tags;
pub mod template;

pub use builder::{BuildError, BuildOptions, BuildProgress, BuildReport, Soundtrack, TrackError};
pub use config::{
    expand_path, merge, read_json5, Config, ConfigError, DiscoveryKind, FfmpegConfig, TrackSource,
    TracksConfig, DEFAULT_LOOP_COUNT, DEFAULT_SAMPLE_THRESHOLD, DEFAULT_TRACK_FILENAME,
};
pub use cover::{decode as decode_picture, encode_jpeg, parse_size, CoverConfig, CoverError};
pub use discovery::{discover, TrackEntry, AUDIO_EXTENSIONS};
pub use manifest::{
    Album, Disc, ManifestAggregator, ManifestConfig, ManifestError, TagNames, Track,
    DEFAULT_MANIFEST_FILE,
};
pub use metadata::{MetadataConfig, MetadataResolver};
pub use output::{extension, OutputPlanner, DEFAULT_FORMAT, DEFAULT_TEMPLATE};
pub use sheet::{EffectSheet, Sheet, SheetCache, SheetConfig, SheetError, SheetRow};
pub use tag_store::{LoftyTagStore, TagStore, TagStoreError};
pub use tags::{canonicalize, id3_frame, Picture, TagSet, TagValue};
