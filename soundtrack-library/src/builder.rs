//! Batch soundtrack builder
//!
//! Tracks are built one at a time, end to end: metadata, audio, effects,
//! encoding, tags, manifest. A failing track is reported and skipped unless
//! `fail_fast` is set; the manifest written for earlier tracks stays valid.

use crate::config::{Config, ConfigError};
use crate::discovery::{discover, TrackEntry};
use crate::manifest::{ManifestAggregator, ManifestConfig, ManifestError};
use crate::metadata::MetadataResolver;
use crate::output::OutputPlanner;
use crate::sheet::SheetCache;
use crate::tag_store::{LoftyTagStore, TagStore, TagStoreError};
use crossbeam_channel::Sender;
use soundtrack_audio::{AudioCodec, CodecError, EffectRegistry, FileCodec, ResolveError, SourceResolver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Progress updates during a build
#[derive(Debug, Clone, PartialEq)]
pub enum BuildProgress {
    Started {
        total: usize,
    },
    /// Building a track (1-indexed)
    Track {
        current: usize,
        total: usize,
        title: String,
    },
    /// Already built by an earlier run
    Skipped {
        current: usize,
        total: usize,
        title: String,
    },
    Failed {
        title: String,
        message: String,
    },
    Complete {
        built: usize,
        skipped: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Why one track could not be built
#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Cannot write {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("Cannot tag {}: {source}", path.display())]
    Tags {
        path: PathBuf,
        #[source]
        source: TagStoreError,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("Track '{title}' from {}: {source}", config.display())]
    Track {
        title: String,
        config: PathBuf,
        #[source]
        source: TrackError,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOptions {
    /// Keep an existing manifest and skip tracks it already lists
    pub resume: bool,
    /// Stop at the first failing track
    pub fail_fast: bool,
    /// Overrides the config file's directory as the output root
    pub output_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub built: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub manifest: PathBuf,
}

enum Outcome {
    Built,
    Skipped,
}

/// A configured soundtrack, ready to build
pub struct Soundtrack<S: TagStore = LoftyTagStore> {
    config: Config,
    options: BuildOptions,
    resolver: SourceResolver,
    metadata: MetadataResolver,
    planner: OutputPlanner,
    manifest: ManifestAggregator,
    effect_sheets: SheetCache,
    store: S,
}

impl Soundtrack<LoftyTagStore> {
    pub fn new(config: Config, options: BuildOptions) -> Result<Self, BuildError> {
        let codec = match config.sample_rate {
            Some(rate) => FileCodec::with_sample_rate(rate),
            None => FileCodec::new(),
        };
        Self::with_parts(config, options, Box::new(codec), LoftyTagStore::new())
    }
}

impl<S: TagStore> Soundtrack<S> {
    pub fn with_parts(
        config: Config,
        options: BuildOptions,
        codec: Box<dyn AudioCodec>,
        store: S,
    ) -> Result<Self, BuildError> {
        let output_root = options
            .output_root
            .clone()
            .unwrap_or_else(|| config.output_root.clone());

        let manifest_config = config.manifest.clone().unwrap_or_else(ManifestConfig::default);
        let mut manifest = ManifestAggregator::new(&manifest_config, &config.metadata_dir, &output_root)?;
        if options.resume {
            manifest.resume()?;
        }

        Ok(Self {
            resolver: SourceResolver::new(codec, EffectRegistry::with_builtins(), config.sample_threshold),
            metadata: MetadataResolver::new(config.metadata.clone()),
            planner: OutputPlanner::new(output_root, config.output.clone(), config.formats.clone()),
            manifest,
            effect_sheets: SheetCache::new(),
            store,
            config,
            options,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manifest(&self) -> &ManifestAggregator {
        &self.manifest
    }

    /// Build every track, checking `cancel` between tracks
    pub fn build(
        &mut self,
        cancel: &AtomicBool,
        progress: Option<Sender<BuildProgress>>,
    ) -> Result<BuildReport, BuildError> {
        let entries = discover(&self.config)?;
        let total = entries.len();
        send(&progress, BuildProgress::Started { total });

        let mut report = BuildReport {
            manifest: self.manifest.path().to_path_buf(),
            ..BuildReport::default()
        };

        for (i, entry) in entries.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                tracing::info!(remaining = total - i, "Build cancelled");
                report.cancelled = true;
                break;
            }

            let label = entry.title.clone().unwrap_or_else(|| format!("Track {}", i + 1));
            match self.build_track(entry, i + 1, total, &progress) {
                Ok(Outcome::Built) => report.built += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(title = %label, config = %entry.config.display(), error = %e, "Track failed");
                    send(
                        &progress,
                        BuildProgress::Failed {
                            title: label.clone(),
                            message: e.to_string(),
                        },
                    );
                    if self.options.fail_fast {
                        return Err(BuildError::Track {
                            title: label,
                            config: entry.config.clone(),
                            source: e,
                        });
                    }
                }
            }
        }

        send(
            &progress,
            BuildProgress::Complete {
                built: report.built,
                skipped: report.skipped,
                failed: report.failed,
                cancelled: report.cancelled,
            },
        );
        tracing::info!(built = report.built, skipped = report.skipped, failed = report.failed, "Build finished");
        Ok(report)
    }

    fn build_track(
        &mut self,
        entry: &TrackEntry,
        current: usize,
        total: usize,
        progress: &Option<Sender<BuildProgress>>,
    ) -> Result<Outcome, TrackError> {
        let settings = self.config.track_settings(
            entry.loop_override.as_ref(),
            entry.silence_override.as_ref(),
            &entry.config,
        )?;

        let file = entry.primary_file();
        let tags = self
            .metadata
            .resolve(file.as_deref(), entry.title.as_deref(), &entry.metadata);
        let title = tags.text("title").unwrap_or_else(|| format!("Track {current}"));
        let paths = self.planner.plan(&tags);

        if self.options.resume && self.manifest.contains(&title) && paths.iter().all(|(_, p)| p.is_file()) {
            tracing::info!(title = %title, "Already built, skipping");
            send(progress, BuildProgress::Skipped { current, total, title });
            return Ok(Outcome::Skipped);
        }
        send(
            progress,
            BuildProgress::Track {
                current,
                total,
                title: title.clone(),
            },
        );

        let audio = self.resolver.resolve_value(&entry.track, &entry.base_dir, &settings)?;

        let mut effects = entry.effects.clone();
        effects.extend(self.config.tracks.effects.iter().cloned());
        if let Some(sheet) = &self.config.tracks.effect_sheet {
            if let Some(sheet) = self.effect_sheets.effect_sheet(sheet) {
                effects.extend(sheet.effects_for(&title));
            }
        }
        let audio = self
            .resolver
            .apply_effects(audio, &effects)
            .map_err(|source| ResolveError::Effect {
                config: entry.config.clone(),
                source,
            })?;

        for (format, path) in &paths {
            let options = self.config.encode_options(format);
            self.resolver
                .codec()
                .save(&audio, path, format, &options)
                .map_err(|source| TrackError::Encode {
                    path: path.clone(),
                    source,
                })?;
            self.store
                .write_tags(path, &tags)
                .map_err(|source| TrackError::Tags {
                    path: path.clone(),
                    source,
                })?;
            tracing::info!(title = %title, file = %path.display(), "Saved track");
        }

        self.manifest.add(&tags, audio.duration_secs(), &paths)?;
        Ok(Outcome::Built)
    }
}

fn send(progress: &Option<Sender<BuildProgress>>, event: BuildProgress) {
    if let Some(ref tx) = progress {
        let _ = tx.send(event);
    }
}
