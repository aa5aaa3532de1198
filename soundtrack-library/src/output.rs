//! Output path planning

use crate::tags::{TagSet, TagValue};
use crate::template::format_with;
use std::path::{Path, PathBuf};

pub const DEFAULT_TEMPLATE: &str = "{title}.{extension}";
pub const DEFAULT_FORMAT: &str = "wav";

/// File extension for an encoder format name
pub fn extension(format: &str) -> &str {
    match format {
        "vorbis" => "ogg",
        "aiff" => "aiff",
        other => other,
    }
}

/// Expands the output template once per configured format
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPlanner {
    root: PathBuf,
    template: String,
    formats: Vec<String>,
}

impl OutputPlanner {
    pub fn new(root: impl Into<PathBuf>, template: impl Into<String>, formats: Vec<String>) -> Self {
        let formats = if formats.is_empty() {
            vec![DEFAULT_FORMAT.to_string()]
        } else {
            formats
        };
        Self {
            root: root.into(),
            template: template.into(),
            formats,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// `(format, path)` for every configured format
    pub fn plan(&self, tags: &TagSet) -> Vec<(String, PathBuf)> {
        self.formats
            .iter()
            .map(|format| (format.clone(), self.path_for(tags, format)))
            .collect()
    }

    pub fn path_for(&self, tags: &TagSet, format: &str) -> PathBuf {
        let relative = format_with(
            &self.template,
            |name| match name {
                "format" => Some(TagValue::from(format)),
                "extension" | "ext" => Some(TagValue::from(extension(format))),
                _ => tags.get(name).cloned(),
            },
            sanitize,
        );
        self.root.join(relative)
    }
}

/// Keep substituted values from introducing directories
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
