use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::DEFAULT_QUOTA_BYTES;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "marginalia";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_theme")]
    pub theme: String,

    /// Share of the content width given to the rendered block.
    #[serde(default = "default_block_width_percent")]
    pub block_width_percent: u16,

    /// Share of the content width given to the comment panel.
    #[serde(default = "default_panel_width_percent")]
    pub panel_width_percent: u16,

    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: u64,

    /// Where per-document comment storage lives; platform data dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_theme() -> String {
    "Oceanic Next".to_string()
}

fn default_block_width_percent() -> u16 {
    65
}

fn default_panel_width_percent() -> u16 {
    30
}

fn default_storage_quota_bytes() -> u64 {
    DEFAULT_QUOTA_BYTES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            theme: default_theme(),
            block_width_percent: default_block_width_percent(),
            panel_width_percent: default_panel_width_percent(),
            storage_quota_bytes: default_storage_quota_bytes(),
            storage_dir: None,
        }
    }
}

impl Settings {
    /// Clamps the width shares into a usable range where block and panel
    /// together never exceed the content width.
    pub fn sanitized(mut self) -> Self {
        self.block_width_percent = self.block_width_percent.clamp(20, 90);
        self.panel_width_percent = self
            .panel_width_percent
            .clamp(10, 100 - self.block_width_percent);
        self
    }

    /// Storage file for a document: one file per document, like one
    /// `localStorage` per origin.
    pub fn storage_path_for(&self, document: &Path) -> Option<PathBuf> {
        let dir = match &self.storage_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()?.join(APP_NAME),
        };
        Some(dir.join(storage_file_name(document)))
    }
}

/// `doc_<md5>.json` keyed by the document's canonical path, so same-named
/// files in different directories keep separate comments.
pub fn storage_file_name(document: &Path) -> String {
    let resolved = fs::canonicalize(document)
        .or_else(|_| std::path::absolute(document))
        .unwrap_or_else(|e| {
            warn!("Could not resolve {document:?}, keying storage by the given path: {e}");
            document.to_path_buf()
        });

    let digest = md5::compute(resolved.to_string_lossy().as_bytes());
    format!("doc_{digest:x}.json")
}
