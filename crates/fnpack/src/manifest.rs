//! Build manifest for up-to-date detection
//!
//! Lives next to the artifacts as `.fnpack-manifest.json`. For every function
//! it records a hash of everything generation read and a hash of what was
//! written, so a later run can skip functions whose inputs did not change and
//! whose artifact was not touched since.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::util::content_hash;

pub const MANIFEST_FILE_NAME: &str = ".fnpack-manifest.json";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub input_hash: String,
    pub output_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    version: u32,
    /// Tool version that wrote the manifest
    generator: String,
    entries: BTreeMap<String, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            generator: env!("CARGO_PKG_VERSION").to_owned(),
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn path_in(deployment_dir: &Path) -> PathBuf {
        deployment_dir.join(MANIFEST_FILE_NAME)
    }

    /// Load the manifest of a deployment directory
    ///
    /// A missing, unreadable or outdated manifest yields an empty one, which
    /// only means everything is rebuilt.
    pub fn load(deployment_dir: &Path) -> Self {
        let path = Self::path_in(deployment_dir);
        let Ok(content) = fs::read_to_string(&path) else {
            debug!("no manifest at {}", path.display());
            return Self::default();
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(manifest)
                if manifest.version == MANIFEST_VERSION
                    && manifest.generator == env!("CARGO_PKG_VERSION") =>
            {
                manifest
            }
            Ok(_) => {
                debug!("manifest {} was written by another version", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("ignoring unreadable manifest {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn get(&self, function: &str) -> Option<&ManifestEntry> {
        self.entries.get(function)
    }

    pub fn insert(&mut self, function: impl Into<String>, entry: ManifestEntry) {
        self.entries.insert(function.into(), entry);
    }

    pub fn remove(&mut self, function: &str) -> Option<ManifestEntry> {
        self.entries.remove(function)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `output` still holds what was recorded for `function` from the
    /// same inputs
    pub fn is_up_to_date(&self, function: &str, input_hash: &str, output: &Path) -> bool {
        let Some(entry) = self.get(function) else {
            return false;
        };
        if entry.input_hash != input_hash {
            return false;
        }
        fs::read_to_string(output)
            .is_ok_and(|written| content_hash([written.as_str()]) == entry.output_hash)
    }

    pub fn save(&self, deployment_dir: &Path) -> Result<()> {
        let path = Self::path_in(deployment_dir);
        let mut json =
            serde_json::to_string_pretty(self).context("Failed to serialize build manifest")?;
        json.push('\n');
        fs::write(&path, json)
            .with_context(|| format!("Failed to write build manifest {}", path.display()))
    }
}
