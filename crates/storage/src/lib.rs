use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use sitemirror_core::MirrorError;

/// Directory under the output root holding session state.
pub const STATE_DIR: &str = ".sitemirror";
const MANIFEST_FILE: &str = "manifest.json";

/// Persisted URL → local path registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub start_url: String,
    pub saved_at: DateTime<Utc>,
    pub pages_saved: u64,
    pub assets_saved: u64,
    pub entries: BTreeMap<String, String>,
}

/// Writes mirrored files below one output root.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), MirrorError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Map a `/`-separated local path onto the output root. Anything that could
    /// leave the root is rejected.
    pub fn resolve(&self, local_path: &str) -> Result<PathBuf, MirrorError> {
        let relative = Path::new(local_path);
        if local_path.is_empty() || local_path.contains('\\') {
            return Err(MirrorError::PathEscape(local_path.to_string()));
        }
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(MirrorError::PathEscape(local_path.to_string()));
            }
        }
        Ok(self.root.join(relative))
    }

    /// Write the whole file or nothing: bytes go to a sibling temp file that is
    /// then renamed into place.
    pub async fn write_file(&self, local_path: &str, bytes: &[u8]) -> Result<PathBuf, MirrorError> {
        let path = self.resolve(local_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".part");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;

        debug!(local_path, bytes = bytes.len(), "wrote file");
        Ok(path)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(MANIFEST_FILE)
    }

    pub async fn save_manifest(&self, manifest: &Manifest) -> Result<(), MirrorError> {
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| MirrorError::Other(e.into()))?;
        self.write_file(&format!("{STATE_DIR}/{MANIFEST_FILE}"), &json)
            .await?;
        info!(
            entries = manifest.entries.len(),
            path = %self.manifest_path().display(),
            "saved manifest"
        );
        Ok(())
    }

    /// `Ok(None)` when no manifest has been written yet.
    pub async fn load_manifest(&self) -> Result<Option<Manifest>, MirrorError> {
        let path = self.manifest_path();
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let bytes = fs::read(&path).await?;
        let manifest = serde_json::from_slice(&bytes).map_err(|e| {
            MirrorError::Config(format!("corrupt manifest {}: {e}", path.display()))
        })?;
        Ok(Some(manifest))
    }
}
