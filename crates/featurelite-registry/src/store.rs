//! Feature storage: one `<id>.rhai` file per feature under the storage root.

use crate::artifact::{parse_persisted, render_persisted, FeatureMetadata};
use crate::error::StoreError;
use featurelite_core::path_validation::validate_existing_dir;
use featurelite_core::plan::is_valid_id;
use std::fs;
use std::path::{Path, PathBuf};

pub const ARTIFACT_EXTENSION: &str = "rhai";

/// Write to a sibling temp file, then rename over the target.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", ARTIFACT_EXTENSION));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

#[derive(Debug, Clone)]
pub struct FeatureStore {
    root: PathBuf,
}

impl FeatureStore {
    /// Open (creating if needed) the storage root. Failure here is fatal to
    /// the caller; nothing can be loaded or persisted without it.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let inaccessible = |reason: String| StoreError::RootInaccessible {
            path: root.to_path_buf(),
            reason,
        };
        fs::create_dir_all(root).map_err(|e| inaccessible(e.to_string()))?;
        let root = validate_existing_dir(root, "storage root").map_err(|e| inaccessible(format!("{:#}", e)))?;
        fs::read_dir(&root).map_err(|e| inaccessible(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}.{}", id, ARTIFACT_EXTENSION)))
    }

    pub fn save(&self, code: &str, meta: &FeatureMetadata) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&meta.id)?;
        let content = render_persisted(code, meta).map_err(|e| StoreError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        atomic_write(&path, &content).map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "Persisted feature artifact");
        Ok(path)
    }

    pub fn read(&self, id: &str) -> Result<(String, FeatureMetadata, PathBuf), StoreError> {
        let path = self.path_for(id)?;
        let (code, meta) = Self::read_path(&path)?;
        Ok((code, meta, path))
    }

    pub fn read_path(path: &Path) -> Result<(String, FeatureMetadata), StoreError> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        parse_persisted(&content).map_err(|reason| StoreError::Malformed {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Artifact files under the root, sorted by path.
    pub fn list(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Remove the artifact. Returns `false` if it was already gone.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}
