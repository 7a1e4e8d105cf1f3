use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ModelArtifact;

/// File-backed store for the single current model artifact.
///
/// Saves go to a uniquely named temp file in the target directory which is
/// fsynced and then renamed over the target, so readers observe either the
/// previous artifact or the new one in full.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), AppError> {
        artifact
            .validate()
            .map_err(|reason| AppError::Validation(format!("refusing to save artifact: {}", reason)))?;
        let bytes = serde_json::to_vec_pretty(artifact)
            .map_err(|e| AppError::Internal(format!("failed to serialize artifact: {}", e)))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("model.json");
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Err(e) = write_synced(&tmp, &bytes).and_then(|_| fs::rename(&tmp, &self.path)) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove temp artifact {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e.into());
        }

        // Persist the rename itself; not every platform allows syncing a directory.
        if let Err(e) = sync_dir(&dir) {
            warn!("Could not sync directory {} after saving artifact: {}", dir.display(), e);
        }

        info!(
            "💾 Saved model artifact to {} ({} samples, {} batches)",
            self.path.display(),
            artifact.samples,
            artifact.batches
        );
        Ok(())
    }

    pub fn load(&self) -> Result<ModelArtifact, AppError> {
        let display = self.path.display().to_string();
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AppError::ArtifactMissing(display)),
            Err(e) => {
                return Err(AppError::ArtifactCorrupt {
                    path: display,
                    reason: e.to_string(),
                })
            }
        };

        let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| AppError::ArtifactCorrupt {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        artifact
            .validate()
            .map_err(|reason| AppError::ArtifactCorrupt { path: display, reason })?;
        Ok(artifact)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}
