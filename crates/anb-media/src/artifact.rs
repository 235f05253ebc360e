//! Intermediate artifact files with guaranteed cleanup.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A file path that is deleted when the guard is dropped.
///
/// Each pipeline stage writes into one of these, so every intermediate
/// disappears on success, on error and on early return alike. Call
/// [`TempArtifact::keep`] to retain the file.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Fresh, uniquely named `.mp4` path in `dir` (the file is not created).
    pub fn new(dir: impl AsRef<Path>, prefix: &str) -> Self {
        Self::at(dir.as_ref().join(format!("{}_{}.mp4", prefix, Uuid::new_v4())))
    }

    /// Guard an existing or future path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and return the path.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed artifact {}", self.path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove artifact {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = {
            let artifact = TempArtifact::new(dir.path(), "cut");
            std::fs::write(artifact.path(), b"frames").unwrap();
            artifact.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_artifact_never_written_is_fine() {
        let dir = TempDir::new().unwrap();
        drop(TempArtifact::new(dir.path(), "resized"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_kept_artifact_survives() {
        let dir = TempDir::new().unwrap();
        let artifact = TempArtifact::at(dir.path().join("final.mp4"));
        std::fs::write(artifact.path(), b"frames").unwrap();
        let path = artifact.keep();
        assert!(path.exists());
    }

    #[test]
    fn test_names_are_unique() {
        let a = TempArtifact::new("/tmp", "cut");
        let b = TempArtifact::new("/tmp", "cut");
        assert_ne!(a.path(), b.path());
        assert!(a.path().file_name().unwrap().to_string_lossy().starts_with("cut_"));
    }
}
