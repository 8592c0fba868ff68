//! Durable per-batch-key progress.
//!
//! Layout under the checkpoint directory, for batch key `k`:
//! `k.progress.json` is rewritten after every committed batch (through a
//! `.tmp` sibling and a rename), `k.json` is the canonical document written
//! by [`BatchCheckpointer::finalize`] at the end of a run.

use crate::models::{CheckpointDocument, Product};
use chrono::Utc;
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("unable to serialize checkpoint `{key}`: {message}")]
    Serialize { key: String, message: String },
    #[error("unable to write checkpoint `{path}`: {message}")]
    Write { path: String, message: String },
    #[error("unable to promote checkpoint to `{path}`: {message}")]
    Promote { path: String, message: String },
    #[error("checkpoint copy `{path}` failed verification: {message}")]
    Verify { path: String, message: String },
}

#[derive(Debug, Default)]
pub struct LoadedBatch {
    pub items: Vec<Product>,
    pub resume_offset: usize,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BatchCheckpointer {
    dir: PathBuf,
}

impl BatchCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn canonical_path(&self, batch_key: &str) -> PathBuf {
        self.dir.join(format!("{batch_key}.json"))
    }

    pub fn progress_path(&self, batch_key: &str) -> PathBuf {
        self.dir.join(format!("{batch_key}.progress.json"))
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }

    /// Never fails: an unreadable or corrupt checkpoint restarts the batch
    /// key from empty.
    pub fn load(&self, batch_key: &str) -> LoadedBatch {
        let candidates = [self.progress_path(batch_key), self.canonical_path(batch_key)];
        let Some(path) = candidates.into_iter().find(|p| p.is_file()) else {
            return LoadedBatch::default();
        };

        let parsed = fs::read(&path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<CheckpointDocument>(&bytes).map_err(|err| err.to_string())
            });
        match parsed {
            Ok(doc) => {
                let resume_offset = doc.cursor.unwrap_or(doc.items.len());
                info!(
                    target = "catalog.checkpoint",
                    batch_key = %batch_key,
                    path = %path.display(),
                    items = doc.items.len(),
                    updated_at = %doc.updated_at,
                    "checkpoint_loaded"
                );
                LoadedBatch {
                    items: doc.items,
                    resume_offset,
                    source: Some(path),
                }
            }
            Err(err) => {
                warn!(
                    target = "catalog.checkpoint",
                    batch_key = %batch_key,
                    path = %path.display(),
                    error = %err,
                    "checkpoint_corrupt_restarting"
                );
                LoadedBatch::default()
            }
        }
    }

    /// Writes the full accumulated list. The previous progress file stays
    /// in place unless the new one is completely written and renamed over it.
    pub fn save(&self, batch_key: &str, items: &[Product]) -> Result<(), CheckpointError> {
        let doc = CheckpointDocument {
            batch_key: batch_key.to_string(),
            updated_at: Utc::now(),
            cursor: Some(items.len()),
            items: items.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|err| CheckpointError::Serialize {
            key: batch_key.to_string(),
            message: err.to_string(),
        })?;

        let target = self.progress_path(batch_key);
        let staging = Self::staging_path(&target);
        fs::create_dir_all(&self.dir).map_err(|err| CheckpointError::Write {
            path: self.dir.display().to_string(),
            message: err.to_string(),
        })?;
        write_synced(&staging, &bytes).map_err(|err| CheckpointError::Write {
            path: staging.display().to_string(),
            message: err.to_string(),
        })?;
        if let Err(err) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(CheckpointError::Promote {
                path: target.display().to_string(),
                message: err.to_string(),
            });
        }
        Ok(())
    }

    /// Replaces the canonical document with the progress file. The progress
    /// file is removed only once the copy has been verified.
    pub fn finalize(&self, batch_key: &str) -> Result<PathBuf, CheckpointError> {
        let progress = self.progress_path(batch_key);
        let canonical = self.canonical_path(batch_key);
        if !progress.is_file() {
            return Ok(canonical);
        }

        let staging = Self::staging_path(&canonical);
        fs::copy(&progress, &staging).map_err(|err| CheckpointError::Write {
            path: staging.display().to_string(),
            message: err.to_string(),
        })?;
        if let Err(err) = verify_document(&staging) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        fs::rename(&staging, &canonical).map_err(|err| CheckpointError::Promote {
            path: canonical.display().to_string(),
            message: err.to_string(),
        })?;
        fs::remove_file(&progress).map_err(|err| CheckpointError::Write {
            path: progress.display().to_string(),
            message: err.to_string(),
        })?;
        info!(target = "catalog.checkpoint", batch_key = %batch_key, path = %canonical.display(), "checkpoint_finalized");
        Ok(canonical)
    }

    pub fn clear(&self, batch_key: &str) -> Result<(), CheckpointError> {
        for path in [self.progress_path(batch_key), self.canonical_path(batch_key)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(CheckpointError::Write {
                        path: path.display().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn verify_document(path: &Path) -> Result<(), CheckpointError> {
    let verify_err = |message: String| CheckpointError::Verify {
        path: path.display().to_string(),
        message,
    };
    let bytes = fs::read(path).map_err(|err| verify_err(err.to_string()))?;
    if bytes.is_empty() {
        return Err(verify_err("empty file".into()));
    }
    serde_json::from_slice::<CheckpointDocument>(&bytes)
        .map(|_| ())
        .map_err(|err| verify_err(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_product;

    fn items(ids: &[&str]) -> Vec<Product> {
        ids.iter().map(|id| sample_product(id)).collect()
    }

    #[test]
    fn missing_checkpoint_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = BatchCheckpointer::new(dir.path()).load("hermes");
        assert!(loaded.items.is_empty());
        assert_eq!(loaded.resume_offset, 0);
        assert!(loaded.source.is_none());
    }

    #[test]
    fn saved_batch_reloads_after_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        BatchCheckpointer::new(dir.path())
            .save("hermes", &items(&["1", "2", "3"]))
            .expect("save");

        let restarted = BatchCheckpointer::new(dir.path());
        let loaded = restarted.load("hermes");
        assert_eq!(loaded.items, items(&["1", "2", "3"]));
        assert_eq!(loaded.resume_offset, 3);
        assert!(!BatchCheckpointer::staging_path(&restarted.progress_path("hermes")).exists());
    }

    #[test]
    fn corrupt_checkpoint_restarts_from_scratch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = BatchCheckpointer::new(dir.path());
        fs::write(checkpointer.progress_path("hermes"), b"{not json").expect("write");
        let loaded = checkpointer.load("hermes");
        assert!(loaded.items.is_empty());
        assert_eq!(loaded.resume_offset, 0);
    }

    #[test]
    fn failed_promotion_keeps_previous_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = BatchCheckpointer::new(dir.path());
        checkpointer.save("hermes", &items(&["1"])).expect("save");
        checkpointer.finalize("hermes").expect("finalize");

        // A non-empty directory at the progress path makes the rename fail.
        let blocker = checkpointer.progress_path("hermes");
        fs::create_dir_all(blocker.join("occupied")).expect("blocker");

        let err = checkpointer
            .save("hermes", &items(&["1", "2"]))
            .expect_err("promotion must fail");
        assert!(matches!(err, CheckpointError::Promote { .. }));

        let canonical: CheckpointDocument =
            serde_json::from_slice(&fs::read(checkpointer.canonical_path("hermes")).expect("read"))
                .expect("canonical intact");
        assert_eq!(canonical.items.len(), 1);
    }

    #[test]
    fn finalize_promotes_and_removes_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = BatchCheckpointer::new(dir.path());
        checkpointer.save("hermes", &items(&["1", "2"])).expect("save");
        let path = checkpointer.finalize("hermes").expect("finalize");
        assert_eq!(path, checkpointer.canonical_path("hermes"));
        assert!(!checkpointer.progress_path("hermes").exists());
        let loaded = checkpointer.load("hermes");
        assert_eq!(loaded.items.len(), 2);
    }

    #[test]
    fn finalize_keeps_progress_when_verification_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = BatchCheckpointer::new(dir.path());
        fs::write(checkpointer.progress_path("hermes"), b"").expect("write");
        let err = checkpointer.finalize("hermes").expect_err("empty copy");
        assert!(matches!(err, CheckpointError::Verify { .. }));
        assert!(checkpointer.progress_path("hermes").exists());
        assert!(!checkpointer.canonical_path("hermes").exists());
    }

    #[test]
    fn clear_removes_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let checkpointer = BatchCheckpointer::new(dir.path());
        checkpointer.save("hermes", &items(&["1"])).expect("save");
        checkpointer.finalize("hermes").expect("finalize");
        checkpointer.save("hermes", &items(&["1", "2"])).expect("save");
        checkpointer.clear("hermes").expect("clear");
        assert!(checkpointer.load("hermes").items.is_empty());
        checkpointer.clear("hermes").expect("idempotent clear");
    }
}
