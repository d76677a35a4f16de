//! Durable snapshot of a run between stages.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use leadpipe_shared::{Lead, LeadPipeError, Result};
use leadpipe_storage::write_json_atomic;

use crate::pipeline::{RunSummary, Stage};

/// Highest completed stage plus everything needed to continue from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    pub leads: Vec<Lead>,
    pub summary: RunSummary,
    pub saved_at: DateTime<Utc>,
}

/// JSON checkpoint file owned by one pipeline.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint, if one exists and parses. Unreadable files are logged and ignored.
    pub fn load(&self) -> Option<Checkpoint> {
        if !self.path.exists() {
            return None;
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(|e| LeadPipeError::io(&self.path, e))
            .and_then(|content| {
                serde_json::from_str::<Checkpoint>(&content)
                    .map_err(|e| LeadPipeError::parse(format!("invalid checkpoint: {e}")))
            });

        match parsed {
            Ok(checkpoint) => {
                info!(
                    stage = checkpoint.stage.index(),
                    leads = checkpoint.leads.len(),
                    saved_at = %checkpoint.saved_at,
                    "checkpoint found"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to load checkpoint");
                None
            }
        }
    }

    /// Commit `stage` as completed with the current leads and summary.
    pub fn save(&self, stage: Stage, leads: &[Lead], summary: &RunSummary) -> Result<()> {
        let checkpoint = CheckpointRef {
            stage,
            leads,
            summary,
            saved_at: Utc::now(),
        };
        write_json_atomic(&self.path, &checkpoint)?;
        info!(stage = stage.index(), leads = leads.len(), "checkpoint saved");
        Ok(())
    }

    /// Remove the checkpoint after a completed run.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("checkpoint removed, run complete");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LeadPipeError::io(&self.path, e)),
        }
    }
}

/// Borrowing twin of [`Checkpoint`] so saving does not clone the lead list.
#[derive(Serialize)]
struct CheckpointRef<'a> {
    stage: Stage,
    leads: &'a [Lead],
    summary: &'a RunSummary,
    saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> (PathBuf, CheckpointStore) {
        let dir = std::env::temp_dir().join(format!("lp_ckpt_{}", Uuid::now_v7()));
        let store = CheckpointStore::new(dir.join("checkpoint.json"));
        (dir, store)
    }

    #[test]
    fn save_then_load() {
        let (dir, store) = temp_store();
        let summary = RunSummary::new(vec!["imobiliaria".into()]);
        let leads = vec![Lead::new("Imob Centro", "imobiliaria").with_city("BH")];

        store.save(Stage::SiteAnalysis, &leads, &summary).expect("save");
        let loaded = store.load().expect("checkpoint present");
        assert_eq!(loaded.stage, Stage::SiteAnalysis);
        assert_eq!(loaded.leads.len(), 1);
        assert_eq!(loaded.leads[0].name, "Imob Centro");
        assert_eq!(loaded.summary.categories, vec!["imobiliaria".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stage_is_stored_as_index() {
        let (dir, store) = temp_store();
        store
            .save(Stage::Scoring, &[], &RunSummary::new(vec![]))
            .expect("save");
        let raw = std::fs::read_to_string(store.path()).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["stage"], 5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_or_corrupt_checkpoint_loads_none() {
        let (dir, store) = temp_store();
        assert!(store.load().is_none());

        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(store.path(), "{\"stage\": 99}").expect("write");
        assert!(store.load().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_is_idempotent() {
        let (dir, store) = temp_store();
        store
            .save(Stage::Search, &[], &RunSummary::new(vec![]))
            .expect("save");
        store.clear().expect("first clear");
        assert!(!store.path().exists());
        store.clear().expect("second clear");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
