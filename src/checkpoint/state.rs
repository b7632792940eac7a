//! Checkpoint state management for resumable exploration runs.
//!
//! Epistemic foundation:
//! - K_i: The scheduler state is plain data, persisted as JSON
//! - K_i: State is persisted to disk atomically (write-then-rename)
//! - B_i: Checkpoint file may not exist → Option
//! - I^B: Crash during write → backup file provides recovery

use crate::models::{ExploreError, Result};
use crate::scheduler::ExplorationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Checkpoint of one exploration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Run name, usually the config file stem
    pub name: String,
    /// Scheduler state
    pub scheduler: ExplorationState,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Create a checkpoint for a run that has not planned anything yet.
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            scheduler: ExplorationState::default(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Replace the scheduler state.
    pub fn update(&mut self, scheduler: ExplorationState) {
        self.scheduler = scheduler;
        self.updated_at = Utc::now();
    }
}

/// Checkpoint manager for persisting and loading run state.
pub struct CheckpointManager {
    dir: PathBuf,
    checkpoint_path: PathBuf,
    backup_path: PathBuf,
    state: Option<RunCheckpoint>,
}

impl CheckpointManager {
    /// Create a manager, creating `dir` if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| ExploreError::io("creating checkpoint dir", e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            checkpoint_path: dir.join("checkpoint.json"),
            backup_path: dir.join("checkpoint.backup.json"),
            state: None,
        })
    }

    /// Check if a checkpoint exists.
    pub fn exists(&self) -> bool {
        self.checkpoint_path.exists()
    }

    /// Initialize a new checkpoint or load the existing one.
    pub fn init_or_load(&mut self, name: &str) -> Result<&RunCheckpoint> {
        if self.exists() {
            let state = self.load()?;
            info!(
                stage = state.scheduler.cur_stage,
                iterations = state.scheduler.planned_iterations,
                "Resuming from checkpoint"
            );
        } else {
            self.state = Some(RunCheckpoint::new(name));
            self.save()?;
            info!(name, "Created new checkpoint");
        }
        self.loaded()
    }

    /// Load checkpoint from disk.
    pub fn load(&mut self) -> Result<&RunCheckpoint> {
        let file = File::open(&self.checkpoint_path)
            .map_err(|e| ExploreError::io("opening checkpoint", e))?;
        let reader = BufReader::new(file);
        let state: RunCheckpoint = serde_json::from_reader(reader)
            .map_err(|e| ExploreError::Parse(format!("Invalid checkpoint: {e}")))?;

        self.state = Some(state);
        self.loaded()
    }

    /// Save checkpoint to disk (atomic write).
    pub fn save(&self) -> Result<()> {
        let state = self.loaded()?;

        // Backup existing checkpoint
        if self.checkpoint_path.exists() {
            fs::copy(&self.checkpoint_path, &self.backup_path)
                .map_err(|e| ExploreError::io("backing up checkpoint", e))?;
        }

        let temp_path = self.dir.join("checkpoint.tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| ExploreError::io("creating temp checkpoint", e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state)
            .map_err(|e| ExploreError::Internal(format!("Serializing checkpoint: {e}")))?;

        fs::rename(&temp_path, &self.checkpoint_path)
            .map_err(|e| ExploreError::io("renaming checkpoint", e))?;

        debug!(
            iterations = state.scheduler.planned_iterations,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Record the scheduler state and save.
    pub fn update(&mut self, scheduler: ExplorationState) -> Result<()> {
        match &mut self.state {
            Some(state) => state.update(scheduler),
            None => {
                return Err(ExploreError::Internal(
                    "No checkpoint state to update".to_string(),
                ));
            }
        }
        self.save()
    }

    /// Get reference to state.
    pub fn state(&self) -> Option<&RunCheckpoint> {
        self.state.as_ref()
    }

    /// Get checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn loaded(&self) -> Result<&RunCheckpoint> {
        self.state
            .as_ref()
            .ok_or_else(|| ExploreError::Internal("No checkpoint state loaded".to_string()))
    }
}
