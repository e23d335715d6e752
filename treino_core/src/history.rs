//! Delivered workout history.
//!
//! Every log a backend accepts lands here as one JSON line, tagged with the
//! identity it was delivered under. The CLI uses this file as its backend,
//! and the session reads it back to pre-fill weights from the last time the
//! same workout was done.

use crate::jsonl;
use crate::sync::Backend;
use crate::{Error, ExerciseResult, FinalizedWorkoutLog, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One delivered log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Nil only for lines written before entries had ids
    #[serde(default)]
    pub id: Uuid,
    pub identity: String,
    pub synced_at: DateTime<Utc>,
    pub log: FinalizedWorkoutLog,
}

/// JSONL history file
///
/// Every access serializes on `<path>.lock`, which outlives the rename done
/// by edits and deletes.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &HistoryEntry) -> Result<()> {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_exclusive()?;
        let result = jsonl::append_line(&self.path, entry);
        lock.unlock()?;
        result?;

        tracing::debug!(
            "Appended {} workout for {} to history",
            entry.log.workout_id,
            entry.identity
        );
        Ok(())
    }

    /// All entries in file order; malformed lines are skipped
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_shared()?;
        let entries: Result<Vec<HistoryEntry>> = jsonl::read_lines(&self.path);
        lock.unlock()?;

        let entries = entries?;
        if entries.iter().any(|e| e.id.is_nil()) {
            return self.assign_missing_ids();
        }
        Ok(entries)
    }

    /// Give id-less entries a permanent id so they can be edited
    fn assign_missing_ids(&self) -> Result<Vec<HistoryEntry>> {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<Vec<HistoryEntry>> {
            let mut entries: Vec<HistoryEntry> = jsonl::read_lines(&self.path)?;
            let mut assigned = 0;
            for entry in entries.iter_mut().filter(|e| e.id.is_nil()) {
                entry.id = Uuid::new_v4();
                assigned += 1;
            }
            if assigned > 0 {
                jsonl::rewrite(&self.path, &entries)?;
                tracing::info!("Assigned ids to {} history entries", assigned);
            }
            Ok(entries)
        })();

        lock.unlock()?;
        result
    }

    /// Entry with `id`, if any
    pub fn get(&self, id: Uuid) -> Result<Option<HistoryEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.id == id))
    }

    /// Replace the exercises of one entry
    ///
    /// Exercises left without sets are dropped and the remaining sets are
    /// renumbered from 1, matching how a finished log is built.
    pub fn update_sets(&mut self, id: Uuid, exercises: Vec<ExerciseResult>) -> Result<HistoryEntry> {
        for set in exercises.iter().flat_map(|e| &e.sets) {
            if !set.weight.is_finite() || set.weight < 0.0 {
                return Err(Error::Validation(format!(
                    "weight must be a non-negative number, got {}",
                    set.weight
                )));
            }
        }

        let exercises: Vec<ExerciseResult> = exercises
            .into_iter()
            .filter(|e| !e.sets.is_empty())
            .map(|mut e| {
                for (i, set) in e.sets.iter_mut().enumerate() {
                    set.set_number = i as u32 + 1;
                }
                e
            })
            .collect();

        let updated = self.rewrite_with(id, |entry| {
            entry.log.exercises = exercises;
            true
        })?;
        tracing::info!("Edited {} workout {}", updated.log.workout_id, id);
        Ok(updated)
    }

    /// Remove one entry; returns what was removed
    pub fn delete(&mut self, id: Uuid) -> Result<HistoryEntry> {
        let removed = self.rewrite_with(id, |_| false)?;
        tracing::info!("Deleted {} workout {}", removed.log.workout_id, id);
        Ok(removed)
    }

    /// Apply `edit` to the entry with `id` and rewrite the file; `edit`
    /// returns false to drop the entry. Yields the entry after the edit.
    fn rewrite_with<F>(&mut self, id: Uuid, edit: F) -> Result<HistoryEntry>
    where
        F: FnOnce(&mut HistoryEntry) -> bool,
    {
        let lock = jsonl::open_lock(&self.path, ".lock")?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<HistoryEntry> {
            let mut entries: Vec<HistoryEntry> = jsonl::read_lines(&self.path)?;
            let position = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| Error::Validation(format!("no history entry with id {}", id)))?;

            let mut entry = entries[position].clone();
            if edit(&mut entry) {
                entries[position] = entry.clone();
            } else {
                entries.remove(position);
            }
            jsonl::rewrite(&self.path, &entries)?;
            Ok(entry)
        })();

        lock.unlock()?;
        result
    }

    /// Entries delivered under `identity`, newest first by end time
    pub fn entries_for(&self, identity: &str) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .entries()?
            .into_iter()
            .filter(|e| e.identity == identity)
            .collect();
        entries.sort_by(|a, b| b.log.ended_at.cmp(&a.log.ended_at));
        Ok(entries)
    }

    pub fn logs_for(&self, identity: &str) -> Result<Vec<FinalizedWorkoutLog>> {
        Ok(self.entries_for(identity)?.into_iter().map(|e| e.log).collect())
    }

    /// Most recent log of `workout_id` for `identity`
    pub fn last_workout(
        &self,
        identity: &str,
        workout_id: &str,
    ) -> Result<Option<FinalizedWorkoutLog>> {
        Ok(self
            .logs_for(identity)?
            .into_iter()
            .find(|log| log.workout_id == workout_id))
    }
}

impl Backend for HistoryLog {
    fn send(&mut self, identity: &str, log: &FinalizedWorkoutLog) -> Result<()> {
        self.append(&HistoryEntry {
            id: Uuid::new_v4(),
            identity: identity.to_string(),
            synced_at: Utc::now(),
            log: log.clone(),
        })
    }
}
