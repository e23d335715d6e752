//! CSV export of workout history.
//!
//! One row per logged set, so the file opens directly in a spreadsheet.

use crate::{Error, FinalizedWorkoutLog, Result};
use std::path::Path;
use tempfile::NamedTempFile;

/// A row in the CSV output
#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct CsvRow {
    workout_id: String,
    workout_name: String,
    started_at: String,
    ended_at: String,
    duration_seconds: u64,
    core_done: bool,
    body_weight: Option<f64>,
    exercise_id: String,
    exercise_name: String,
    set_number: u32,
    weight: f64,
    reps: u32,
}

fn rows(log: &FinalizedWorkoutLog) -> impl Iterator<Item = CsvRow> + '_ {
    log.exercises.iter().flat_map(move |exercise| {
        exercise.sets.iter().map(move |set| CsvRow {
            workout_id: log.workout_id.clone(),
            workout_name: log.workout_name.clone(),
            started_at: log.started_at.to_rfc3339(),
            ended_at: log.ended_at.to_rfc3339(),
            duration_seconds: log.duration_seconds,
            core_done: log.core_done,
            body_weight: log.body_weight,
            exercise_id: exercise.exercise_id.clone(),
            exercise_name: exercise.exercise_name.clone(),
            set_number: set.set_number,
            weight: set.weight,
            reps: set.reps,
        })
    })
}

/// Write every set of `logs` to `path`, replacing any existing file
///
/// The CSV is written to a sibling temp file, fsynced, then renamed over
/// `path`, so a crash never leaves a half-written export behind.
/// Returns the number of rows written.
pub fn export_csv(logs: &[FinalizedWorkoutLog], path: &Path) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(temp.as_file());

    let mut count = 0;
    for log in logs {
        for row in rows(log) {
            writer.serialize(row)?;
            count += 1;
        }
    }

    writer.flush()?;
    drop(writer);
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Exported {} sets from {} workouts to {:?}", count, logs.len(), path);
    Ok(count)
}
