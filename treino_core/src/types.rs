//! Core domain types for Treino.
//!
//! This module defines the fundamental types used throughout the system:
//! - Workout and exercise definitions (the plan catalog)
//! - Set slots and set records logged during a session
//! - The persisted in-flight session state
//! - Finalized workout logs and their queued wrapper

use crate::rest_timer::RestTimer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Plan Types
// ============================================================================

/// A single exercise within a workout definition
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseDefinition {
    pub id: String,
    pub name: String,
    /// Target set count, always >= 1
    pub sets: u32,
    /// Target reps: "8", "6-10" or a token such as "FALHA"
    pub reps: String,
    pub rest_seconds: u32,
    pub notes: Option<String>,
}

impl ExerciseDefinition {
    /// Rep count used to pre-fill an empty input row
    ///
    /// Ranges use their upper bound, fixed targets the number itself.
    /// Non-numeric targets (e.g. "to failure") have no default.
    pub fn default_reps(&self) -> Option<u32> {
        let target = match self.reps.split_once('-') {
            Some((_, high)) => high,
            None => self.reps.as_str(),
        };
        target.trim().parse().ok()
    }

    /// Index of the final planned set
    pub fn last_set_index(&self) -> u32 {
        self.sets.saturating_sub(1)
    }
}

/// A complete workout definition (one training day)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutDefinition {
    pub id: String,
    pub name: String,
    pub day_name: String,
    pub focus: String,
    pub exercises: Vec<ExerciseDefinition>,
}

impl WorkoutDefinition {
    pub fn exercise(&self, exercise_id: &str) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|e| e.id == exercise_id)
    }
}

/// One exercise of the auxiliary core routine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CoreExercise {
    pub name: String,
    pub reps: String,
    pub notes: String,
}

/// The complete plan: workouts in rotation order plus the core routine
#[derive(Clone, Debug)]
pub struct Catalog {
    pub workouts: Vec<WorkoutDefinition>,
    pub core_routine: Vec<CoreExercise>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Address of one planned set within a session
///
/// Serialized as `"<exercise_id>_<index>"` so it can key a JSON object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetKey {
    pub exercise_id: String,
    pub index: u32,
}

impl SetKey {
    pub fn new(exercise_id: impl Into<String>, index: u32) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            index,
        }
    }
}

impl fmt::Display for SetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.exercise_id, self.index)
    }
}

impl FromStr for SetKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        // Exercise ids contain underscores themselves, so split on the last one
        let (exercise_id, index) = s
            .rsplit_once('_')
            .ok_or_else(|| crate::Error::Other(format!("Invalid set key: {}", s)))?;
        let index = index
            .parse()
            .map_err(|e| crate::Error::Other(format!("Invalid set index in {}: {}", s, e)))?;
        Ok(SetKey::new(exercise_id, index))
    }
}

impl Serialize for SetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A logged set (weight x reps)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetRecord {
    pub weight: f64,
    pub reps: u32,
    pub done: bool,
}

impl SetRecord {
    pub fn completed(weight: f64, reps: u32) -> Self {
        Self {
            weight,
            reps,
            done: true,
        }
    }
}

/// Pre-fill values for an input row that has not been committed yet
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SetDraft {
    pub weight: Option<f64>,
    pub reps: Option<u32>,
}

/// One check box of the 3x3 core checklist
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreSlot {
    pub exercise: u8,
    pub set: u8,
}

impl CoreSlot {
    pub const EXERCISES: u8 = 3;
    pub const SETS: u8 = 3;

    /// Build a slot, rejecting coordinates outside the 3x3 grid
    pub fn new(exercise: u8, set: u8) -> crate::Result<Self> {
        if exercise >= Self::EXERCISES || set >= Self::SETS {
            return Err(crate::Error::Validation(format!(
                "core slot {}x{} is outside the {}x{} grid",
                exercise,
                set,
                Self::EXERCISES,
                Self::SETS
            )));
        }
        Ok(Self { exercise, set })
    }

    /// All nine slots in row-major order
    pub fn all() -> impl Iterator<Item = CoreSlot> {
        (0..Self::EXERCISES)
            .flat_map(|exercise| (0..Self::SETS).map(move |set| CoreSlot { exercise, set }))
    }
}

/// The in-flight session, as persisted to the session store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub workout_id: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
    /// Only completed sets; open slots are absent
    #[serde(default)]
    pub sets: BTreeMap<SetKey, SetRecord>,
    #[serde(default)]
    pub rest_timer: Option<RestTimer>,
}

impl SessionState {
    pub fn new(workout_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            workout_id: workout_id.into(),
            started_at,
            elapsed_seconds: 0,
            sets: BTreeMap::new(),
            rest_timer: None,
        }
    }

    pub fn set(&self, exercise_id: &str, index: u32) -> Option<&SetRecord> {
        self.sets.get(&SetKey::new(exercise_id, index))
    }
}

// ============================================================================
// Finalized Log Types
// ============================================================================

/// A completed set in a finalized log, numbered from 1
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub set_number: u32,
    pub weight: f64,
    pub reps: u32,
}

/// All completed sets of one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseResult {
    pub exercise_id: String,
    pub exercise_name: String,
    pub sets: Vec<LoggedSet>,
}

impl ExerciseResult {
    /// Sum of weight x reps over all sets
    pub fn volume(&self) -> f64 {
        self.sets.iter().map(|s| s.weight * s.reps as f64).sum()
    }

    pub fn max_weight(&self) -> f64 {
        self.sets.iter().map(|s| s.weight).fold(0.0, f64::max)
    }
}

/// A finished workout, immutable once built
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FinalizedWorkoutLog {
    pub workout_id: String,
    pub workout_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub core_done: bool,
    pub body_weight: Option<f64>,
    pub exercises: Vec<ExerciseResult>,
}

impl FinalizedWorkoutLog {
    pub fn exercise(&self, exercise_id: &str) -> Option<&ExerciseResult> {
        self.exercises.iter().find(|e| e.exercise_id == exercise_id)
    }

    pub fn volume(&self) -> f64 {
        self.exercises.iter().map(ExerciseResult::volume).sum()
    }
}

/// A finalized log waiting in the outbox
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QueuedRecord {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub log: FinalizedWorkoutLog,
}
