//! Active workout session state machine.
//!
//! An `ActiveWorkout` owns one in-flight session: the set records, the core
//! checklist, the single rest timer and the repeating ticks that drive them.
//! Phases move through a pure transition function; the struct applies the
//! side effects (persisting the slot, alerting, handing off the final log).
//!
//! Every operation takes the current instant explicitly so callers decide
//! what time it is (wall clock in the CLI, virtual time in tests).

use crate::config::SessionConfig;
use crate::rest_timer::{RestAlert, RestTimer};
use crate::scheduler::{self, Scheduler, TickId, TickKind};
use crate::store::SessionStore;
use crate::sync::{Delivery, LogSubmitter};
use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

// ============================================================================
// Phases
// ============================================================================

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the store to answer the recovery lookup
    Initializing,
    Active,
    ConfirmingFinish,
    Finished,
    Cancelled,
}

/// Inputs to the phase transition function
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Recovery lookup answered
    Restored,
    /// Set, timer or checklist change
    Mutate,
    RequestFinish,
    /// Back out of the finish confirmation
    ResumeEditing,
    ConfirmFinish,
    Cancel,
}

impl SessionPhase {
    /// Next phase for `event`, or an error if the event is not allowed here
    pub fn apply(self, event: SessionEvent) -> Result<SessionPhase> {
        use SessionEvent as E;
        use SessionPhase as P;

        match (self, event) {
            (P::Initializing, E::Restored) => Ok(P::Active),
            (P::Active, E::Mutate) => Ok(P::Active),
            (P::Active, E::RequestFinish) => Ok(P::ConfirmingFinish),
            (P::Active, E::Cancel) => Ok(P::Cancelled),
            (P::ConfirmingFinish, E::ResumeEditing) => Ok(P::Active),
            (P::ConfirmingFinish, E::ConfirmFinish) => Ok(P::Finished),
            (from, event) => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Finished | SessionPhase::Cancelled)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Initializing => "initializing",
            SessionPhase::Active => "active",
            SessionPhase::ConfirmingFinish => "confirming_finish",
            SessionPhase::Finished => "finished",
            SessionPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionEvent::Restored => "restored",
            SessionEvent::Mutate => "mutate",
            SessionEvent::RequestFinish => "request_finish",
            SessionEvent::ResumeEditing => "resume_editing",
            SessionEvent::ConfirmFinish => "confirm_finish",
            SessionEvent::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Input parsing
// ============================================================================

/// Weight typed by the user; anything unparseable is zero
///
/// Accepts a decimal comma ("82,5").
pub fn parse_weight(input: &str) -> f64 {
    match input.trim().replace(',', ".").parse::<f64>() {
        Ok(w) if w.is_finite() => w,
        _ => 0.0,
    }
}

/// Reps typed by the user; anything unparseable is zero
pub fn parse_reps(input: &str) -> u32 {
    input.trim().parse().unwrap_or(0)
}

// ============================================================================
// Finalization
// ============================================================================

/// Build the finished log from a session
///
/// Only completed slots are kept, in slot order, renumbered from 1.
/// Exercises without a completed set are dropped.
pub fn finalize_log(
    def: &WorkoutDefinition,
    state: &SessionState,
    core_done: bool,
    ended_at: DateTime<Utc>,
    body_weight: Option<f64>,
) -> FinalizedWorkoutLog {
    let exercises = def
        .exercises
        .iter()
        .filter_map(|exercise| {
            let sets: Vec<LoggedSet> = (0..exercise.sets)
                .filter_map(|index| state.set(&exercise.id, index).filter(|r| r.done))
                .enumerate()
                .map(|(i, record)| LoggedSet {
                    set_number: i as u32 + 1,
                    weight: record.weight,
                    reps: record.reps,
                })
                .collect();

            if sets.is_empty() {
                None
            } else {
                Some(ExerciseResult {
                    exercise_id: exercise.id.clone(),
                    exercise_name: exercise.name.clone(),
                    sets,
                })
            }
        })
        .collect();

    FinalizedWorkoutLog {
        workout_id: def.id.clone(),
        workout_name: def.name.clone(),
        started_at: state.started_at,
        ended_at,
        duration_seconds: state.elapsed_seconds,
        core_done,
        body_weight,
        exercises,
    }
}

/// Drafts pre-filled from the previous log of the same workout
///
/// Seeding is positional: the n-th logged set fills input row n. Logs keep
/// only completed sets, renumbered from 1, so a log whose only set was done
/// in row 3 seeds row 1. Logged sets beyond the plan's set count are dropped.
fn seed_drafts(def: &WorkoutDefinition, last: &FinalizedWorkoutLog) -> HashMap<SetKey, SetDraft> {
    let mut drafts = HashMap::new();
    for result in &last.exercises {
        let Some(exercise) = def.exercise(&result.exercise_id) else {
            continue;
        };
        for logged in &result.sets {
            let index = logged.set_number.saturating_sub(1);
            if index >= exercise.sets {
                continue;
            }
            drafts.insert(
                SetKey::new(&exercise.id, index),
                SetDraft {
                    weight: Some(logged.weight),
                    reps: Some(logged.reps),
                },
            );
        }
    }
    drafts
}

// ============================================================================
// State machine
// ============================================================================

/// Side effects observed by one `pump`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PumpReport {
    pub elapsed_seconds: Option<u64>,
    /// Exercise whose rest just ran out
    pub rest_finished: Option<String>,
}

/// One in-flight workout
pub struct ActiveWorkout<S: SessionStore, A: RestAlert> {
    def: WorkoutDefinition,
    phase: SessionPhase,
    state: SessionState,
    drafts: HashMap<SetKey, SetDraft>,
    core: BTreeSet<CoreSlot>,
    scheduler: Scheduler,
    elapsed_tick: Option<TickId>,
    rest_tick: Option<TickId>,
    store: S,
    alert: A,
    config: SessionConfig,
    recovered: bool,
}

impl<S: SessionStore, A: RestAlert> ActiveWorkout<S, A> {
    /// Start or resume a session for `def`
    ///
    /// A slot saved for the same workout is adopted as-is, except that a rest
    /// timer which ran out while nobody was watching is dropped without an
    /// alert. A previous log of the same workout seeds the input drafts
    /// (nothing is marked done); recorded sets always take precedence over
    /// them. A failing store read is logged and treated as empty.
    pub fn start(
        def: WorkoutDefinition,
        store: S,
        alert: A,
        config: SessionConfig,
        now: DateTime<Utc>,
        last_workout: Option<&FinalizedWorkoutLog>,
    ) -> Result<Self> {
        let phase = SessionPhase::Initializing;

        let saved = match store.load(&def.id) {
            Ok(saved) => saved.filter(|s| s.workout_id == def.id),
            Err(e) => {
                tracing::warn!("Failed to read session slot: {}. Starting fresh.", e);
                None
            }
        };

        let recovered = saved.is_some();
        let drafts = match last_workout.filter(|l| l.workout_id == def.id) {
            Some(last) => {
                let drafts = seed_drafts(&def, last);
                tracing::debug!("Seeded {} set drafts from {}", drafts.len(), last.ended_at);
                drafts
            }
            None => HashMap::new(),
        };
        let state = match saved {
            Some(state) => {
                tracing::info!(
                    "Resuming {} started at {} ({} sets done)",
                    def.id,
                    state.started_at,
                    state.sets.len()
                );
                state
            }
            None => {
                tracing::info!("Starting new {} session", def.id);
                SessionState::new(&def.id, now)
            }
        };

        let mut session = Self {
            phase: phase.apply(SessionEvent::Restored)?,
            def,
            state,
            drafts,
            core: BTreeSet::new(),
            scheduler: Scheduler::new(),
            elapsed_tick: None,
            rest_tick: None,
            store,
            alert,
            config,
            recovered,
        };

        session.elapsed_tick = Some(session.scheduler.schedule_repeating(
            TickKind::Elapsed,
            scheduler::elapsed_interval(),
            now,
        ));
        match session.state.rest_timer.as_ref().map(|t| t.is_expired(now)) {
            Some(true) => {
                tracing::debug!("Dropping rest timer that ran out while away");
                session.state.rest_timer = None;
                session.persist();
            }
            Some(false) => session.schedule_rest_poll(now),
            None => {}
        }

        Ok(session)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn definition(&self) -> &WorkoutDefinition {
        &self.def
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// True when the session was adopted from the store
    pub fn is_recovered(&self) -> bool {
        self.recovered
    }

    pub fn rest_timer(&self) -> Option<&RestTimer> {
        self.state.rest_timer.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn alert(&self) -> &A {
        &self.alert
    }

    pub fn completed_sets(&self, exercise_id: &str) -> usize {
        self.def
            .exercise(exercise_id)
            .map(|exercise| {
                (0..exercise.sets)
                    .filter(|&i| self.state.set(exercise_id, i).is_some_and(|r| r.done))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn exercise_complete(&self, exercise_id: &str) -> bool {
        self.def
            .exercise(exercise_id)
            .is_some_and(|exercise| self.completed_sets(exercise_id) == exercise.sets as usize)
    }

    /// Values to pre-fill the input row of a slot
    ///
    /// Recorded value, else the seeded draft, else the first set's weight and
    /// the target's default reps.
    pub fn draft(&self, exercise_id: &str, index: u32) -> SetDraft {
        if let Some(record) = self.state.set(exercise_id, index) {
            return SetDraft {
                weight: Some(record.weight),
                reps: Some(record.reps),
            };
        }
        if let Some(draft) = self.drafts.get(&SetKey::new(exercise_id, index)) {
            return *draft;
        }
        SetDraft {
            weight: self.state.set(exercise_id, 0).map(|r| r.weight),
            reps: self.def.exercise(exercise_id).and_then(|e| e.default_reps()),
        }
    }

    pub fn is_core_checked(&self, slot: CoreSlot) -> bool {
        self.core.contains(&slot)
    }

    pub fn core_checked_count(&self) -> usize {
        self.core.len()
    }

    pub fn core_done(&self) -> bool {
        self.core.len() >= self.config.core_done_threshold
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Mark a set as done
    ///
    /// Starts the rest timer unless the exercise has no rest or this is its
    /// last set. The slot is persisted best-effort.
    pub fn record_set(
        &mut self,
        exercise_id: &str,
        index: u32,
        weight: f64,
        reps: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.phase = self.phase.apply(SessionEvent::Mutate)?;
        let exercise = self.exercise(exercise_id)?.clone();
        if index >= exercise.sets {
            return Err(Error::Validation(format!(
                "{} has {} sets; index {} is out of range",
                exercise.id, exercise.sets, index
            )));
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(Error::Validation(format!(
                "weight must be a non-negative number, got {}",
                weight
            )));
        }

        self.write_set(&exercise, index, weight, reps, exercise.rest_seconds, now);
        self.persist();
        Ok(())
    }

    /// `record_set` from raw text fields
    pub fn record_set_input(
        &mut self,
        exercise_id: &str,
        index: u32,
        weight: &str,
        reps: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.record_set(exercise_id, index, parse_weight(weight), parse_reps(reps), now)
    }

    /// Copy the first set into every remaining set of the exercise
    ///
    /// The first set must be done with positive weight and reps. No rest
    /// timer is started. Returns the number of sets written.
    pub fn repeat_first_set(&mut self, exercise_id: &str, now: DateTime<Utc>) -> Result<u32> {
        self.phase = self.phase.apply(SessionEvent::Mutate)?;
        let exercise = self.exercise(exercise_id)?.clone();

        let first = self
            .state
            .set(&exercise.id, 0)
            .filter(|r| r.done && r.weight > 0.0 && r.reps > 0)
            .copied()
            .ok_or_else(|| Error::Validation("first set must be filled".into()))?;

        for index in 1..exercise.sets {
            self.write_set(&exercise, index, first.weight, first.reps, 0, now);
        }
        self.persist();
        Ok(exercise.sets - 1)
    }

    /// Flip one core checklist box; returns the new value
    ///
    /// The checklist lives only as long as this session object.
    pub fn toggle_core_set(&mut self, slot: CoreSlot) -> Result<bool> {
        self.phase = self.phase.apply(SessionEvent::Mutate)?;
        let checked = if self.core.remove(&slot) {
            false
        } else {
            self.core.insert(slot);
            true
        };
        tracing::debug!("Core slot {:?} -> {}", slot, checked);
        Ok(checked)
    }

    /// Add time to the live rest timer; false when none is running
    pub fn extend_rest(&mut self) -> Result<bool> {
        self.ensure_live()?;
        let Some(timer) = self.state.rest_timer.as_mut() else {
            return Ok(false);
        };
        timer.extend(self.config.rest_extend_seconds);
        self.persist();
        Ok(true)
    }

    /// Drop the live rest timer without alerting; false when none is running
    pub fn skip_rest(&mut self) -> Result<bool> {
        self.ensure_live()?;
        if self.state.rest_timer.is_none() {
            return Ok(false);
        }
        self.stop_rest();
        self.persist();
        Ok(true)
    }

    /// Process ticks due at `now`
    pub fn pump(&mut self, now: DateTime<Utc>) -> PumpReport {
        let mut report = PumpReport::default();
        if self.phase.is_terminal() {
            return report;
        }

        for (_, kind) in self.scheduler.due(now) {
            match kind {
                TickKind::Elapsed => {
                    self.refresh_elapsed(now);
                    report.elapsed_seconds = Some(self.state.elapsed_seconds);
                }
                TickKind::RestPoll => {
                    if let Some(name) = self.finish_rest_if_expired(now) {
                        report.rest_finished = Some(name);
                    }
                }
                TickKind::QueuePoll => {}
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Finish / cancel
    // ------------------------------------------------------------------

    pub fn request_finish(&mut self) -> Result<()> {
        self.phase = self.phase.apply(SessionEvent::RequestFinish)?;
        Ok(())
    }

    pub fn resume_editing(&mut self) -> Result<()> {
        self.phase = self.phase.apply(SessionEvent::ResumeEditing)?;
        Ok(())
    }

    /// Finalize the session and hand the log to `submitter`
    ///
    /// If the hand-off itself fails the session stays in `ConfirmingFinish`
    /// with its slot intact, so nothing is lost.
    pub fn confirm_finish(
        &mut self,
        now: DateTime<Utc>,
        body_weight: Option<f64>,
        submitter: &mut dyn LogSubmitter,
    ) -> Result<(FinalizedWorkoutLog, Delivery)> {
        let next = self.phase.apply(SessionEvent::ConfirmFinish)?;
        if let Some(w) = body_weight {
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::Validation(format!(
                    "body weight must be a positive number, got {}",
                    w
                )));
            }
        }

        self.refresh_elapsed(now);
        let log = finalize_log(&self.def, &self.state, self.core_done(), now, body_weight);
        let delivery = submitter.submit(&log)?;

        self.phase = next;
        self.teardown();
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to clear session slot: {}", e);
        }

        tracing::info!(
            "Finished {}: {} exercises, {}s, {:?}",
            log.workout_id,
            log.exercises.len(),
            log.duration_seconds,
            delivery
        );
        Ok((log, delivery))
    }

    /// Abandon the session without producing a log
    pub fn cancel(&mut self) -> Result<()> {
        self.phase = self.phase.apply(SessionEvent::Cancel)?;
        self.teardown();
        if let Err(e) = self.store.clear() {
            tracing::warn!("Failed to clear session slot: {}", e);
        }
        tracing::info!("Cancelled {} session", self.def.id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn exercise(&self, exercise_id: &str) -> Result<&ExerciseDefinition> {
        self.def
            .exercise(exercise_id)
            .ok_or_else(|| Error::UnknownExercise(exercise_id.to_string()))
    }

    fn ensure_live(&self) -> Result<()> {
        match self.phase {
            SessionPhase::Active | SessionPhase::ConfirmingFinish => Ok(()),
            from => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: SessionEvent::Mutate.to_string(),
            }),
        }
    }

    fn write_set(
        &mut self,
        exercise: &ExerciseDefinition,
        index: u32,
        weight: f64,
        reps: u32,
        rest_seconds: u32,
        now: DateTime<Utc>,
    ) {
        let key = SetKey::new(&exercise.id, index);
        self.drafts.remove(&key);
        self.state.sets.insert(key, SetRecord::completed(weight, reps));
        tracing::debug!(
            "Set {} #{}: {}kg x {}",
            exercise.id,
            index + 1,
            weight,
            reps
        );

        if rest_seconds > 0 && index < exercise.last_set_index() {
            self.start_rest(&exercise.name, rest_seconds, now);
        }
    }

    /// Replace any live timer; the old one never alerts
    fn start_rest(&mut self, name: &str, seconds: u32, now: DateTime<Utc>) {
        self.state.rest_timer = Some(RestTimer::start(name, seconds, now));
        if self.rest_tick.is_none() {
            self.schedule_rest_poll(now);
        }
    }

    fn schedule_rest_poll(&mut self, now: DateTime<Utc>) {
        self.rest_tick = Some(self.scheduler.schedule_repeating(
            TickKind::RestPoll,
            scheduler::rest_poll_interval(),
            now,
        ));
    }

    fn stop_rest(&mut self) {
        self.state.rest_timer = None;
        if let Some(id) = self.rest_tick.take() {
            self.scheduler.cancel(id);
        }
    }

    fn finish_rest_if_expired(&mut self, now: DateTime<Utc>) -> Option<String> {
        let expired = self.state.rest_timer.as_ref()?.is_expired(now);
        if !expired {
            return None;
        }
        let name = self.state.rest_timer.as_ref()?.name.clone();
        self.stop_rest();
        self.alert.alert(&name);
        self.persist();
        Some(name)
    }

    fn refresh_elapsed(&mut self, now: DateTime<Utc>) {
        self.state.elapsed_seconds = (now - self.state.started_at).num_seconds().max(0) as u64;
    }

    /// Stop every tick and drop the rest timer silently
    fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.elapsed_tick = None;
        self.rest_tick = None;
        self.state.rest_timer = None;
    }

    /// Best-effort write of the slot; failures never reach the caller
    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::warn!(
                "Failed to persist {} session: {}. Continuing in memory.",
                self.state.workout_id,
                e
            );
        }
    }
}
