use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use treino_core::format::{format_clock, format_duration};
use treino_core::scheduler::rest_display_interval;
use treino_core::*;

#[derive(Parser)]
#[command(name = "treino")]
#[command(about = "Gym workout tracker with offline sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Queue finished workouts instead of delivering them
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the workout plans
    Plans,

    /// Suggest today's workout
    Suggest,

    /// Start (or resume) a workout
    Start {
        /// Workout id, e.g. LEGS1
        workout: String,
    },

    /// Record a completed set
    Set {
        /// Exercise id, e.g. l1_agachamento
        exercise: String,

        /// Set number, starting at 1
        number: u32,

        /// Weight in kg (decimal comma accepted)
        weight: String,

        /// Repetitions
        reps: String,
    },

    /// Copy the first set into the remaining sets of an exercise
    Repeat {
        exercise: String,
    },

    /// Show the active workout
    Status,

    /// Show or control the rest timer
    Rest {
        /// Block until the rest is over
        #[arg(long)]
        wait: bool,

        /// Add time to the running rest
        #[arg(long, conflicts_with = "skip")]
        extend: bool,

        /// Dismiss the running rest
        #[arg(long)]
        skip: bool,
    },

    /// Finish the active workout and save it
    Finish {
        /// Body weight in kg
        #[arg(long)]
        body_weight: Option<f64>,

        /// Core checklist boxes ticked (0-9)
        #[arg(long, default_value_t = 0)]
        core_sets: u8,
    },

    /// Abandon the active workout
    Cancel,

    /// Deliver workouts queued while offline
    Sync,

    /// List finished workouts, or edit one
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,

        /// Show at most this many
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Weekly totals and per-exercise progress
    Progress,

    /// Export every logged set to CSV
    Export {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Correct one logged set of a finished workout
    Edit {
        /// Entry id or a unique prefix of it, as listed by `treino history`
        id: String,

        exercise: String,

        /// Logged set number, starting at 1
        number: u32,

        /// Weight in kg (decimal comma accepted)
        weight: String,

        reps: String,
    },

    /// Remove a finished workout
    Delete {
        /// Entry id or a unique prefix of it
        id: String,
    },
}

/// Resolved paths and settings for one invocation
struct Env {
    config: Config,
    offline: bool,
}

impl Env {
    fn session_store(&self) -> FileSessionStore {
        FileSessionStore::new(self.config.data.session_path())
    }

    fn history(&self) -> HistoryLog {
        HistoryLog::new(self.config.data.history_path())
    }

    fn identity(&self) -> &str {
        &self.config.sync.identity
    }

    fn sync_service(&self) -> SyncService<FileOutbox, HistoryLog, StaticLink> {
        SyncService::new(
            Outbox::new(FileOutbox::new(self.config.data.outbox_path())),
            self.history(),
            StaticLink(!self.offline),
            self.identity(),
        )
    }

    /// Rebuild the session held in the slot
    fn resume(&self, now: DateTime<Utc>) -> Result<ActiveWorkout<FileSessionStore, TerminalBell>> {
        let store = self.session_store();
        let state = store.peek()?.ok_or(Error::NoActiveSession)?;
        let def = get_default_catalog().require(&state.workout_id)?.clone();
        let last = self.history().last_workout(self.identity(), &def.id)?;
        ActiveWorkout::start(
            def,
            store,
            TerminalBell,
            self.config.session.clone(),
            now,
            last.as_ref(),
        )
    }

    /// History entry of this identity whose id starts with `prefix`
    fn find_entry(&self, prefix: &str) -> Result<HistoryEntry> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Err(Error::Validation("history id must not be empty".into()));
        }
        let mut matches: Vec<HistoryEntry> = self
            .history()
            .entries_for(self.identity())?
            .into_iter()
            .filter(|e| e.id.to_string().starts_with(&prefix))
            .collect();
        match matches.len() {
            0 => Err(Error::Validation(format!("no history entry with id {}", prefix))),
            1 => Ok(matches.remove(0)),
            n => Err(Error::Validation(format!(
                "history id {} is ambiguous ({} entries); use more characters",
                prefix, n
            ))),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    treino_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    let offline = cli.offline || config.sync.offline;

    let errors = get_default_catalog().validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let env = Env { config, offline };
    tracing::debug!(
        "Data in {:?}, identity {}, offline {}",
        env.config.data.data_dir,
        env.identity(),
        env.offline
    );

    match cli.command {
        Commands::Plans => cmd_plans(),
        Commands::Suggest => cmd_suggest(&env),
        Commands::Start { workout } => cmd_start(&env, &workout),
        Commands::Set {
            exercise,
            number,
            weight,
            reps,
        } => cmd_set(&env, &exercise, number, &weight, &reps),
        Commands::Repeat { exercise } => cmd_repeat(&env, &exercise),
        Commands::Status => cmd_status(&env),
        Commands::Rest { wait, extend, skip } => cmd_rest(&env, wait, extend, skip),
        Commands::Finish {
            body_weight,
            core_sets,
        } => cmd_finish(&env, body_weight, core_sets),
        Commands::Cancel => cmd_cancel(&env),
        Commands::Sync => cmd_sync(&env),
        Commands::History { action, limit } => match action {
            None => cmd_history(&env, limit),
            Some(HistoryAction::Edit {
                id,
                exercise,
                number,
                weight,
                reps,
            }) => cmd_history_edit(&env, &id, &exercise, number, &weight, &reps),
            Some(HistoryAction::Delete { id }) => cmd_history_delete(&env, &id),
        },
        Commands::Progress => cmd_progress(&env),
        Commands::Export { path } => cmd_export(&env, &path),
    }
}

fn cmd_plans() -> Result<()> {
    for workout in &get_default_catalog().workouts {
        println!("{:<6} {} ({})", workout.id, workout.name, workout.day_name);
        println!("       {}", workout.focus);
        for exercise in &workout.exercises {
            println!(
                "       - {:<22} {} x {}  rest {}",
                exercise.id,
                exercise.sets,
                exercise.reps,
                format_clock(exercise.rest_seconds as u64)
            );
        }
        println!();
    }
    Ok(())
}

fn cmd_suggest(env: &Env) -> Result<()> {
    let logs = env.history().logs_for(env.identity())?;
    let last = logs
        .first()
        .map(|log| (log.workout_id.as_str(), log.ended_at.with_timezone(&Local).date_naive()));

    let today = Local::now().date_naive();
    match get_default_catalog().suggest_next(today, last) {
        Some(workout) => {
            println!("Suggested: {} - {}", workout.id, workout.name);
            println!("  {}", workout.focus);
        }
        None => println!("No workouts in the catalog."),
    }
    Ok(())
}

fn cmd_start(env: &Env, workout_id: &str) -> Result<()> {
    let now = Utc::now();
    let def = get_default_catalog().require(workout_id)?.clone();

    let mut store = env.session_store();
    if let Some(other) = store.peek()?.filter(|s| s.workout_id != def.id) {
        tracing::info!("Replacing unfinished {} session", other.workout_id);
        println!(
            "Abandoning unfinished {} started {}",
            other.workout_id,
            other.started_at.with_timezone(&Local).format("%d/%m %H:%M")
        );
    }

    let last = env.history().last_workout(env.identity(), &def.id)?;
    let session = ActiveWorkout::start(
        def,
        env.session_store(),
        TerminalBell,
        env.config.session.clone(),
        now,
        last.as_ref(),
    )?;

    if session.is_recovered() {
        println!("✓ Resumed {}", session.definition().name);
    } else {
        // Claim the slot so later commands find this workout
        store.save(session.state())?;
        println!("✓ Started {}", session.definition().name);
    }
    print_session(&session, now);
    Ok(())
}

fn cmd_set(env: &Env, exercise_id: &str, number: u32, weight: &str, reps: &str) -> Result<()> {
    if number == 0 {
        return Err(Error::Validation("set numbers start at 1".into()));
    }
    let now = Utc::now();
    let mut session = env.resume(now)?;
    session.record_set_input(exercise_id, number - 1, weight, reps, now)?;

    if let Some(record) = session.state().set(exercise_id, number - 1) {
        println!(
            "✓ {} set {}: {}kg x {}",
            exercise_id, number, record.weight, record.reps
        );
    }
    if let Some(timer) = session.rest_timer() {
        println!(
            "  Rest {} ({})",
            format_clock(timer.remaining_seconds(now) as u64),
            timer.name
        );
    }
    Ok(())
}

fn cmd_repeat(env: &Env, exercise_id: &str) -> Result<()> {
    let now = Utc::now();
    let mut session = env.resume(now)?;
    let written = session.repeat_first_set(exercise_id, now)?;
    println!("✓ Copied first set of {} into {} more sets", exercise_id, written);
    Ok(())
}

fn cmd_status(env: &Env) -> Result<()> {
    let now = Utc::now();
    match env.resume(now) {
        Ok(session) => {
            print_session(&session, now);
            Ok(())
        }
        Err(Error::NoActiveSession) => {
            println!("No active workout.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn cmd_rest(env: &Env, wait: bool, extend: bool, skip: bool) -> Result<()> {
    let clock = SystemClock;
    let mut session = env.resume(clock.now())?;

    if skip {
        if session.skip_rest()? {
            println!("✓ Rest skipped");
        } else {
            println!("No rest running.");
        }
        return Ok(());
    }

    if extend && !session.extend_rest()? {
        println!("No rest running.");
        return Ok(());
    }

    let Some(timer) = session.rest_timer() else {
        println!("No rest running.");
        return Ok(());
    };
    tracing::debug!("Rest for {} ends at {}", timer.name, timer.ends_at);
    println!(
        "Rest {} ({})",
        format_clock(timer.remaining_seconds(clock.now()) as u64),
        timer.name
    );

    if !wait {
        return Ok(());
    }

    let mut stdout = io::stdout();
    loop {
        let now = clock.now();
        let report = session.pump(now);
        if report.rest_finished.is_some() {
            break;
        }
        match session.rest_timer() {
            Some(timer) => {
                print!("\r  {} ", format_clock(timer.remaining_seconds(now) as u64));
                stdout.flush()?;
            }
            None => break,
        }
        let interval = rest_display_interval().to_std().unwrap_or_else(|e| {
            tracing::warn!("Invalid rest display interval: {}", e);
            std::time::Duration::from_millis(250)
        });
        std::thread::sleep(interval);
    }
    Ok(())
}

fn cmd_finish(env: &Env, body_weight: Option<f64>, core_sets: u8) -> Result<()> {
    let now = Utc::now();
    let mut session = env.resume(now)?;

    for slot in CoreSlot::all().take(core_sets as usize) {
        session.toggle_core_set(slot)?;
    }

    session.request_finish()?;
    let mut sync = env.sync_service();
    let (log, delivery) = session.confirm_finish(now, body_weight, &mut sync)?;

    println!("✓ Finished {}", log.workout_name);
    println!("  Duration: {}", format_duration(log.duration_seconds));
    println!("  Exercises: {}", log.exercises.len());
    println!("  Volume: {:.0}kg", log.volume());
    if log.core_done {
        println!("  Core: done");
    }
    match delivery {
        Delivery::Sent => println!("  Saved."),
        Delivery::Queued => println!("  Offline: queued, run `treino sync` when back online."),
        Delivery::QueuedAfterError => println!("  Save failed: queued for retry."),
    }
    Ok(())
}

fn cmd_cancel(env: &Env) -> Result<()> {
    let now = Utc::now();
    let mut session = env.resume(now)?;
    session.cancel()?;
    println!("✓ Cancelled {}", session.definition().name);
    Ok(())
}

fn cmd_sync(env: &Env) -> Result<()> {
    let mut sync = env.sync_service();
    let sent = sync.drain()?;
    tracing::info!("Sync delivered {} queued workouts", sent);
    match sync.status() {
        SyncStatus::Idle => println!("✓ Synced {} workouts. Nothing pending.", sent),
        SyncStatus::Syncing { pending } => {
            println!("Synced {} workouts; {} still pending.", sent, pending)
        }
        SyncStatus::Offline { pending } => println!("Offline; {} workouts pending.", pending),
    }
    Ok(())
}

fn cmd_history(env: &Env, limit: usize) -> Result<()> {
    let entries = env.history().entries_for(env.identity())?;
    if entries.is_empty() {
        println!("No workouts yet.");
        return Ok(());
    }
    for entry in entries.iter().take(limit) {
        let log = &entry.log;
        let id = entry.id.to_string();
        println!(
            "{}  {}  {:<6} {:<28} {:>8}  {:>6.0}kg",
            &id[..8],
            log.ended_at.with_timezone(&Local).format("%d/%m %H:%M"),
            log.workout_id,
            log.workout_name,
            format_duration(log.duration_seconds),
            log.volume()
        );
    }
    Ok(())
}

fn cmd_history_edit(
    env: &Env,
    id: &str,
    exercise_id: &str,
    number: u32,
    weight: &str,
    reps: &str,
) -> Result<()> {
    let entry = env.find_entry(id)?;
    let mut exercises = entry.log.exercises.clone();

    let exercise = exercises
        .iter_mut()
        .find(|e| e.exercise_id == exercise_id)
        .ok_or_else(|| Error::UnknownExercise(exercise_id.to_string()))?;
    let count = exercise.sets.len();
    let set = number
        .checked_sub(1)
        .and_then(|index| exercise.sets.get_mut(index as usize))
        .ok_or_else(|| {
            Error::Validation(format!(
                "{} has {} logged sets; set {} is out of range",
                exercise_id, count, number
            ))
        })?;
    set.weight = treino_core::session::parse_weight(weight);
    set.reps = treino_core::session::parse_reps(reps);
    let (new_weight, new_reps) = (set.weight, set.reps);

    let updated = env.history().update_sets(entry.id, exercises)?;
    println!(
        "✓ Updated {} {} set {}: {}kg x {}",
        updated.log.workout_id, exercise_id, number, new_weight, new_reps
    );
    Ok(())
}

fn cmd_history_delete(env: &Env, id: &str) -> Result<()> {
    let entry = env.find_entry(id)?;
    let removed = env.history().delete(entry.id)?;
    println!(
        "✓ Deleted {} from {}",
        removed.log.workout_name,
        removed.log.ended_at.with_timezone(&Local).format("%d/%m %H:%M")
    );
    Ok(())
}

fn cmd_progress(env: &Env) -> Result<()> {
    let now = Utc::now();
    let logs = env.history().logs_for(env.identity())?;

    let summary = treino_core::progress::weekly_summary(&logs, now);
    println!("Last 7 days");
    println!("  Workouts: {}", summary.workouts);
    println!("  Volume:   {:.0}kg", summary.total_volume);
    println!("  Average:  {}min", summary.average_duration_minutes);
    println!("This week: {} workouts", treino_core::progress::workouts_this_week(&logs, now));

    let series = treino_core::progress::exercise_progress(&logs);
    let tracked: Vec<_> = series.values().filter(|s| s.points.len() >= 2).collect();
    if tracked.is_empty() {
        println!("\nNot enough data for progress yet.");
        return Ok(());
    }

    println!("\nMax weight");
    for exercise in tracked {
        if let (Some(first), Some(last)) = (exercise.points.first(), exercise.points.last()) {
            println!(
                "  {:<32} {:>6.1} -> {:>6.1}kg ({:+.1})",
                exercise.exercise_name,
                first.max_weight,
                last.max_weight,
                last.max_weight - first.max_weight
            );
        }
    }
    Ok(())
}

fn cmd_export(env: &Env, path: &std::path::Path) -> Result<()> {
    let mut logs = env.history().logs_for(env.identity())?;
    logs.reverse();
    let rows = export_csv(&logs, path)?;
    tracing::debug!("Exported {} logs", logs.len());
    println!("✓ Exported {} sets to {}", rows, path.display());
    Ok(())
}

fn print_session<S: SessionStore, A: RestAlert>(session: &ActiveWorkout<S, A>, now: DateTime<Utc>) {
    let def = session.definition();
    let elapsed = (now - session.state().started_at).num_seconds().max(0) as u64;

    println!("\n{} - {}", def.id, def.name);
    println!("Elapsed {}", format_clock(elapsed));

    for exercise in &def.exercises {
        let mark = if session.exercise_complete(&exercise.id) { "✓" } else { " " };
        println!(
            "\n[{}] {} ({}) {} x {}",
            mark, exercise.name, exercise.id, exercise.sets, exercise.reps
        );
        for index in 0..exercise.sets {
            match session.state().set(&exercise.id, index) {
                Some(record) if record.done => {
                    println!("    {}. {}kg x {}", index + 1, record.weight, record.reps);
                }
                _ => {
                    let draft = session.draft(&exercise.id, index);
                    let weight = draft.weight.map(|w| w.to_string()).unwrap_or_else(|| "-".into());
                    let reps = draft.reps.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                    println!("    {}. ({}kg x {})", index + 1, weight, reps);
                }
            }
        }
    }

    if let Some(timer) = session.rest_timer() {
        println!(
            "\nRest {} ({})",
            format_clock(timer.remaining_seconds(now) as u64),
            timer.name
        );
    }
}
