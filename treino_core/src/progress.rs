//! Progress statistics over delivered workouts.

use crate::FinalizedWorkoutLog;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;

/// One workout's contribution to an exercise's progress series
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressPoint {
    pub date: NaiveDate,
    pub max_weight: f64,
    pub volume: f64,
}

/// Progress series for one exercise, oldest point first
#[derive(Clone, Debug, PartialEq)]
pub struct ExerciseProgress {
    pub exercise_id: String,
    pub exercise_name: String,
    pub points: Vec<ProgressPoint>,
}

/// Totals over the trailing seven days
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeeklySummary {
    pub workouts: usize,
    pub total_volume: f64,
    /// Whole minutes, 0 when there were no workouts
    pub average_duration_minutes: u64,
}

/// Build per-exercise series from logs in any order
///
/// Bodyweight-only entries (max weight 0) produce no point.
pub fn exercise_progress(logs: &[FinalizedWorkoutLog]) -> BTreeMap<String, ExerciseProgress> {
    let mut ordered: Vec<&FinalizedWorkoutLog> = logs.iter().collect();
    ordered.sort_by_key(|log| log.ended_at);

    let mut series: BTreeMap<String, ExerciseProgress> = BTreeMap::new();
    for log in ordered {
        let date = log.ended_at.date_naive();
        for exercise in &log.exercises {
            let entry = series
                .entry(exercise.exercise_id.clone())
                .or_insert_with(|| ExerciseProgress {
                    exercise_id: exercise.exercise_id.clone(),
                    exercise_name: exercise.exercise_name.clone(),
                    points: Vec::new(),
                });
            let max_weight = exercise.max_weight();
            if max_weight > 0.0 {
                entry.points.push(ProgressPoint {
                    date,
                    max_weight,
                    volume: exercise.volume(),
                });
            }
        }
    }
    series
}

pub fn weekly_summary(logs: &[FinalizedWorkoutLog], now: DateTime<Utc>) -> WeeklySummary {
    let cutoff = now - Duration::days(7);
    let recent: Vec<&FinalizedWorkoutLog> =
        logs.iter().filter(|log| log.ended_at >= cutoff).collect();

    let workouts = recent.len();
    let total_volume = recent.iter().map(|log| log.volume()).sum();
    let total_seconds: u64 = recent.iter().map(|log| log.duration_seconds).sum();
    let average_duration_minutes = if workouts > 0 {
        total_seconds / workouts as u64 / 60
    } else {
        0
    };

    WeeklySummary {
        workouts,
        total_volume,
        average_duration_minutes,
    }
}

/// Midnight UTC of the Monday starting `now`'s week
pub fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    Utc.from_utc_datetime(&monday.and_time(chrono::NaiveTime::MIN))
}

pub fn workouts_this_week(logs: &[FinalizedWorkoutLog], now: DateTime<Utc>) -> usize {
    let start = start_of_week(now);
    logs.iter().filter(|log| log.ended_at >= start).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExerciseResult, LoggedSet};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn squat_log(ended_at: DateTime<Utc>, weight: f64, minutes: u64) -> FinalizedWorkoutLog {
        FinalizedWorkoutLog {
            workout_id: "LEGS1".into(),
            workout_name: "Pernas A".into(),
            started_at: ended_at - Duration::minutes(minutes as i64),
            ended_at,
            duration_seconds: minutes * 60,
            core_done: true,
            body_weight: None,
            exercises: vec![
                ExerciseResult {
                    exercise_id: "l1_agachamento".into(),
                    exercise_name: "Agachamento".into(),
                    sets: vec![
                        LoggedSet { set_number: 1, weight, reps: 6 },
                        LoggedSet { set_number: 2, weight: weight - 10.0, reps: 8 },
                    ],
                },
                ExerciseResult {
                    exercise_id: "l1_panturrilha".into(),
                    exercise_name: "Panturrilha".into(),
                    sets: vec![LoggedSet { set_number: 1, weight: 0.0, reps: 20 }],
                },
            ],
        }
    }

    #[test]
    fn test_exercise_progress_oldest_first() {
        // 2025-03-10 is a Monday
        let logs = vec![squat_log(at(10, 19), 105.0, 50), squat_log(at(3, 19), 100.0, 45)];
        let series = exercise_progress(&logs);

        let squat = &series["l1_agachamento"];
        assert_eq!(squat.exercise_name, "Agachamento");
        let weights: Vec<f64> = squat.points.iter().map(|p| p.max_weight).collect();
        assert_eq!(weights, vec![100.0, 105.0]);
        assert_eq!(squat.points[0].volume, 100.0 * 6.0 + 90.0 * 8.0);
        assert_eq!(squat.points[0].date, NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
    }

    #[test]
    fn test_bodyweight_exercise_has_no_points() {
        let series = exercise_progress(&[squat_log(at(3, 19), 100.0, 45)]);
        assert!(series["l1_panturrilha"].points.is_empty());
    }

    #[test]
    fn test_weekly_summary_window() {
        let logs = vec![
            squat_log(at(10, 19), 100.0, 50),
            squat_log(at(8, 19), 100.0, 41),
            squat_log(at(1, 19), 100.0, 60),
        ];
        let summary = weekly_summary(&logs, at(11, 12));

        assert_eq!(summary.workouts, 2);
        assert_eq!(summary.total_volume, 2.0 * (600.0 + 720.0));
        // (50 + 41) / 2 = 45.5 minutes, floored
        assert_eq!(summary.average_duration_minutes, 45);
    }

    #[test]
    fn test_weekly_summary_empty() {
        assert_eq!(weekly_summary(&[], at(11, 12)), WeeklySummary::default());
    }

    #[test]
    fn test_week_starts_on_monday() {
        // Sunday belongs to the week that began the previous Monday
        assert_eq!(start_of_week(at(16, 8)), at(10, 0));
        assert_eq!(start_of_week(at(10, 0)), at(10, 0));

        let logs = vec![squat_log(at(9, 20), 100.0, 50), squat_log(at(11, 7), 100.0, 50)];
        assert_eq!(workouts_this_week(&logs, at(12, 12)), 1);
    }
}
