//! Built-in training plan.
//!
//! Six training days in a fixed rotation, plus the 3-exercise core routine
//! tracked by the session checklist.

use crate::types::*;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

fn ex(id: &str, name: &str, sets: u32, reps: &str, rest_seconds: u32, notes: &str) -> ExerciseDefinition {
    ExerciseDefinition {
        id: id.into(),
        name: name.into(),
        sets,
        reps: reps.into(),
        rest_seconds,
        notes: if notes.is_empty() {
            None
        } else {
            Some(notes.into())
        },
    }
}

fn workout(
    id: &str,
    day_name: &str,
    name: &str,
    focus: &str,
    exercises: Vec<ExerciseDefinition>,
) -> WorkoutDefinition {
    WorkoutDefinition {
        id: id.into(),
        name: name.into(),
        day_name: day_name.into(),
        focus: focus.into(),
        exercises,
    }
}

/// Builds the default catalog
///
/// Prefer `get_default_catalog()` outside of tests.
pub fn build_default_catalog() -> Catalog {
    // Rotation order: LEGS1, PUSH1, PULL1, LEGS2, PUSH2, PULL2
    let workouts = vec![
        workout(
            "LEGS1",
            "Segunda",
            "LEGS 1: Manutenção Força",
            "Quadríceps (Volume Baixo)",
            vec![
                ex("l1_agachamento", "Agachamento Livre (Barra)", 3, "5-8", 150, "Manter carga de 140kg+. Descanso total."),
                ex("l1_legpress", "Leg Press 45º", 2, "10-15", 105, "Complemento com menos stress axial."),
                ex("l1_flexora", "Cadeira Flexora", 3, "12-15", 75, "Isolamento de posteriores."),
                ex("l1_panturrilha", "Panturrilha (Máquina/Leg)", 3, "15-20", 60, "Pausa no alongamento."),
            ],
        ),
        workout(
            "PUSH1",
            "Terça",
            "PUSH 1: Peito Tensão",
            "Peito Superior (Carga)",
            vec![
                ex("p1_supino_inc_halt", "Supino Inclinado (Halteres)", 4, "6-10", 120, "Prioridade absoluta. Foco clavicular."),
                ex("p1_supino_reto_halt", "Supino Reto (Halteres)", 3, "8-12", 105, "Amplitude total (alongar bem)."),
                ex("p1_dips", "Fundos (Dips) com Peso", 3, "8-12", 90, "Tronco inclinado à frente. Peito inferior."),
                ex("p1_desenv_halt", "Desenv. Ombros (Halteres)", 3, "8-12", 90, "Carga pesada controlada."),
                ex("p1_triceps_testa", "Tríceps Testa (Barra W)", 3, "10-15", 75, "Cabeça longa do tríceps."),
                ex("p1_triceps_corda", "Tríceps Polia (Corda)", 2, "12-15", 60, "Finalizador metabólico."),
            ],
        ),
        workout(
            "PULL1",
            "Quarta",
            "PULL 1: Costas Largura",
            "Dorsais & Espessura",
            vec![
                ex("pl1_puxada_frente", "Puxada Frontal (Polia)", 4, "8-12", 90, "Foco na largura (V-Taper)."),
                ex("pl1_remada_cavalo", "Remada Cavalinho (Neutra)", 3, "8-12", 105, "Carga pesada para espessura."),
                ex("pl1_serrote", "Remada Unilateral (Serrote)", 3, "10-12", 90, "Grande amplitude de movimento."),
                ex("pl1_facepull", "Face Pull (Corda)", 3, "15-20", 60, "Saúde dos ombros/deltóide posterior."),
                ex("pl1_rosca_direta", "Rosca Direta (Barra Reta)", 3, "8-12", 75, "Construtor base de bíceps."),
                ex("pl1_rosca_martelo", "Rosca Martelo (Halteres)", 3, "10-15", 60, "Foco braquial/antebraço."),
            ],
        ),
        workout(
            "LEGS2",
            "Quinta",
            "LEGS 2: Manutenção Posterior",
            "Cadeia Posterior & Carga",
            vec![
                ex("l2_sumo", "Agachamento Sumô", 3, "5-8", 150, "Manter/progredir carga de 180kg. Glúteos/Adutores."),
                ex("l2_stiff", "Stiff (RDL)", 3, "8-12", 120, "Construtor primário de posterior."),
                ex("l2_extensora", "Cadeira Extensora", 2, "15-20", 75, "Foco metabólico para quadríceps."),
                ex("l2_panturrilha_sent", "Panturrilha Sentado", 3, "15-20", 60, "Foco no sóleo."),
            ],
        ),
        workout(
            "PUSH2",
            "Sexta",
            "PUSH 2: Peito Metabólico",
            "Variação & Calistenia",
            vec![
                ex("p2_supino_reto_barra", "Supino Reto (Barra)", 4, "8-12", 105, "Sobrecarga absoluta."),
                ex("p2_supino_inc_maq", "Supino Inclinado (Máq/Smith)", 3, "10-15", 90, "Levar até a falha com segurança."),
                ex("p2_flexoes", "Flexões com Peso", 3, "FALHA", 75, "Disco nas costas. ROM completo."),
                ex("p2_elev_lateral_polia", "Elevação Lateral (Polia Unilateral)", 4, "12-15", 60, "Tensão constante no deltóide medial."),
                ex("p2_crossover", "Crossover (Polia Média/Baixa)", 2, "15-20", 60, "Foco no pump e adução máxima."),
                ex("p2_triceps_corda", "Tríceps Polia (Corda)", 3, "12-15", 60, "Volume para tríceps."),
            ],
        ),
        workout(
            "PULL2",
            "Sábado",
            "PULL 2: Costas Variação",
            "Planos & Pegadas",
            vec![
                ex("pl2_remada_barra", "Remada com Barra (Pronada)", 4, "6-10", 120, "Espessura total (trapézio/rombóides)."),
                ex("pl2_puxada_neutra", "Puxada Neutra (Triângulo)", 3, "10-15", 90, "Foco dorsais com carga alta."),
                ex("pl2_pulldown_corda", "Pulldown (Braços Retos)", 3, "12-15", 75, "Isolamento puro de dorsais."),
                ex("pl2_crucifixo_inv", "Crucifixo Inverso (Máq/Polia)", 3, "15-20", 60, "Deltóide posterior e meio das costas."),
                ex("pl2_scott", "Rosca Scott (Máquina)", 3, "10-15", 75, "Foco no pico do bíceps."),
                ex("pl2_rosca_inversa", "Rosca Inversa (Polia Baixa)", 2, "12-15", 60, "Braquiorradial/Antebraço."),
            ],
        ),
    ];

    let core_routine = vec![
        CoreExercise {
            name: "Elevação de Pernas (Suspenso)".into(),
            reps: "10-15".into(),
            notes: "Foco infra abdominal.".into(),
        },
        CoreExercise {
            name: "Abdominal Polia (Cable Crunch)".into(),
            reps: "12-15".into(),
            notes: "Foco supra, com carga.".into(),
        },
        CoreExercise {
            name: "Rotação Russa (com Peso)".into(),
            reps: "30-45s".into(),
            notes: "Foco oblíquos.".into(),
        },
    ];

    Catalog {
        workouts,
        core_routine,
    }
}

impl Catalog {
    pub fn workout(&self, id: &str) -> Option<&WorkoutDefinition> {
        self.workouts.iter().find(|w| w.id == id)
    }

    /// Like `workout`, but an unknown id is an error
    pub fn require(&self, id: &str) -> Result<&WorkoutDefinition> {
        self.workout(id)
            .ok_or_else(|| Error::UnknownWorkout(id.to_string()))
    }

    /// Plan suggested for `today`
    ///
    /// Tuesday to Saturday each map to a fixed day; Sunday and Monday fall
    /// back to PUSH1. If a workout was already logged today, the next one in
    /// rotation order is suggested instead.
    pub fn suggest_next(
        &self,
        today: NaiveDate,
        last_logged: Option<(&str, NaiveDate)>,
    ) -> Option<&WorkoutDefinition> {
        if let Some((last_id, logged_on)) = last_logged {
            if logged_on == today {
                if let Some(pos) = self.workouts.iter().position(|w| w.id == last_id) {
                    return self.workouts.get((pos + 1) % self.workouts.len());
                }
            }
        }

        let id = match today.weekday() {
            Weekday::Tue => "PULL1",
            Weekday::Wed => "LEGS1",
            Weekday::Thu => "PUSH2",
            Weekday::Fri => "PULL2",
            Weekday::Sat => "LEGS2",
            Weekday::Sun | Weekday::Mon => "PUSH1",
        };
        self.workout(id).or_else(|| self.workouts.first())
    }

    /// Validate the catalog for consistency and completeness
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut workout_ids = HashSet::new();
        let mut exercise_ids = HashSet::new();

        for def in &self.workouts {
            if def.id.is_empty() {
                errors.push("Workout has empty ID".to_string());
            }
            if !workout_ids.insert(def.id.as_str()) {
                errors.push(format!("Duplicate workout id '{}'", def.id));
            }
            if def.name.is_empty() {
                errors.push(format!("Workout '{}' has empty name", def.id));
            }
            if def.exercises.is_empty() {
                errors.push(format!("Workout '{}' has no exercises", def.id));
            }

            for exercise in &def.exercises {
                if exercise.id.is_empty() {
                    errors.push(format!("Workout '{}' has an exercise with empty ID", def.id));
                }
                // Set keys are "<exercise>_<index>" and stay unique per session
                if !exercise_ids.insert(exercise.id.as_str()) {
                    errors.push(format!("Duplicate exercise id '{}'", exercise.id));
                }
                if exercise.sets == 0 {
                    errors.push(format!(
                        "Exercise '{}' in '{}' has zero sets",
                        exercise.id, def.id
                    ));
                }
                if exercise.reps.trim().is_empty() {
                    errors.push(format!("Exercise '{}' has empty rep target", exercise.id));
                }
            }
        }

        if self.core_routine.len() != CoreSlot::EXERCISES as usize {
            errors.push(format!(
                "Core routine has {} exercises, expected {}",
                self.core_routine.len(),
                CoreSlot::EXERCISES
            ));
        }

        errors
    }
}
