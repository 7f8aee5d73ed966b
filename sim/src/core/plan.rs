//! Weekly exercise plans and their progression.

use chrono::NaiveDate;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    Cardio,
    Strength,
    Mobility,
    Sleep,
    Stress,
}

impl Focus {
    pub const ALL: [Focus; 5] = [
        Focus::Cardio,
        Focus::Strength,
        Focus::Mobility,
        Focus::Sleep,
        Focus::Stress,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedExercise {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub duration_min: u32,
    pub sessions_per_week: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub week_start: NaiveDate,
    pub focus: Focus,
    pub exercises: Vec<PlannedExercise>,
    pub diet_focus: String,
    pub note: String,
    #[serde(default)]
    pub travel_adapted: bool,
}

impl WeeklyPlan {
    /// Planned hours across all sessions.
    pub fn weekly_hours(&self) -> f64 {
        let minutes: u32 = self
            .exercises
            .iter()
            .map(|e| e.duration_min * e.sessions_per_week)
            .sum();
        f64::from(minutes) / 60.0
    }
}

const TRAVEL_NOTE: &str =
    "Travel-friendly: reduce duration, replace gym with hotel room bodyweight moves.";
const CLIMATE_NOTE: &str = "Adapted for Singapore's climate.";
const PLAN_CLIMATE_NOTE: &str = "Plan adapted for Singapore's climate.";

/// Progression above this adherence; regression below `REGRESS_BELOW`.
pub const PROGRESS_FROM: f64 = 0.55;
pub const REGRESS_BELOW: f64 = 0.45;
const SESSION_STEP_CHANCE: f64 = 0.3;

fn exercise(name: &str, kind: &str, duration_min: u32, sessions_per_week: u32) -> PlannedExercise {
    PlannedExercise {
        name: name.to_string(),
        kind: kind.to_string(),
        duration_min,
        sessions_per_week,
    }
}

/// Build a fresh plan for `focus`, halving durations on travel weeks.
pub fn create_weekly_plan(focus: Focus, week_start: NaiveDate, travel_week: bool) -> WeeklyPlan {
    let (exercises, diet_focus) = match focus {
        Focus::Cardio => (
            vec![
                exercise("Brisk walk", "cardio", 30, 4),
                exercise("Short run intervals", "cardio", 20, 1),
            ],
            "increase whole grains and fruit",
        ),
        Focus::Strength => (
            vec![
                exercise("Bodyweight circuit", "strength", 20, 3),
                exercise("Core routine", "strength", 10, 2),
            ],
            "increase protein at breakfast",
        ),
        Focus::Mobility => (
            vec![exercise("Yoga / mobility mix", "mobility", 25, 4)],
            "hydrate and monitor sodium",
        ),
        Focus::Sleep => (
            vec![exercise("Evening wind-down", "habit", 15, 7)],
            "sleep-supporting meals; avoid late caffeine",
        ),
        Focus::Stress => (
            vec![exercise("Mindful breathing", "stress", 10, 7)],
            "reduce stimulants; increase magnesium-rich foods",
        ),
    };
    let mut plan = WeeklyPlan {
        week_start,
        focus,
        exercises,
        diet_focus: diet_focus.to_string(),
        note: String::new(),
        travel_adapted: false,
    };
    if travel_week {
        adapt_for_travel(&mut plan);
    }
    plan.note = if plan.note.is_empty() {
        PLAN_CLIMATE_NOTE.to_string()
    } else {
        format!("{} {CLIMATE_NOTE}", plan.note)
    };
    plan
}

fn adapt_for_travel(plan: &mut WeeklyPlan) {
    for ex in &mut plan.exercises {
        ex.duration_min = (ex.duration_min / 2).max(10);
    }
    plan.note = TRAVEL_NOTE.to_string();
    plan.travel_adapted = true;
}

/// Carry `previous` into `week_start`, nudging load by adherence.
pub fn progress_plan<R: Rng + ?Sized>(
    previous: &WeeklyPlan,
    week_start: NaiveDate,
    adherence: f64,
    rng: &mut R,
) -> WeeklyPlan {
    let mut plan = previous.clone();
    plan.week_start = week_start;
    if adherence >= PROGRESS_FROM {
        for ex in &mut plan.exercises {
            ex.duration_min = (f64::from(ex.duration_min) * 1.1).round() as u32;
            if rng.gen_bool(SESSION_STEP_CHANCE) {
                ex.sessions_per_week = (ex.sessions_per_week + 1).min(7);
            }
        }
    } else if adherence < REGRESS_BELOW {
        for ex in &mut plan.exercises {
            ex.duration_min = ((f64::from(ex.duration_min) * 0.9) as u32).max(5);
            if rng.gen_bool(SESSION_STEP_CHANCE) {
                ex.sessions_per_week = ex.sessions_per_week.saturating_sub(1).max(1);
            }
        }
    }
    plan
}

/// Plan for the coming week.
///
/// The first week, a requested refresh (an exercise update landed), or the
/// week after a travel-adapted plan start fresh. Otherwise the previous plan
/// progresses and is travel-adapted again when needed.
pub fn next_plan<R: Rng + ?Sized>(
    previous: Option<&WeeklyPlan>,
    week_start: NaiveDate,
    travel_week: bool,
    adherence: f64,
    refresh: bool,
    rng: &mut R,
) -> WeeklyPlan {
    match previous {
        Some(prev) if !refresh && !prev.travel_adapted => {
            let mut plan = progress_plan(prev, week_start, adherence, rng);
            if travel_week {
                adapt_for_travel(&mut plan);
                plan.note = format!("{} {CLIMATE_NOTE}", plan.note);
            }
            plan
        }
        Some(prev) if !refresh => create_weekly_plan(prev.focus, week_start, travel_week),
        _ => {
            let focus = Focus::ALL.choose(rng).copied().unwrap_or(Focus::Cardio);
            create_weekly_plan(focus, week_start, travel_week)
        }
    }
}
