//! Persona and KPI state carried across simulated days.
//!
//! `SimState` is the single mutable record the guardrail engine works on. It is
//! persisted as JSON after every simulated day and embedded in the export.
//! Every field has a serde default so partial seed files load.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::core::plan::WeeklyPlan;
use crate::core::types::{CadenceKind, UpdateKind};

/// Travel weeks span seven days from the listed start date.
pub const TRAVEL_WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimState {
    pub date_iso: NaiveDate,
    /// Run number of the export that last touched this state.
    pub run_id: Option<u32>,
    pub member: Member,
    pub kpis: Kpis,
    pub elyx_rules: ElyxRules,
    pub cadence: Cadence,
    pub last_events: EventDates,
    pub next_due: EventDates,
    pub next_test_due_iso: Option<NaiveDate>,
    pub pending_tests: Vec<PendingTest>,
    pub pending_exercise_updates: Vec<PendingUpdate>,
    pub pending_diet_updates: Vec<PendingUpdate>,
    pub pending_behavior_updates: Vec<PendingUpdate>,
    pub plan: PlanHistory,
    pub recent_non_follow_events: u32,
    pub persona_snapshot: PersonaSnapshot,
    pub weekly_time_commitment: WeeklyTime,
    pub time_commitment_log: Vec<TimeLogEntry>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            date_iso: seed_date(2025, 6, 2),
            run_id: None,
            member: Member::default(),
            kpis: Kpis::default(),
            elyx_rules: ElyxRules::default(),
            cadence: Cadence::default(),
            last_events: EventDates::default(),
            next_due: EventDates::default(),
            next_test_due_iso: None,
            pending_tests: Vec::new(),
            pending_exercise_updates: Vec::new(),
            pending_diet_updates: Vec::new(),
            pending_behavior_updates: Vec::new(),
            plan: PlanHistory::default(),
            recent_non_follow_events: 0,
            persona_snapshot: PersonaSnapshot::default(),
            weekly_time_commitment: WeeklyTime::default(),
            time_commitment_log: Vec::new(),
        }
    }
}

fn seed_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

impl SimState {
    /// Move the simulated date forward by one day.
    ///
    /// Due dates are schedule-driven and are left untouched.
    pub fn advance_day(&mut self) {
        if let Some(next) = self.date_iso.succ_opt() {
            self.date_iso = next;
        }
    }

    pub fn is_travel_week(&self, date: NaiveDate) -> bool {
        self.member.travel_weeks.iter().any(|start| {
            let offset = (date - *start).num_days();
            (0..TRAVEL_WEEK_DAYS).contains(&offset)
        })
    }

    pub fn pending_updates(&self, kind: UpdateKind) -> &Vec<PendingUpdate> {
        match kind {
            UpdateKind::Exercise => &self.pending_exercise_updates,
            UpdateKind::Diet => &self.pending_diet_updates,
            UpdateKind::Behavior => &self.pending_behavior_updates,
        }
    }

    pub fn pending_updates_mut(&mut self, kind: UpdateKind) -> &mut Vec<PendingUpdate> {
        match kind {
            UpdateKind::Exercise => &mut self.pending_exercise_updates,
            UpdateKind::Diet => &mut self.pending_diet_updates,
            UpdateKind::Behavior => &mut self.pending_behavior_updates,
        }
    }

    /// Hours tracked against the weekly time budget so far.
    pub fn hours_used_this_week(&self) -> f64 {
        self.weekly_time_commitment.hours.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub name: String,
    pub location: String,
    pub condition: String,
    pub age: u32,
    /// Probability in `[0, 1]` that the member follows a scheduled step.
    pub adherence_rate: f64,
    /// Start dates of travel weeks.
    pub travel_weeks: Vec<NaiveDate>,
}

impl Default for Member {
    fn default() -> Self {
        Self {
            name: "Rohan Patel".to_string(),
            location: "Singapore".to_string(),
            condition: "hypertension".to_string(),
            age: 37,
            adherence_rate: 0.5,
            travel_weeks: vec![
                seed_date(2025, 6, 23),
                seed_date(2025, 7, 21),
                seed_date(2025, 8, 18),
                seed_date(2025, 9, 8),
            ],
        }
    }
}

/// Tracked member KPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kpi {
    Hrv,
    Vo2max,
    CholesterolTotal,
    SleepQuality,
    StressResilience,
}

impl Kpi {
    pub const ALL: [Kpi; 5] = [
        Kpi::Hrv,
        Kpi::Vo2max,
        Kpi::CholesterolTotal,
        Kpi::SleepQuality,
        Kpi::StressResilience,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kpi::Hrv => "hrv",
            Kpi::Vo2max => "vo2max",
            Kpi::CholesterolTotal => "cholesterol_total",
            Kpi::SleepQuality => "sleep_quality",
            Kpi::StressResilience => "stress_resilience",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Kpis {
    pub hrv: i32,
    pub vo2max: i32,
    pub cholesterol_total: i32,
    pub sleep_quality: i32,
    pub stress_resilience: i32,
}

impl Default for Kpis {
    fn default() -> Self {
        Self {
            hrv: 42,
            vo2max: 36,
            cholesterol_total: 212,
            sleep_quality: 60,
            stress_resilience: 55,
        }
    }
}

impl Kpis {
    pub fn get(&self, kpi: Kpi) -> i32 {
        match kpi {
            Kpi::Hrv => self.hrv,
            Kpi::Vo2max => self.vo2max,
            Kpi::CholesterolTotal => self.cholesterol_total,
            Kpi::SleepQuality => self.sleep_quality,
            Kpi::StressResilience => self.stress_resilience,
        }
    }

    pub fn set(&mut self, kpi: Kpi, value: i32) {
        match kpi {
            Kpi::Hrv => self.hrv = value,
            Kpi::Vo2max => self.vo2max = value,
            Kpi::CholesterolTotal => self.cholesterol_total = value,
            Kpi::SleepQuality => self.sleep_quality = value,
            Kpi::StressResilience => self.stress_resilience = value,
        }
    }
}

pub const DEFAULT_TEST_PANEL: [&str; 7] = [
    "Lipid panel",
    "HbA1c",
    "CRP",
    "Vitamin D",
    "CBC",
    "Comprehensive Metabolic Panel",
    "Thyroid panel",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElyxRules {
    pub allowed_test_panel: Vec<String>,
}

impl Default for ElyxRules {
    fn default() -> Self {
        Self {
            allowed_test_panel: DEFAULT_TEST_PANEL.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Cadence intervals in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cadence {
    pub exercise_update_days: u32,
    pub diet_update_days: u32,
    pub behavior_update_days: u32,
    pub diagnostic_interval_days: u32,
    pub max_curiosity_chats_per_week: u32,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            exercise_update_days: 14,
            diet_update_days: 14,
            behavior_update_days: 14,
            diagnostic_interval_days: 90,
            max_curiosity_chats_per_week: 5,
        }
    }
}

impl Cadence {
    pub fn interval(&self, kind: CadenceKind) -> u32 {
        match kind {
            CadenceKind::Diagnostic => self.diagnostic_interval_days,
            CadenceKind::Exercise => self.exercise_update_days,
            CadenceKind::Diet => self.diet_update_days,
            CadenceKind::Behavior => self.behavior_update_days,
        }
    }
}

/// Per-kind event dates, used both for last occurrences and next due dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDates {
    pub diagnostic_test: Option<NaiveDate>,
    pub exercise_update: Option<NaiveDate>,
    pub diet_update: Option<NaiveDate>,
    pub behavior_update: Option<NaiveDate>,
}

impl EventDates {
    pub fn get(&self, kind: CadenceKind) -> Option<NaiveDate> {
        match kind {
            CadenceKind::Diagnostic => self.diagnostic_test,
            CadenceKind::Exercise => self.exercise_update,
            CadenceKind::Diet => self.diet_update,
            CadenceKind::Behavior => self.behavior_update,
        }
    }

    pub fn set(&mut self, kind: CadenceKind, date: NaiveDate) {
        let slot = match kind {
            CadenceKind::Diagnostic => &mut self.diagnostic_test,
            CadenceKind::Exercise => &mut self.exercise_update,
            CadenceKind::Diet => &mut self.diet_update,
            CadenceKind::Behavior => &mut self.behavior_update,
        };
        *slot = Some(date);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTest {
    pub test_type: String,
    pub date_iso: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub date_iso: NaiveDate,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanHistory {
    pub history: Vec<WeeklyPlan>,
}

/// Member sentiment toward the Elyx team, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSnapshot {
    pub trust: i32,
    pub engagement: i32,
    pub frustration: i32,
}

impl Default for PersonaSnapshot {
    fn default() -> Self {
        Self {
            trust: 55,
            engagement: 52,
            frustration: 22,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyTime {
    /// Hours per activity key (lowercase, spaces replaced by underscores).
    pub hours: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLogEntry {
    pub date_iso: NaiveDate,
    pub hours: f64,
    pub activity: String,
}

/// Whole days from `from` to `to` (negative when `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date` shifted by `days`, saturating at the calendar bounds.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(TimeDelta::days(days))
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn partial_seed_fills_defaults() {
        let state: SimState = serde_json::from_str(
            r#"{"date_iso":"2025-01-06","member":{"adherence_rate":0.7},"kpis":{"hrv":50}}"#,
        )
        .expect("parse");
        assert_eq!(state.date_iso, date(2025, 1, 6));
        assert_eq!(state.member.adherence_rate, 0.7);
        assert_eq!(state.member.name, "Rohan Patel");
        assert_eq!(state.kpis.hrv, 50);
        assert_eq!(state.kpis.vo2max, 36);
        assert_eq!(state.cadence.diagnostic_interval_days, 90);
        assert_eq!(state.persona_snapshot, PersonaSnapshot::default());
        assert_eq!(state.elyx_rules.allowed_test_panel.len(), 7);
    }

    #[test]
    fn advance_day_keeps_due_dates() {
        let mut state = SimState {
            date_iso: date(2025, 2, 28),
            next_test_due_iso: Some(date(2025, 3, 1)),
            ..SimState::default()
        };
        state.next_due.set(CadenceKind::Exercise, date(2025, 3, 1));

        state.advance_day();

        assert_eq!(state.date_iso, date(2025, 3, 1));
        assert_eq!(state.next_test_due_iso, Some(date(2025, 3, 1)));
        assert_eq!(state.next_due.exercise_update, Some(date(2025, 3, 1)));
    }

    #[test]
    fn travel_week_covers_seven_days_from_start() {
        let mut state = SimState::default();
        state.member.travel_weeks = vec![date(2025, 6, 23)];

        assert!(!state.is_travel_week(date(2025, 6, 22)));
        assert!(state.is_travel_week(date(2025, 6, 23)));
        assert!(state.is_travel_week(date(2025, 6, 29)));
        assert!(!state.is_travel_week(date(2025, 6, 30)));
    }
}
