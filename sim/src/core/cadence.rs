//! Guardrail tools applied to the member state.
//!
//! Each tool either mutates `SimState` and returns a human-readable message,
//! or returns the `Rejection` that blocked it. Cadence windows are measured
//! from the last recorded event of the same kind to the requested date.

use chrono::NaiveDate;

use crate::core::state::{PendingTest, PendingUpdate, SimState, TimeLogEntry, add_days, days_between};
use crate::core::types::{Action, ActionOutcome, CadenceKind, Rejection, UpdateKind};

/// Weekly hours the member commits to the health plan.
pub const WEEKLY_TIME_BUDGET_HOURS: f64 = 5.0;
pub const TIME_LOG_CAP: usize = 100;
/// Minimum spacing for single tests regardless of the configured interval.
pub const MIN_TEST_SPACING_DAYS: u32 = 80;
/// Tests shared on one date that count as a comprehensive panel.
pub const PANEL_MIN_TESTS: usize = 3;
pub const MAX_PENDING_UPDATES: usize = 3;
/// Upper bound for a single tracked time entry.
pub const MAX_TRACKED_HOURS: f64 = 24.0;
/// Team-applied panels are scheduled this many days after a cold start.
pub const INITIAL_PANEL_OFFSET_DAYS: i64 = 14;
/// The next panel is queued once the interval is this close.
pub const PANEL_LOOKAHEAD_DAYS: u32 = 7;

pub const COMPREHENSIVE_PANEL: [&str; 5] = [
    "Lipid panel",
    "HbA1c",
    "CRP",
    "Vitamin D",
    "Comprehensive Metabolic Panel",
];

const DIAGNOSTIC_ACTIVITY: &str = "diagnostic testing";

/// Test report the member shares once a pending test falls due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedReport {
    pub test_type: String,
    pub date: NaiveDate,
}

fn cadence_gate(
    state: &SimState,
    kind: CadenceKind,
    when: NaiveDate,
    min_days: u32,
) -> Result<(), Rejection> {
    let Some(last) = state.last_events.get(kind) else {
        return Ok(());
    };
    if days_between(last, when) < i64::from(min_days) {
        return Err(Rejection::Cadence {
            kind,
            interval_days: state.cadence.interval(kind),
            next_eligible: Some(add_days(last, i64::from(min_days))),
        });
    }
    Ok(())
}

/// Push `date` forward a week at a time until it leaves every travel week.
pub fn bump_past_travel(state: &SimState, mut date: NaiveDate) -> NaiveDate {
    while state.is_travel_week(date) {
        date = add_days(date, 7);
    }
    date
}

fn mark_test_due(state: &mut SimState, date: NaiveDate) {
    state.next_test_due_iso = Some(date);
    state.next_due.set(CadenceKind::Diagnostic, date);
}

pub fn propose_test(
    state: &mut SimState,
    test_type: &str,
    date: NaiveDate,
) -> Result<String, Rejection> {
    if !state
        .elyx_rules
        .allowed_test_panel
        .iter()
        .any(|allowed| allowed == test_type)
    {
        return Err(Rejection::TestNotAllowed(test_type.to_string()));
    }
    let interval = state.cadence.diagnostic_interval_days;
    let min_days = MIN_TEST_SPACING_DAYS.max(interval.saturating_sub(10));
    cadence_gate(state, CadenceKind::Diagnostic, date, min_days)?;

    let date = bump_past_travel(state, date);
    state
        .pending_tests
        .retain(|t| !(t.test_type == test_type && t.date_iso > date));
    if !state
        .pending_tests
        .iter()
        .any(|t| t.test_type == test_type && t.date_iso == date)
    {
        state.pending_tests.push(PendingTest {
            test_type: test_type.to_string(),
            date_iso: date,
        });
    }
    mark_test_due(state, date);
    track_time(state, 1.0, DIAGNOSTIC_ACTIVITY, date);
    Ok(format!("Scheduled {test_type} for {date}"))
}

pub fn propose_comprehensive_panel(
    state: &mut SimState,
    date: NaiveDate,
) -> Result<String, Rejection> {
    let interval = state.cadence.diagnostic_interval_days;
    cadence_gate(
        state,
        CadenceKind::Diagnostic,
        date,
        interval.saturating_sub(5),
    )?;

    let date = bump_past_travel(state, date);
    state.pending_tests.retain(|t| t.date_iso != date);
    state
        .pending_tests
        .extend(COMPREHENSIVE_PANEL.iter().map(|test_type| PendingTest {
            test_type: test_type.to_string(),
            date_iso: date,
        }));
    mark_test_due(state, date);
    track_time(state, 1.5, DIAGNOSTIC_ACTIVITY, date);
    Ok(format!("Scheduled comprehensive diagnostic panel for {date}"))
}

fn update_title(kind: UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Exercise => "Exercise",
        UpdateKind::Diet => "Diet",
        UpdateKind::Behavior => "Behavior",
    }
}

/// Schedule an exercise, diet, or behavior plan update.
pub fn schedule_update(
    state: &mut SimState,
    kind: UpdateKind,
    date: NaiveDate,
    reason: &str,
) -> Result<String, Rejection> {
    let cadence = kind.cadence();
    let interval = state.cadence.interval(cadence);
    cadence_gate(state, cadence, date, interval.saturating_sub(2))?;

    state.next_due.set(cadence, date);
    let pending = state.pending_updates_mut(kind);
    if pending.len() >= MAX_PENDING_UPDATES {
        pending.sort_by(|a, b| b.date_iso.cmp(&a.date_iso));
        pending.truncate(MAX_PENDING_UPDATES - 1);
    }
    if !pending
        .iter()
        .any(|p| p.date_iso == date && p.reason == reason)
    {
        pending.push(PendingUpdate {
            date_iso: date,
            reason: reason.to_string(),
        });
    }
    track_time(state, 0.5, &format!("{} planning", kind.as_str()), date);
    Ok(format!(
        "{} update planned for {date} ({reason})",
        update_title(kind)
    ))
}

/// Hours reported by the model must be positive, finite and fit in a day.
pub fn check_tracked_hours(hours: f64) -> Result<(), Rejection> {
    if hours.is_finite() && hours > 0.0 && hours <= MAX_TRACKED_HOURS {
        Ok(())
    } else {
        Err(Rejection::InvalidHours(hours.to_string()))
    }
}

/// Record hours against the weekly budget and the rolling time log.
pub fn track_time(state: &mut SimState, hours: f64, activity: &str, date: NaiveDate) -> String {
    let key = activity.to_lowercase().replace(' ', "_");
    *state
        .weekly_time_commitment
        .hours
        .entry(key)
        .or_insert(0.0) += hours;

    state.time_commitment_log.push(TimeLogEntry {
        date_iso: date,
        hours,
        activity: activity.to_string(),
    });
    let overflow = state
        .time_commitment_log
        .len()
        .saturating_sub(TIME_LOG_CAP);
    state.time_commitment_log.drain(..overflow);

    let used = state.hours_used_this_week();
    let remaining = (WEEKLY_TIME_BUDGET_HOURS - used).max(0.0);
    format!(
        "Tracked {hours}h for {activity}. {used:.1}h used this week, {remaining:.1}h remaining."
    )
}

/// Share the report for pending tests dated on or before `today`.
///
/// Three or more tests on the earliest due date are shared together as a
/// comprehensive panel; otherwise one test is shared per call.
pub fn share_due_test_report(state: &mut SimState, today: NaiveDate) -> Option<SharedReport> {
    let due_date = state
        .pending_tests
        .iter()
        .filter(|t| t.date_iso <= today)
        .map(|t| t.date_iso)
        .min()?;
    let on_date = state
        .pending_tests
        .iter()
        .filter(|t| t.date_iso == due_date)
        .count();

    let test_type = if on_date >= PANEL_MIN_TESTS {
        state.pending_tests.retain(|t| t.date_iso != due_date);
        "Comprehensive Panel".to_string()
    } else {
        let idx = state
            .pending_tests
            .iter()
            .position(|t| t.date_iso == due_date)?;
        state.pending_tests.remove(idx).test_type
    };

    state.last_events.set(CadenceKind::Diagnostic, today);
    track_time(state, 1.0, DIAGNOSTIC_ACTIVITY, today);
    Some(SharedReport {
        test_type,
        date: today,
    })
}

/// Apply an Elyx action, then simulate whether the member follows it.
///
/// `roll` is a uniform sample in `[0, 1)`; the member follows when it falls
/// below the adherence rate. Time tracking is bookkeeping and always lands.
pub fn apply_action(
    state: &mut SimState,
    action: &Action,
    today: NaiveDate,
    roll: f64,
) -> ActionOutcome {
    let scheduled = match action {
        Action::ProposeTest {
            test_type,
            date_iso,
        } => propose_test(state, test_type, date_iso.unwrap_or(today)),
        Action::ProposeComprehensivePanel { date_iso } => {
            propose_comprehensive_panel(state, date_iso.unwrap_or(today))
        }
        Action::ScheduleExerciseUpdate { date_iso, reason } => {
            schedule_update(state, UpdateKind::Exercise, date_iso.unwrap_or(today), reason)
        }
        Action::ScheduleDietUpdate { date_iso, reason } => {
            schedule_update(state, UpdateKind::Diet, date_iso.unwrap_or(today), reason)
        }
        Action::ScheduleBehaviorUpdate { date_iso, reason } => {
            schedule_update(state, UpdateKind::Behavior, date_iso.unwrap_or(today), reason)
        }
        Action::TrackTimeCommitment { hours, activity } => {
            return match check_tracked_hours(*hours) {
                Ok(()) => ActionOutcome::Tracked(track_time(state, *hours, activity, today)),
                Err(rejection) => ActionOutcome::Rejected(rejection),
            };
        }
    };
    let message = match scheduled {
        Ok(message) => message,
        Err(rejection) => return ActionOutcome::Rejected(rejection),
    };

    if roll >= state.member.adherence_rate {
        state.recent_non_follow_events += 1;
        return ActionOutcome::NotFollowed;
    }
    if let Some(kind) = action.update_kind() {
        state
            .last_events
            .set(kind.cadence(), action.date().unwrap_or(today));
    }
    ActionOutcome::Applied(message)
}

/// Week-start diagnostic check.
///
/// With no diagnostic on record, an initial panel is queued two weeks out.
/// Otherwise the next panel is queued once the interval is within a week.
/// Nothing is queued when a test is already pending for the target date.
pub fn diagnostic_check(state: &mut SimState, today: NaiveDate) -> Result<Option<String>, Rejection> {
    let target = match state.last_events.diagnostic_test {
        None => {
            if !state.pending_tests.is_empty() {
                return Ok(None);
            }
            add_days(today, INITIAL_PANEL_OFFSET_DAYS)
        }
        Some(last) => {
            let interval = state.cadence.diagnostic_interval_days;
            let since = days_between(last, today);
            if since < i64::from(interval.saturating_sub(PANEL_LOOKAHEAD_DAYS)) {
                return Ok(None);
            }
            add_days(last, i64::from(interval)).max(today)
        }
    };
    let target = bump_past_travel(state, target);
    if state.pending_tests.iter().any(|t| t.date_iso == target) {
        return Ok(None);
    }
    propose_comprehensive_panel(state, target).map(Some)
}

/// Week-end enforcement: anything overdue is scheduled by the team.
///
/// Returns one message per programmatic action, each to be logged as
/// `[CADENCE_APPLIED]`.
pub fn enforce_week_boundary(state: &mut SimState, today: NaiveDate) -> Vec<String> {
    let mut applied = Vec::new();
    for kind in UpdateKind::ALL {
        let cadence = kind.cadence();
        let due = state
            .last_events
            .get(cadence)
            .map(|last| add_days(last, i64::from(state.cadence.interval(cadence))));
        if due.is_some_and(|due| due > today) {
            continue;
        }
        if let Ok(message) = schedule_update(state, kind, today, "cadence due") {
            state.last_events.set(cadence, today);
            applied.push(message);
        }
    }

    let diagnostic_due = match state.last_events.diagnostic_test {
        Some(last) => Some(add_days(
            last,
            i64::from(state.cadence.diagnostic_interval_days),
        )),
        None => state.next_test_due_iso,
    };
    if state.pending_tests.is_empty()
        && diagnostic_due.is_some_and(|due| due <= today)
    {
        if let Ok(message) = propose_comprehensive_panel(state, today) {
            applied.push(message);
        }
    }
    applied
}
