//! Decision extraction and the Timeline JSON records built from chat.
//!
//! Decisions come from ACTION lines in Elyx messages. Their outcome is read
//! back from the System notes that follow in the same turn group, so the
//! summary only depends on the transcript.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::drift::nudges_for;
use crate::core::persona::parse_action;
use crate::core::state::{Kpi, Kpis, PersonaSnapshot};
use crate::core::schedule::TEST_REPORT_TEXT;
use crate::core::text::clip;
use crate::core::types::{Action, ChatMessage, ParsedAction, Speaker, UpdateKind};

pub const APPLIED_PREFIX: &str = "[Action applied]";
pub const REJECTED_PREFIX: &str = "[Action rejected]";
pub const NOT_FOLLOWED_NOTE: &str =
    "[Action not followed] Member did not adhere to the proposed plan.";
pub const CADENCE_APPLIED_PREFIX: &str = "[CADENCE_APPLIED]";

pub const DECISION_CONFIDENCE: f64 = 0.7;
const TRIGGER_CHARS: usize = 120;
const RATIONALE_CHARS: usize = 160;
const PROACTIVE_TRIGGER: &str = "Proactive check-in on plan progress and due cadence items";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Applied,
    NotFollowed,
    Rejected,
    /// No System note recorded a result.
    Proposed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision_type: String,
    pub title: String,
    pub trigger: String,
    pub rationale: String,
    pub affected_kpis: Vec<Kpi>,
    pub linked_message_ids: Vec<String>,
    pub confidence: f64,
    pub outcome: DecisionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDecisions {
    pub date_iso: NaiveDate,
    pub decisions: Vec<DecisionRecord>,
    pub notes: Option<String>,
}

/// Pull decision records out of one day's messages.
pub fn extract_daily_decisions(date_iso: NaiveDate, messages: &[ChatMessage]) -> DailyDecisions {
    let mut decisions = Vec::new();
    for (idx, msg) in messages.iter().enumerate() {
        if !msg.speaker.is_elyx() {
            continue;
        }
        let Some(parsed) = parse_action(&msg.text) else {
            continue;
        };

        let trigger_msg = messages[..idx]
            .iter()
            .rev()
            .take_while(|m| m.turn_group == msg.turn_group)
            .find(|m| m.speaker == Speaker::Member);
        let notes: Vec<&ChatMessage> = messages[idx + 1..]
            .iter()
            .take_while(|m| m.turn_group == msg.turn_group && m.speaker == Speaker::System)
            .collect();

        let mut linked = Vec::new();
        if let Some(trigger) = trigger_msg {
            linked.push(trigger.id.clone());
        }
        linked.push(msg.id.clone());
        linked.extend(notes.iter().map(|n| n.id.clone()));

        let trigger = match trigger_msg {
            Some(m) => format!("Member: {}", clip(&m.text, TRIGGER_CHARS)),
            None => PROACTIVE_TRIGGER.to_string(),
        };

        let (title, affected_kpis, reason) = match &parsed {
            ParsedAction::Valid(action) => describe(action),
            ParsedAction::Unsupported { kind } => {
                (format!("Unsupported action: {kind}"), Vec::new(), String::new())
            }
            ParsedAction::Malformed { kind, reason } => {
                (format!("Malformed action: {kind}"), Vec::new(), reason.clone())
            }
        };
        let rationale = if reason.trim().is_empty() {
            clip(&bubble_text(&msg.text), RATIONALE_CHARS)
        } else {
            clip(&reason, RATIONALE_CHARS)
        };
        let outcome = match parsed {
            ParsedAction::Unsupported { .. } | ParsedAction::Malformed { .. } => {
                DecisionOutcome::Rejected
            }
            ParsedAction::Valid(_) => outcome_from_notes(&notes),
        };

        decisions.push(DecisionRecord {
            decision_type: "ACTION".to_string(),
            title,
            trigger,
            rationale,
            affected_kpis,
            linked_message_ids: linked,
            confidence: DECISION_CONFIDENCE,
            outcome,
        });
    }

    let reports = messages
        .iter()
        .filter(|m| m.speaker == Speaker::Member && m.text == TEST_REPORT_TEXT)
        .count();
    let notes = (reports > 0).then(|| "Member shared a test report.".to_string());

    DailyDecisions {
        date_iso,
        decisions,
        notes,
    }
}

fn describe(action: &Action) -> (String, Vec<Kpi>, String) {
    match action {
        Action::ProposeTest { test_type, .. } => (
            format!("Diagnostic test: {test_type}"),
            vec![Kpi::CholesterolTotal],
            String::new(),
        ),
        Action::ProposeComprehensivePanel { .. } => (
            "Comprehensive test panel".to_string(),
            vec![Kpi::CholesterolTotal, Kpi::Hrv],
            String::new(),
        ),
        Action::ScheduleExerciseUpdate { reason, .. } => plan_update(UpdateKind::Exercise, reason),
        Action::ScheduleDietUpdate { reason, .. } => plan_update(UpdateKind::Diet, reason),
        Action::ScheduleBehaviorUpdate { reason, .. } => plan_update(UpdateKind::Behavior, reason),
        Action::TrackTimeCommitment { hours, activity } => (
            format!("Time commitment: {activity}"),
            Vec::new(),
            format!("{hours}h logged against the weekly budget"),
        ),
    }
}

fn plan_update(kind: UpdateKind, reason: &str) -> (String, Vec<Kpi>, String) {
    let kpis = nudges_for(kind).into_iter().map(|n| n.kpi).collect();
    (
        format!("{} plan update", capitalize(kind.as_str())),
        kpis,
        reason.to_string(),
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn bubble_text(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().to_uppercase().starts_with("ACTION:"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn outcome_from_notes(notes: &[&ChatMessage]) -> DecisionOutcome {
    for note in notes {
        if note.text.starts_with(APPLIED_PREFIX) {
            return DecisionOutcome::Applied;
        }
        if note.text == NOT_FOLLOWED_NOTE {
            return DecisionOutcome::NotFollowed;
        }
        if note.text.starts_with(REJECTED_PREFIX) || note.text.to_lowercase().contains("cadence") {
            return DecisionOutcome::Rejected;
        }
    }
    DecisionOutcome::Proposed
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalMetrics {
    pub doctor_time_hours: f64,
    pub coach_time_hours: f64,
    pub diet_updates: u32,
    pub behavior_updates: u32,
    pub non_follow_events: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub decisions: Vec<DecisionRecord>,
    pub persona_state: PersonaSnapshot,
    pub internal_metrics: InternalMetrics,
    pub member_kpis_end: Kpis,
}

/// Roll a week's decisions into the weekly summary.
///
/// Doctor time is booked when any test was proposed, coach time is a full hour
/// when exercise was touched and half an hour otherwise.
pub fn summarize_week(
    week_start: NaiveDate,
    decisions: Vec<DecisionRecord>,
    persona_state: PersonaSnapshot,
    kpis_end: Kpis,
) -> WeeklySummary {
    let titled = |needle: &str| {
        decisions
            .iter()
            .filter(|d| d.title.to_lowercase().contains(needle))
            .count()
    };
    let internal_metrics = InternalMetrics {
        doctor_time_hours: if titled("test") > 0 { 0.5 } else { 0.0 },
        coach_time_hours: if titled("exercise") > 0 { 1.0 } else { 0.5 },
        diet_updates: titled("diet") as u32,
        behavior_updates: titled("behavior") as u32,
        non_follow_events: decisions
            .iter()
            .filter(|d| d.outcome == DecisionOutcome::NotFollowed)
            .count() as u32,
    };
    WeeklySummary {
        week_start,
        decisions,
        persona_state,
        internal_metrics,
        member_kpis_end: kpis_end,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Decision,
    KpiDrift,
    TestReport,
    CadenceApplied,
    Plan,
    DiagnosticScheduled,
}

/// One state change in the Timeline JSON, tied to the messages behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub date_iso: NaiveDate,
    pub kind: TimelineKind,
    pub summary: String,
    pub message_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpis: Option<Kpis>,
}

impl TimelineEntry {
    pub fn new(
        date_iso: NaiveDate,
        kind: TimelineKind,
        summary: impl Into<String>,
        message_ids: Vec<String>,
    ) -> Self {
        Self {
            date_iso,
            kind,
            summary: summary.into(),
            message_ids,
            kpis: None,
        }
    }

    pub fn decision(date_iso: NaiveDate, record: &DecisionRecord) -> Self {
        let outcome = match record.outcome {
            DecisionOutcome::Applied => "applied",
            DecisionOutcome::NotFollowed => "not followed",
            DecisionOutcome::Rejected => "rejected",
            DecisionOutcome::Proposed => "proposed",
        };
        Self::new(
            date_iso,
            TimelineKind::Decision,
            format!("{} ({outcome})", record.title),
            record.linked_message_ids.clone(),
        )
    }

    pub fn kpi_drift(date_iso: NaiveDate, kpis: Kpis, message_ids: Vec<String>) -> Self {
        Self {
            kpis: Some(kpis),
            ..Self::new(date_iso, TimelineKind::KpiDrift, "Weekly KPI drift applied", message_ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Persona;
    use crate::test_support::{date, message};

    fn day() -> Vec<ChatMessage> {
        vec![
            message("m1", Speaker::Member, 3, "Flight to Jakarta Tuesday, can I swap the gym day?"),
            message(
                "m2",
                Speaker::Elyx(Persona::Rachel),
                3,
                "Swap to hotel circuits.\nACTION: {\"type\":\"schedule_exercise_update\",\"reason\":\"travel swap\"}",
            ),
            message("m3", Speaker::System, 3, "[Action applied] Exercise update planned for 2025-06-03 (travel swap)"),
            message(
                "m4",
                Speaker::Elyx(Persona::Carla),
                3,
                "Less sodium this week.\nACTION: {\"type\":\"schedule_diet_update\"}",
            ),
            message("m5", Speaker::System, 3, NOT_FOLLOWED_NOTE),
        ]
    }

    #[test]
    fn decisions_link_trigger_reply_and_outcome() {
        let daily = extract_daily_decisions(date(2025, 6, 3), &day());
        assert_eq!(daily.decisions.len(), 2);

        let exercise = &daily.decisions[0];
        assert_eq!(exercise.title, "Exercise plan update");
        assert_eq!(exercise.rationale, "travel swap");
        assert_eq!(exercise.linked_message_ids, vec!["m1", "m2", "m3"]);
        assert_eq!(exercise.outcome, DecisionOutcome::Applied);
        assert_eq!(exercise.affected_kpis, vec![Kpi::Hrv, Kpi::StressResilience]);
        assert!(exercise.trigger.starts_with("Member: Flight to Jakarta"));

        let diet = &daily.decisions[1];
        assert_eq!(diet.outcome, DecisionOutcome::NotFollowed);
        assert_eq!(diet.rationale, "Less sodium this week.");
        assert_eq!(diet.linked_message_ids, vec!["m1", "m4", "m5"]);
        assert_eq!(daily.notes, None);
    }

    #[test]
    fn proactive_and_rejected_decisions() {
        let messages = vec![
            message(
                "e1",
                Speaker::Elyx(Persona::DrWarren),
                7,
                "Quarterly labs.\nACTION: {\"type\":\"propose_test\",\"test_type\":\"CRP\"}",
            ),
            message("s1", Speaker::System, 7, "System: cadence synchronized; next scheduled action is on 2025-06-10."),
            message("e2", Speaker::Elyx(Persona::Ruby), 8, "Noted.\nACTION: {\"type\":\"send_flowers\"}"),
            message("e3", Speaker::Elyx(Persona::Ruby), 9, "All good, no action today."),
            message("r1", Speaker::Member, 9, "Test report sent."),
        ];
        let daily = extract_daily_decisions(date(2025, 6, 10), &messages);
        assert_eq!(daily.decisions.len(), 2);
        assert_eq!(daily.decisions[0].title, "Diagnostic test: CRP");
        assert_eq!(daily.decisions[0].trigger, PROACTIVE_TRIGGER);
        assert_eq!(daily.decisions[0].outcome, DecisionOutcome::Rejected);
        assert_eq!(daily.decisions[1].title, "Unsupported action: send_flowers");
        assert_eq!(daily.decisions[1].outcome, DecisionOutcome::Rejected);
        assert_eq!(daily.notes.as_deref(), Some("Member shared a test report."));
    }

    #[test]
    fn weekly_metrics_count_decisions() {
        let mut decisions = extract_daily_decisions(date(2025, 6, 3), &day()).decisions;
        decisions.extend(
            extract_daily_decisions(
                date(2025, 6, 4),
                &[message(
                    "e9",
                    Speaker::Elyx(Persona::DrWarren),
                    4,
                    "ACTION: {\"type\":\"propose_comprehensive_panel\"}",
                )],
            )
            .decisions,
        );

        let summary = summarize_week(
            date(2025, 6, 2),
            decisions,
            PersonaSnapshot::default(),
            Kpis::default(),
        );
        let metrics = summary.internal_metrics;
        assert_eq!(metrics.doctor_time_hours, 0.5);
        assert_eq!(metrics.coach_time_hours, 1.0);
        assert_eq!(metrics.diet_updates, 1);
        assert_eq!(metrics.behavior_updates, 0);
        assert_eq!(metrics.non_follow_events, 1);
        assert_eq!(summary.decisions.len(), 3);
    }

    #[test]
    fn quiet_week_books_half_hour_of_coaching() {
        let summary = summarize_week(date(2025, 6, 2), Vec::new(), PersonaSnapshot::default(), Kpis::default());
        assert_eq!(summary.internal_metrics.doctor_time_hours, 0.0);
        assert_eq!(summary.internal_metrics.coach_time_hours, 0.5);
    }

    #[test]
    fn timeline_entries_serialize_kind_and_optional_kpis() {
        let entry = TimelineEntry::new(date(2025, 6, 9), TimelineKind::CadenceApplied, "Diet update", vec!["x".into()]);
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["kind"], "cadence_applied");
        assert!(json.get("kpis").is_none());

        let drift = TimelineEntry::kpi_drift(date(2025, 6, 9), Kpis::default(), Vec::new());
        let json = serde_json::to_value(&drift).expect("serialize");
        assert_eq!(json["kpis"]["hrv"], 42);
    }
}
