//! Guardrail checks on raw Elyx output before it reaches the transcript.
//!
//! Validation runs on the raw model text, which still carries the PERSONA and
//! ACTION lines. The first failing rule wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::state::{DEFAULT_TEST_PANEL, SimState, add_days, days_between};
use crate::core::types::{CadenceKind, Rejection};

static PERSONA_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*PERSONA:\s*(Ruby|Dr\.?\s*Warren|Advik|Carla|Rachel|Neel)\s*$")
        .expect("persona line regex should be valid")
});

pub const MAX_BUBBLES: usize = 2;
pub const MAX_BUBBLE_WORDS: usize = 60;

pub const FORBIDDEN_ACTIONS: [&str; 6] = [
    "surgery",
    "inpatient_procedures",
    "hospital_admission",
    "chemotherapy",
    "biopsy",
    "organ_transplant",
];

const ORDER_WORDS: [&str; 7] = ["order", "schedule", "book", "propose", "arrange", "set up", "plan"];

/// Slack below the diagnostic interval inside which tests may be ordered.
const DIAGNOSTIC_SLACK_DAYS: u32 = 10;
/// Slack below the plan update interval.
const UPDATE_SLACK_DAYS: u32 = 2;

/// Check a raw Elyx reply against format, safety, and cadence rules.
pub fn validate_elyx_reply(raw: &str, state: &SimState) -> Result<(), Rejection> {
    let text = raw.trim();
    let low = text.to_lowercase();

    if !has_persona_line(text) {
        return Err(Rejection::MissingPersonaLine);
    }
    if !bubbles_ok(text) {
        return Err(Rejection::BubbleLimit);
    }
    if let Some(bad) = FORBIDDEN_ACTIONS
        .iter()
        .find(|bad| low.contains(&bad.replace('_', " ")))
    {
        return Err(Rejection::ForbiddenAction((*bad).to_string()));
    }
    if is_test_order_request(&low) {
        check_test_order(&low, state)?;
    }
    let has_action = low.contains("action:");
    if has_action {
        for (word, kind) in [
            ("exercise", CadenceKind::Exercise),
            ("diet", CadenceKind::Diet),
        ] {
            if low.contains(word) && (low.contains("update") || low.contains("plan")) {
                check_window(state, kind, UPDATE_SLACK_DAYS)?;
            }
        }
        for (found, expected) in [
            ("diet_update", "schedule_diet_update"),
            ("behavior_update", "schedule_behavior_update"),
        ] {
            if low.contains(found) && !low.contains(expected) {
                return Err(Rejection::MisnamedAction { expected, found });
            }
        }
    }
    Ok(())
}

fn has_persona_line(text: &str) -> bool {
    text.lines()
        .next()
        .is_some_and(|first| PERSONA_LINE_RE.is_match(first))
}

/// 1-2 content bubbles of at most 60 words, ignoring PERSONA/ACTION lines.
fn bubbles_ok(text: &str) -> bool {
    let bubbles: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let upper = line.to_uppercase();
            !upper.starts_with("PERSONA:") && !upper.starts_with("ACTION:")
        })
        .collect();
    (1..=MAX_BUBBLES).contains(&bubbles.len())
        && bubbles
            .iter()
            .all(|b| b.split_whitespace().count() <= MAX_BUBBLE_WORDS)
}

/// Only explicit proposals count as ordering a test.
fn is_test_order_request(low: &str) -> bool {
    let has_test_word = low.contains("test") || low.contains("panel") || low.contains("labs");
    let proposes = ORDER_WORDS.iter().any(|w| low.contains(w)) || low.contains("action:");
    has_test_word && proposes
}

fn check_test_order(low: &str, state: &SimState) -> Result<(), Rejection> {
    let allowed = &state.elyx_rules.allowed_test_panel;
    let on_panel = if allowed.is_empty() {
        DEFAULT_TEST_PANEL
            .iter()
            .any(|t| low.contains(&t.to_lowercase()))
    } else {
        allowed.iter().any(|t| low.contains(&t.to_lowercase()))
    };
    if !on_panel {
        return Err(Rejection::OffPanelTest);
    }
    // Within ten days of the quarterly mark counts as on schedule, which also
    // covers comprehensive panels booked around the quarter.
    check_window(state, CadenceKind::Diagnostic, DIAGNOSTIC_SLACK_DAYS)
}

fn check_window(state: &SimState, kind: CadenceKind, slack_days: u32) -> Result<(), Rejection> {
    let Some(last) = state.last_events.get(kind) else {
        return Ok(());
    };
    let interval = state.cadence.interval(kind);
    let min_days = i64::from(interval.saturating_sub(slack_days));
    if days_between(last, state.date_iso) < min_days {
        return Err(Rejection::Cadence {
            kind,
            interval_days: interval,
            next_eligible: Some(add_days(last, min_days)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, sample_state};

    fn reply(body: &str) -> String {
        format!("PERSONA: Ruby\n{body}")
    }

    #[test]
    fn requires_persona_first_line() {
        let state = sample_state();
        assert_eq!(
            validate_elyx_reply("Hi there\nPERSONA: Ruby", &state),
            Err(Rejection::MissingPersonaLine)
        );
        assert_eq!(
            validate_elyx_reply("Ruby: PERSONA: Ruby\nHi", &state),
            Err(Rejection::MissingPersonaLine)
        );
        assert_eq!(validate_elyx_reply("PERSONA: Dr Warren\nHi", &state), Ok(()));
    }

    #[test]
    fn limits_bubbles() {
        let state = sample_state();
        assert_eq!(
            validate_elyx_reply("PERSONA: Ruby\n\nACTION: {}", &state),
            Err(Rejection::BubbleLimit)
        );
        assert_eq!(
            validate_elyx_reply(&reply("one\ntwo\nthree"), &state),
            Err(Rejection::BubbleLimit)
        );
        let long = vec!["word"; MAX_BUBBLE_WORDS + 1].join(" ");
        assert_eq!(
            validate_elyx_reply(&reply(&long), &state),
            Err(Rejection::BubbleLimit)
        );
        assert_eq!(validate_elyx_reply(&reply("one\ntwo"), &state), Ok(()));
    }

    #[test]
    fn rejects_forbidden_actions() {
        let state = sample_state();
        assert_eq!(
            validate_elyx_reply(&reply("We could discuss a hospital admission."), &state),
            Err(Rejection::ForbiddenAction("hospital_admission".to_string()))
        );
    }

    #[test]
    fn test_orders_must_be_on_panel_and_on_cadence() {
        let mut state = sample_state();
        assert_eq!(
            validate_elyx_reply(&reply("Let's book a full body MRI test."), &state),
            Err(Rejection::OffPanelTest)
        );
        assert_eq!(
            validate_elyx_reply(&reply("Let's book a CRP test next week."), &state),
            Ok(())
        );

        state.date_iso = date(2025, 6, 2);
        state.last_events.diagnostic_test = Some(date(2025, 4, 1));
        let rejection = validate_elyx_reply(&reply("Let's book a CRP test."), &state)
            .expect_err("cadence");
        assert_eq!(rejection.to_string(), "CADENCE_DIAGNOSTIC: due every 90 days");

        state.date_iso = date(2025, 6, 22);
        assert_eq!(
            validate_elyx_reply(&reply("Time for the quarterly Lipid panel and HbA1c, plan below."), &state),
            Ok(())
        );
    }

    #[test]
    fn mentions_without_proposal_skip_test_rules() {
        let state = sample_state();
        assert_eq!(
            validate_elyx_reply(&reply("Your MRI test looked fine."), &state),
            Ok(())
        );
    }

    #[test]
    fn exercise_update_cadence_applies_with_action() {
        let mut state = sample_state();
        state.last_events.exercise_update = Some(state.date_iso);
        let text = reply(
            "New exercise plan below.\nACTION: {\"type\":\"schedule_exercise_update\",\"reason\":\"progress\"}",
        );
        assert!(
            validate_elyx_reply(&text, &state)
                .expect_err("cadence")
                .is_cadence()
        );
        assert_eq!(
            validate_elyx_reply(&reply("New exercise plan soon."), &state),
            Ok(())
        );
    }

    #[test]
    fn misnamed_action_types_are_rejected() {
        let state = sample_state();
        let text = reply("Small tweak.\nACTION: {\"type\":\"behavior_update\"}");
        assert_eq!(
            validate_elyx_reply(&text, &state),
            Err(Rejection::MisnamedAction {
                expected: "schedule_behavior_update",
                found: "behavior_update",
            })
        );
    }
}
