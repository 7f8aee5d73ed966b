//! PERSONA/ACTION parsing, persona choice, and transcript cleaning.

use std::sync::LazyLock;

use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde_json::Value;

use crate::core::text::mentions_any;
use crate::core::types::{Action, ChatMessage, ParsedAction, Persona, Speaker};

static PERSONA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)PERSONA\s*:\s*([A-Za-z0-9 .'-]+)").expect("persona regex should be valid")
});

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)ACTION\s*:\s*(\{.*\})").expect("action regex should be valid")
});

/// Whole `Name: PERSONA: ...` lines the model sometimes emits.
static LEADING_SPEAKER_PERSONA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[A-Za-z .()]+:\s*PERSONA\s*:.*$")
        .expect("leading persona regex should be valid")
});

static MEMBER_GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(hi|hello|hey)[, ]+rohan[,!:]?\s*")
        .expect("member greeting regex should be valid")
});

static MEMBER_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*rohan[,!:]\s*").expect("member address regex should be valid")
});

static PROMPT_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(SYSTEM|DEVELOPER)\]").expect("prompt section regex should be valid")
});

pub const STATE_LEAK_REPLACEMENT: &str =
    "Sorry, I'm having a bit of technical difficulty. Let me try again.";

/// Share of Ruby replies swapped for another persona once Ruby dominates.
pub const RUBY_OVERRIDE_CHANCE: f64 = 0.5;
const RUBY_RECENT_WINDOW: usize = 6;
const RUBY_RECENT_LIMIT: usize = 2;

/// First `PERSONA:` value anywhere in the reply.
pub fn parse_persona(raw: &str) -> Option<String> {
    PERSONA_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse the `ACTION: {json}` payload, tolerating single-quoted JSON.
///
/// Returns `None` when there is no ACTION line or the payload is not a JSON
/// object with a `type`.
/// Unparseable `date_iso` values are dropped so the action falls back to the
/// current simulated day.
pub fn parse_action(raw: &str) -> Option<ParsedAction> {
    let payload = ACTION_RE.captures(raw)?.get(1)?.as_str().trim();
    let mut value: Value = serde_json::from_str(payload)
        .or_else(|_| serde_json::from_str(&payload.replace('\'', "\"")))
        .ok()?;
    let object = value.as_object_mut()?;
    let kind = object.get("type")?.as_str()?.to_string();
    if object
        .get("date_iso")
        .and_then(Value::as_str)
        .is_some_and(|d| d.parse::<chrono::NaiveDate>().is_err())
    {
        object.remove("date_iso");
    }
    match serde_json::from_value::<Action>(value) {
        Ok(action) => Some(ParsedAction::Valid(action)),
        Err(err) if is_known_kind(&kind) => Some(ParsedAction::Malformed {
            kind,
            reason: err.to_string(),
        }),
        Err(_) => Some(ParsedAction::Unsupported { kind }),
    }
}

fn is_known_kind(kind: &str) -> bool {
    matches!(
        kind,
        "propose_test"
            | "propose_comprehensive_panel"
            | "schedule_exercise_update"
            | "schedule_diet_update"
            | "schedule_behavior_update"
            | "track_time_commitment"
    )
}

/// Map loose persona strings ("ruby (concierge)", "RUBY") to a persona.
pub fn sanitize_persona(raw: &str) -> Option<Persona> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(persona) = Persona::from_name(s) {
        return Some(persona);
    }
    let lower = s.to_lowercase();
    if let Some(persona) = Persona::ALL.into_iter().find(|p| {
        let name = p.name().to_lowercase();
        lower.contains(&name) || name.contains(&lower)
    }) {
        return Some(persona);
    }
    let first = s.split_whitespace().next()?;
    Persona::ALL
        .into_iter()
        .find(|p| p.name().eq_ignore_ascii_case(first))
}

const LAB_KEYWORDS: &[&str] = &[
    "crp",
    "lipid",
    "lipids",
    "lipid panel",
    "panel",
    "labs",
    "test report",
    "lab results",
    "test results",
    "report sent",
    "blood panel",
    "a1c",
    "hba1c",
];
const WEARABLE_KEYWORDS: &[&str] = &[
    "hrv",
    "whoop",
    "garmin",
    "wearable",
    "heart rate variability",
    "hr zone",
    "zones",
    "recovery",
];
const NUTRITION_KEYWORDS: &[&str] = &[
    "diet",
    "magnesium",
    "supplement",
    "omega",
    "nutrition",
    "food",
    "calories",
    "protein",
    "carb",
    "fats",
];
const EXERCISE_KEYWORDS: &[&str] = &[
    "exercise", "workout", "mobility", "strength", "pt", "training", "gym", "run", "zone 2",
];
const ESCALATION_KEYWORDS: &[&str] = &[
    "frustrat", "escalat", "strategy", "qbr", "value", "complaint", "lead",
];

/// Route a member message to the specialist its topic calls for.
///
/// Topics are checked in priority order: labs, wearables, nutrition,
/// exercise, escalation.
pub fn route_by_topic(text: &str) -> Option<Persona> {
    let lower = text.to_lowercase();
    let routes = [
        (LAB_KEYWORDS, Persona::DrWarren),
        (WEARABLE_KEYWORDS, Persona::Advik),
        (NUTRITION_KEYWORDS, Persona::Carla),
        (EXERCISE_KEYWORDS, Persona::Rachel),
        (ESCALATION_KEYWORDS, Persona::Neel),
    ];
    routes
        .into_iter()
        .find(|(keywords, _)| mentions_any(&lower, keywords))
        .map(|(_, persona)| persona)
}

/// Decide which persona voices an Elyx reply.
///
/// Topic routing wins. Otherwise the model's persona is kept, except that a
/// Ruby reply is swapped for another persona half of the time when Ruby
/// already gave two of the last six Elyx replies. Without a usable persona
/// the scheduled starter speaks.
pub fn choose_persona<R: Rng + ?Sized>(
    parsed: Option<Persona>,
    routed: Option<Persona>,
    default: Persona,
    recent: &[ChatMessage],
    rng: &mut R,
) -> Persona {
    if let Some(persona) = routed {
        return persona;
    }
    let Some(persona) = parsed else {
        return default;
    };
    if persona == Persona::Ruby {
        let ruby_recent = recent
            .iter()
            .rev()
            .filter(|m| m.speaker.is_elyx())
            .take(RUBY_RECENT_WINDOW)
            .filter(|m| m.speaker == Speaker::Elyx(Persona::Ruby))
            .count();
        if ruby_recent >= RUBY_RECENT_LIMIT && rng.gen_bool(RUBY_OVERRIDE_CHANCE) {
            let pool: Vec<Persona> = Persona::ROTATION
                .into_iter()
                .chain(Persona::SPECIALISTS)
                .filter(|p| *p != Persona::Ruby)
                .collect();
            if let Some(alternative) = pool.choose(rng) {
                return *alternative;
            }
        }
    }
    persona
}

/// Visible diary text for an Elyx reply.
///
/// Drops persona declarations and blank lines. ACTION lines stay visible.
pub fn clean_elyx_text(raw: &str) -> String {
    let without_leading = LEADING_SPEAKER_PERSONA_RE.replace_all(raw, "");
    let without_persona = PERSONA_RE.replace_all(&without_leading, "");
    let joined = without_persona
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    strip_prompt_leaks(joined.trim())
}

/// Visible diary text for a member message (no self-address).
pub fn clean_member_text(raw: &str) -> String {
    let without_greeting = MEMBER_GREETING_RE.replace_all(raw, "");
    let without_address = MEMBER_ADDRESS_RE.replace_all(without_greeting.trim(), "");
    strip_prompt_leaks(without_address.trim())
}

/// Remove echoed prompt sections and state dumps from model output.
///
/// Only the text after the last `[SYSTEM]`/`[DEVELOPER]` header survives. Text
/// that looks like the serialized member state is replaced wholesale.
pub fn strip_prompt_leaks(text: &str) -> String {
    let tail = match PROMPT_SECTION_RE.find_iter(text).last() {
        Some(m) => text[m.end()..].trim(),
        None => text.trim(),
    };
    if tail.contains("\"date_iso\":") && tail.contains("\"member\":") && tail.contains("\"kpis\":") {
        return STATE_LEAK_REPLACEMENT.to_string();
    }
    tail.to_string()
}
