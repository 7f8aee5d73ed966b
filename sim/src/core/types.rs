//! Shared deterministic types for the simulation core.
//!
//! These types define stable contracts between core components and the
//! exported JSON. They must not depend on external state or I/O.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Elyx team member voicing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    Ruby,
    #[serde(rename = "Dr. Warren")]
    DrWarren,
    Advik,
    Carla,
    Rachel,
    Neel,
}

impl Persona {
    pub const ALL: [Persona; 6] = [
        Persona::Ruby,
        Persona::DrWarren,
        Persona::Advik,
        Persona::Carla,
        Persona::Rachel,
        Persona::Neel,
    ];

    /// Weekly rotation of the default starter persona.
    pub const ROTATION: [Persona; 4] = [
        Persona::Ruby,
        Persona::Advik,
        Persona::Carla,
        Persona::Rachel,
    ];

    /// Specialists who take over on quarterly days.
    pub const SPECIALISTS: [Persona; 2] = [Persona::DrWarren, Persona::Neel];

    pub fn name(self) -> &'static str {
        match self {
            Persona::Ruby => "Ruby",
            Persona::DrWarren => "Dr. Warren",
            Persona::Advik => "Advik",
            Persona::Carla => "Carla",
            Persona::Rachel => "Rachel",
            Persona::Neel => "Neel",
        }
    }

    /// Exact (case-insensitive) name lookup.
    pub fn from_name(name: &str) -> Option<Persona> {
        let trimmed = name.trim();
        Persona::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const MEMBER_LABEL: &str = "Rohan";
pub const SYSTEM_LABEL: &str = "System";

/// Author of a chat message. Serialized as its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Speaker {
    Member,
    Elyx(Persona),
    System,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::Member => MEMBER_LABEL,
            Speaker::Elyx(persona) => persona.name(),
            Speaker::System => SYSTEM_LABEL,
        }
    }

    pub fn is_elyx(self) -> bool {
        matches!(self, Speaker::Elyx(_))
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<Speaker> for String {
    fn from(speaker: Speaker) -> Self {
        speaker.label().to_string()
    }
}

impl TryFrom<String> for Speaker {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            MEMBER_LABEL => Ok(Speaker::Member),
            SYSTEM_LABEL => Ok(Speaker::System),
            other => Persona::from_name(other)
                .map(Speaker::Elyx)
                .ok_or_else(|| format!("unknown speaker '{other}'")),
        }
    }
}

/// Turn group used by JSON-only system markers.
pub const MARKER_TURN_GROUP: i64 = -1;

/// One entry of the chat transcript (the diary, in structured form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub ts: String,
    pub speaker: Speaker,
    pub turn_group: i64,
    pub text: String,
}

/// Category of a cadence-governed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceKind {
    Diagnostic,
    Exercise,
    Diet,
    Behavior,
}

impl CadenceKind {
    pub fn code(self) -> &'static str {
        match self {
            CadenceKind::Diagnostic => "DIAGNOSTIC",
            CadenceKind::Exercise => "EXERCISE",
            CadenceKind::Diet => "DIET",
            CadenceKind::Behavior => "BEHAVIOR",
        }
    }
}

/// Plan updates that follow a fixed cadence (everything except diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Exercise,
    Diet,
    Behavior,
}

impl UpdateKind {
    pub const ALL: [UpdateKind; 3] = [UpdateKind::Exercise, UpdateKind::Diet, UpdateKind::Behavior];

    pub fn cadence(self) -> CadenceKind {
        match self {
            UpdateKind::Exercise => CadenceKind::Exercise,
            UpdateKind::Diet => CadenceKind::Diet,
            UpdateKind::Behavior => CadenceKind::Behavior,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Exercise => "exercise",
            UpdateKind::Diet => "diet",
            UpdateKind::Behavior => "behavior",
        }
    }
}

fn default_activity() -> String {
    "exercise".to_string()
}

/// Schedulable step emitted by Elyx on an `ACTION: {json}` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ProposeTest {
        test_type: String,
        #[serde(default)]
        date_iso: Option<NaiveDate>,
    },
    ProposeComprehensivePanel {
        #[serde(default)]
        date_iso: Option<NaiveDate>,
    },
    ScheduleExerciseUpdate {
        #[serde(default)]
        date_iso: Option<NaiveDate>,
        #[serde(default)]
        reason: String,
    },
    ScheduleDietUpdate {
        #[serde(default)]
        date_iso: Option<NaiveDate>,
        #[serde(default)]
        reason: String,
    },
    ScheduleBehaviorUpdate {
        #[serde(default)]
        date_iso: Option<NaiveDate>,
        #[serde(default)]
        reason: String,
    },
    TrackTimeCommitment {
        #[serde(default)]
        hours: f64,
        #[serde(default = "default_activity")]
        activity: String,
    },
}

impl Action {
    /// The `type` tag as written on the ACTION line.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::ProposeTest { .. } => "propose_test",
            Action::ProposeComprehensivePanel { .. } => "propose_comprehensive_panel",
            Action::ScheduleExerciseUpdate { .. } => "schedule_exercise_update",
            Action::ScheduleDietUpdate { .. } => "schedule_diet_update",
            Action::ScheduleBehaviorUpdate { .. } => "schedule_behavior_update",
            Action::TrackTimeCommitment { .. } => "track_time_commitment",
        }
    }

    /// Requested date, when the action carries one.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Action::ProposeTest { date_iso, .. }
            | Action::ProposeComprehensivePanel { date_iso }
            | Action::ScheduleExerciseUpdate { date_iso, .. }
            | Action::ScheduleDietUpdate { date_iso, .. }
            | Action::ScheduleBehaviorUpdate { date_iso, .. } => *date_iso,
            Action::TrackTimeCommitment { .. } => None,
        }
    }

    /// The update kind for plan-update actions.
    pub fn update_kind(&self) -> Option<UpdateKind> {
        match self {
            Action::ScheduleExerciseUpdate { .. } => Some(UpdateKind::Exercise),
            Action::ScheduleDietUpdate { .. } => Some(UpdateKind::Diet),
            Action::ScheduleBehaviorUpdate { .. } => Some(UpdateKind::Behavior),
            _ => None,
        }
    }
}

/// Result of parsing an ACTION line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAction {
    Valid(Action),
    /// JSON parsed and carried a `type`, but not one the engine knows.
    Unsupported { kind: String },
    /// Known `type` whose fields are missing or of the wrong shape.
    Malformed { kind: String, reason: String },
}

/// Guardrail rejection. `Display` yields the stable reason code written to the
/// transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("FORMAT: Missing or invalid PERSONA line")]
    MissingPersonaLine,
    #[error("STYLE: Too many bubbles or bubble too long")]
    BubbleLimit,
    #[error("FORBIDDEN_ACTION:{0}")]
    ForbiddenAction(String),
    #[error("OFF_PANEL_TEST")]
    OffPanelTest,
    #[error("{0} not allowed")]
    TestNotAllowed(String),
    #[error("CADENCE_{}: due every {interval_days} days", kind.code())]
    Cadence {
        kind: CadenceKind,
        interval_days: u32,
        next_eligible: Option<NaiveDate>,
    },
    #[error("ACTION_TYPE: Use {expected} instead of {found}")]
    MisnamedAction {
        expected: &'static str,
        found: &'static str,
    },
    #[error("UNKNOWN_ACTION_TYPE")]
    UnknownActionType(String),
    #[error("MALFORMED_ACTION:{kind}: {reason}")]
    MalformedAction { kind: String, reason: String },
    #[error("INVALID_HOURS: {0}")]
    InvalidHours(String),
}

impl Rejection {
    pub fn is_cadence(&self) -> bool {
        matches!(self, Rejection::Cadence { .. })
    }
}

/// What happened when an action was applied to the member state.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Scheduled and followed by the member.
    Applied(String),
    /// Time tracking is bookkeeping and always lands.
    Tracked(String),
    /// Scheduled but the member did not adhere.
    NotFollowed,
    Rejected(Rejection),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_serializes_as_label() {
        let json = serde_json::to_string(&Speaker::Elyx(Persona::DrWarren)).expect("ser");
        assert_eq!(json, "\"Dr. Warren\"");
        let back: Speaker = serde_json::from_str("\"Rohan\"").expect("de");
        assert_eq!(back, Speaker::Member);
        assert!(serde_json::from_str::<Speaker>("\"Bob\"").is_err());
    }

    #[test]
    fn action_parses_from_tagged_json() {
        let action: Action = serde_json::from_str(
            r#"{"type":"propose_test","test_type":"Lipid panel","date_iso":"2025-06-10"}"#,
        )
        .expect("parse");
        assert_eq!(
            action,
            Action::ProposeTest {
                test_type: "Lipid panel".to_string(),
                date_iso: NaiveDate::from_ymd_opt(2025, 6, 10),
            }
        );

        let tracked: Action =
            serde_json::from_str(r#"{"type":"track_time_commitment","hours":1.5}"#).expect("parse");
        assert_eq!(tracked.kind(), "track_time_commitment");
        match tracked {
            Action::TrackTimeCommitment { activity, .. } => assert_eq!(activity, "exercise"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cadence_rejection_has_stable_code() {
        let rejection = Rejection::Cadence {
            kind: CadenceKind::Exercise,
            interval_days: 14,
            next_eligible: None,
        };
        assert_eq!(rejection.to_string(), "CADENCE_EXERCISE: due every 14 days");
        assert!(rejection.is_cadence());
        assert!(!Rejection::OffPanelTest.is_cadence());
    }
}
