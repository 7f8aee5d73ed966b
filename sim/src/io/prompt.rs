//! Prompt rendering for both agents under a byte budget.
//!
//! Developer prompts are minijinja templates split into sections by
//! `<!-- section:KEY required|droppable -->` markers. When a rendered prompt is
//! over budget, droppable sections go first and the last section is truncated.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::cadence::WEEKLY_TIME_BUDGET_HOURS;
use crate::core::state::{PersonaSnapshot, SimState};
use crate::core::types::{ChatMessage, Persona};
use crate::core::validator::FORBIDDEN_ACTIONS;

const ELYX_SYSTEM_TEMPLATE: &str = include_str!("prompts/elyx_system.md");
const ELYX_DEVELOPER_TEMPLATE: &str = include_str!("prompts/elyx_developer.md");
const MEMBER_SYSTEM_TEMPLATE: &str = include_str!("prompts/member_system.md");
const MEMBER_DEVELOPER_TEMPLATE: &str = include_str!("prompts/member_developer.md");

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should be valid")
});

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 5] = ["location", "time", "sentiment", "recent", "travel"];

const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("elyx_system", ELYX_SYSTEM_TEMPLATE),
            ("elyx_developer", ELYX_DEVELOPER_TEMPLATE),
            ("member_system", MEMBER_SYSTEM_TEMPLATE),
            ("member_developer", MEMBER_DEVELOPER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt template should be valid");
        }
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();
    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let allowed = budget.saturating_sub(total - last.content.len());
    let before_len = last.content.len();
    if allowed > TRUNCATION_MARKER.len() {
        truncate_on_char_boundary(&mut last.content, allowed - TRUNCATION_MARKER.len());
        last.content.push_str(TRUNCATION_MARKER);
    } else {
        truncate_on_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_on_char_boundary(text: &mut String, max_bytes: usize) {
    let mut cut = max_bytes.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Transcript lines as shown to the agents.
pub fn format_recent(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{} {}: {}", m.ts, m.speaker.label(), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ElyxPromptInputs<'a> {
    pub state: &'a SimState,
    pub recent: &'a [ChatMessage],
    pub sentiment: Option<PersonaSnapshot>,
    pub travel_week: bool,
}

pub struct MemberPromptInputs<'a> {
    pub state: &'a SimState,
    pub recent: &'a [ChatMessage],
    pub mood: &'a str,
}

/// Builds system and developer prompts for both agents.
pub struct PromptBuilder {
    engine: PromptEngine,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            engine: PromptEngine::new(),
            budget_bytes,
        }
    }

    pub fn elyx_system(&self, state: &SimState) -> Result<String> {
        let personas: Vec<&str> = Persona::ALL.iter().map(|p| p.name()).collect();
        self.engine.render(
            "elyx_system",
            context! {
                personas => personas,
                forbidden_actions => FORBIDDEN_ACTIONS,
                diagnostic_interval_days => state.cadence.diagnostic_interval_days,
                exercise_update_days => state.cadence.exercise_update_days,
            },
        )
    }

    pub fn elyx_developer(&self, input: &ElyxPromptInputs<'_>) -> Result<String> {
        let state = input.state;
        let used = state.hours_used_this_week();
        let remaining = (WEEKLY_TIME_BUDGET_HOURS - used).max(0.0);
        let rendered = self.engine.render(
            "elyx_developer",
            context! {
                member_name => &state.member.name,
                sentiment => input.sentiment.map(|s| context! {
                    trust => s.trust,
                    engagement => s.engagement,
                    frustration => s.frustration,
                }),
                travel_week => input.travel_week,
                location => &state.member.location,
                condition => &state.member.condition,
                budget_hours => format!("{WEEKLY_TIME_BUDGET_HOURS:.0}"),
                used_hours => format!("{used:.1}"),
                remaining_hours => format!("{remaining:.1}"),
                recent_messages => format_recent(input.recent),
                state_json => state_json(state)?,
            },
        )?;
        Ok(self.fit(&rendered))
    }

    pub fn member_system(&self, state: &SimState) -> Result<String> {
        self.engine.render(
            "member_system",
            context! { member_name => &state.member.name },
        )
    }

    pub fn member_developer(&self, input: &MemberPromptInputs<'_>) -> Result<String> {
        let state = input.state;
        let personas: Vec<&str> = Persona::ALL.iter().map(|p| p.name()).collect();
        let first_name = state
            .member
            .name
            .split_whitespace()
            .next()
            .unwrap_or_default();
        let rendered = self.engine.render(
            "member_developer",
            context! {
                member_name => &state.member.name,
                first_name => first_name,
                personas => personas,
                age => state.member.age,
                mood => input.mood,
                location => &state.member.location,
                condition => &state.member.condition,
                recent_messages => format_recent(input.recent),
                state_json => state_json(state)?,
            },
        )?;
        Ok(self.fit(&rendered))
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }
}

fn state_json(state: &SimState) -> Result<String> {
    serde_json::to_string_pretty(state).context("serialize state for prompt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Speaker;
    use crate::test_support::message;

    fn recent() -> Vec<ChatMessage> {
        let mut msg = message("m1", Speaker::Member, 1, "Slept badly after the red-eye.");
        msg.ts = "[6/2/25, 7:10 AM]".to_string();
        vec![msg]
    }

    /// Verifies sections render in template order with markers removed.
    #[test]
    fn elyx_developer_sections_are_ordered() {
        let state = SimState::default();
        let recent = recent();
        let prompt = PromptBuilder::new(100_000)
            .elyx_developer(&ElyxPromptInputs {
                state: &state,
                recent: &recent,
                sentiment: Some(PersonaSnapshot::default()),
                travel_week: true,
            })
            .expect("render");

        assert!(!prompt.contains("<!--"));
        let order = [
            "You are Elyx",
            "Guidance:",
            "trust=55,engagement=52,frustration=22",
            "NOTE: member traveling this week.",
            "based in Singapore, managing hypertension",
            "~0.0h used this week, ~5.0h remaining",
            "[6/2/25, 7:10 AM] Rohan: Slept badly",
            "State:",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| prompt.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn empty_optional_sections_disappear() {
        let state = SimState::default();
        let prompt = PromptBuilder::new(100_000)
            .elyx_developer(&ElyxPromptInputs {
                state: &state,
                recent: &[],
                sentiment: None,
                travel_week: false,
            })
            .expect("render");
        assert!(!prompt.contains("Sentiment snapshot"));
        assert!(!prompt.contains("traveling"));
        assert!(!prompt.contains("Recent conversation"));
    }

    #[test]
    fn budget_drops_droppable_then_truncates_state() {
        let state = SimState::default();
        let recent = recent();
        let prompt = PromptBuilder::new(1_200)
            .elyx_developer(&ElyxPromptInputs {
                state: &state,
                recent: &recent,
                sentiment: Some(PersonaSnapshot::default()),
                travel_week: true,
            })
            .expect("render");

        assert!(prompt.len() <= 1_200 + 4 * 2);
        assert!(prompt.contains("Guidance:"));
        assert!(!prompt.contains("based in Singapore"));
        assert!(!prompt.contains("Recent conversation"));
        assert!(prompt.ends_with("[truncated]"));
    }

    #[test]
    fn member_prompts_use_member_profile() {
        let state = SimState::default();
        let builder = PromptBuilder::new(100_000);
        assert_eq!(
            builder.member_system(&state).expect("system").trim(),
            "You are Rohan Patel, the member."
        );
        let dev = builder
            .member_developer(&MemberPromptInputs {
                state: &state,
                recent: &[],
                mood: "tired",
            })
            .expect("developer");
        assert!(dev.contains("Mood: tired"));
        assert!(dev.contains("\"Hey Rohan\""));
        assert!(dev.contains("Ruby, Dr. Warren, Advik, Carla, Rachel, Neel"));
    }

    #[test]
    fn system_prompt_lists_rules_from_state() {
        let mut state = SimState::default();
        state.cadence.diagnostic_interval_days = 120;
        let system = PromptBuilder::new(100).elyx_system(&state).expect("render");
        assert!(system.contains("diagnostics every 120 days"));
        assert!(system.contains("surgery, inpatient_procedures"));
        assert!(system.contains("PERSONA: <one of Ruby|Dr. Warren|Advik|Carla|Rachel|Neel>"));
    }

    #[test]
    fn truncation_respects_utf8() {
        let mut text = "héllo".to_string();
        truncate_on_char_boundary(&mut text, 2);
        assert_eq!(text, "h");
    }
}
