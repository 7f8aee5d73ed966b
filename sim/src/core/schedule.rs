//! Daily scheduling: who speaks, when, and what the member opens with.

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::state::Cadence;
use crate::core::types::Persona;

/// Hard cap on member-initiated chats per week.
pub const MEMBER_WEEKLY_CAP: u32 = 5;

pub const MEMBER_MAX_TOKENS: u32 = 160;
pub const ELYX_MAX_TOKENS: u32 = 280;
pub const MEMBER_EVENING_MAX_TOKENS: u32 = 120;
pub const ELYX_EVENING_MAX_TOKENS: u32 = 220;

pub const PROACTIVE_PROMPT: &str =
    "Start today's proactive check-in focusing on plan progress and any due cadence items.";
pub const EVENING_PROMPT: &str = "Evening follow-up based on earlier chat.";
pub const TEST_REPORT_TEXT: &str = "Test report sent.";

pub const MOODS: [&str; 4] = ["motivated", "curious", "tired", "frustrated"];

/// Who opens the day's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Member,
    Elyx,
}

pub fn rotation_persona(week_idx: u32) -> Persona {
    Persona::ROTATION[week_idx as usize % Persona::ROTATION.len()]
}

/// Specialist who takes over on every `interval_days`-th simulated day.
pub fn specialist_due(day_index: u32, interval_days: u32) -> Option<Persona> {
    if interval_days == 0 || day_index == 0 || day_index % interval_days != 0 {
        return None;
    }
    let turn = (day_index / interval_days) as usize % Persona::SPECIALISTS.len();
    Some(Persona::SPECIALISTS[turn])
}

/// Default Elyx voice for the day.
pub fn starter_persona(week_idx: u32, day_index: u32, specialist_interval_days: u32) -> Persona {
    specialist_due(day_index, specialist_interval_days)
        .unwrap_or_else(|| rotation_persona(week_idx))
}

pub fn member_weekly_budget(cadence: &Cadence) -> u32 {
    cadence.max_curiosity_chats_per_week.min(MEMBER_WEEKLY_CAP)
}

/// Pick the initiator; Elyx opens once the member budget is spent.
pub fn choose_initiator<R: Rng + ?Sized>(
    rng: &mut R,
    member_share: f64,
    member_budget_left: bool,
) -> Initiator {
    if member_budget_left && rng.gen_bool(member_share.clamp(0.0, 1.0)) {
        Initiator::Member
    } else {
        Initiator::Elyx
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTime {
    pub hour: u32,
    pub minute: u32,
}

const MORNING_HOURS: [u32; 4] = [7, 8, 9, 10];
const MORNING_MINUTES: [u32; 11] = [0, 3, 5, 8, 10, 12, 15, 18, 20, 25, 30];
const MORNING_GAPS: [u32; 8] = [2, 3, 4, 5, 6, 7, 8, 9];
const EVENING_HOURS: [u32; 4] = [18, 19, 20, 21];
const EVENING_MINUTES: [u32; 12] = [0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55];
const EVENING_GAPS: [u32; 4] = [2, 3, 4, 5];

fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[u32]) -> u32 {
    options.choose(rng).copied().unwrap_or_default()
}

/// Jittered message times for one day: a morning pair, plus an evening pair
/// when two turns are configured.
pub fn day_chat_times<R: Rng + ?Sized>(turns_per_day: u32, rng: &mut R) -> Vec<ChatTime> {
    let hour = pick(rng, &MORNING_HOURS);
    let minute = pick(rng, &MORNING_MINUTES);
    let mut times = vec![
        ChatTime { hour, minute },
        ChatTime {
            hour,
            minute: (minute + pick(rng, &MORNING_GAPS)).min(59),
        },
    ];
    if turns_per_day >= 2 {
        let hour = pick(rng, &EVENING_HOURS);
        let minute = pick(rng, &EVENING_MINUTES);
        times.push(ChatTime { hour, minute });
        times.push(ChatTime {
            hour,
            minute: (minute + pick(rng, &EVENING_GAPS)).min(59),
        });
    }
    times.truncate((2 * turns_per_day as usize).max(2));
    times
}

/// WhatsApp export stamp, e.g. `[6/4/25, 9:05 AM]`.
pub fn whatsapp_stamp(date: NaiveDate, time: ChatTime) -> String {
    let am_pm = if time.hour < 12 { "AM" } else { "PM" };
    let hour12 = match time.hour % 12 {
        0 => 12,
        h => h,
    };
    format!(
        "[{}/{}/{}, {}:{:02} {}]",
        date.month(),
        date.day(),
        date.year() % 100,
        hour12,
        time.minute,
        am_pm
    )
}

/// What the member's opening message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOpening {
    Travel,
    ResearchQuestion,
    AdherenceSelfReport,
    Plain,
}

impl MemberOpening {
    pub fn prompt(self) -> &'static str {
        match self {
            MemberOpening::Travel => "Open today's chat mentioning travel constraints.",
            MemberOpening::ResearchQuestion => {
                "Ask a health research question (diet, supplements, sleep, exercise optimization)."
            }
            MemberOpening::AdherenceSelfReport => {
                "Adherence self-report: I missed my sessions, explain why and ask for alternate plan."
            }
            MemberOpening::Plain => "Open today's chat.",
        }
    }
}

/// Choose the opening topic.
///
/// Travel weeks lead with travel 60% of the time. Otherwise 45% research
/// questions, then a self-report band whose odds rise when adherence is low.
pub fn choose_member_opening<R: Rng + ?Sized>(
    travel_week: bool,
    adherence: f64,
    rng: &mut R,
) -> MemberOpening {
    let pick: f64 = rng.gen_range(0.0..1.0);
    if travel_week && rng.gen_bool(0.6) {
        return MemberOpening::Travel;
    }
    if pick < 0.45 {
        return MemberOpening::ResearchQuestion;
    }
    let self_report_chance = if adherence >= 0.5 { 0.25 } else { 0.35 };
    if pick < 0.7 && rng.gen_bool(self_report_chance) {
        return MemberOpening::AdherenceSelfReport;
    }
    MemberOpening::Plain
}

pub fn choose_mood<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    MOODS.choose(rng).copied().unwrap_or("curious")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::date;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rotation_and_specialists() {
        assert_eq!(rotation_persona(0), Persona::Ruby);
        assert_eq!(rotation_persona(5), Persona::Advik);
        assert_eq!(specialist_due(0, 90), None);
        assert_eq!(specialist_due(45, 90), None);
        assert_eq!(specialist_due(90, 90), Some(Persona::Neel));
        assert_eq!(specialist_due(180, 90), Some(Persona::DrWarren));
        assert_eq!(starter_persona(2, 90, 90), Persona::Neel);
        assert_eq!(starter_persona(2, 91, 90), Persona::Carla);
    }

    #[test]
    fn member_budget_is_capped() {
        let mut cadence = Cadence::default();
        cadence.max_curiosity_chats_per_week = 9;
        assert_eq!(member_weekly_budget(&cadence), 5);
        cadence.max_curiosity_chats_per_week = 3;
        assert_eq!(member_weekly_budget(&cadence), 3);
    }

    #[test]
    fn exhausted_budget_forces_elyx() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            assert_eq!(choose_initiator(&mut rng, 1.0, false), Initiator::Elyx);
            assert_eq!(choose_initiator(&mut rng, 1.0, true), Initiator::Member);
        }
    }

    #[test]
    fn chat_times_follow_turn_count() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let one = day_chat_times(1, &mut rng);
            assert_eq!(one.len(), 2);
            assert_eq!(one[0].hour, one[1].hour);
            assert!(one[1].minute > one[0].minute && one[1].minute <= 39);
            assert!((7..=10).contains(&one[0].hour));

            let two = day_chat_times(2, &mut rng);
            assert_eq!(two.len(), 4);
            assert!((18..=21).contains(&two[2].hour));
            assert!(two[3].minute <= 59);
        }
    }

    #[test]
    fn stamps_match_whatsapp_export() {
        let day = date(2025, 6, 4);
        assert_eq!(whatsapp_stamp(day, ChatTime { hour: 9, minute: 5 }), "[6/4/25, 9:05 AM]");
        assert_eq!(whatsapp_stamp(day, ChatTime { hour: 12, minute: 0 }), "[6/4/25, 12:00 PM]");
        assert_eq!(whatsapp_stamp(day, ChatTime { hour: 21, minute: 30 }), "[6/4/25, 9:30 PM]");
        assert_eq!(
            whatsapp_stamp(date(2030, 1, 9), ChatTime { hour: 0, minute: 7 }),
            "[1/9/30, 12:07 AM]"
        );
    }

    #[test]
    fn openings_cover_every_kind() {
        let mut rng = StdRng::seed_from_u64(5);
        let picks: Vec<MemberOpening> = (0..400)
            .map(|_| choose_member_opening(true, 0.4, &mut rng))
            .collect();
        for kind in [
            MemberOpening::Travel,
            MemberOpening::ResearchQuestion,
            MemberOpening::AdherenceSelfReport,
            MemberOpening::Plain,
        ] {
            assert!(picks.contains(&kind), "missing {kind:?}");
        }
        let home: Vec<MemberOpening> = (0..200)
            .map(|_| choose_member_opening(false, 0.8, &mut rng))
            .collect();
        assert!(!home.contains(&MemberOpening::Travel));
    }
}
