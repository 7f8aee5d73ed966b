//! Orchestration for `sim run`.
//!
//! A run drives `max_weeks` simulated weeks of member/Elyx chat. Every
//! exchange flows through the guardrails in [`crate::core`], the transcript is
//! written to the diary as it happens, and the Timeline JSON export is written
//! once at the end, including after a crash or an interrupt.

use std::collections::HashSet;
use std::fs;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use crate::core::cadence::{
    apply_action, diagnostic_check, enforce_week_boundary, share_due_test_report, track_time,
};
use crate::core::drift::{KpiNudge, apply_kpi_drift, nudges_for};
use crate::core::persona::{
    choose_persona, clean_elyx_text, clean_member_text, parse_action, parse_persona, route_by_topic,
    sanitize_persona,
};
use crate::core::plan::next_plan;
use crate::core::schedule::{
    ChatTime, ELYX_EVENING_MAX_TOKENS, ELYX_MAX_TOKENS, EVENING_PROMPT, Initiator,
    MEMBER_EVENING_MAX_TOKENS, MEMBER_MAX_TOKENS, PROACTIVE_PROMPT, TEST_REPORT_TEXT,
    choose_initiator, choose_member_opening, choose_mood, day_chat_times, member_weekly_budget,
    starter_persona, whatsapp_stamp,
};
use crate::core::seed;
use crate::core::sentiment::track_persona_sentiment;
use crate::core::state::SimState;
use crate::core::summary::{
    APPLIED_PREFIX, CADENCE_APPLIED_PREFIX, DecisionRecord, NOT_FOLLOWED_NOTE, REJECTED_PREFIX,
    TimelineEntry, TimelineKind, WeeklySummary, extract_daily_decisions, summarize_week,
};
use crate::core::types::{
    ActionOutcome, ChatMessage, MARKER_TURN_GROUP, ParsedAction, Persona, Rejection, Speaker,
    UpdateKind,
};
use crate::core::validator::validate_elyx_reply;
use crate::io::config::{LlmConfig, SimConfig};
use crate::io::diary::Diary;
use crate::io::export::{ExportPayload, RunPaths, next_run_number, write_export};
use crate::io::llm::{ChatRequest, HttpLlmClient, LlmClient, OfflineLlm, Provider, Voice};
use crate::io::prompt::{ElyxPromptInputs, MemberPromptInputs, PromptBuilder};
use crate::io::rate_limit::{RateLimited, RateLimiter};
use crate::io::schema::{self, SchemaKind};
use crate::io::state_store::{load_state, write_state};

pub const DAYS_PER_WEEK: u32 = 7;

const CADENCE_NOTE_TEMPLATES: [&str; 3] = [
    "Elyx team adjusted cadence automatically. Next due date: {date}.",
    "System: cadence synchronized; next scheduled action is on {date}.",
    "Note: scheduling aligned to cadence rules. Next follow-up scheduled for {date}.",
];

const TEST_REPORT_TIME: ChatTime = ChatTime { hour: 10, minute: 5 };
const MESSAGE_ID_HEX: usize = 8;
/// Time-log activity for the week's exercise plan.
pub const PLAN_ACTIVITY: &str = "exercise plan";
const SENTIMENT_WINDOW: usize = 8;

/// Why `run_simulation` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stop {
    /// All configured weeks ran.
    Completed,
    /// A turn failed; the message is the error chain.
    Crashed(String),
    /// Ctrl-C was observed at a turn boundary.
    Interrupted,
}

/// Summary of one `sim run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub run_id: u32,
    pub paths: RunPaths,
    pub weeks_completed: u32,
    pub messages: usize,
    pub stop: Stop,
}

/// Build the configured LLM client.
///
/// HTTP providers are wrapped in the rate limiter; the offline client is not.
pub fn build_client(cfg: &LlmConfig, api_key: Option<String>) -> Result<Box<dyn LlmClient>> {
    if cfg.provider == Provider::Offline {
        return Ok(Box::new(OfflineLlm::new()));
    }
    let client = HttpLlmClient::from_config(cfg, api_key)
        .with_context(|| format!("build {} client", cfg.provider))?;
    let limiter = RateLimiter::new(cfg.rpm, cfg.burst, cfg.daily_limit, Instant::now());
    Ok(Box::new(RateLimited::new(client, limiter)))
}

/// Run a whole simulation and always write its export.
///
/// Errors inside the weekly loop are recorded as a crash (diary and chats)
/// and reported through [`Stop::Crashed`]. Only failures to set up the run or
/// to write the export are returned as `Err`.
pub fn run_simulation<L: LlmClient + ?Sized>(
    cfg: &SimConfig,
    llm: &L,
    interrupted: &AtomicBool,
) -> Result<SimulationOutcome> {
    cfg.validate()?;
    let export_dir = &cfg.paths.export_dir;
    fs::create_dir_all(export_dir)
        .with_context(|| format!("create export dir {}", export_dir.display()))?;
    let run_id = next_run_number(export_dir)?;
    let paths = RunPaths::new(export_dir, run_id);
    let diary = Diary::create(&paths.diary)?;

    let mut state = load_state(&cfg.paths.state)?;
    state.run_id = Some(run_id);
    let seed = cfg.seed.unwrap_or_else(|| u64::from(run_id));
    info!(run_id, seed, weeks = cfg.max_weeks, "simulation starting");

    let mut session = Session {
        cfg,
        llm,
        prompts: PromptBuilder::new(cfg.conversation.prompt_budget_bytes),
        seed: seed.to_string(),
        run_id,
        diary,
        state,
        chats: Vec::new(),
        week_log: Vec::new(),
        week_decisions: Vec::new(),
        week_nudges: Vec::new(),
        weekly_summaries: Vec::new(),
        timeline: Vec::new(),
        cadence_notes: HashSet::new(),
        message_ids: HashSet::new(),
        next_message: 0,
        refresh_plan: false,
        day_index: 0,
        weeks_completed: 0,
    };

    let stop = match session.run_weeks(interrupted) {
        Ok(stop) => stop,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "simulation crashed");
            session.record_crash(&err);
            Stop::Crashed(format!("{err:#}"))
        }
    };

    if let Err(err) = write_state(&cfg.paths.state, &session.state) {
        warn!(error = %format!("{err:#}"), "final state write failed");
    }
    let payload = ExportPayload {
        run_id,
        diary_path: paths.diary.display().to_string(),
        state: session.state,
        chats: session.chats,
        weekly_summaries: session.weekly_summaries,
        timeline: session.timeline,
    };
    write_export(&paths.json, &payload)?;
    info!(run_id, weeks = session.weeks_completed, ?stop, "simulation finished");

    Ok(SimulationOutcome {
        run_id,
        paths,
        weeks_completed: session.weeks_completed,
        messages: payload.chats.len(),
        stop,
    })
}

enum Flow {
    Continue,
    Interrupted,
}

/// Per-turn inputs for an Elyx reply.
struct ElyxTurn<'p> {
    today: NaiveDate,
    turn_group: i64,
    time: ChatTime,
    max_tokens: u32,
    starter: Persona,
    prompt: &'p str,
}

struct Session<'a, L: ?Sized> {
    cfg: &'a SimConfig,
    llm: &'a L,
    prompts: PromptBuilder,
    seed: String,
    run_id: u32,
    diary: Diary,
    state: SimState,
    chats: Vec<ChatMessage>,
    week_log: Vec<ChatMessage>,
    week_decisions: Vec<DecisionRecord>,
    week_nudges: Vec<(KpiNudge, String)>,
    weekly_summaries: Vec<WeeklySummary>,
    timeline: Vec<TimelineEntry>,
    /// (date, reason) pairs that already produced a cadence note.
    cadence_notes: HashSet<(NaiveDate, String)>,
    message_ids: HashSet<String>,
    next_message: u64,
    /// An exercise update landed, so next week's plan starts fresh.
    refresh_plan: bool,
    day_index: u32,
    weeks_completed: u32,
}

impl<L: LlmClient + ?Sized> Session<'_, L> {
    fn run_weeks(&mut self, interrupted: &AtomicBool) -> Result<Stop> {
        for week_idx in 0..self.cfg.max_weeks {
            match self.run_week(week_idx, interrupted)? {
                Flow::Continue => self.weeks_completed += 1,
                Flow::Interrupted => return Ok(Stop::Interrupted),
            }
        }
        Ok(Stop::Completed)
    }

    #[instrument(skip_all, fields(week = week_idx + 1))]
    fn run_week(&mut self, week_idx: u32, interrupted: &AtomicBool) -> Result<Flow> {
        let week_start = self.state.date_iso;
        let travel_week = self.state.is_travel_week(week_start);
        let member_budget = member_weekly_budget(&self.state.cadence);
        let mut member_initiated = 0;
        self.week_log.clear();

        match diagnostic_check(&mut self.state, week_start) {
            Ok(Some(message)) => {
                info!(%message, "diagnostic panel queued");
                self.timeline.push(TimelineEntry::new(
                    week_start,
                    TimelineKind::DiagnosticScheduled,
                    message,
                    Vec::new(),
                ));
            }
            Ok(None) => {}
            Err(rejection) => debug!(%rejection, "diagnostic panel not queued"),
        }

        let refresh = self.push_marker(format!("[SYSTEM_REFRESH] Week {} context reset", week_idx + 1));
        let note = self.push_marker(format!(
            "[SYSTEM_NOTE] Member {} is based in {}, currently managing {}.",
            self.state.member.name, self.state.member.location, self.state.member.condition
        ));
        self.start_week_plan(week_start, travel_week, vec![refresh, note]);

        for day in 0..DAYS_PER_WEEK {
            if interrupted.load(Ordering::SeqCst) {
                info!(day, "interrupt observed");
                return Ok(Flow::Interrupted);
            }
            let member_budget_left = member_initiated < member_budget;
            let flow = self.run_day(week_idx, day, travel_week, member_budget_left, interrupted)?;
            if matches!(flow, DayFlow::MemberOpened | DayFlow::MemberOpenedInterrupted) {
                member_initiated += 1;
            }
            if matches!(flow, DayFlow::Interrupted | DayFlow::MemberOpenedInterrupted) {
                return Ok(Flow::Interrupted);
            }
        }

        self.finish_week(week_start, travel_week)?;
        Ok(Flow::Continue)
    }

    fn start_week_plan(&mut self, week_start: NaiveDate, travel_week: bool, marker_ids: Vec<String>) {
        let mut rng = seed::rng_for(&[&self.seed, "plan", &week_start.to_string()]);
        let plan = next_plan(
            self.state.plan.history.last(),
            week_start,
            travel_week,
            self.state.member.adherence_rate,
            mem::take(&mut self.refresh_plan),
            &mut rng,
        );
        let summary = format!(
            "Weekly plan: {:?} focus, {:.1}h planned. {}",
            plan.focus,
            plan.weekly_hours(),
            plan.note
        );
        let tracked = track_time(
            &mut self.state,
            plan.weekly_hours(),
            PLAN_ACTIVITY,
            week_start,
        );
        debug!(%summary, %tracked, "weekly plan ready");
        self.timeline
            .push(TimelineEntry::new(week_start, TimelineKind::Plan, summary, marker_ids));
        self.state.plan.history.push(plan);
    }

    #[instrument(skip_all, fields(date = %self.state.date_iso))]
    fn run_day(
        &mut self,
        week_idx: u32,
        day: u32,
        travel_week: bool,
        member_budget_left: bool,
        interrupted: &AtomicBool,
    ) -> Result<DayFlow> {
        let today = self.state.date_iso;
        let turn_group = i64::try_from(self.chats.len() + 1).unwrap_or(i64::MAX);
        let mut rng = seed::rng_for(&[
            &self.seed,
            &today.to_string(),
            &week_idx.to_string(),
            &day.to_string(),
        ]);
        let times = day_chat_times(self.cfg.turns_per_day, &mut rng);
        let starter = starter_persona(
            week_idx,
            self.day_index,
            self.cfg.conversation.specialist_interval_days,
        );

        let initiator = choose_initiator(
            &mut rng,
            self.cfg.conversation.member_initiation_share,
            member_budget_left,
        );
        let opening = match initiator {
            Initiator::Member => {
                let adherence = self.state.member.adherence_rate;
                let prompt = choose_member_opening(travel_week, adherence, &mut rng).prompt();
                let text = self.member_turn(prompt, MEMBER_MAX_TOKENS, &mut rng)?;
                self.push_turn(today, times[0], Speaker::Member, text.clone(), turn_group)?;
                Some(text)
            }
            Initiator::Elyx => None,
        };
        let member_opened = opening.is_some();

        self.elyx_turn(
            &ElyxTurn {
                today,
                turn_group,
                time: times[1],
                max_tokens: ELYX_MAX_TOKENS,
                starter,
                prompt: opening.as_deref().unwrap_or(PROACTIVE_PROMPT),
            },
            travel_week,
            &mut rng,
        )?;

        if self.cfg.turns_per_day >= 2 && times.len() >= 4 {
            if interrupted.load(Ordering::SeqCst) {
                info!("interrupt observed before evening turn");
                return Ok(if member_opened {
                    DayFlow::MemberOpenedInterrupted
                } else {
                    DayFlow::Interrupted
                });
            }
            let text = self.member_turn(EVENING_PROMPT, MEMBER_EVENING_MAX_TOKENS, &mut rng)?;
            self.push_turn(today, times[2], Speaker::Member, text.clone(), turn_group)?;
            self.elyx_turn(
                &ElyxTurn {
                    today,
                    turn_group,
                    time: times[3],
                    max_tokens: ELYX_EVENING_MAX_TOKENS,
                    starter,
                    prompt: &text,
                },
                travel_week,
                &mut rng,
            )?;
        }

        self.close_day(today, turn_group)?;
        self.state.advance_day();
        self.day_index += 1;
        Ok(if member_opened {
            DayFlow::MemberOpened
        } else {
            DayFlow::ElyxOpened
        })
    }

    /// Test report, decisions, sentiment and persistence for the day.
    fn close_day(&mut self, today: NaiveDate, turn_group: i64) -> Result<()> {
        if let Some(report) = share_due_test_report(&mut self.state, today) {
            let id = self.push_turn(
                today,
                TEST_REPORT_TIME,
                Speaker::Member,
                TEST_REPORT_TEXT.to_string(),
                turn_group,
            )?;
            info!(test = %report.test_type, "test report shared");
            self.timeline.push(TimelineEntry::new(
                report.date,
                TimelineKind::TestReport,
                format!("{} report shared", report.test_type),
                vec![id],
            ));
        }

        let todays: Vec<ChatMessage> = self
            .week_log
            .iter()
            .filter(|m| m.turn_group == turn_group)
            .cloned()
            .collect();
        let daily = extract_daily_decisions(today, &todays);
        schema::validate(SchemaKind::DailyDecisions, &daily)
            .with_context(|| format!("daily decisions for {today}"))?;
        debug!(decisions = daily.decisions.len(), "daily decisions extracted");
        for record in &daily.decisions {
            self.timeline.push(TimelineEntry::decision(today, record));
        }
        self.week_decisions.extend(daily.decisions);

        let window_start = self.week_log.len().saturating_sub(SENTIMENT_WINDOW);
        self.state.persona_snapshot = track_persona_sentiment(&self.week_log[window_start..]);

        write_state(&self.cfg.paths.state, &self.state)
    }

    fn finish_week(&mut self, week_start: NaiveDate, travel_week: bool) -> Result<()> {
        let boundary = self.state.date_iso;

        let nudges: Vec<KpiNudge> = self.week_nudges.iter().map(|(n, _)| *n).collect();
        let mut drift_ids: Vec<String> = self.week_nudges.drain(..).map(|(_, id)| id).collect();
        drift_ids.dedup();
        let mut rng = seed::rng_for(&[&self.seed, "drift", &week_start.to_string()]);
        let delta = apply_kpi_drift(
            &mut self.state.kpis,
            self.state.member.adherence_rate,
            travel_week,
            &nudges,
            &mut rng,
        );
        info!(?delta, "weekly KPI drift applied");
        self.timeline
            .push(TimelineEntry::kpi_drift(boundary, self.state.kpis, drift_ids));

        let summary = summarize_week(
            week_start,
            mem::take(&mut self.week_decisions),
            self.state.persona_snapshot,
            self.state.kpis,
        );
        schema::validate(SchemaKind::WeeklySummary, &summary)
            .with_context(|| format!("weekly summary for {week_start}"))?;
        self.weekly_summaries.push(summary);

        self.state.weekly_time_commitment.hours.clear();

        for message in enforce_week_boundary(&mut self.state, boundary) {
            info!(%message, "cadence applied at week boundary");
            let id = self.push_marker(format!("{CADENCE_APPLIED_PREFIX} {message}"));
            self.timeline.push(TimelineEntry::new(
                boundary,
                TimelineKind::CadenceApplied,
                message,
                vec![id],
            ));
        }

        write_state(&self.cfg.paths.state, &self.state)
    }

    fn member_turn(&mut self, user: &str, max_tokens: u32, rng: &mut StdRng) -> Result<String> {
        let mood = choose_mood(rng);
        let system = self.prompts.member_system(&self.state)?;
        let developer = self.prompts.member_developer(&MemberPromptInputs {
            state: &self.state,
            recent: self.recent(),
            mood,
        })?;
        let raw = self
            .llm
            .complete(&ChatRequest {
                voice: Voice::Member,
                system,
                developer,
                user: user.to_string(),
                max_tokens,
            })
            .context("member turn")?;
        Ok(clean_member_text(&raw))
    }

    fn elyx_turn(&mut self, turn: &ElyxTurn<'_>, travel_week: bool, rng: &mut StdRng) -> Result<()> {
        let system = self.prompts.elyx_system(&self.state)?;
        let developer = self.prompts.elyx_developer(&ElyxPromptInputs {
            state: &self.state,
            recent: self.recent(),
            sentiment: Some(self.state.persona_snapshot),
            travel_week,
        })?;
        let raw = self
            .llm
            .complete(&ChatRequest {
                voice: Voice::Elyx,
                system,
                developer,
                user: turn.prompt.to_string(),
                max_tokens: turn.max_tokens,
            })
            .context("elyx turn")?;

        let parsed = parse_persona(&raw).and_then(|p| sanitize_persona(&p));
        let persona = choose_persona(
            parsed,
            route_by_topic(turn.prompt),
            turn.starter,
            &self.chats,
            rng,
        );
        let verdict = validate_elyx_reply(&raw, &self.state);
        let elyx_id = self.push_turn(
            turn.today,
            turn.time,
            Speaker::Elyx(persona),
            clean_elyx_text(&raw),
            turn.turn_group,
        )?;

        if let Err(rejection) = verdict {
            debug!(%rejection, "reply rejected by guardrails");
            return self.note_rejection(turn, &rejection, rng);
        }
        let action = match parse_action(&raw) {
            Some(ParsedAction::Valid(action)) => action,
            Some(ParsedAction::Unsupported { kind }) => {
                return self.note_rejection(turn, &Rejection::UnknownActionType(kind), rng);
            }
            Some(ParsedAction::Malformed { kind, reason }) => {
                debug!(%kind, %reason, "malformed action");
                let rejection = Rejection::MalformedAction { kind, reason };
                return self.note_rejection(turn, &rejection, rng);
            }
            None => return Ok(()),
        };

        let roll = seed::roll(&[
            &self.seed,
            &turn.today.to_string(),
            action.kind(),
            &turn.turn_group.to_string(),
        ]);
        match apply_action(&mut self.state, &action, turn.today, roll) {
            ActionOutcome::Applied(message) => {
                if let Some(kind) = action.update_kind() {
                    if kind == UpdateKind::Exercise {
                        self.refresh_plan = true;
                    }
                    self.week_nudges
                        .extend(nudges_for(kind).into_iter().map(|n| (n, elyx_id.clone())));
                }
                info!(kind = action.kind(), %message, "action applied");
                self.push_note(turn, format!("{APPLIED_PREFIX} {message}"))
            }
            ActionOutcome::Tracked(message) => {
                self.push_note(turn, format!("{APPLIED_PREFIX} {message}"))
            }
            ActionOutcome::NotFollowed => {
                info!(kind = action.kind(), "member did not follow action");
                self.push_note(turn, NOT_FOLLOWED_NOTE.to_string())
            }
            ActionOutcome::Rejected(rejection) => {
                debug!(%rejection, kind = action.kind(), "action rejected");
                self.note_rejection(turn, &rejection, rng)
            }
        }
    }

    /// Cadence rejections become one friendly note per day and reason; other
    /// rejections are written verbatim.
    fn note_rejection(
        &mut self,
        turn: &ElyxTurn<'_>,
        rejection: &Rejection,
        rng: &mut StdRng,
    ) -> Result<()> {
        if !rejection.is_cadence() {
            return self.push_note(turn, format!("{REJECTED_PREFIX} {rejection}"));
        }
        if !self.cadence_notes.insert((turn.today, rejection.to_string())) {
            debug!(%rejection, "cadence note already shown today");
            return Ok(());
        }
        let template = CADENCE_NOTE_TEMPLATES
            .choose(rng)
            .copied()
            .unwrap_or(CADENCE_NOTE_TEMPLATES[0]);
        self.push_note(turn, template.replace("{date}", &turn.today.to_string()))
    }

    fn push_note(&mut self, turn: &ElyxTurn<'_>, text: String) -> Result<()> {
        self.push_turn(turn.today, turn.time, Speaker::System, text, turn.turn_group)
            .map(|_| ())
    }

    /// Append a transcript message to the diary, the week log and the chats.
    fn push_turn(
        &mut self,
        date: NaiveDate,
        time: ChatTime,
        speaker: Speaker,
        text: String,
        turn_group: i64,
    ) -> Result<String> {
        let msg = ChatMessage {
            id: self.next_message_id(),
            ts: whatsapp_stamp(date, time),
            speaker,
            turn_group,
            text,
        };
        self.diary.write_message(&msg)?;
        let id = msg.id.clone();
        self.week_log.push(msg.clone());
        self.chats.push(msg);
        Ok(id)
    }

    /// JSON-only System marker; never written to the diary.
    fn push_marker(&mut self, text: String) -> String {
        let msg = ChatMessage {
            id: self.next_message_id(),
            ts: format!("[{}]", self.state.date_iso),
            speaker: Speaker::System,
            turn_group: MARKER_TURN_GROUP,
            text,
        };
        let id = msg.id.clone();
        self.chats.push(msg);
        id
    }

    fn record_crash(&mut self, err: &anyhow::Error) {
        if let Err(write_err) = self.diary.write_crash(err) {
            warn!(error = %format!("{write_err:#}"), "could not write crash to diary");
        }
        let msg = ChatMessage {
            id: self.next_message_id(),
            ts: "[CRASH]".to_string(),
            speaker: Speaker::System,
            turn_group: MARKER_TURN_GROUP,
            text: format!("[SIMULATION_CRASH] {err:#}"),
        };
        self.chats.push(msg);
    }

    fn recent(&self) -> &[ChatMessage] {
        let start = self
            .chats
            .len()
            .saturating_sub(self.cfg.conversation.recent_window);
        &self.chats[start..]
    }

    fn next_message_id(&mut self) -> String {
        loop {
            let seq = self.next_message;
            self.next_message += 1;
            let id = format!(
                "msg_{}",
                seed::short_hex(
                    &[&self.seed, &self.run_id.to_string(), &seq.to_string()],
                    MESSAGE_ID_HEX
                )
            );
            if self.message_ids.insert(id.clone()) {
                return id;
            }
        }
    }
}

/// How a simulated day ended, for the weekly member budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayFlow {
    MemberOpened,
    ElyxOpened,
    MemberOpenedInterrupted,
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLlm, test_config};
    use rand::Rng;

    const MEMBER: &str = "Hi Ruby, slept badly again after the late flight.";
    const ELYX_PLAIN: &str = "PERSONA: Ruby\nThanks for flagging. Let's keep tonight light and reassess tomorrow.";

    #[test]
    fn cadence_notes_are_deduplicated_per_day() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = test_config(temp.path());
        let llm = ScriptedLlm::new(&[MEMBER], &[ELYX_PLAIN]);
        let mut session = Session {
            cfg: &cfg,
            llm: &llm,
            prompts: PromptBuilder::new(1_000),
            seed: "1".to_string(),
            run_id: 1,
            diary: Diary::create(&temp.path().join("diary.txt")).expect("diary"),
            state: SimState::default(),
            chats: Vec::new(),
            week_log: Vec::new(),
            week_decisions: Vec::new(),
            week_nudges: Vec::new(),
            weekly_summaries: Vec::new(),
            timeline: Vec::new(),
            cadence_notes: HashSet::new(),
            message_ids: HashSet::new(),
            next_message: 0,
            refresh_plan: false,
            day_index: 0,
            weeks_completed: 0,
        };
        let turn = ElyxTurn {
            today: session.state.date_iso,
            turn_group: 1,
            time: ChatTime { hour: 9, minute: 0 },
            max_tokens: ELYX_MAX_TOKENS,
            starter: Persona::Ruby,
            prompt: PROACTIVE_PROMPT,
        };
        let rejection = Rejection::Cadence {
            kind: crate::core::types::CadenceKind::Diet,
            interval_days: 14,
            next_eligible: None,
        };
        let mut rng = seed::rng_for(&["test"]);

        session.note_rejection(&turn, &rejection, &mut rng).expect("first");
        session.note_rejection(&turn, &rejection, &mut rng).expect("second");
        session
            .note_rejection(&turn, &Rejection::OffPanelTest, &mut rng)
            .expect("other");

        let texts: Vec<&str> = session.chats.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("2025-06-02"));
        assert_eq!(texts[1], "[Action rejected] OFF_PANEL_TEST");
    }

    #[test]
    fn message_ids_are_unique_and_prefixed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = test_config(temp.path());
        let llm = ScriptedLlm::new(&[MEMBER], &[ELYX_PLAIN]);
        let outcome = run_simulation(&cfg, &llm, &AtomicBool::new(false)).expect("run");
        let raw = fs::read_to_string(&outcome.paths.json).expect("export");
        let payload: ExportPayload = serde_json::from_str(&raw).expect("parse");

        let ids: HashSet<&str> = payload.chats.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), payload.chats.len());
        assert!(payload.chats.iter().all(|m| m.id.starts_with("msg_") && m.id.len() == 12));
    }

    #[test]
    fn offline_client_needs_no_key() {
        let cfg = LlmConfig {
            provider: Provider::Offline,
            ..LlmConfig::default()
        };
        assert!(build_client(&cfg, None).is_ok());

        let http = LlmConfig::default();
        let err = build_client(&http, None).err().expect("missing key");
        assert!(format!("{err:#}").contains("LLM_API_KEY"));
    }

    #[test]
    fn rng_is_stable_for_day_parts() {
        let a: f64 = seed::rng_for(&["42", "2025-06-02", "0", "0"]).gen_range(0.0..1.0);
        let b: f64 = seed::rng_for(&["42", "2025-06-02", "0", "0"]).gen_range(0.0..1.0);
        assert_eq!(a, b);
    }
}
