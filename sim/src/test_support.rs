//! Test-only helpers for dates, member state, messages and scripted LLMs.

use std::cell::{Cell, RefCell};
use std::path::Path;

use chrono::NaiveDate;
use tempfile::TempDir;

use crate::core::state::SimState;
use crate::core::types::{ChatMessage, Speaker};
use crate::io::config::SimConfig;
use crate::io::llm::{ChatRequest, LlmClient, LlmError, Provider, Voice};

/// Build a date, panicking on invalid input.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Member state on Monday 2025-06-02 with no history and no travel.
pub fn sample_state() -> SimState {
    let mut state = SimState {
        date_iso: date(2025, 6, 2),
        ..SimState::default()
    };
    state.member.travel_weeks.clear();
    state.member.adherence_rate = 0.5;
    state
}

/// Chat message with a fixed morning timestamp.
pub fn message(id: &str, speaker: Speaker, turn_group: i64, text: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        ts: "[6/2/25, 9:00 AM]".to_string(),
        speaker,
        turn_group,
        text: text.to_string(),
    }
}

/// Config for a one-week offline run rooted in `root`.
pub fn test_config(root: &Path) -> SimConfig {
    let mut cfg = SimConfig {
        max_weeks: 1,
        seed: Some(42),
        ..SimConfig::default()
    };
    cfg.llm.provider = Provider::Offline;
    cfg.paths.state = root.join("state.json");
    cfg.paths.export_dir = root.join("exports");
    cfg
}

/// Temporary directory holding the state file and exports of a test run.
pub struct TestWorkspace {
    dir: TempDir,
    pub config: SimConfig,
}

impl TestWorkspace {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = test_config(dir.path());
        Ok(Self { dir, config })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// LLM double that cycles through scripted replies per voice.
///
/// Every request is recorded. When `fail_at` is set, the call with that
/// zero-based index fails with [`LlmError::Unavailable`].
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    member: Vec<String>,
    elyx: Vec<String>,
    fail_at: Option<usize>,
    calls: Cell<usize>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new(member: &[&str], elyx: &[&str]) -> Self {
        Self {
            member: member.iter().map(|s| (*s).to_string()).collect(),
            elyx: elyx.iter().map(|s| (*s).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        self.requests.borrow_mut().push(request.clone());
        if self.fail_at == Some(call) {
            return Err(LlmError::Unavailable(format!("scripted failure at call {call}")));
        }
        let replies = match request.voice {
            Voice::Member => &self.member,
            Voice::Elyx => &self.elyx,
        };
        let turn = self
            .requests
            .borrow()
            .iter()
            .filter(|r| r.voice == request.voice)
            .count()
            - 1;
        Ok(replies
            .get(turn % replies.len().max(1))
            .cloned()
            .unwrap_or_default())
    }
}
