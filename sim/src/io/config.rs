//! Simulation configuration stored in `sim.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::llm::Provider;

pub const DEFAULT_CONFIG_FILE: &str = "sim.toml";

/// Simulation configuration (TOML).
///
/// Missing tables and fields fall back to the defaults below; environment
/// overrides are applied on top by [`SimConfig::apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated weeks of seven days each.
    pub max_weeks: u32,

    /// 1 = morning exchange only, 2 = morning plus evening follow-up.
    pub turns_per_day: u32,

    /// Fixed run seed. Unset runs derive the seed from the run number.
    pub seed: Option<u64>,

    pub llm: LlmConfig,
    pub paths: PathsConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Empty means the provider's default model.
    pub model: String,
    /// Empty means the provider's default endpoint.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Requests per minute.
    pub rpm: u32,
    /// Requests allowed in any 60 second window.
    pub burst: u32,
    /// Requests allowed per 24 hours.
    pub daily_limit: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            model: String::new(),
            base_url: String::new(),
            api_key_env: "LLM_API_KEY".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            rpm: 6,
            burst: 10,
            daily_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Member state, read at start and rewritten after every simulated day.
    pub state: PathBuf,
    /// Directory receiving `runN.json` and `runN_diary.txt`.
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: PathBuf::from("data/seed_state.json"),
            export_dir: PathBuf::from("data/exports"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// Chance that the member opens the day while budget remains.
    pub member_initiation_share: f64,
    /// A specialist (Dr. Warren or Neel) leads every N simulated days.
    pub specialist_interval_days: u32,
    /// Byte budget for a rendered developer prompt.
    pub prompt_budget_bytes: usize,
    /// Recent messages shown to both agents.
    pub recent_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            member_initiation_share: 0.6,
            specialist_interval_days: 90,
            prompt_budget_bytes: 12_000,
            recent_window: 6,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_weeks: 16,
            turns_per_day: 1,
            seed: None,
            llm: LlmConfig::default(),
            paths: PathsConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_weeks == 0 {
            return Err(anyhow!("max_weeks must be > 0"));
        }
        if !(1..=2).contains(&self.turns_per_day) {
            return Err(anyhow!("turns_per_day must be 1 or 2"));
        }
        if self.llm.rpm == 0 {
            return Err(anyhow!("llm.rpm must be > 0"));
        }
        if self.llm.burst == 0 {
            return Err(anyhow!("llm.burst must be > 0"));
        }
        if self.llm.daily_limit == Some(0) {
            return Err(anyhow!("llm.daily_limit must be > 0 when set"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("llm.temperature must be within 0.0..=2.0"));
        }
        if self.llm.api_key_env.trim().is_empty() {
            return Err(anyhow!("llm.api_key_env must be non-empty"));
        }
        if !(0.0..=1.0).contains(&self.conversation.member_initiation_share) {
            return Err(anyhow!(
                "conversation.member_initiation_share must be within 0.0..=1.0"
            ));
        }
        if self.conversation.specialist_interval_days == 0 {
            return Err(anyhow!("conversation.specialist_interval_days must be > 0"));
        }
        if self.conversation.prompt_budget_bytes == 0 {
            return Err(anyhow!("conversation.prompt_budget_bytes must be > 0"));
        }
        if self.conversation.recent_window == 0 {
            return Err(anyhow!("conversation.recent_window must be > 0"));
        }
        Ok(())
    }

    /// Apply `MAX_WEEKS`, `TURNS_PER_DAY`, `LLM_RPM`, `LLM_PROVIDER`,
    /// `LLM_BASE_URL` and `LLM_MODEL` from `lookup`.
    ///
    /// Empty values are ignored; unparseable numbers are errors.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("MAX_WEEKS") {
            self.max_weeks = parse_env("MAX_WEEKS", &v)?;
        }
        if let Some(v) = get("TURNS_PER_DAY") {
            self.turns_per_day = parse_env("TURNS_PER_DAY", &v)?;
        }
        if let Some(v) = get("LLM_RPM") {
            self.llm.rpm = parse_env("LLM_RPM", &v)?;
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.parse().with_context(|| "parse LLM_PROVIDER")?;
        }
        if let Some(v) = get("LLM_BASE_URL") {
            self.llm.base_url = v.trim().to_string();
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v.trim().to_string();
        }
        self.validate()
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("parse {key}={value}"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SimConfig::default()`.
pub fn load_config(path: &Path) -> Result<SimConfig> {
    if !path.exists() {
        let cfg = SimConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SimConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SimConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SimConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("sim.toml");
        let mut cfg = SimConfig::default();
        cfg.seed = Some(7);
        cfg.llm.daily_limit = Some(200);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sim.toml");
        fs::write(&path, "max_weeks = 2\n[llm]\nprovider = \"anthropic\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_weeks, 2);
        assert_eq!(cfg.llm.provider, Provider::Anthropic);
        assert_eq!(cfg.llm.rpm, 6);
        assert_eq!(cfg.conversation, ConversationConfig::default());
    }

    #[test]
    fn rejects_out_of_range_turns() {
        let cfg = SimConfig {
            turns_per_day: 3,
            ..SimConfig::default()
        };
        let err = cfg.validate().expect_err("turns");
        assert!(err.to_string().contains("turns_per_day"));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("MAX_WEEKS", "3"),
            ("TURNS_PER_DAY", "2"),
            ("LLM_PROVIDER", "gemini"),
            ("LLM_MODEL", " gemini-2.0-flash "),
            ("LLM_RPM", ""),
        ]);
        let mut cfg = SimConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .expect("overrides");
        assert_eq!(cfg.max_weeks, 3);
        assert_eq!(cfg.turns_per_day, 2);
        assert_eq!(cfg.llm.provider, Provider::Gemini);
        assert_eq!(cfg.llm.model, "gemini-2.0-flash");
        assert_eq!(cfg.llm.rpm, 6);

        let mut bad = SimConfig::default();
        let err = bad
            .apply_env_overrides(|k| (k == "TURNS_PER_DAY").then(|| "five".to_string()))
            .expect_err("parse");
        assert!(err.to_string().contains("TURNS_PER_DAY"));
    }
}
