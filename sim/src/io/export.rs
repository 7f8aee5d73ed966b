//! Run numbering and the Timeline JSON export (`runN.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::state::SimState;
use crate::core::summary::{TimelineEntry, WeeklySummary};
use crate::core::types::ChatMessage;

/// Everything a run produced, written once at the end of every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub run_id: u32,
    pub diary_path: String,
    pub state: SimState,
    pub chats: Vec<ChatMessage>,
    pub weekly_summaries: Vec<WeeklySummary>,
    pub timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub run_id: u32,
    pub json: PathBuf,
    pub diary: PathBuf,
}

impl RunPaths {
    pub fn new(export_dir: &Path, run_id: u32) -> Self {
        Self {
            run_id,
            json: export_dir.join(format!("run{run_id}.json")),
            diary: export_dir.join(format!("run{run_id}_diary.txt")),
        }
    }
}

/// One past the highest `runN.json` in `export_dir` (1 when none exist).
pub fn next_run_number(export_dir: &Path) -> Result<u32> {
    if !export_dir.exists() {
        return Ok(1);
    }
    let mut highest = 0;
    for entry in fs::read_dir(export_dir)
        .with_context(|| format!("read export dir {}", export_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", export_dir.display()))?;
        let name = entry.file_name();
        let Some(number) = name
            .to_str()
            .and_then(|n| n.strip_prefix("run"))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        highest = highest.max(number);
    }
    Ok(highest + 1)
}

/// Atomically write the export (temp file + rename).
pub fn write_export(path: &Path, payload: &ExportPayload) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(payload).context("serialize export")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)?;
    info!(
        path = %path.display(),
        chats = payload.chats.len(),
        weeks = payload.weekly_summaries.len(),
        "export written"
    );
    Ok(())
}

pub fn load_export(path: &Path) -> Result<serde_json::Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read export {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse export {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_numbers_skip_unrelated_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        assert_eq!(next_run_number(&dir.join("missing")).expect("missing"), 1);
        assert_eq!(next_run_number(dir).expect("empty"), 1);

        for name in ["run1.json", "run7.json", "run9_diary.txt", "runX.json", "notes.json"] {
            fs::write(dir.join(name), "{}").expect("write");
        }
        assert_eq!(next_run_number(dir).expect("scan"), 8);
    }

    #[test]
    fn run_paths_follow_naming() {
        let paths = RunPaths::new(Path::new("data/exports"), 3);
        assert_eq!(paths.json, Path::new("data/exports/run3.json"));
        assert_eq!(paths.diary, Path::new("data/exports/run3_diary.txt"));
    }

    #[test]
    fn export_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run1.json");
        let payload = ExportPayload {
            run_id: 1,
            diary_path: "run1_diary.txt".to_string(),
            state: SimState::default(),
            chats: Vec::new(),
            weekly_summaries: Vec::new(),
            timeline: Vec::new(),
        };
        write_export(&path, &payload).expect("write");

        let raw = load_export(&path).expect("load");
        assert_eq!(raw["run_id"], 1);
        let back: ExportPayload = serde_json::from_value(raw).expect("typed");
        assert_eq!(back, payload);
    }
}
