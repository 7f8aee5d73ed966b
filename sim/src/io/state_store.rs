//! Member state storage (`data/seed_state.json` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::state::SimState;

/// Load member state from disk.
///
/// A missing file yields the default seed state.
pub fn load_state(path: &Path) -> Result<SimState> {
    if !path.exists() {
        info!(path = %path.display(), "state file missing, starting from seed defaults");
        return Ok(SimState::default());
    }
    debug!(path = %path.display(), "loading state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: SimState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(date = %state.date_iso, run_id = ?state.run_id, "state loaded");
    Ok(state)
}

/// Atomically write member state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &SimState) -> Result<()> {
    debug!(path = %path.display(), date = %state.date_iso, "writing state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
