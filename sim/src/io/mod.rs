//! Side effects of a simulation run: files, HTTP, prompts, schemas.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod config;
pub mod diary;
pub mod export;
pub mod llm;
pub mod prompt;
pub mod rate_limit;
pub mod schema;
pub mod state_store;

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .map(OsString::from)
        .with_context(|| format!("path missing file name {}", path.display()))?;
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
