//! Human-readable transcript, flushed after every line.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::ChatMessage;

/// Open diary file for one run (`runN_diary.txt`).
///
/// Every line is flushed immediately so a crash or interrupt never loses
/// already-simulated chat.
pub struct Diary {
    path: PathBuf,
    out: BufWriter<File>,
}

impl Diary {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create diary {}", path.display()))?;
        debug!(path = %path.display(), "diary opened");
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `[stamp] Speaker: text`.
    pub fn write_message(&mut self, msg: &ChatMessage) -> Result<()> {
        self.write_raw(&format!("{} {}: {}\n", msg.ts, msg.speaker.label(), msg.text))
    }

    /// Append a crash record with the full error chain.
    pub fn write_crash(&mut self, error: &anyhow::Error) -> Result<()> {
        self.write_raw(&format!("\n[SIMULATION CRASH] {error}\n{error:?}\n"))
    }

    fn write_raw(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .with_context(|| format!("write diary {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Persona, Speaker};
    use crate::test_support::message;

    #[test]
    fn lines_are_visible_before_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("exports").join("run1_diary.txt");
        let mut diary = Diary::create(&path).expect("create");

        let mut msg = message("m1", Speaker::Elyx(Persona::Ruby), 1, "Morning! How did you sleep?");
        msg.ts = "[6/2/25, 8:05 AM]".to_string();
        diary.write_message(&msg).expect("write");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "[6/2/25, 8:05 AM] Ruby: Morning! How did you sleep?\n");
        assert_eq!(diary.path(), path.as_path());
    }

    #[test]
    fn crash_record_names_the_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run2_diary.txt");
        let mut diary = Diary::create(&path).expect("create");
        let err = anyhow::anyhow!("provider unreachable").context("elyx reply");
        diary.write_crash(&err).expect("crash");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert!(contents.starts_with("\n[SIMULATION CRASH] elyx reply\n"));
        assert!(contents.contains("provider unreachable"));
    }
}
