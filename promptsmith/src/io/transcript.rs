//! Transcript snapshots under `{output_dir}/{session_id}/`.
//!
//! Snapshots are write-only: the engine never reads them back. Every file is
//! replaced atomically so an external viewer never sees a torn write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::store::MessageStore;
use crate::core::types::{Tags, Turn};
use crate::io::config::write_atomic;

#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub dir: PathBuf,
    pub chat_dir: PathBuf,
    pub branches_dir: PathBuf,
    pub model_chat_path: PathBuf,
    pub user_chat_path: PathBuf,
    pub prompts_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl SessionPaths {
    pub fn new(dir: &Path) -> Self {
        let chat_dir = dir.join("chat");
        let branches_dir = dir.join("branches");
        Self {
            dir: dir.to_path_buf(),
            model_chat_path: chat_dir.join("model_chat.json"),
            user_chat_path: chat_dir.join("user_chat.json"),
            prompts_path: chat_dir.join("prompts.json"),
            config_path: chat_dir.join("config.json"),
            log_path: dir.join("session.log"),
            chat_dir,
            branches_dir,
        }
    }

    /// Branch file for 1-based example `number`.
    pub fn example_path(&self, number: usize) -> PathBuf {
        self.branches_dir.join(format!("example_{number}.json"))
    }

    /// Branch file for 1-based round `number`.
    pub fn round_path(&self, number: usize) -> PathBuf {
        self.branches_dir.join(format!("round_{number}.json"))
    }

    pub fn comparison_path(&self, number: usize) -> PathBuf {
        self.branches_dir
            .join(format!("comparison_round_{number}.json"))
    }
}

/// Auxiliary judgment exchange for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonRecord {
    pub round: usize,
    pub request: Vec<Turn>,
    pub judgment: String,
}

/// Rewrite both full logs and one view per example and per round.
pub fn write_transcripts(
    paths: &SessionPaths,
    store: &MessageStore,
    example_count: usize,
    round_count: usize,
) -> Result<()> {
    write_json(&paths.model_chat_path, store.model_log())?;
    write_json(&paths.user_chat_path, store.user_log())?;
    for index in 0..example_count {
        write_json(&paths.example_path(index + 1), &store.view(&Tags::example(index)))?;
    }
    for index in 0..round_count {
        write_json(&paths.round_path(index + 1), &store.view(&Tags::round(index)))?;
    }
    debug!(
        dir = %paths.dir.display(),
        model_turns = store.model_log().len(),
        user_turns = store.user_log().len(),
        "transcripts written"
    );
    Ok(())
}

pub fn write_comparison(paths: &SessionPaths, record: &ComparisonRecord) -> Result<PathBuf> {
    let path = paths.comparison_path(record.round);
    write_json(&path, record)?;
    Ok(path)
}

/// Pretty JSON with a trailing newline, replaced atomically.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}
