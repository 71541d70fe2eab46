//! Prompt exports and session metadata (`chat/prompts.json`, `chat/config.json`).

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::chat_format::ChatFormat;
use crate::core::types::Turn;
use crate::io::backend::TimingSummary;
use crate::io::prompt::{Shot, TEXT_PLACEHOLDER, worker_prompt};
use crate::io::transcript::{SessionPaths, write_json};

/// One suggested instruction, ready to use outside the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptArtifact {
    pub instruction: String,
    /// Worker prompt without demonstrations, rendered in the worker's chat format.
    pub zero_shot: String,
    /// Same, with the accepted outputs as demonstrations. Equal to
    /// `zero_shot` when nothing was accepted.
    pub few_shot: String,
}

/// Session bookkeeping written next to the transcripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub started_at: String,
    pub orchestrator: String,
    pub worker: String,
    pub worker_format: ChatFormat,
    pub example_count: usize,
    pub round_count: usize,
    pub model_cursor: usize,
    pub user_cursor: usize,
    pub finished: bool,
    /// Aggregate generation timing; absent when nothing was generated.
    pub generation: Option<TimingSummary>,
}

/// Render every instruction in history, in order.
pub fn build_prompt_artifacts(
    instructions: &[String],
    shots: &[Shot],
    format: ChatFormat,
) -> Result<Vec<PromptArtifact>> {
    instructions
        .iter()
        .map(|instruction| {
            let zero = worker_prompt(instruction, &[], TEXT_PLACEHOLDER)?;
            let few = worker_prompt(instruction, shots, TEXT_PLACEHOLDER)?;
            Ok(PromptArtifact {
                instruction: instruction.clone(),
                zero_shot: format.render(&[Turn::user(zero)]),
                few_shot: format.render(&[Turn::user(few)]),
            })
        })
        .collect()
}

#[instrument(skip_all, fields(prompts = artifacts.len(), session_id = %meta.session_id))]
pub fn write_artifacts(
    paths: &SessionPaths,
    artifacts: &[PromptArtifact],
    meta: &SessionMeta,
) -> Result<()> {
    write_json(&paths.prompts_path, artifacts)?;
    write_json(&paths.config_path, meta)?;
    debug!(path = %paths.prompts_path.display(), "prompt artifacts written");
    Ok(())
}
