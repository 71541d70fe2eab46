//! Session state threaded through the turn loop and every handler.

use std::collections::VecDeque;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::core::capabilities::CapabilityTable;
use crate::core::store::MessageStore;
use crate::core::types::{BranchContext, Role};
use crate::errors::HandlerError;
use crate::instructions;
use crate::io::artifacts::{SessionMeta, build_prompt_artifacts, write_artifacts};
use crate::io::backend::{Generator, TimingReport};
use crate::io::config::SessionConfig;
use crate::io::prompt::Shot;
use crate::io::transcript::{SessionPaths, write_transcripts};

/// The two generation backends a session talks to.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub orchestrator: &'a dyn Generator,
    pub worker: &'a dyn Generator,
}

/// Discussion record for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRecord {
    pub instruction: String,
    /// Raw worker outputs, one per example.
    pub outputs: Vec<String>,
    /// Outputs the user accepted. Filled when the next round opens.
    pub accepted: Vec<Option<String>>,
    /// User-log length when the round opened.
    pub user_log_start: usize,
    pub comparison: Option<String>,
}

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) capabilities: CapabilityTable,
    pub(crate) store: MessageStore,
    pub(crate) context: BranchContext,
    pub(crate) examples: Vec<String>,
    pub(crate) outputs: Vec<Option<String>>,
    pub(crate) instructions: Vec<String>,
    pub(crate) rounds: Vec<RoundRecord>,
    pub(crate) pending: VecDeque<String>,
    pub(crate) finished: bool,
    pub(crate) timings: TimingReport,
    identity: Option<SessionIdentity>,
}

#[derive(Debug, Clone)]
struct SessionIdentity {
    id: String,
    started_at: String,
    paths: SessionPaths,
}

impl Session {
    pub fn new(config: SessionConfig, capabilities: CapabilityTable) -> Self {
        Self {
            config,
            capabilities,
            store: MessageStore::new(),
            context: BranchContext::default(),
            examples: Vec::new(),
            outputs: Vec::new(),
            instructions: Vec::new(),
            rounds: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
            timings: TimingReport::default(),
            identity: None,
        }
    }

    /// Append the static greeting to the user log and return it.
    pub fn welcome(&mut self) -> &'static str {
        self.store.append_user_only(Role::Assistant, instructions::WELCOME);
        self.store.mark_user_log_seen();
        instructions::WELCOME
    }

    /// Install the orchestrator instructions and the examples.
    ///
    /// Leaves the new turns unconsumed, so the next turn-loop run asks the
    /// orchestrator to open the conversation.
    #[instrument(skip_all, fields(examples = examples.len()))]
    pub fn start(&mut self, examples: Vec<String>) -> Result<()> {
        if self.identity.is_some() {
            return Err(HandlerError::AlreadyStarted.into());
        }
        let mut examples = examples;
        examples.retain(|text| !text.trim().is_empty());
        if examples.is_empty() {
            return Err(HandlerError::NoExamples.into());
        }
        if examples.len() > self.config.max_examples {
            debug!(
                dropped = examples.len() - self.config.max_examples,
                "capping examples"
            );
            examples.truncate(self.config.max_examples);
        }

        self.append(Role::System, instructions::TASK);
        self.append(Role::System, instructions::API);
        for line in self.capabilities.describe() {
            self.append(Role::System, line);
        }
        self.append(Role::System, instructions::EXAMPLES);
        for (i, text) in examples.iter().enumerate() {
            self.append(Role::System, instructions::example_line(i + 1, text));
        }

        self.outputs = vec![None; examples.len()];
        self.examples = examples;

        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let id = session_id(&self.examples, &started_at);
        let paths = SessionPaths::new(&self.config.output_dir.join(&id));
        debug!(session_id = %id, dir = %paths.dir.display(), "session directory assigned");
        self.identity = Some(SessionIdentity {
            id,
            started_at,
            paths,
        });
        self.persist()
    }

    /// A user message, visible to the orchestrator under the current context.
    pub fn add_user_message(&mut self, text: &str) {
        debug!(chars = text.len(), "got input from user");
        self.append(Role::User, text);
        self.store.mark_user_log_seen();
    }

    /// A UI-side notice that only the user sees.
    pub fn add_user_note(&mut self, text: &str) {
        self.store.append_user_only(Role::System, text);
        self.store.mark_user_log_seen();
    }

    /// Orchestrator messages for the user that were not returned yet.
    pub fn take_agent_messages(&mut self) -> Vec<String> {
        self.store
            .take_user_log_assistant_turns()
            .into_iter()
            .map(|turn| turn.content)
            .collect()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn context(&self) -> BranchContext {
        self.context
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    /// Output table of the current round.
    pub fn outputs(&self) -> &[Option<String>] {
        &self.outputs
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    pub fn pending(&self) -> &VecDeque<String> {
        &self.pending
    }

    /// Durations of every successful generation so far.
    pub fn timings(&self) -> &TimingReport {
        &self.timings
    }

    pub fn session_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.id.as_str())
    }

    pub fn paths(&self) -> Option<&SessionPaths> {
        self.identity.as_ref().map(|identity| &identity.paths)
    }

    /// Append under the current branch context.
    pub(crate) fn append(&mut self, role: Role, content: impl Into<String>) {
        self.store.append(role, content, self.context);
    }

    /// Accepted `(text, output)` pairs of the latest round that has any.
    pub(crate) fn latest_shots(&self) -> Vec<Shot> {
        let current = std::iter::once(self.outputs.as_slice());
        let archived = self.rounds.iter().rev().map(|round| round.accepted.as_slice());
        current
            .chain(archived)
            .find(|accepted| accepted.iter().any(Option::is_some))
            .map(|accepted| {
                self.examples
                    .iter()
                    .zip(accepted)
                    .filter_map(|(text, output)| {
                        output.as_ref().map(|output| Shot {
                            text: text.clone(),
                            output: output.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rewrite the transcript snapshots. No-op before `start`.
    pub(crate) fn persist(&self) -> Result<()> {
        let Some(paths) = self.paths() else {
            return Ok(());
        };
        write_transcripts(paths, &self.store, self.examples.len(), self.rounds.len())
    }

    /// Write `chat/prompts.json` and `chat/config.json`.
    pub(crate) fn save_artifacts(&self, backends: Backends<'_>) -> Result<()> {
        let Some(identity) = self.identity.as_ref() else {
            return Ok(());
        };
        let timing = self.timings.summary();
        if let Some(summary) = timing {
            info!(
                generations = summary.count,
                mean_ms = summary.mean_ms,
                max_ms = summary.max_ms,
                min_ms = summary.min_ms,
                "generation timing report"
            );
        }
        let format = backends.worker.format();
        let artifacts = build_prompt_artifacts(&self.instructions, &self.latest_shots(), format)?;
        let meta = SessionMeta {
            session_id: identity.id.clone(),
            started_at: identity.started_at.clone(),
            orchestrator: backends.orchestrator.name().to_string(),
            worker: backends.worker.name().to_string(),
            worker_format: format,
            example_count: self.examples.len(),
            round_count: self.rounds.len(),
            model_cursor: self.store.model_cursor(),
            user_cursor: self.store.user_cursor(),
            finished: self.finished,
            generation: timing,
        };
        write_artifacts(&identity.paths, &artifacts, &meta)
    }
}

/// First 16 hex chars of SHA-256 over the examples and the start timestamp.
pub fn session_id(examples: &[String], started_at: &str) -> String {
    let mut hasher = Sha256::new();
    for text in examples {
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(started_at.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
