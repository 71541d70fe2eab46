//! Generation backend abstraction.
//!
//! The [`Generator`] trait decouples the protocol engine from the model that
//! produces text. [`CommandGenerator`] pipes a rendered conversation into a
//! local command; tests use scripted generators that replay canned responses.

use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::chat_format::ChatFormat;
use crate::core::types::Turn;
use crate::errors::BackendError;
use crate::io::config::BackendConfig;
use crate::io::process::run_command_with_timeout;

/// Environment variable carrying the token budget to command backends.
pub const MAX_NEW_TOKENS_ENV: &str = "PROMPTSMITH_MAX_NEW_TOKENS";

/// One generation request: the conversation the model should continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub turns: Vec<Turn>,
    pub max_new_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            max_new_tokens: None,
        }
    }
}

/// Abstraction over text-generation backends.
///
/// Implementations must be shareable across the fan-out worker threads.
pub trait Generator: Send + Sync {
    /// Short label used in logs and session metadata.
    fn name(&self) -> &str;

    /// Layout of prompts this backend consumes; also decides role markers.
    fn format(&self) -> ChatFormat;

    /// Produce the raw continuation of `request.turns`.
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
}

/// Trimmed model output together with how long the backend took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub elapsed: Duration,
}

/// Generate, cut simulated trailing turns, and trim.
///
/// Every engine-side generation goes through here so truncation and timing
/// logs are uniform.
#[instrument(skip_all, fields(backend = generator.name(), turns = request.turns.len()))]
pub fn generate_text(generator: &dyn Generator, request: &GenerateRequest) -> Result<Generation> {
    let started = Instant::now();
    let raw = generator.generate(request)?;
    let elapsed = started.elapsed();
    let text = generator
        .format()
        .truncate_at_role_marker(&raw)
        .trim()
        .to_string();
    info!(
        duration_ms = elapsed.as_millis() as u64,
        prompt_chars = request.turns.iter().map(|t| t.content.len()).sum::<usize>(),
        raw_chars = raw.len(),
        response_chars = text.len(),
        "generation finished"
    );
    debug!(response = %text, "got response from model");
    Ok(Generation { text, elapsed })
}

/// Durations of the successful generations of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingReport {
    durations_ms: Vec<u64>,
}

/// Aggregate view of a [`TimingReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingSummary {
    pub count: usize,
    pub mean_ms: u64,
    pub max_ms: u64,
    pub min_ms: u64,
}

impl TimingReport {
    pub fn record(&mut self, elapsed: Duration) {
        self.durations_ms.push(elapsed.as_millis() as u64);
    }

    /// `None` until something was recorded.
    pub fn summary(&self) -> Option<TimingSummary> {
        let max_ms = *self.durations_ms.iter().max()?;
        let min_ms = *self.durations_ms.iter().min()?;
        let count = self.durations_ms.len();
        let total: u64 = self.durations_ms.iter().sum();
        Some(TimingSummary {
            count,
            mean_ms: total / count as u64,
            max_ms,
            min_ms,
        })
    }
}

/// Generator that runs a configured command per request.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    name: String,
    config: BackendConfig,
}

impl CommandGenerator {
    pub fn new(name: impl Into<String>, config: BackendConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> ChatFormat {
        self.config.format
    }

    #[instrument(skip_all, fields(backend = %self.name))]
    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("{} backend has no command", self.name))?;
        let prompt = self.config.format.render(&request.turns);
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(limit) = request.max_new_tokens.or(self.config.max_new_tokens) {
            cmd.env(MAX_NEW_TOKENS_ENV, limit.to_string());
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = run_command_with_timeout(
            cmd,
            prompt.as_bytes(),
            timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run {} backend", self.name))?;

        if output.timed_out {
            return Err(BackendError::TimedOut {
                backend: self.name.clone(),
                secs: self.config.timeout_secs,
            }
            .into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), stderr = %output.stderr_tail(), "backend failed");
            return Err(BackendError::Failed {
                backend: self.name.clone(),
                code: output.status.code(),
            }
            .into());
        }
        let text = output.stdout_lossy();
        if text.trim().is_empty() {
            return Err(BackendError::Empty {
                backend: self.name.clone(),
            }
            .into());
        }
        Ok(text)
    }
}
