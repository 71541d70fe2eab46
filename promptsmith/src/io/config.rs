//! Session configuration stored under `.promptsmith/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::chat_format::ChatFormat;

/// Session configuration (TOML).
///
/// Missing fields default to values that work with a local llama3 CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory that receives one sub-directory of transcripts per session.
    pub output_dir: PathBuf,

    /// Examples beyond this count are ignored.
    pub max_examples: usize,

    /// Backend that plays the orchestrator.
    pub orchestrator: BackendConfig,

    /// Backend that executes proposed prompts against the examples.
    pub worker: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Command that reads a rendered prompt on stdin and prints the completion.
    pub command: Vec<String>,

    /// Prompt layout expected by the model behind `command`.
    pub format: ChatFormat,

    /// Wall-clock budget for one generation.
    pub timeout_secs: u64,

    /// Truncate stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Forwarded to the command as `PROMPTSMITH_MAX_NEW_TOKENS` when set.
    pub max_new_tokens: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "llama3".to_string(),
            ],
            format: ChatFormat::Llama3,
            timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
            max_new_tokens: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("_out"),
            max_examples: 3,
            orchestrator: BackendConfig::default(),
            worker: BackendConfig::default(),
        }
    }
}

impl BackendConfig {
    fn validate(&self, label: &str) -> Result<()> {
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("{label}.command must be a non-empty array"));
        }
        if self.timeout_secs == 0 {
            return Err(anyhow!("{label}.timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("{label}.output_limit_bytes must be > 0"));
        }
        if self.max_new_tokens == Some(0) {
            return Err(anyhow!("{label}.max_new_tokens must be > 0 when set"));
        }
        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_examples == 0 {
            return Err(anyhow!("max_examples must be > 0"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow!("output_dir must not be empty"));
        }
        self.orchestrator.validate("orchestrator")?;
        self.worker.validate("worker")?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
