//! Deterministic generators for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::capabilities::CapabilityTable;
use crate::core::chat_format::ChatFormat;
use crate::errors::BackendError;
use crate::io::backend::{GenerateRequest, Generator};
use crate::io::config::SessionConfig;
use crate::session::Session;

/// Session whose output directory is a fresh temporary directory.
///
/// Keep the returned guard alive for as long as the session writes.
pub fn scratch_session() -> (TempDir, Session) {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = SessionConfig {
        output_dir: temp.path().to_path_buf(),
        ..SessionConfig::default()
    };
    (temp, Session::new(config, CapabilityTable::standard()))
}

/// Replays canned responses in order and records every request.
///
/// Once the script runs out, the last response repeats. A generator built
/// with no responses fails every request.
pub struct ScriptedGenerator {
    name: String,
    format: ChatFormat,
    script: Mutex<Script>,
    requests: Mutex<Vec<GenerateRequest>>,
}

struct Script {
    queue: VecDeque<String>,
    last: Option<String>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(name: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            format: ChatFormat::Plain,
            script: Mutex::new(Script {
                queue: responses.into_iter().map(Into::into).collect(),
                last: None,
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_format(mut self, format: ChatFormat) -> Self {
        self.format = format;
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> ChatFormat {
        self.format
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("request log poisoned"))?
            .push(request.clone());
        let mut script = self
            .script
            .lock()
            .map_err(|_| anyhow!("script poisoned"))?;
        if let Some(next) = script.queue.pop_front() {
            script.last = Some(next.clone());
            return Ok(next);
        }
        script.last.clone().ok_or_else(|| {
            BackendError::Empty {
                backend: self.name.clone(),
            }
            .into()
        })
    }
}

struct Rule {
    key: String,
    response: Option<String>,
    delay: Duration,
}

/// Answers by matching a substring of the request, with an optional delay.
///
/// Records responses in completion order so tests can tell completion order
/// apart from result order.
pub struct KeyedGenerator {
    name: String,
    rules: Vec<Rule>,
    completed: Mutex<Vec<String>>,
}

impl KeyedGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            completed: Mutex::new(Vec::new()),
        }
    }

    /// Answer `response` after `delay` when any turn contains `key`.
    pub fn rule(mut self, key: &str, response: &str, delay: Duration) -> Self {
        self.rules.push(Rule {
            key: key.to_string(),
            response: Some(response.to_string()),
            delay,
        });
        self
    }

    /// Fail with exit status 1 when any turn contains `key`.
    pub fn failing(mut self, key: &str) -> Self {
        self.rules.push(Rule {
            key: key.to_string(),
            response: None,
            delay: Duration::ZERO,
        });
        self
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Generator for KeyedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> ChatFormat {
        ChatFormat::Plain
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let rule = self
            .rules
            .iter()
            .find(|rule| request.turns.iter().any(|t| t.content.contains(&rule.key)))
            .ok_or_else(|| anyhow!("no rule matches request"))?;
        thread::sleep(rule.delay);
        let Some(response) = rule.response.clone() else {
            return Err(BackendError::Failed {
                backend: self.name.clone(),
                code: Some(1),
            }
            .into());
        };
        self.completed
            .lock()
            .map_err(|_| anyhow!("completion log poisoned"))?
            .push(response.clone());
        Ok(response)
    }
}
