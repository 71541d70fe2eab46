//! Worker and judgment prompt rendering.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::Turn;

const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");
const COMPARISON_TEMPLATE: &str = include_str!("prompts/comparison.md");

/// Placeholder standing in for the input text in exported prompts.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// One demonstration pair in a few-shot prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shot {
    pub text: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
struct AcceptedContext<'a> {
    number: usize,
    output: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("worker", WORKER_TEMPLATE)
            .expect("worker template should be valid");
        env.add_template("comparison", COMPARISON_TEMPLATE)
            .expect("comparison template should be valid");
        Self { env }
    }

    fn render_worker(&self, instruction: &str, shots: &[Shot], text: &str) -> Result<String> {
        let template = self.env.get_template("worker")?;
        let rendered = template.render(context! {
            instruction => instruction.trim(),
            shots => shots,
            text => text.trim(),
        })?;
        Ok(rendered)
    }

    fn render_comparison(
        &self,
        discussion: &[Turn],
        accepted: &[Option<String>],
        outputs: &[String],
    ) -> Result<String> {
        let accepted: Vec<AcceptedContext<'_>> = accepted
            .iter()
            .enumerate()
            .filter_map(|(i, output)| {
                output.as_deref().map(|output| AcceptedContext {
                    number: i + 1,
                    output,
                })
            })
            .collect();
        let template = self.env.get_template("comparison")?;
        let rendered = template.render(context! {
            discussion => discussion,
            accepted => accepted,
            outputs => outputs,
        })?;
        Ok(rendered)
    }
}

/// Prompt sent to the worker for one example.
///
/// With no shots this is the zero-shot form; shots are laid out as
/// `Text:`/`Output:` pairs ahead of the input.
pub fn worker_prompt(instruction: &str, shots: &[Shot], text: &str) -> Result<String> {
    PromptEngine::new().render_worker(instruction, shots, text)
}

/// Request for the orchestrator to judge a new round against the previous
/// round's discussion and accepted outputs.
pub fn comparison_prompt(
    discussion: &[Turn],
    accepted: &[Option<String>],
    outputs: &[String],
) -> Result<String> {
    PromptEngine::new().render_comparison(discussion, accepted, outputs)
}
