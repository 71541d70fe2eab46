//! Capability table: the calls the orchestrator may emit.
//!
//! Signatures look like `receiver.call_name(arg_a, arg_b)`. The call name is
//! the signature with its argument list stripped; the argument names give the
//! expected arity.

use anyhow::{Result, anyhow};

/// One declared call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub signature: String,
    pub name: String,
    pub params: Vec<String>,
    pub description: String,
}

impl Capability {
    pub fn parse(signature: &str, description: &str) -> Result<Self> {
        let signature = signature.trim();
        let open = signature
            .find('(')
            .ok_or_else(|| anyhow!("capability signature '{signature}' missing '('"))?;
        if !signature.ends_with(')') {
            return Err(anyhow!("capability signature '{signature}' missing ')'"));
        }
        let name = signature[..open].trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("capability signature '{signature}' has empty name"));
        }
        let params = signature[open + 1..signature.len() - 1]
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            signature: signature.to_string(),
            name,
            params,
            description: description.trim().to_string(),
        })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Ordered table of capabilities, built once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: Vec<Capability>,
}

pub const SUBMIT_MESSAGE_TO_USER: &str = "self.submit_message_to_user";
pub const SUBMIT_PROMPT: &str = "self.submit_prompt";
pub const SWITCH_TO_EXAMPLE: &str = "self.switch_to_example";
pub const OUTPUT_ACCEPTED: &str = "self.output_accepted";
pub const END_OUTPUTS_DISCUSSION: &str = "self.end_outputs_discussion";
pub const DONE: &str = "self.done";

const DEFAULT_TABLE: &[(&str, &str)] = &[
    (
        "self.submit_message_to_user(message)",
        "call this function to submit your message to the user. Use markdown to mark the prompts and the outputs.",
    ),
    (
        "self.submit_prompt(prompt)",
        "call this function to inform the system that you have a new suggestion for the prompt. Share the prompt with the user before submitting it.",
    ),
    (
        "self.switch_to_example(example_num)",
        "call this function before you start discussing the output of a specific example with the user.",
    ),
    (
        "self.output_accepted(example_num, output)",
        "call this function every time the user accepts an output. Pass the example number and the output text as parameters.",
    ),
    (
        "self.end_outputs_discussion()",
        "call this function after all the outputs of the current prompt were discussed with the user.",
    ),
    (
        "self.done()",
        "call this function when the user is satisfied with the prompt and the results it produces.",
    ),
];

impl CapabilityTable {
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut entries: Vec<Capability> = Vec::new();
        for (signature, description) in pairs {
            let capability = Capability::parse(signature, description)?;
            if entries.iter().any(|c| c.name == capability.name) {
                return Err(anyhow!("duplicate capability '{}'", capability.name));
            }
            entries.push(capability);
        }
        if entries.is_empty() {
            return Err(anyhow!("capability table must not be empty"));
        }
        Ok(Self { entries })
    }

    /// The table the engine's handlers implement.
    pub fn standard() -> Self {
        Self::from_pairs(DEFAULT_TABLE.iter().copied())
            .expect("built-in capability table should be valid")
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.name.as_str()).collect()
    }

    /// One line per capability, as shown to the orchestrator.
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|c| format!("function {}: {}", c.signature, c.description))
            .collect()
    }
}
