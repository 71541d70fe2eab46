//! Shared deterministic types for the protocol engine.
//!
//! These types define the shape of the conversation log. They carry no I/O and
//! serialize to a stable JSON layout used by the transcript writer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a turn in the orchestrator log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Turns with this role are mirrored into the user-facing log on append.
    pub fn is_user_visible(self) -> bool {
        matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch dimensions a turn can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Example,
    Round,
}

/// Per-turn branch tags. `None` means the turn applies to every branch along
/// that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<usize>,
}

/// The active `(example, round)` selector. Same shape as [`Tags`]: an unset
/// dimension imposes no filter.
pub type BranchContext = Tags;

impl Tags {
    /// Tags that apply to every branch.
    pub fn universal() -> Self {
        Self::default()
    }

    pub fn example(index: usize) -> Self {
        Self {
            example: Some(index),
            round: None,
        }
    }

    pub fn round(index: usize) -> Self {
        Self {
            example: None,
            round: Some(index),
        }
    }

    pub fn get(&self, dimension: Dimension) -> Option<usize> {
        match dimension {
            Dimension::Example => self.example,
            Dimension::Round => self.round,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: Option<usize>) {
        match dimension {
            Dimension::Example => self.example = value,
            Dimension::Round => self.round = value,
        }
    }

    /// True if a turn carrying `self` is visible under `context`.
    pub fn visible_in(&self, context: &BranchContext) -> bool {
        [Dimension::Example, Dimension::Round]
            .into_iter()
            .all(|dim| match (context.get(dim), self.get(dim)) {
                (None, _) | (Some(_), None) => true,
                (Some(wanted), Some(have)) => wanted == have,
            })
    }
}

/// One message in a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tags: Tags,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, tags: Tags) -> Self {
        Self {
            role,
            content: content.into(),
            tags,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, Tags::universal())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Tags::universal())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Tags::universal())
    }
}
