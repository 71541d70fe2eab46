//! Conversation rendering for text-completion backends.
//!
//! Each format knows how to lay out a conversation view as one prompt string
//! and which role markers signal that the model started simulating the next
//! turn.

use serde::{Deserialize, Serialize};

use crate::core::types::{Role, Turn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatFormat {
    #[default]
    Llama3,
    Mixtral,
    Plain,
}

const LLAMA_BEGIN: &str = "<|begin_of_text|>";
const LLAMA_HEADER_START: &str = "<|start_header_id|>";
const LLAMA_HEADER_END: &str = "<|end_header_id|>";
const LLAMA_END_OF_MESSAGE: &str = "<|eot_id|>";
const MIXTRAL_BOS: &str = "<s>";
const MIXTRAL_EOS: &str = "</s>";

impl ChatFormat {
    /// Render `turns` as a single prompt ending where the assistant speaks next.
    pub fn render(self, turns: &[Turn]) -> String {
        match self {
            ChatFormat::Llama3 => render_llama3(turns),
            ChatFormat::Mixtral => render_mixtral(turns),
            ChatFormat::Plain => render_plain(turns),
        }
    }

    fn role_markers(self) -> &'static [&'static str] {
        match self {
            ChatFormat::Llama3 => &[LLAMA_END_OF_MESSAGE, LLAMA_HEADER_START],
            ChatFormat::Mixtral => &["[INST]", MIXTRAL_EOS],
            ChatFormat::Plain => &["\nuser:", "\nsystem:"],
        }
    }

    /// Cut `text` at the first role marker, dropping simulated trailing turns.
    pub fn truncate_at_role_marker(self, text: &str) -> String {
        let cut = self
            .role_markers()
            .iter()
            .filter_map(|marker| text.find(marker))
            .min()
            .unwrap_or(text.len());
        text[..cut].to_string()
    }
}

fn llama_header(role: Role) -> String {
    format!("{LLAMA_HEADER_START}{role}{LLAMA_HEADER_END}")
}

fn render_llama3(turns: &[Turn]) -> String {
    let mut out = String::from(LLAMA_BEGIN);
    for turn in turns {
        out.push_str(&llama_header(turn.role));
        out.push_str("\n\n");
        out.push_str(&turn.content);
        out.push_str(LLAMA_END_OF_MESSAGE);
    }
    out.push_str(&llama_header(Role::Assistant));
    out
}

fn render_mixtral(turns: &[Turn]) -> String {
    // Mixtral has no system role and rejects repeated roles, so system turns are
    // folded into user turns and consecutive same-role turns are merged.
    let mut merged: Vec<(Role, String)> = Vec::new();
    for turn in turns {
        let (role, content) = match turn.role {
            Role::System => (Role::User, format!("system: {}", turn.content)),
            Role::User => (Role::User, format!("user: {}", turn.content)),
            Role::Assistant => (Role::Assistant, turn.content.clone()),
        };
        match merged.last_mut() {
            Some((last_role, last)) if *last_role == role => {
                last.push('\n');
                last.push_str(&content);
            }
            _ => merged.push((role, content)),
        }
    }

    let mut out = String::from(MIXTRAL_BOS);
    for (role, content) in merged {
        if role == Role::User {
            out.push_str(&format!("[INST] {content} [/INST] "));
        } else {
            out.push_str(&format!("{content}{MIXTRAL_EOS} "));
        }
    }
    out
}

fn render_plain(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!("{}: {}\n\n", turn.role, turn.content));
    }
    out.push_str("assistant:");
    out
}
