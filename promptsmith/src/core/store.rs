//! Append-only message store with tag-filtered branch views.
//!
//! The store keeps two logs: the orchestrator-facing log that drives the
//! protocol, and the user-facing log that holds only what the human sees.
//! Each log has a consumption cursor that only moves forward.

use serde::Serialize;

use crate::core::types::{BranchContext, Dimension, Role, Tags, Turn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageStore {
    model_log: Vec<Turn>,
    user_log: Vec<Turn>,
    model_cursor: usize,
    user_cursor: usize,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the orchestrator log, mirroring user-visible roles into the
    /// user log.
    pub fn append(&mut self, role: Role, content: impl Into<String>, tags: Tags) {
        let turn = Turn::new(role, content, tags);
        if role.is_user_visible() {
            self.user_log.push(turn.clone());
        }
        self.model_log.push(turn);
    }

    /// Append to the user log only (orchestrator-authored user messages and
    /// UI notices).
    pub fn append_user_only(&mut self, role: Role, content: impl Into<String>) {
        self.user_log
            .push(Turn::new(role, content, Tags::universal()));
    }

    /// Ordered subsequence of the orchestrator log visible under `context`.
    pub fn view(&self, context: &BranchContext) -> Vec<Turn> {
        self.model_log
            .iter()
            .filter(|turn| turn.tags.visible_in(context))
            .cloned()
            .collect()
    }

    /// Clear `dimension` on the most recent turn so it becomes universal along
    /// that dimension.
    pub fn close_trailing(&mut self, dimension: Dimension) {
        if let Some(last) = self.model_log.last_mut() {
            last.tags.set(dimension, None);
        }
    }

    pub fn model_log(&self) -> &[Turn] {
        &self.model_log
    }

    pub fn user_log(&self) -> &[Turn] {
        &self.user_log
    }

    pub fn model_cursor(&self) -> usize {
        self.model_cursor
    }

    pub fn user_cursor(&self) -> usize {
        self.user_cursor
    }

    /// True when the orchestrator log grew past the consumption cursor.
    pub fn has_unconsumed(&self) -> bool {
        self.model_log.len() > self.model_cursor
    }

    /// Mark every orchestrator-log turn as consumed.
    pub fn consume(&mut self) {
        self.model_cursor = self.model_log.len();
    }

    /// Return assistant turns added to the user log since the last call and
    /// advance the user cursor.
    pub fn take_user_log_assistant_turns(&mut self) -> Vec<Turn> {
        let fresh = self.user_log[self.user_cursor..]
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .cloned()
            .collect();
        self.user_cursor = self.user_log.len();
        fresh
    }

    /// Advance the user cursor past turns the caller already rendered.
    pub fn mark_user_log_seen(&mut self) {
        self.user_cursor = self.user_log.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|t| t.content.as_str()).collect()
    }

    #[test]
    fn branch_views_isolate_examples() {
        let mut store = MessageStore::new();
        store.append(Role::User, "U", Tags::universal());
        store.append(Role::Assistant, "A", Tags::example(1));
        store.append(Role::Assistant, "B", Tags::example(2));

        assert_eq!(contents(&store.view(&Tags::example(1))), vec!["U", "A"]);
        assert_eq!(contents(&store.view(&Tags::example(2))), vec!["U", "B"]);
        assert_eq!(
            contents(&store.view(&BranchContext::default())),
            vec!["U", "A", "B"]
        );
    }

    #[test]
    fn view_is_pure_and_repeatable() {
        let mut store = MessageStore::new();
        store.append(Role::System, "s", Tags::round(0));
        store.append(Role::System, "t", Tags::round(1));
        let first = store.view(&Tags::round(1));
        let second = store.view(&Tags::round(1));
        assert_eq!(first, second);
        assert_eq!(store.model_log().len(), 2);
        assert_eq!(store.model_cursor(), 0);
    }

    #[test]
    fn only_user_role_is_mirrored_to_user_log() {
        let mut store = MessageStore::new();
        store.append(Role::System, "instructions", Tags::universal());
        store.append(Role::User, "hello", Tags::universal());
        store.append(Role::Assistant, "self.done()", Tags::universal());
        store.append_user_only(Role::Assistant, "hi there");

        assert_eq!(contents(store.user_log()), vec!["hello", "hi there"]);
        assert_eq!(store.model_log().len(), 3);
    }

    #[test]
    fn closing_trailing_tag_makes_turn_universal() {
        let mut store = MessageStore::new();
        store.append(
            Role::Assistant,
            "accepted",
            Tags {
                example: Some(0),
                round: Some(0),
            },
        );
        store.close_trailing(Dimension::Example);

        let visible = store.view(&Tags {
            example: Some(2),
            round: Some(0),
        });
        assert_eq!(contents(&visible), vec!["accepted"]);
        assert!(store.view(&Tags::round(1)).is_empty());
    }

    #[test]
    fn cursor_tracks_consumption() {
        let mut store = MessageStore::new();
        assert!(!store.has_unconsumed());
        store.append(Role::User, "x", Tags::universal());
        assert!(store.has_unconsumed());
        store.consume();
        assert!(!store.has_unconsumed());
        assert_eq!(store.model_cursor(), 1);
    }

    #[test]
    fn take_assistant_turns_advances_user_cursor() {
        let mut store = MessageStore::new();
        store.append(Role::User, "question", Tags::universal());
        store.append_user_only(Role::Assistant, "answer");

        let fresh = store.take_user_log_assistant_turns();
        assert_eq!(contents(&fresh), vec!["answer"]);
        assert!(store.take_user_log_assistant_turns().is_empty());
        assert_eq!(store.user_cursor(), 2);
    }
}
