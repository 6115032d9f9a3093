//! Conversation management

use crate::agent::types::Turn;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// An interactive chat session
///
/// Turns only ever grow during a request; rollback truncates back to a
/// length captured earlier.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: Uuid,
    /// Turns in the conversation, oldest first
    turns: Vec<Turn>,
    /// When the conversation started
    pub created_at: DateTime<Utc>,
    /// When the conversation was last updated
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create a new, empty conversation
    pub fn new() -> Self {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn to the conversation
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Utc::now();
    }

    /// Add a user message
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Turn::user(content));
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Drop every turn past `len`
    pub fn truncate(&mut self, len: usize) {
        if len < self.turns.len() {
            self.turns.truncate(len);
            self.updated_at = Utc::now();
        }
    }

    /// Get turn count
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if conversation is empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Time between the session start and its last change
    pub fn active_duration(&self) -> Duration {
        self.updated_at - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::Role;

    #[test]
    fn test_conversation_creation() {
        let conv = Conversation::new();
        assert!(conv.is_empty());
        assert_eq!(conv.created_at, conv.updated_at);
        assert_eq!(conv.active_duration(), Duration::zero());
        assert_ne!(conv.id, Conversation::new().id);
    }

    #[test]
    fn test_push_touches_updated_at() {
        let mut conv = Conversation::new();
        let started = conv.updated_at;
        conv.add_user_message("Hello");

        assert!(conv.updated_at >= started);
        assert_eq!(conv.created_at, started);
        assert!(conv.active_duration() >= Duration::zero());
    }

    #[test]
    fn test_add_turns() {
        let mut conv = Conversation::new();
        conv.add_user_message("Hello");
        conv.push(Turn::model("Hi there!"));

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[0].role, Role::User);
        assert_eq!(conv.turns()[1].role, Role::Model);
        assert_eq!(conv.turns()[1].text(), "Hi there!");
    }

    #[test]
    fn test_truncate_rolls_back() {
        let mut conv = Conversation::new();
        conv.add_user_message("one");
        conv.push(Turn::model("two"));
        let mark = conv.len();
        conv.add_user_message("three");
        conv.push(Turn::model("four"));

        conv.truncate(mark);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.turns()[1].text(), "two");

        // Truncating past the end is a no-op
        conv.truncate(10);
        assert_eq!(conv.len(), 2);
    }
}
