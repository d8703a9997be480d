//! Conversation-related types.

use std::collections::VecDeque;

use finscout_model::ModelMessage;
use serde::{Deserialize, Serialize};

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The assistant's final answers.
    Assistant,
}

/// A prior turn of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Turn {
    /// The author of the turn.
    pub role: Role,
    /// The text of the turn.
    pub content: String,
}

impl Turn {
    pub(crate) fn to_message(&self) -> ModelMessage {
        match self.role {
            Role::User => ModelMessage::User(self.content.clone()),
            Role::Assistant => ModelMessage::Assistant(self.content.clone()),
        }
    }
}

/// Read-only access to earlier turns, injected verbatim into prompts.
pub trait ConversationHistory: Send + Sync {
    /// Returns the most recent turns, oldest first.
    fn recent_turns(&self) -> Vec<Turn>;
}

/// A conversation history kept in memory, bounded to the last few
/// question/answer exchanges.
#[derive(Clone, Debug)]
pub struct InMemoryHistory {
    turns: VecDeque<Turn>,
    max_exchanges: usize,
}

impl InMemoryHistory {
    /// Creates an empty history keeping at most `max_exchanges` exchanges.
    #[inline]
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_exchanges,
        }
    }

    /// Appends a question and its answer, evicting the oldest exchange
    /// when the history is full.
    pub fn record_exchange<Q: Into<String>, A: Into<String>>(
        &mut self,
        query: Q,
        answer: A,
    ) {
        self.turns.push_back(Turn {
            role: Role::User,
            content: query.into(),
        });
        self.turns.push_back(Turn {
            role: Role::Assistant,
            content: answer.into(),
        });
        while self.turns.len() > self.max_exchanges * 2 {
            self.turns.pop_front();
        }
    }

    /// Forgets every turn.
    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Returns `true` if nothing has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for InMemoryHistory {
    #[inline]
    fn default() -> Self {
        Self::new(5)
    }
}

impl ConversationHistory for InMemoryHistory {
    fn recent_turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest_exchange() {
        let mut history = InMemoryHistory::new(2);
        history.record_exchange("q1", "a1");
        history.record_exchange("q2", "a2");
        history.record_exchange("q3", "a3");

        let turns = history.recent_turns();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "q2");
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[3].content, "a3");
        assert_eq!(turns[3].role, Role::Assistant);
    }
}
