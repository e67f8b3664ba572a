// ABOUTME: Session store: the ordered list of turns with the system turn pinned at index 0.
// ABOUTME: Supports append, undo of the last exchange, reset, history load, and serialization.

use crate::error::SessionError;
use crate::session::turn::{Role, Turn};

/// An ordered conversation. Index 0 always holds the system turn.
///
/// At most one assistant turn is the streaming target at a time; it is the only
/// turn whose content may change after it has been appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    turns: Vec<Turn>,
    active: Option<usize>,
}

impl Session {
    /// Create a session seeded with the given system turn.
    pub fn new(system: Turn) -> Self {
        Self {
            turns: vec![system],
            active: None,
        }
    }

    /// Replace every turn with `[system]`.
    pub fn reset(&mut self, system: Turn) {
        self.turns.clear();
        self.turns.push(system);
        self.active = None;
    }

    /// Add a turn to the end. An empty assistant turn becomes the streaming target.
    ///
    /// Any earlier target stops being one, since only the trailing turn may grow.
    pub fn append(&mut self, turn: Turn) {
        let is_target = turn.role == Role::Assistant && turn.content.is_empty();
        self.turns.push(turn);
        self.active = is_target.then(|| self.turns.len() - 1);
    }

    /// Overwrite the system turn in place, keeping the history.
    pub fn replace_system_turn(&mut self, system: Turn) {
        self.turns[0] = system;
    }

    /// Remove the last user/assistant pair and return the user's text.
    ///
    /// The pair is removed even if the assistant turn is a partial or failed
    /// response; this mirrors the retry flow where the text is put back into
    /// the input line.
    pub fn undo_last_exchange(&mut self) -> Result<String, SessionError> {
        let len = self.turns.len();
        if len < 3 {
            return Err(SessionError::InsufficientHistory);
        }
        let (user, assistant) = (&self.turns[len - 2], &self.turns[len - 1]);
        if user.role != Role::User || assistant.role != Role::Assistant {
            return Err(SessionError::InsufficientHistory);
        }

        self.turns.pop();
        let user = self.turns.pop().ok_or(SessionError::InsufficientHistory)?;
        if self.active.is_some_and(|i| i >= self.turns.len()) {
            self.active = None;
        }
        Ok(user.content)
    }

    /// Replace turns 1..N with `history`, keeping the current system turn.
    ///
    /// Nothing is applied if `history` carries a system turn.
    pub fn load(&mut self, history: Vec<Turn>) -> Result<(), SessionError> {
        validate_history(&history)?;
        self.turns.truncate(1);
        self.turns.extend(history);
        self.active = None;
        Ok(())
    }

    /// Append `text` to the streaming target.
    pub fn extend_active(&mut self, text: &str) -> Result<(), SessionError> {
        let index = self.active.ok_or(SessionError::NoActiveTurn)?;
        if index + 1 != self.turns.len() {
            return Err(SessionError::NoActiveTurn);
        }
        self.turns[index].content.push_str(text);
        Ok(())
    }

    /// Stop treating any turn as the streaming target; its content is final.
    pub fn finalize_active(&mut self) -> Option<&Turn> {
        let index = self.active.take()?;
        self.turns.get(index)
    }

    pub fn active_turn(&self) -> Option<&Turn> {
        self.active.and_then(|i| self.turns.get(i))
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_turn(&self) -> &Turn {
        &self.turns[0]
    }

    /// Turns after the system turn.
    pub fn history(&self) -> &[Turn] {
        &self.turns[1..]
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Encode turns 1..N as a JSON array of turn objects.
    pub fn serialize(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self.history())
    }

    /// Decode a JSON array of turn objects produced by [`Session::serialize`].
    pub fn deserialize(text: &str) -> serde_json::Result<Vec<Turn>> {
        serde_json::from_str(text)
    }
}

/// Persisted histories never carry a system turn.
pub fn validate_history(history: &[Turn]) -> Result<(), SessionError> {
    match history.iter().position(|t| t.role == Role::System) {
        Some(i) => Err(SessionError::SystemTurnInHistory { index: i + 1 }),
        None => Ok(()),
    }
}
