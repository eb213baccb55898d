//! Dialogue history
//!
//! Completed clerk exchanges, append-only.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result};

/// One completed exchange between the customer and the clerk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueTurn {
    pub id: Uuid,
    pub user_text: String,
    pub npc_reply_text: String,
    pub timestamp: DateTime<Utc>,
}

impl DialogueTurn {
    /// Stamp a new turn with a fresh id and the current time
    #[must_use]
    pub fn new(user_text: impl Into<String>, npc_reply_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_text: user_text.into(),
            npc_reply_text: npc_reply_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only turn log
pub trait DialogueLog: Send + Sync {
    /// Append a turn
    ///
    /// # Errors
    ///
    /// Returns error if the turn cannot be stored
    fn record(&self, turn: &DialogueTurn) -> Result<()>;

    /// Up to `limit` turns, newest first
    ///
    /// # Errors
    ///
    /// Returns error if the log cannot be read
    fn recent(&self, limit: usize) -> Result<Vec<DialogueTurn>>;
}

/// In-process log for tests and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryDialogueLog {
    turns: Mutex<Vec<DialogueTurn>>,
}

impl MemoryDialogueLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.lock().map_or(0, |t| t.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DialogueLog for MemoryDialogueLog {
    fn record(&self, turn: &DialogueTurn) -> Result<()> {
        self.turns
            .lock()
            .map_err(|e| Error::Database(e.to_string()))?
            .push(turn.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DialogueTurn>> {
        let turns = self.turns.lock().map_err(|e| Error::Database(e.to_string()))?;
        Ok(turns.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_is_newest_first_and_limited() {
        let log = MemoryDialogueLog::new();
        for i in 0..5 {
            log.record(&DialogueTurn::new(format!("u{i}"), format!("n{i}"))).unwrap();
        }

        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_text, "u4");
        assert_eq!(recent[1].user_text, "u3");
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn turns_get_distinct_ids() {
        let a = DialogueTurn::new("hola", "¡Hola!");
        let b = DialogueTurn::new("hola", "¡Hola!");
        assert_ne!(a.id, b.id);
    }
}
