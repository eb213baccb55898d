//! Dialogue turn repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::dialogue::{DialogueLog, DialogueTurn};
use crate::{Error, Result};

/// SQLite-backed [`DialogueLog`]
#[derive(Clone)]
pub struct TurnRepo {
    pool: DbPool,
}

impl TurnRepo {
    /// Create a new turn repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Total number of stored turns
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM dialogue_turns", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl DialogueLog for TurnRepo {
    fn record(&self, turn: &DialogueTurn) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO dialogue_turns (id, user_text, npc_reply_text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            [
                turn.id.to_string(),
                turn.user_text.clone(),
                turn.npc_reply_text.clone(),
                turn.timestamp.to_rfc3339(),
            ],
        )?;

        tracing::debug!(turn_id = %turn.id, "dialogue turn stored");
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<DialogueTurn>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, user_text, npc_reply_text, created_at
             FROM dialogue_turns ORDER BY rowid DESC LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let turns = stmt
            .query_map([limit], |row| {
                Ok(DialogueTurn {
                    id: parse_uuid(&row.get::<_, String>(0)?),
                    user_text: row.get(1)?,
                    npc_reply_text: row.get(2)?,
                    timestamp: parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(turns)
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init, init_memory};

    fn setup() -> TurnRepo {
        TurnRepo::new(init_memory().unwrap())
    }

    #[test]
    fn record_and_read_back() {
        let repo = setup();
        let turn = DialogueTurn::new("Hola, ¿dónde está el pan?", "El pan está en la panadería.");
        repo.record(&turn).unwrap();

        let recent = repo.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, turn.id);
        assert_eq!(recent[0].user_text, turn.user_text);
        assert_eq!(recent[0].npc_reply_text, turn.npc_reply_text);
        assert_eq!(recent[0].timestamp.timestamp(), turn.timestamp.timestamp());
    }

    #[test]
    fn recent_orders_newest_first() {
        let repo = setup();
        for i in 0..4 {
            repo.record(&DialogueTurn::new(format!("pregunta {i}"), "respuesta")).unwrap();
        }

        let recent = repo.recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].user_text, "pregunta 3");
        assert_eq!(recent[2].user_text, "pregunta 1");
        assert_eq!(repo.count().unwrap(), 4);
    }

    #[test]
    fn turns_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turns.db");

        let turn = DialogueTurn::new("gracias", "¡De nada!");
        TurnRepo::new(init(&path).unwrap()).record(&turn).unwrap();

        let reopened = TurnRepo::new(init(&path).unwrap());
        assert_eq!(reopened.recent(1).unwrap()[0].id, turn.id);
    }
}
