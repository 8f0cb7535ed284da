//! Append-only SQLite journal of directive changes.
//!
//! # Storage layout
//!
//! A single table `directive_journal` is created if it does not exist:
//!
//! | column    | type | description                              |
//! |-----------|------|------------------------------------------|
//! | id        | TEXT | UUID v4 primary key                      |
//! | timestamp | TEXT | RFC-3339 creation time (UTC)             |
//! | kind      | TEXT | `goal`, `utterance` or `exchange`        |
//! | content   | TEXT | goal text, utterance, or exchange prompt |
//! | response  | TEXT | exchange outcome, NULL for other kinds   |
//!
//! Insertion order (SQLite `rowid`) is the authoritative order; timestamps
//! are informational.
//!
//! # Example
//!
//! ```rust
//! use rover_memory::journal::{DirectiveJournal, JournalEntry};
//!
//! let journal = DirectiveJournal::open_in_memory().unwrap();
//! journal.append(&JournalEntry::goal("find the red ball")).unwrap();
//! assert_eq!(journal.latest_goal().unwrap().as_deref(), Some("find the red ball"));
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use rover_types::RoverError;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::directive::Exchange;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt journal row: {0}")]
    Corrupt(String),
}

impl From<JournalError> for RoverError {
    fn from(e: JournalError) -> Self {
        RoverError::Storage(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Goal,
    Utterance,
    Exchange,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Utterance => "utterance",
            Self::Exchange => "exchange",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "goal" => Some(Self::Goal),
            "utterance" => Some(Self::Utterance),
            "exchange" => Some(Self::Exchange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub content: String,
    pub response: Option<String>,
}

impl JournalEntry {
    fn new(kind: EntryKind, content: &str, response: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            content: content.to_string(),
            response: response.map(str::to_string),
        }
    }

    pub fn goal(goal: &str) -> Self {
        Self::new(EntryKind::Goal, goal, None)
    }

    pub fn utterance(text: &str) -> Self {
        Self::new(EntryKind::Utterance, text, None)
    }

    pub fn exchange(exchange: &Exchange) -> Self {
        Self {
            timestamp: exchange.at,
            ..Self::new(EntryKind::Exchange, &exchange.prompt, Some(&exchange.response))
        }
    }
}

pub struct DirectiveJournal {
    conn: Connection,
}

impl DirectiveJournal {
    /// Open (or create) a journal database at `path`.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let journal = Self {
            conn: Connection::open(path)?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    pub fn open_in_memory() -> Result<Self, JournalError> {
        let journal = Self {
            conn: Connection::open_in_memory()?,
        };
        journal.init_schema()?;
        Ok(journal)
    }

    fn init_schema(&self) -> Result<(), JournalError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS directive_journal (
                id        TEXT NOT NULL PRIMARY KEY,
                timestamp TEXT NOT NULL,
                kind      TEXT NOT NULL,
                content   TEXT NOT NULL,
                response  TEXT
            );",
        )?;
        Ok(())
    }

    pub fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        self.conn.execute(
            "INSERT INTO directive_journal (id, timestamp, kind, content, response)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.kind.as_str(),
                entry.content,
                entry.response,
            ],
        )?;
        Ok(())
    }

    /// The most recently journalled goal.
    pub fn latest_goal(&self) -> Result<Option<String>, JournalError> {
        let goal = self
            .conn
            .query_row(
                "SELECT content FROM directive_journal
                 WHERE kind = 'goal'
                 ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(goal)
    }

    /// Up to `limit` most recent exchanges, oldest first.
    pub fn recent_exchanges(&self, limit: usize) -> Result<Vec<Exchange>, JournalError> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, content, response FROM directive_journal
             WHERE kind = 'exchange'
             ORDER BY rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let ts: String = row.get(0)?;
            let prompt: String = row.get(1)?;
            let response: Option<String> = row.get(2)?;
            Ok((ts, prompt, response))
        })?;

        let mut exchanges = Vec::new();
        for row in rows {
            let (ts, prompt, response) = row?;
            let at = ts
                .parse::<DateTime<Utc>>()
                .map_err(|e| JournalError::Corrupt(format!("timestamp {ts:?}: {e}")))?;
            exchanges.push(Exchange {
                at,
                prompt,
                response: response.unwrap_or_default(),
            });
        }
        exchanges.reverse();
        Ok(exchanges)
    }

    /// Every entry, in insertion order.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, kind, content, response
             FROM directive_journal ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let ts: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let content: String = row.get(3)?;
            let response: Option<String> = row.get(4)?;
            Ok((id, ts, kind, content, response))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, ts, kind, content, response) = row?;
            entries.push(JournalEntry {
                id: Uuid::parse_str(&id)
                    .map_err(|e| JournalError::Corrupt(format!("id {id:?}: {e}")))?,
                timestamp: ts
                    .parse()
                    .map_err(|e| JournalError::Corrupt(format!("timestamp {ts:?}: {e}")))?,
                kind: EntryKind::parse(&kind)
                    .ok_or_else(|| JournalError::Corrupt(format!("kind {kind:?}")))?,
                content,
                response,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(prompt: &str, response: &str) -> Exchange {
        Exchange {
            at: Utc::now(),
            prompt: prompt.into(),
            response: response.into(),
        }
    }

    #[test]
    fn empty_journal_has_no_goal() {
        let j = DirectiveJournal::open_in_memory().unwrap();
        assert_eq!(j.latest_goal().unwrap(), None);
        assert!(j.recent_exchanges(20).unwrap().is_empty());
    }

    #[test]
    fn latest_goal_wins() {
        let j = DirectiveJournal::open_in_memory().unwrap();
        j.append(&JournalEntry::goal("explore")).unwrap();
        j.append(&JournalEntry::utterance("hello")).unwrap();
        j.append(&JournalEntry::goal("guard the door")).unwrap();
        assert_eq!(j.latest_goal().unwrap().as_deref(), Some("guard the door"));
    }

    #[test]
    fn recent_exchanges_are_bounded_and_oldest_first() {
        let j = DirectiveJournal::open_in_memory().unwrap();
        for i in 0..5 {
            j.append(&JournalEntry::exchange(&exchange(&format!("p{i}"), "ok")))
                .unwrap();
        }
        let recent = j.recent_exchanges(3).unwrap();
        let prompts: Vec<_> = recent.iter().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn entries_preserve_kind_and_response() {
        let j = DirectiveJournal::open_in_memory().unwrap();
        j.append(&JournalEntry::utterance("come here")).unwrap();
        j.append(&JournalEntry::exchange(&exchange("survey", "turn_left -> ok")))
            .unwrap();
        let all = j.entries().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, EntryKind::Utterance);
        assert_eq!(all[0].response, None);
        assert_eq!(all[1].response.as_deref(), Some("turn_left -> ok"));
    }

    #[test]
    fn journal_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        {
            let j = DirectiveJournal::open(&path).unwrap();
            j.append(&JournalEntry::goal("find the cat")).unwrap();
        }
        let j = DirectiveJournal::open(&path).unwrap();
        assert_eq!(j.latest_goal().unwrap().as_deref(), Some("find the cat"));
    }

    #[test]
    fn journal_errors_become_storage_errors() {
        let err: RoverError = JournalError::Corrupt("bad".into()).into();
        assert_eq!(err.kind(), "storage");
    }
}
