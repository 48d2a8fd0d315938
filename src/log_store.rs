use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::content::UnitId;
use crate::event_log::{KeyKind, KeystrokeEvent};

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything recorded about one finished pass over a unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerseLogRecord {
    pub session_id: String,
    pub unit_id: UnitId,
    pub accuracy: f64,
    pub speed: f64,
    pub error_count: usize,
    pub backspace_count: usize,
    pub time_spent_ms: u64,
    pub events: Vec<KeystrokeEvent>,
}

/// Receiver for finished verse logs.
pub trait VerseLogSink {
    fn submit(&mut self, record: &VerseLogRecord) -> Result<(), LogStoreError>;
}

impl<T: VerseLogSink + ?Sized> VerseLogSink for Box<T> {
    fn submit(&mut self, record: &VerseLogRecord) -> Result<(), LogStoreError> {
        (**self).submit(record)
    }
}

/// Drops every record. Used when no store could be opened.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl VerseLogSink for NullSink {
    fn submit(&mut self, _record: &VerseLogRecord) -> Result<(), LogStoreError> {
        Ok(())
    }
}

impl VerseLogSink for Vec<VerseLogRecord> {
    fn submit(&mut self, record: &VerseLogRecord) -> Result<(), LogStoreError> {
        self.push(record.clone());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredLog {
    pub id: i64,
    pub session_id: String,
    pub unit_id: UnitId,
    pub accuracy: f64,
    pub speed: f64,
    pub error_count: usize,
    pub backspace_count: usize,
    pub time_spent_ms: u64,
    pub logged_at: DateTime<Local>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitSummary {
    pub attempts: usize,
    pub best_accuracy: f64,
    pub avg_speed: f64,
}

/// Local SQLite store for verse logs and their keystrokes.
#[derive(Debug)]
pub struct SqliteLogStore {
    conn: Connection,
}

impl SqliteLogStore {
    pub fn open(path: &Path) -> Result<Self, LogStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LogStoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LogStoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LogStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS verse_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                unit_id INTEGER NOT NULL,
                accuracy REAL NOT NULL,
                speed REAL NOT NULL,
                error_count INTEGER NOT NULL,
                backspace_count INTEGER NOT NULL,
                time_spent_ms INTEGER NOT NULL,
                logged_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS keystroke_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_id INTEGER NOT NULL REFERENCES verse_logs(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                character TEXT,
                expected_char TEXT,
                is_error BOOLEAN NOT NULL,
                position INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_verse_logs_unit ON verse_logs(unit_id);
            CREATE INDEX IF NOT EXISTS idx_keystroke_events_log ON keystroke_events(log_id);
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn recent_logs(&self, limit: usize) -> Result<Vec<StoredLog>, LogStoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, session_id, unit_id, accuracy, speed, error_count,
                   backspace_count, time_spent_ms, logged_at
            FROM verse_logs
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let logged_at: String = row.get(8)?;
            let logged_at = DateTime::parse_from_rfc3339(&logged_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(8, "logged_at".to_string(), rusqlite::types::Type::Text)
                })?
                .with_timezone(&Local);

            Ok(StoredLog {
                id: row.get(0)?,
                session_id: row.get(1)?,
                unit_id: row.get::<_, i64>(2)? as UnitId,
                accuracy: row.get(3)?,
                speed: row.get(4)?,
                error_count: row.get::<_, i64>(5)? as usize,
                backspace_count: row.get::<_, i64>(6)? as usize,
                time_spent_ms: row.get::<_, i64>(7)? as u64,
                logged_at,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn events_for(&self, log_id: i64) -> Result<Vec<KeystrokeEvent>, LogStoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT l.unit_id, e.kind, e.character, e.expected_char, e.is_error, e.position, e.duration_ms
            FROM keystroke_events e
            JOIN verse_logs l ON l.id = e.log_id
            WHERE e.log_id = ?1
            ORDER BY e.id
            "#,
        )?;

        let rows = stmt.query_map([log_id], |row| {
            let kind: String = row.get(1)?;
            let kind = KeyKind::parse(&kind)
                .ok_or_else(|| rusqlite::Error::InvalidColumnType(1, "kind".to_string(), rusqlite::types::Type::Text))?;
            let character: Option<String> = row.get(2)?;
            let expected: Option<String> = row.get(3)?;

            Ok(KeystrokeEvent {
                unit_id: row.get::<_, i64>(0)? as UnitId,
                kind,
                char: character.and_then(|s| s.chars().next()),
                expected_char: expected.and_then(|s| s.chars().next()),
                is_error: row.get(4)?,
                position: row.get::<_, i64>(5)? as usize,
                duration_since_last_ms: row.get::<_, i64>(6)? as u64,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn unit_summary(&self, unit_id: UnitId) -> Result<Option<UnitSummary>, LogStoreError> {
        let summary = self
            .conn
            .query_row(
                r#"
                SELECT COUNT(*), MAX(accuracy), AVG(speed)
                FROM verse_logs
                WHERE unit_id = ?1
                GROUP BY unit_id
                "#,
                [unit_id as i64],
                |row| {
                    Ok(UnitSummary {
                        attempts: row.get::<_, i64>(0)? as usize,
                        best_accuracy: row.get(1)?,
                        avg_speed: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }
}

impl VerseLogSink for SqliteLogStore {
    fn submit(&mut self, record: &VerseLogRecord) -> Result<(), LogStoreError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO verse_logs
            (session_id, unit_id, accuracy, speed, error_count, backspace_count, time_spent_ms, logged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.session_id,
                record.unit_id as i64,
                record.accuracy,
                record.speed,
                record.error_count as i64,
                record.backspace_count as i64,
                record.time_spent_ms as i64,
                Local::now().to_rfc3339(),
            ],
        )?;
        let log_id = tx.last_insert_rowid();

        for event in &record.events {
            tx.execute(
                r#"
                INSERT INTO keystroke_events
                (log_id, kind, character, expected_char, is_error, position, duration_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    log_id,
                    event.kind.to_string(),
                    event.char.map(String::from),
                    event.expected_char.map(String::from),
                    event.is_error,
                    event.position as i64,
                    event.duration_since_last_ms as i64,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}
