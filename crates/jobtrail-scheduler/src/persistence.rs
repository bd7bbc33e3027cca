//! SQLite-backed recipient store.
//!
//! Mirrors the document store's collections as tables so the dispatcher can
//! run self-hosted. Also holds the optional per-day send ledger.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use jobtrail_core::error::{JobtrailError, Result};
use jobtrail_core::traits::RecipientStore;
use jobtrail_core::types::{ActivityStamp, DailyTarget, MessageKind, Recipient, Schedule};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};

/// SQLite persistence for recipients, schedules, targets and activities.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> JobtrailError {
    JobtrailError::Store(e.to_string())
}

impl SqliteStore {
    /// Open or create the database and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| JobtrailError::Store(format!("DB open: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| JobtrailError::Store(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                display_name TEXT,
                notifications_enabled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS schedules (
                recipient_id TEXT PRIMARY KEY REFERENCES recipients(id) ON DELETE CASCADE,
                reminder_time TEXT,             -- HH:MM, reference clock
                summary_time TEXT,
                reminder_template TEXT,
                summary_template TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS daily_targets (
                recipient_id TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
                date TEXT NOT NULL,             -- YYYY-MM-DD, reference clock
                target INTEGER NOT NULL,
                PRIMARY KEY (recipient_id, date)
            );

            -- created_at is untyped: rows hold text dates, timestamps or epoch numbers
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
                created_at NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activities_recipient ON activities(recipient_id);

            CREATE TABLE IF NOT EXISTS sent_log (
                recipient_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                date TEXT NOT NULL,
                claimed_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (recipient_id, kind, date)
            );
            ",
            )
            .map_err(|e| JobtrailError::Store(format!("Migration: {e}")))
    }

    // ─── Writers (seeding, admin tooling, tests) ──────────────

    pub fn upsert_recipient(&self, recipient: &Recipient) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO recipients (id, email, display_name, notifications_enabled)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    email = excluded.email,
                    display_name = excluded.display_name,
                    notifications_enabled = excluded.notifications_enabled",
                params![
                    recipient.id,
                    recipient.email,
                    recipient.display_name,
                    recipient.notifications_enabled as i32
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn upsert_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO schedules
                 (recipient_id, reminder_time, summary_time, reminder_template, summary_template, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
                params![
                    schedule.recipient_id,
                    schedule.reminder_time,
                    schedule.summary_time,
                    schedule.reminder_template,
                    schedule.summary_template
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn set_daily_target(&self, target: &DailyTarget) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO daily_targets (recipient_id, date, target) VALUES (?1, ?2, ?3)",
                params![target.recipient_id, target.date, target.target],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn add_activity(&self, recipient_id: &str, created_at: &ActivityStamp) -> Result<()> {
        let value = match created_at {
            ActivityStamp::Epoch(n) => Value::Integer(*n),
            ActivityStamp::Text(s) => Value::Text(s.clone()),
        };
        self.conn()?
            .execute(
                "INSERT INTO activities (recipient_id, created_at) VALUES (?1, ?2)",
                params![recipient_id, value],
            )
            .map_err(db_err)?;
        Ok(())
    }
}

fn row_to_recipient(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        notifications_enabled: row.get::<_, i32>(3)? != 0,
    })
}

#[async_trait]
impl RecipientStore for SqliteStore {
    async fn list_enabled_recipients(&self) -> Result<Vec<Recipient>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, email, display_name, notifications_enabled FROM recipients
                 WHERE notifications_enabled = 1 ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], row_to_recipient).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn find_recipient(&self, identifier: &str) -> Result<Option<Recipient>> {
        self.conn()?
            .query_row(
                "SELECT id, email, display_name, notifications_enabled FROM recipients
                 WHERE id = ?1 OR email = ?1 COLLATE NOCASE LIMIT 1",
                params![identifier],
                row_to_recipient,
            )
            .optional()
            .map_err(db_err)
    }

    async fn schedule_for(&self, recipient_id: &str) -> Result<Option<Schedule>> {
        self.conn()?
            .query_row(
                "SELECT recipient_id, reminder_time, summary_time, reminder_template, summary_template
                 FROM schedules WHERE recipient_id = ?1",
                params![recipient_id],
                |row| {
                    Ok(Schedule {
                        recipient_id: row.get(0)?,
                        reminder_time: row.get(1)?,
                        summary_time: row.get(2)?,
                        reminder_template: row.get(3)?,
                        summary_template: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    async fn daily_target_for(&self, recipient_id: &str, date: &str) -> Result<Option<DailyTarget>> {
        self.conn()?
            .query_row(
                "SELECT recipient_id, date, target FROM daily_targets WHERE recipient_id = ?1 AND date = ?2",
                params![recipient_id, date],
                |row| {
                    Ok(DailyTarget {
                        recipient_id: row.get(0)?,
                        date: row.get(1)?,
                        target: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    async fn activity_stamps(&self, recipient_id: &str) -> Result<Vec<ActivityStamp>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT created_at FROM activities WHERE recipient_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![recipient_id], |row| row.get::<_, Value>(0))
            .map_err(db_err)?;

        let mut stamps = Vec::new();
        for value in rows {
            match value.map_err(db_err)? {
                Value::Integer(n) => stamps.push(ActivityStamp::Epoch(n)),
                Value::Real(f) => stamps.push(ActivityStamp::Epoch(f as i64)),
                Value::Text(s) => stamps.push(ActivityStamp::Text(s)),
                Value::Null | Value::Blob(_) => {}
            }
        }
        Ok(stamps)
    }

    async fn claim_send(&self, recipient_id: &str, kind: MessageKind, date: &str) -> Result<bool> {
        let inserted = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO sent_log (recipient_id, kind, date) VALUES (?1, ?2, ?3)",
                params![recipient_id, kind.as_str(), date],
            )
            .map_err(db_err)?;
        Ok(inserted == 1)
    }
}
