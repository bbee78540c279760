//! Access to the exercise record table.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, Row};

use super::record::{ExerciseId, ExerciseRecord, ExerciseStatus};
use crate::error::StoreError;

/// Opens connections to the record table.
pub trait RecordStore {
    type Connection: RecordConnection;

    fn connect(&self) -> Result<Self::Connection, StoreError>;
}

/// Operations the coordinator needs from one open connection.
pub trait RecordConnection {
    /// Records whose status is Calibrating or ReadyOrDone, in id order.
    fn eligible_records(&mut self) -> Result<Vec<ExerciseRecord>, StoreError>;

    /// Sets `status` on record `id` and commits.
    fn update_status(&mut self, id: ExerciseId, status: ExerciseStatus) -> Result<(), StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS exercises (
    id       INTEGER PRIMARY KEY,
    name     TEXT    NOT NULL,
    category TEXT    NOT NULL,
    status   INTEGER NOT NULL DEFAULT 3
);
";

/// SQLite-backed exercise table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for SqliteStore {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<SqliteConnection, StoreError> {
        let conn = Connection::open(&self.path)?;
        Ok(SqliteConnection { conn })
    }
}

pub struct SqliteConnection {
    conn: Connection,
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(ExerciseId, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

impl SqliteConnection {
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert(&self, name: &str, category: &str, status: ExerciseStatus) -> Result<ExerciseId, StoreError> {
        self.conn.execute(
            "INSERT INTO exercises (name, category, status) VALUES (?1, ?2, ?3)",
            params![name, category, status.code()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn all_records(&self) -> Result<Vec<ExerciseRecord>, StoreError> {
        self.query("SELECT id, name, category, status FROM exercises ORDER BY id")
    }

    fn query(&self, sql: &str) -> Result<Vec<ExerciseRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, category, code) = row?;
            let status = ExerciseStatus::from_code(code).ok_or(StoreError::UnknownStatus { id, status: code })?;
            records.push(ExerciseRecord {
                id,
                name,
                category,
                status,
            });
        }
        Ok(records)
    }
}

impl RecordConnection for SqliteConnection {
    fn eligible_records(&mut self) -> Result<Vec<ExerciseRecord>, StoreError> {
        self.query("SELECT id, name, category, status FROM exercises WHERE status IN (1, 3) ORDER BY id")
    }

    fn update_status(&mut self, id: ExerciseId, status: ExerciseStatus) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE exercises SET status = ?1 WHERE id = ?2",
            params![status.code(), id],
        )?;
        tx.commit()?;
        Ok(())
    }
}
