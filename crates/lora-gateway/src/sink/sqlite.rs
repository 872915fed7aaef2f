// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite sink
//!
//! Local storage for gateways without a reachable server, and for bench
//! setups. Each insert opens its own connection.

use super::{ReadingSink, SinkError, Stage, StoredRow};
use crate::reading::PersistedRecord;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a writer waits on a lock held by a concurrent reader.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn sqlite_err(stage: Stage) -> impl FnOnce(rusqlite::Error) -> SinkError {
    move |source| SinkError::Sqlite { stage, source }
}

/// SQLite sink.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE readings (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     sensor_id TEXT NOT NULL,
///     humidity REAL NOT NULL,
///     temperature REAL NOT NULL,
///     status TEXT NOT NULL,
///     recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
    table: String,
    insert_sql: String,
}

impl SqliteSink {
    /// Open (creating if needed) the database file and its table.
    ///
    /// `table` must already be a validated identifier.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, SinkError> {
        let sink = Self {
            path: path.as_ref().to_path_buf(),
            table: table.to_string(),
            insert_sql: format!(
                "INSERT INTO {} (sensor_id, humidity, temperature, status)
                 VALUES (?1, ?2, ?3, ?4)",
                table
            ),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    fn connect(&self) -> Result<Connection, SinkError> {
        let conn = Connection::open(&self.path).map_err(sqlite_err(Stage::Connect))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(sqlite_err(Stage::Connect))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), SinkError> {
        let conn = self.connect()?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sensor_id TEXT NOT NULL,
                    humidity REAL NOT NULL,
                    temperature REAL NOT NULL,
                    status TEXT NOT NULL,
                    recorded_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                )",
                self.table
            ),
            [],
        )
        .map_err(sqlite_err(Stage::Schema))?;

        Ok(())
    }

    fn row_to_stored(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            id: row.get(0)?,
            sensor_id: row.get(1)?,
            humidity: row.get(2)?,
            temperature: row.get(3)?,
            status: row.get(4)?,
            recorded_at: row.get(5)?,
        })
    }
}

impl ReadingSink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError> {
        // Dropped on every return path, rolling back an uncommitted transaction.
        let mut conn = self.connect()?;

        let tx = conn.transaction().map_err(sqlite_err(Stage::Begin))?;
        tx.execute(
            &self.insert_sql,
            params![
                record.sensor_id,
                record.humidity,
                record.temperature,
                record.status.as_str(),
            ],
        )
        .map_err(sqlite_err(Stage::Insert))?;
        tx.commit().map_err(sqlite_err(Stage::Commit))?;

        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, sensor_id, humidity, temperature, status, recorded_at
                 FROM {}
                 ORDER BY id DESC
                 LIMIT ?1",
                self.table
            ))
            .map_err(sqlite_err(Stage::Query))?;

        let limit = limit.min(i64::MAX as usize) as i64;
        let rows = stmt
            .query_map([limit], Self::row_to_stored)
            .map_err(sqlite_err(Stage::Query))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_err(Stage::Query))?;

        Ok(rows)
    }
}
