// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage sinks.
//!
//! A sink performs one insert per reading on a connection it opens and
//! releases within the call. [`StorageSink`] is the boundary the gateway
//! talks to: it builds the row, logs failures, and hands the error back so
//! the loop can count it. It never retries.
//!
//! # Backends
//!
//! - [`PostgresSink`] -- central server (feature `postgres`, default)
//! - [`SqliteSink`] -- local file, also used for bench setups
//! - [`MemorySink`] -- in-process double with failure injection
//! - [`QueuedSink`] -- bounded hand-off to a worker thread around any of the above
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE readings (
//!     id          BIGSERIAL PRIMARY KEY,
//!     sensor_id   TEXT NOT NULL,
//!     humidity    REAL NOT NULL,
//!     temperature REAL NOT NULL,
//!     status      TEXT NOT NULL,
//!     recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

mod memory;
#[cfg(feature = "postgres")]
mod pg;
mod queued;
mod sqlite;

pub use memory::MemorySink;
#[cfg(feature = "postgres")]
pub use pg::PostgresSink;
pub use queued::QueuedSink;
pub use sqlite::SqliteSink;

use crate::classify::Classification;
use crate::config::{StorageBackend, StorageConfig};
use crate::reading::{PersistedRecord, Reading};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Step of a persist call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Schema,
    Begin,
    Insert,
    Commit,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Connect => "connect",
            Stage::Schema => "schema",
            Stage::Begin => "begin",
            Stage::Insert => "insert",
            Stage::Commit => "commit",
            Stage::Query => "query",
        })
    }
}

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SQLite {stage} failed: {source}")]
    Sqlite {
        stage: Stage,
        #[source]
        source: rusqlite::Error,
    },

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL {stage} failed: {source}")]
    Postgres {
        stage: Stage,
        #[source]
        source: postgres::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Persist queue full, record dropped")]
    QueueFull,

    #[error("Persist worker is not running")]
    WorkerStopped,

    #[error("{0} does not support queries")]
    Unsupported(String),

    #[error("Failed to start persist worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub id: i64,
    pub sensor_id: String,
    pub humidity: f64,
    pub temperature: f64,
    pub status: String,
    pub recorded_at: String,
}

/// Final outcome of records handed to a background writer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Records written to the store.
    pub stored: u64,
    /// Records the store refused.
    pub failed: u64,
}

/// A relational store accepting one reading per call.
pub trait ReadingSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Insert one row. Opens and releases its own connection.
    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError>;

    /// Most recent rows, newest first.
    fn recent(&mut self, _limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        Err(SinkError::Unsupported(self.name().to_string()))
    }

    /// Outcome of deferred writes, for sinks that accept a record before
    /// storing it. `None` when `insert` already reports the final result.
    fn worker_stats(&self) -> Option<WorkerStats> {
        None
    }

    /// Release anything held across calls. Called once on shutdown.
    fn close(&mut self) {}
}

impl<S: ReadingSink + ?Sized> ReadingSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError> {
        (**self).insert(record)
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        (**self).recent(limit)
    }

    fn worker_stats(&self) -> Option<WorkerStats> {
        (**self).worker_stats()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Failure-isolating boundary around a sink.
pub struct StorageSink<S: ReadingSink> {
    inner: S,
}

impl<S: ReadingSink> StorageSink<S> {
    /// Wrap a sink.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Access the wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Persist a reading with its decision.
    ///
    /// Failures are logged here; the returned error is informational and
    /// the reading is gone either way.
    pub fn persist(
        &mut self,
        reading: Reading,
        classification: &Classification,
    ) -> Result<(), SinkError> {
        let record = PersistedRecord::new(reading, classification);

        match self.inner.insert(&record) {
            Ok(()) => {
                tracing::debug!(
                    sink = self.inner.name(),
                    sensor = %record.sensor_id,
                    "Reading stored"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    sink = self.inner.name(),
                    sensor = %record.sensor_id,
                    status = %record.status,
                    "Failed to persist reading: {}",
                    err
                );
                Err(err)
            }
        }
    }

    /// Close the wrapped sink.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

/// Open the sink selected by the storage configuration.
///
/// With `queue_capacity > 0` the sink runs on a worker thread behind a
/// bounded queue.
pub fn open(
    config: &StorageConfig,
    queue_capacity: usize,
) -> Result<Box<dyn ReadingSink>, SinkError> {
    let sink: Box<dyn ReadingSink> = match config.backend {
        StorageBackend::Sqlite => Box::new(SqliteSink::open(&config.sqlite_path, &config.table)?),
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => Box::new(PostgresSink::new(&config.database, &config.table)),
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            return Err(SinkError::Backend(
                "built without PostgreSQL support (enable the `postgres` feature)".into(),
            ))
        }
    };

    if queue_capacity > 0 {
        Ok(Box::new(QueuedSink::spawn(sink, queue_capacity)?))
    } else {
        Ok(sink)
    }
}
