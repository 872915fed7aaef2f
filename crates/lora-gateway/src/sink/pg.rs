// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PostgreSQL sink
//!
//! Central store for deployed gateways. No connection is held between
//! readings: every insert connects, runs one transaction and disconnects,
//! so a server restart costs at most the reading in flight.

use super::{ReadingSink, SinkError, Stage, StoredRow};
use crate::config::DbConfig;
use crate::reading::PersistedRecord;
use postgres::{Client, Config, NoTls};

fn pg_err(stage: Stage) -> impl FnOnce(postgres::Error) -> SinkError {
    move |source| SinkError::Postgres { stage, source }
}

/// PostgreSQL sink.
pub struct PostgresSink {
    config: Config,
    table: String,
    insert_sql: String,
}

impl PostgresSink {
    /// Build a sink for `db`, writing to `table`.
    ///
    /// Does not touch the network; the first insert does.
    pub fn new(db: &DbConfig, table: &str) -> Self {
        let mut config = Config::new();
        config
            .host(&db.host)
            .port(db.port)
            .dbname(&db.database)
            .user(&db.user)
            .connect_timeout(db.connect_timeout())
            .application_name("lora-gateway");
        if !db.password.is_empty() {
            config.password(&db.password);
        }

        Self {
            config,
            table: table.to_string(),
            // REAL columns; binds go through float8 so f64 values are accepted.
            insert_sql: format!(
                "INSERT INTO {} (sensor_id, humidity, temperature, status)
                 VALUES ($1, $2::float8, $3::float8, $4)",
                table
            ),
        }
    }

    fn connect(&self) -> Result<Client, SinkError> {
        self.config.connect(NoTls).map_err(pg_err(Stage::Connect))
    }
}

impl ReadingSink for PostgresSink {
    fn name(&self) -> &str {
        "postgres"
    }

    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError> {
        let mut client = self.connect()?;

        let mut tx = client.transaction().map_err(pg_err(Stage::Begin))?;
        tx.execute(
            self.insert_sql.as_str(),
            &[
                &record.sensor_id,
                &record.humidity,
                &record.temperature,
                &record.status.as_str(),
            ],
        )
        .map_err(pg_err(Stage::Insert))?;
        tx.commit().map_err(pg_err(Stage::Commit))?;

        // Client dropped here, closing the connection.
        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        let mut client = self.connect()?;
        let limit = limit.min(i64::MAX as usize) as i64;

        let rows = client
            .query(
                format!(
                    "SELECT id::int8, sensor_id, humidity::float8, temperature::float8,
                            status, recorded_at::text
                     FROM {}
                     ORDER BY id DESC
                     LIMIT $1",
                    self.table
                )
                .as_str(),
                &[&limit],
            )
            .map_err(pg_err(Stage::Query))?;

        rows.iter()
            .map(|row| -> Result<StoredRow, postgres::Error> {
                Ok(StoredRow {
                    id: row.try_get(0)?,
                    sensor_id: row.try_get(1)?,
                    humidity: row.try_get(2)?,
                    temperature: row.try_get(3)?,
                    status: row.try_get(4)?,
                    recorded_at: row.try_get(5)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(pg_err(Stage::Query))
    }
}
