// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory sink.

use super::{ReadingSink, SinkError, StoredRow};
use crate::reading::PersistedRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    rows: Vec<PersistedRecord>,
    fail_next: usize,
    attempts: usize,
}

/// Sink keeping rows in memory.
///
/// Clones share the same rows, so a handle kept outside the gateway sees
/// everything written through the one moved into it. Failures can be
/// injected with [`MemorySink::fail_next`].
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` inserts fail as if the store were unreachable.
    pub fn fail_next(&self, n: usize) {
        self.lock().fail_next = n;
    }

    /// Snapshot of stored rows, oldest first.
    pub fn rows(&self) -> Vec<PersistedRecord> {
        self.lock().rows.clone()
    }

    /// Number of insert calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReadingSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.attempts += 1;

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SinkError::Unavailable("injected failure".into()));
        }

        state.rows.push(record.clone());
        Ok(())
    }

    fn recent(&mut self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        let state = self.lock();
        let rows = state
            .rows
            .iter()
            .enumerate()
            .rev()
            .take(limit)
            .map(|(idx, record)| StoredRow {
                id: idx as i64 + 1,
                sensor_id: record.sensor_id.clone(),
                humidity: record.humidity,
                temperature: record.temperature,
                status: record.status.to_string(),
                recorded_at: String::new(),
            })
            .collect();
        Ok(rows)
    }
}
