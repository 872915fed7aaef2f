// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded persistence queue.
//!
//! Moves inserts off the serial loop onto a worker thread so a slow store
//! cannot hold up reads. The queue is bounded; when it is full the newest
//! record is dropped and the caller is told so.

use super::{ReadingSink, SinkError, WorkerStats};
use crate::reading::PersistedRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Sink forwarding records to a worker thread that owns the real sink.
pub struct QueuedSink {
    name: String,
    tx: Option<SyncSender<PersistedRecord>>,
    worker: Option<JoinHandle<()>>,
    stored: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl QueuedSink {
    /// Start a worker draining a queue of `capacity` records into `inner`.
    pub fn spawn<S>(mut inner: S, capacity: usize) -> Result<Self, SinkError>
    where
        S: ReadingSink + 'static,
    {
        let name = format!("queued-{}", inner.name());
        let (tx, rx) = mpsc::sync_channel::<PersistedRecord>(capacity.max(1));
        let stored = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let stored_clone = Arc::clone(&stored);
        let failed_clone = Arc::clone(&failed);

        let worker = std::thread::Builder::new()
            .name("persist-worker".to_string())
            .spawn(move || {
                tracing::debug!(sink = inner.name(), "Persist worker started");

                // Ends once the sender is dropped and the queue is drained.
                for record in rx {
                    match inner.insert(&record) {
                        Ok(()) => {
                            stored_clone.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            failed_clone.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                sink = inner.name(),
                                sensor = %record.sensor_id,
                                "Failed to persist queued reading: {}",
                                err
                            );
                        }
                    }
                }

                inner.close();
                tracing::debug!("Persist worker stopped");
            })?;

        Ok(Self {
            name,
            tx: Some(tx),
            worker: Some(worker),
            stored,
            failed,
        })
    }
}

impl ReadingSink for QueuedSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, record: &PersistedRecord) -> Result<(), SinkError> {
        let Some(tx) = &self.tx else {
            return Err(SinkError::WorkerStopped);
        };

        match tx.try_send(record.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::WorkerStopped),
        }
    }

    /// Records the worker has written or failed to write so far.
    fn worker_stats(&self) -> Option<WorkerStats> {
        Some(WorkerStats {
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        })
    }

    /// Drain the queue and stop the worker.
    fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(sink = %self.name, "Persist worker panicked");
            }
        }
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Status;
    use crate::sink::MemorySink;
    use std::sync::{Arc, Barrier};

    fn record(sensor: &str) -> PersistedRecord {
        PersistedRecord {
            sensor_id: sensor.into(),
            humidity: 42.0,
            temperature: 22.0,
            status: Status::Normal,
        }
    }

    #[test]
    fn test_close_drains_queue() {
        let memory = MemorySink::new();
        let mut queued = QueuedSink::spawn(memory.clone(), 16).unwrap();
        assert_eq!(queued.name(), "queued-memory");

        for i in 0..10 {
            queued.insert(&record(&format!("S{}", i))).unwrap();
        }
        queued.close();

        let rows = memory.rows();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0].sensor_id, "S0");
        assert_eq!(rows[9].sensor_id, "S9");
        assert_eq!(queued.worker_stats().unwrap().stored, 10);
    }

    #[test]
    fn test_worker_failures_are_counted() {
        let memory = MemorySink::new();
        memory.fail_next(1);
        let mut queued = QueuedSink::spawn(memory.clone(), 4).unwrap();

        queued.insert(&record("a")).unwrap();
        queued.insert(&record("b")).unwrap();
        queued.close();

        assert_eq!(
            queued.worker_stats(),
            Some(WorkerStats {
                stored: 1,
                failed: 1
            })
        );
        assert_eq!(memory.rows().len(), 1);
    }

    /// Sink that blocks its first insert until the test releases it.
    struct Gate {
        barrier: Arc<Barrier>,
        first: bool,
    }

    impl ReadingSink for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn insert(&mut self, _record: &PersistedRecord) -> Result<(), SinkError> {
            if self.first {
                self.first = false;
                self.barrier.wait();
                self.barrier.wait();
            }
            Ok(())
        }
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let barrier = Arc::new(Barrier::new(2));
        let gate = Gate {
            barrier: Arc::clone(&barrier),
            first: true,
        };
        let mut queued = QueuedSink::spawn(gate, 1).unwrap();

        queued.insert(&record("in-flight")).unwrap();
        // worker now holds the first record
        barrier.wait();

        queued.insert(&record("queued")).unwrap();
        assert!(matches!(
            queued.insert(&record("dropped")),
            Err(SinkError::QueueFull)
        ));

        barrier.wait();
        queued.close();
        assert_eq!(queued.worker_stats().unwrap().stored, 2);
    }

    #[test]
    fn test_insert_after_close_reports_stopped() {
        let mut queued = QueuedSink::spawn(MemorySink::new(), 1).unwrap();
        queued.close();
        assert!(matches!(
            queued.insert(&record("late")),
            Err(SinkError::WorkerStopped)
        ));
    }
}
