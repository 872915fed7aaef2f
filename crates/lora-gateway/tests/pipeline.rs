// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::too_many_lines)] // Example/test code
#![allow(clippy::needless_pass_by_value)] // Test functions
#![allow(clippy::cast_possible_truncation)] // Test parameters

//! End-to-end gateway tests
//!
//! Drive the full loop (serial session, extraction, classification, sink)
//! with scripted serial ports and in-process or SQLite stores.

use lora_gateway::sink::{self, ReadingSink, SqliteSink};
use lora_gateway::{
    Gateway, GatewayConfig, GatewayStats, LineOutcome, MemorySink, PersistedRecord, Pipeline,
    QueuedSink, ScriptedOpener, ScriptedPort, SinkError, Status, StorageBackend, Thresholds,
    UNKNOWN_SENSOR,
};
use std::io;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn fast_config(backoff_ms: u64) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.tick_interval_ms = 10;
    config.serial.reconnect_backoff_ms = backoff_ms;
    config
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Run `gateway` on a thread until `cond` holds, then stop it.
fn run_until<S>(
    gateway: Gateway<ScriptedOpener, S>,
    cond: impl FnMut() -> bool,
) -> GatewayStats
where
    S: ReadingSink + 'static,
{
    let stop = gateway.stop_handle();
    let worker = thread::spawn(move || gateway.run());

    let reached = wait_until(Duration::from_secs(5), cond);
    stop.stop();
    let stats = worker.join().unwrap();
    assert!(reached, "condition not reached, stats: {:?}", stats);
    stats
}

#[test]
fn test_persist_failure_does_not_stop_ingestion() {
    let opener = ScriptedOpener::new();
    opener.push_port(
        ScriptedPort::new()
            .line("LoRa receiver ready")
            .line(r#"RX: {"id":"S1","umid":20.0,"temp":35.0} rssi=-97"#)
            .timeout()
            .line(r#"RX: {"id":"S2","umid":55.0,"temp":22.0} rssi=-88"#),
    );

    let memory = MemorySink::new();
    memory.fail_next(1);

    let gateway = Gateway::new(&fast_config(1000), opener.clone(), memory.clone());
    let stats = run_until(gateway, || memory.rows().len() == 1);

    let rows = memory.rows();
    assert_eq!(rows[0].sensor_id, "S2");
    assert_eq!(rows[0].status, Status::Normal);
    assert_eq!(memory.attempts(), 2);

    assert_eq!(stats.lines_received, 3);
    assert_eq!(stats.lines_discarded, 1);
    assert_eq!(stats.readings, 2);
    assert_eq!(stats.persist_failures, 1);
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.link_losses, 0);
    assert_eq!(opener.attempts().len(), 1);
}

#[test]
fn test_link_loss_reconnects_after_backoff() {
    let backoff = Duration::from_millis(150);

    let opener = ScriptedOpener::new();
    opener.push_port(
        ScriptedPort::new()
            .line(r#"{"id":"S1","umid":45,"temp":21}"#)
            // half a frame, then the cable goes
            .data(br#"{"id":"S9","umid"#)
            .error(io::ErrorKind::BrokenPipe),
    );
    opener.push_failure(io::ErrorKind::NotFound);
    opener.push_port(ScriptedPort::new().line(r#"{"id":"S2","umid":38,"temp":29}"#));

    let memory = MemorySink::new();
    let gateway = Gateway::new(
        &fast_config(backoff.as_millis() as u64),
        opener.clone(),
        memory.clone(),
    );
    let stats = run_until(gateway, || memory.rows().len() == 2);

    let sensors: Vec<String> = memory.rows().into_iter().map(|r| r.sensor_id).collect();
    assert_eq!(sensors, ["S1", "S2"]);

    let attempts = opener.attempts();
    assert_eq!(attempts.len(), 3);
    assert!(attempts[1] - attempts[0] >= backoff);
    assert!(attempts[2] - attempts[1] >= backoff);

    assert_eq!(stats.link_losses, 1);
    assert_eq!(stats.connect_attempts, 3);
    assert_eq!(stats.connect_failures, 1);
}

#[test]
fn test_end_of_stream_counts_as_link_loss() {
    let opener = ScriptedOpener::new();
    opener.push_port(ScriptedPort::new().line(r#"{"id":"S1","umid":60,"temp":20}"#).eof());

    let memory = MemorySink::new();
    let gateway = Gateway::new(&fast_config(20), opener.clone(), memory.clone());
    let stats = run_until(gateway, || opener.attempts().len() >= 2);

    assert_eq!(memory.rows().len(), 1);
    assert_eq!(stats.link_losses, 1);
    assert!(stats.connect_failures >= 1);
}

#[test]
fn test_loose_frames_are_normalised() {
    let opener = ScriptedOpener::new();
    opener.push_port(
        ScriptedPort::new()
            .line(r#"{"umid":"35.5"}"#)
            .line(r#"noise {"id":"S4","umid":30}} trailing junk"#)
            .line("}garbage{")
            .line("[1, 2, 3]"),
    );

    let memory = MemorySink::new();
    let gateway = Gateway::new(&fast_config(1000), opener, memory.clone());
    let stats = run_until(gateway, || memory.rows().len() == 2);

    let rows = memory.rows();
    assert_eq!(rows[0].sensor_id, UNKNOWN_SENSOR);
    assert_eq!(rows[0].humidity, 35.5);
    assert_eq!(rows[0].temperature, 0.0);
    assert_eq!(rows[0].status, Status::Attention);

    assert_eq!(rows[1].sensor_id, "S4");
    assert_eq!(rows[1].humidity, 30.0);
    assert_eq!(rows[1].temperature, 0.0);

    // the last two lines may or may not have been read before the stop
    assert!(stats.lines_discarded <= 2);
}

#[test]
fn test_queued_sqlite_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(1000);
    config.persist_queue = 4;
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.sqlite_path = dir.path().join("gateway.db");

    let opener = ScriptedOpener::new();
    opener.push_port(
        ScriptedPort::new()
            .line(r#"{"id":"A","umid":45,"temp":20}"#)
            .line(r#"{"id":"B","umid":35,"temp":25}"#)
            .line(r#"{"id":"C","umid":15,"temp":33}"#),
    );

    let sink = sink::open(&config.storage, config.persist_queue).unwrap();
    assert_eq!(sink.name(), "queued-sqlite");

    let mut reader = SqliteSink::open(&config.storage.sqlite_path, &config.storage.table).unwrap();
    let gateway = Gateway::new(&config, opener, sink);
    let stats = run_until(gateway, || {
        reader.recent(10).map(|rows| rows.len() == 3).unwrap_or(false)
    });

    // run() closes the sink, which drains the queue before returning
    let rows = SqliteSink::open(&config.storage.sqlite_path, &config.storage.table)
        .unwrap()
        .recent(10)
        .unwrap();
    let statuses: Vec<&str> = rows.iter().map(|r| r.status.as_str()).collect();
    assert_eq!(statuses, ["CRITICAL", "ATTENTION", "NORMAL"]);
    assert_eq!(stats.persisted, 3);
    assert_eq!(stats.queue_drops, 0);
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
fn test_full_queue_counts_drop_and_keeps_going() {
    let barrier = Arc::new(Barrier::new(2));
    let gate = Gate {
        barrier: Arc::clone(&barrier),
        first: true,
    };
    let queued = QueuedSink::spawn(gate, 1).unwrap();
    let mut pipeline = Pipeline::new(Thresholds::default(), queued);

    assert_eq!(
        pipeline.process_line(r#"{"id":"S1","umid":55,"temp":22}"#),
        LineOutcome::Persisted(Status::Normal)
    );
    // worker now holds S1, the queue is empty
    barrier.wait();

    assert_eq!(
        pipeline.process_line(r#"{"id":"S2","umid":55,"temp":22}"#),
        LineOutcome::Persisted(Status::Normal)
    );
    assert_eq!(
        pipeline.process_line(r#"{"id":"S3","umid":10,"temp":22}"#),
        LineOutcome::Dropped(Status::Attention)
    );
    assert_eq!(pipeline.stats().queue_drops, 1);
    assert_eq!(pipeline.stats().persist_failures, 0);

    // a line after the drop is still processed
    assert_eq!(pipeline.process_line("boot ok"), LineOutcome::Discarded);

    barrier.wait();
    let stats = pipeline.close();
    assert_eq!(stats.readings, 3);
    assert_eq!(stats.persisted, 2);
    assert_eq!(stats.queue_drops, 1);
    assert_eq!(stats.persist_failures, 0);
}
