// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway loop.
//!
//! [`Pipeline`] turns one text line into at most one stored row:
//! extract, classify, log, persist. [`Gateway`] drives a pipeline from a
//! [`SerialSession`], reconnecting with a fixed backoff whenever the link
//! drops. It runs until its [`StopHandle`] is tripped.

use crate::classify::{Classification, Status, Thresholds};
use crate::config::{ConfigError, GatewayConfig, SerialConfig};
use crate::extract::{decode_line, extract_reading};
use crate::reading::Reading;
use crate::serial::{Poll, PortOpener, SerialError, SerialSession, SystemPortOpener};
use crate::sink::{self, ReadingSink, SinkError, StorageSink};
use chrono::Local;
use serde::Serialize;
use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest uninterrupted sleep; bounds how late a stop is noticed.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Errors raised while setting a gateway up or feeding it a capture.
///
/// Once running, the loop itself never fails: serial and sink errors are
/// handled per kind and counted in [`GatewayStats`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Gateway statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    /// Lines received (serial or replay).
    pub lines_received: u64,
    /// Lines with no usable reading.
    pub lines_discarded: u64,
    /// Readings extracted and classified.
    pub readings: u64,
    /// Readings stored. With a persist queue this counts accepted readings
    /// until the pipeline is closed, then the rows the worker wrote.
    pub persisted: u64,
    /// Readings the sink failed to store.
    pub persist_failures: u64,
    /// Readings dropped because the persist queue was full.
    pub queue_drops: u64,
    /// Serial open attempts.
    pub connect_attempts: u64,
    /// Serial open failures.
    pub connect_failures: u64,
    /// Established links that were lost.
    pub link_losses: u64,
}

impl GatewayStats {
    /// Log all counters at info level.
    pub fn log(&self, message: &str) {
        tracing::info!(
            lines_received = self.lines_received,
            lines_discarded = self.lines_discarded,
            readings = self.readings,
            persisted = self.persisted,
            persist_failures = self.persist_failures,
            queue_drops = self.queue_drops,
            connect_attempts = self.connect_attempts,
            connect_failures = self.connect_failures,
            link_losses = self.link_losses,
            "{}",
            message
        );
    }
}

/// What happened to one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// No reading in the line.
    Discarded,
    /// Reading classified and stored.
    Persisted(Status),
    /// Reading classified, the store refused it; it is gone.
    Dropped(Status),
}

/// Extract → classify → persist, one line at a time.
pub struct Pipeline<S: ReadingSink> {
    thresholds: Thresholds,
    sink: StorageSink<S>,
    stats: GatewayStats,
    max_line_bytes: usize,
}

impl<S: ReadingSink> Pipeline<S> {
    /// Create a pipeline writing to `sink`.
    pub fn new(thresholds: Thresholds, sink: S) -> Self {
        Self {
            thresholds,
            sink: StorageSink::new(sink),
            stats: GatewayStats::default(),
            max_line_bytes: SerialConfig::default().max_line_bytes,
        }
    }

    /// Longest line [`Pipeline::replay`] accepts; longer lines are discarded.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Statistics so far.
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Process one decoded line.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        self.stats.lines_received += 1;

        let Some(reading) = extract_reading(line) else {
            self.stats.lines_discarded += 1;
            tracing::debug!(line = %line, "Discarded line without a reading");
            return LineOutcome::Discarded;
        };

        self.stats.readings += 1;
        let classification = self.thresholds.classify_reading(&reading);
        emit_record(&reading, &classification);

        let status = classification.status;
        match self.sink.persist(reading, &classification) {
            Ok(()) => {
                self.stats.persisted += 1;
                LineOutcome::Persisted(status)
            }
            Err(SinkError::QueueFull) => {
                self.stats.queue_drops += 1;
                LineOutcome::Dropped(status)
            }
            Err(_) => {
                // Already logged at the sink boundary.
                self.stats.persist_failures += 1;
                LineOutcome::Dropped(status)
            }
        }
    }

    /// Feed a captured serial log through the pipeline.
    ///
    /// Lines are split on `\n` and decoded like serial input, so invalid
    /// UTF-8 in a capture is dropped the same way. A line longer than the
    /// line cap is skipped up to its newline and counted as discarded.
    pub fn replay<R: BufRead>(&mut self, mut reader: R) -> Result<(), GatewayError> {
        // One byte over the cap tells an overlong line from one that fits.
        let limit = self.max_line_bytes as u64 + 1;
        let mut raw = Vec::new();
        loop {
            raw.clear();
            let read = (&mut reader).take(limit).read_until(b'\n', &mut raw)?;
            if read == 0 {
                break;
            }

            if read as u64 == limit && raw.last() != Some(&b'\n') {
                skip_line(&mut reader, limit, &mut raw)?;
                self.stats.lines_received += 1;
                self.stats.lines_discarded += 1;
                tracing::debug!(
                    max_line_bytes = self.max_line_bytes,
                    "Discarded overlong line"
                );
                continue;
            }

            let line = decode_line(&raw);
            self.process_line(&line);
        }
        Ok(())
    }

    /// Close the sink. Queued sinks drain before this returns.
    pub fn close(mut self) -> GatewayStats {
        self.sink.close();
        // Queued readings are only known stored once the worker has drained.
        if let Some(worker) = self.sink.inner().worker_stats() {
            self.stats.persisted = worker.stored;
            self.stats.persist_failures += worker.failed;
        }
        self.stats
    }
}

/// Consume input up to and including the next newline, in `limit` chunks.
fn skip_line<R: BufRead>(reader: &mut R, limit: u64, scratch: &mut Vec<u8>) -> io::Result<()> {
    loop {
        scratch.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', scratch)?;
        if read == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Observability record for one classified reading.
fn emit_record(reading: &Reading, classification: &Classification) {
    tracing::info!(
        time = %Local::now().format("%H:%M:%S"),
        sensor = %reading.sensor_id,
        humidity = reading.humidity,
        temperature = reading.temperature,
        status = %classification.status,
        recommendation = classification.recommendation,
        "{}",
        reading
    );
}

/// Handle to stop a running gateway.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the gateway.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Serial ingestion loop.
///
/// The link is either up (poll for lines) or down (attempt a connect). A
/// failed connect or a lost link waits the reconnect backoff before the
/// next attempt; nothing else ends the loop.
pub struct Gateway<O: PortOpener, S: ReadingSink> {
    session: SerialSession<O>,
    pipeline: Pipeline<S>,
    tick: Duration,
    backoff: Duration,
    running: Arc<AtomicBool>,
}

impl Gateway<SystemPortOpener, Box<dyn ReadingSink>> {
    /// Build a gateway for the real serial device and the configured store.
    pub fn open(config: &GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let sink = sink::open(&config.storage, config.persist_queue)?;
        Ok(Self::new(config, SystemPortOpener, sink))
    }
}

impl<O: PortOpener, S: ReadingSink> Gateway<O, S> {
    /// Create a gateway. Nothing is opened until [`Gateway::run`].
    pub fn new(config: &GatewayConfig, opener: O, sink: S) -> Self {
        Self {
            session: SerialSession::new(config.serial.clone(), opener),
            pipeline: Pipeline::new(config.thresholds, sink)
                .with_max_line_bytes(config.serial.max_line_bytes),
            tick: config.tick_interval(),
            backoff: config.serial.reconnect_backoff(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a handle to stop the gateway from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    /// Check if the gateway has not been stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped (blocking).
    ///
    /// On return the port is closed and the sink has been closed.
    pub fn run(mut self) -> GatewayStats {
        tracing::info!(
            port = %self.session.config().port,
            baud = self.session.config().baud_rate,
            backoff_ms = self.backoff.as_millis() as u64,
            "Starting gateway"
        );

        while self.is_running() {
            if !self.session.is_connected() {
                self.pipeline.stats.connect_attempts += 1;
                if let Err(err) = self.session.connect() {
                    self.pipeline.stats.connect_failures += 1;
                    tracing::warn!("{}; retrying in {:?}", err, self.backoff);
                    self.sleep(self.backoff);
                    continue;
                }
            }

            match self.session.poll() {
                Ok(Poll::Line(line)) => {
                    self.pipeline.process_line(&line);
                }
                Ok(Poll::Idle) => self.sleep(self.tick),
                Err(err @ SerialError::LinkLost { .. }) => {
                    self.pipeline.stats.link_losses += 1;
                    tracing::warn!("{}; reconnecting in {:?}", err, self.backoff);
                    self.sleep(self.backoff);
                }
                Err(err @ (SerialError::NotConnected(_) | SerialError::Open { .. })) => {
                    // Next iteration reconnects.
                    tracing::debug!("{}", err);
                }
            }
        }

        self.session.disconnect();
        let stats = self.pipeline.close();
        stats.log("Gateway stopped");
        stats
    }

    /// Sleep for `duration`, returning early once stopped.
    fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}
