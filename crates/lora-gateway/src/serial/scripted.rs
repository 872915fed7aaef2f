// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted serial ports for tests and bench runs without hardware.

use super::PortOpener;
use crate::config::SerialConfig;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// One scripted read outcome.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes returned by the next read(s).
    Data(Vec<u8>),
    /// The read times out.
    Timeout,
    /// The read fails with this error kind.
    Error(io::ErrorKind),
    /// The read returns 0 bytes (device closed).
    Eof,
}

/// In-memory port replaying a fixed script.
///
/// Once the script is exhausted every read times out, like a silent device.
#[derive(Debug, Default)]
pub struct ScriptedPort {
    steps: VecDeque<Step>,
}

impl ScriptedPort {
    /// Create an empty (silent) port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes.
    pub fn data(mut self, bytes: &[u8]) -> Self {
        self.steps.push_back(Step::Data(bytes.to_vec()));
        self
    }

    /// Queue a `\n`-terminated line.
    pub fn line(mut self, line: &str) -> Self {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.steps.push_back(Step::Data(bytes));
        self
    }

    /// Queue a read timeout.
    pub fn timeout(mut self) -> Self {
        self.steps.push_back(Step::Timeout);
        self
    }

    /// Queue a read error.
    pub fn error(mut self, kind: io::ErrorKind) -> Self {
        self.steps.push_back(Step::Error(kind));
        self
    }

    /// Queue end-of-stream.
    pub fn eof(mut self) -> Self {
        self.steps.push_back(Step::Eof);
        self
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            None | Some(Step::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "scripted read timeout",
            )),
            Some(Step::Error(kind)) => Err(io::Error::new(kind, "scripted read failure")),
            Some(Step::Eof) => Ok(0),
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

#[derive(Debug, Default)]
struct OpenerState {
    outcomes: VecDeque<Result<ScriptedPort, io::ErrorKind>>,
    attempts: Vec<Instant>,
}

/// Opener handing out scripted ports in order.
///
/// Clones share state, so a test can keep one clone to inspect attempts
/// after moving the other into a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOpener {
    state: Arc<Mutex<OpenerState>>,
}

impl ScriptedOpener {
    /// Create an opener with nothing queued (every open fails).
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful open returning `port`.
    pub fn push_port(&self, port: ScriptedPort) {
        self.lock().outcomes.push_back(Ok(port));
    }

    /// Queue a failed open.
    pub fn push_failure(&self, kind: io::ErrorKind) {
        self.lock().outcomes.push_back(Err(kind));
    }

    /// Instants of every open attempt so far.
    pub fn attempts(&self) -> Vec<Instant> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OpenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortOpener for ScriptedOpener {
    type Port = ScriptedPort;

    fn open(&mut self, config: &SerialConfig) -> io::Result<ScriptedPort> {
        let mut state = self.lock();
        state.attempts.push(Instant::now());

        match state.outcomes.pop_front() {
            Some(Ok(port)) => Ok(port),
            Some(Err(kind)) => Err(io::Error::new(
                kind,
                format!("scripted open failure for {}", config.port),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such device: {}", config.port),
            )),
        }
    }
}
