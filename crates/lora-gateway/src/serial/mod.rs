// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial session management.
//!
//! A [`SerialSession`] owns at most one open port at a time. The handle
//! lives inside the session state, so "connected" and "has a handle" are
//! the same thing and no locking is involved.
//!
//! # State machine
//!
//! ```text
//!                connect() ok
//! Disconnected ---------------> Connected
//!      ^  |                        |
//!      |  | connect() err          | poll(): I/O error or EOF
//!      |  v                        v
//!      +-- Degraded(reason) <------+
//!          (connect() allowed again after the caller's backoff)
//! ```
//!
//! `poll()` distinguishes three outcomes: a complete line, no data within
//! the read timeout ([`Poll::Idle`]), and a lost link
//! ([`SerialError::LinkLost`]).

mod scripted;

pub use scripted::{ScriptedOpener, ScriptedPort, Step};

use crate::config::SerialConfig;
use crate::extract::decode_line;
use std::io::{self, Read};
use thiserror::Error;

/// Read chunk size; LoRa frames are well under this.
const READ_CHUNK: usize = 256;

/// Serial session errors.
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("serial link lost on {port}: {source}")]
    LinkLost {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("serial port {0} is not connected")]
    NotConnected(String),
}

/// Opens serial ports.
///
/// Abstracted so the session state machine can run against scripted
/// in-memory ports.
pub trait PortOpener {
    /// Port handle type.
    type Port: Read;

    /// Open the configured device.
    fn open(&mut self, config: &SerialConfig) -> io::Result<Self::Port>;
}

/// Opens real devices through the `serialport` crate (8N1, no flow control).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    type Port = Box<dyn serialport::SerialPort>;

    fn open(&mut self, config: &SerialConfig) -> io::Result<Self::Port> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        // Drop boot banners and half frames buffered before we attached.
        if let Err(err) = port.clear(serialport::ClearBuffer::Input) {
            tracing::debug!("Failed to clear serial input buffer: {}", err);
        }

        Ok(port)
    }
}

/// Observable connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle, no failure recorded.
    Disconnected,
    /// Port open and readable.
    Connected,
    /// No handle; the last open or read failed with this reason.
    Degraded(String),
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// One decoded line, terminator stripped.
    Line(String),
    /// Nothing arrived within the read timeout.
    Idle,
}

enum Link<P> {
    Disconnected,
    Connected(LineReader<P>),
    Degraded(String),
}

/// Owner of the serial connection lifecycle.
pub struct SerialSession<O: PortOpener> {
    opener: O,
    config: SerialConfig,
    link: Link<O::Port>,
}

impl<O: PortOpener> SerialSession<O> {
    /// Create a disconnected session.
    pub fn new(config: SerialConfig, opener: O) -> Self {
        Self {
            opener,
            config,
            link: Link::Disconnected,
        }
    }

    /// Serial configuration in use.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        match &self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connected(_) => ConnectionState::Connected,
            Link::Degraded(reason) => ConnectionState::Degraded(reason.clone()),
        }
    }

    /// Check if a port is open.
    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    /// Open the port if not already open.
    ///
    /// On failure the session is left degraded; the caller owns the backoff.
    pub fn connect(&mut self) -> Result<(), SerialError> {
        if self.is_connected() {
            return Ok(());
        }

        match self.opener.open(&self.config) {
            Ok(port) => {
                tracing::info!(
                    port = %self.config.port,
                    baud = self.config.baud_rate,
                    "Serial port connected"
                );
                self.link = Link::Connected(LineReader::new(port, self.config.max_line_bytes));
                Ok(())
            }
            Err(source) => {
                self.link = Link::Degraded(source.to_string());
                Err(SerialError::Open {
                    port: self.config.port.clone(),
                    source,
                })
            }
        }
    }

    /// Try to read one line.
    ///
    /// Blocks for at most the configured read timeout. A read error other
    /// than a timeout drops the handle before returning
    /// [`SerialError::LinkLost`].
    pub fn poll(&mut self) -> Result<Poll, SerialError> {
        let Link::Connected(reader) = &mut self.link else {
            return Err(SerialError::NotConnected(self.config.port.clone()));
        };

        match reader.poll_line() {
            Ok(Some(raw)) => Ok(Poll::Line(decode_line(&raw))),
            Ok(None) => Ok(Poll::Idle),
            Err(source) => {
                // Replacing the state drops the reader and closes the port.
                self.link = Link::Degraded(source.to_string());
                Err(SerialError::LinkLost {
                    port: self.config.port.clone(),
                    source,
                })
            }
        }
    }

    /// Close the port, if open.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            tracing::info!(port = %self.config.port, "Serial port closed");
        }
        self.link = Link::Disconnected;
    }
}

/// Splits a byte stream into `\n`-terminated lines.
struct LineReader<P> {
    port: P,
    buf: Vec<u8>,
    max_line_bytes: usize,
}

impl<P: Read> LineReader<P> {
    fn new(port: P, max_line_bytes: usize) -> Self {
        Self {
            port,
            buf: Vec::with_capacity(READ_CHUNK),
            max_line_bytes,
        }
    }

    /// Return a buffered line, or read once and try again.
    fn poll_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.port.read(&mut chunk) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial device closed",
            )),
            Ok(n) => {
                self.buf.extend_from_slice(&chunk[..n]);
                let line = self.take_line();
                self.enforce_limit();
                Ok(line)
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    /// Discard an unterminated run of bytes that outgrew the line limit.
    fn enforce_limit(&mut self) {
        if self.buf.len() > self.max_line_bytes && !self.buf.contains(&b'\n') {
            tracing::debug!(
                bytes = self.buf.len(),
                "Discarding unterminated serial input over line limit"
            );
            self.buf.clear();
        }
    }
}
