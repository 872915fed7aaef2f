// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRa Edge Gateway
//!
//! Reads sensor frames from a serial-attached LoRa receiver, classifies
//! each reading into an irrigation status, and stores it in a relational
//! database.
//!
//! # Features
//!
//! - **Noise-tolerant extraction** -- one JSON payload per line, any chatter around it
//! - **Threshold classifier** -- NORMAL / ATTENTION / CRITICAL with a recommendation
//! - **Self-healing serial link** -- reconnects with a fixed backoff, forever
//! - **Isolated persistence** -- PostgreSQL or SQLite, a failed insert never stops ingestion
//!
//! # Architecture
//!
//! ```text
//! Gateway
//! +-- SerialSession   (port lifecycle, line framing)
//! +-- Pipeline
//!     +-- extract_reading   (line -> Reading)
//!     +-- Thresholds        (Reading -> Classification)
//!     +-- StorageSink       (PostgresSink, SqliteSink, QueuedSink, MemorySink)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lora_gateway::{Gateway, GatewayConfig};
//!
//! let config = GatewayConfig::from_file("gateway.toml")?;
//! let gateway = Gateway::open(&config)?;
//! let stop = gateway.stop_handle();
//! let stats = gateway.run();
//! ```

pub mod classify;
pub mod config;
pub mod extract;
pub mod gateway;
pub mod reading;
pub mod serial;
pub mod simulate;
pub mod sink;

pub use classify::{Classification, Status, Thresholds};
pub use config::{ConfigError, DbConfig, GatewayConfig, SerialConfig, StorageBackend, StorageConfig};
pub use extract::{decode_line, extract_reading};
pub use gateway::{Gateway, GatewayError, GatewayStats, LineOutcome, Pipeline, StopHandle};
pub use reading::{PersistedRecord, Reading, UNKNOWN_SENSOR};
pub use serial::{
    ConnectionState, Poll, PortOpener, ScriptedOpener, ScriptedPort, SerialError, SerialSession,
    SystemPortOpener,
};
pub use simulate::Simulator;
#[cfg(feature = "postgres")]
pub use sink::PostgresSink;
pub use sink::{
    MemorySink, QueuedSink, ReadingSink, SinkError, SqliteSink, StorageSink, StoredRow, WorkerStats,
};
