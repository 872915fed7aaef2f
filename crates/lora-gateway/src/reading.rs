// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sensor reading entities.

use crate::classify::{Classification, Status};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor id used when a frame carries no `id` field.
pub const UNKNOWN_SENSOR: &str = "Unknown";

/// One decoded, validated sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Sensor identifier as reported by the node.
    pub sensor_id: String,
    /// Soil humidity in percent.
    pub humidity: f64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
}

impl Reading {
    /// Create a new reading.
    pub fn new(sensor_id: impl Into<String>, humidity: f64, temperature: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            humidity,
            temperature,
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor: {} | Humidity: {}% | Temp: {}°C",
            self.sensor_id, self.humidity, self.temperature
        )
    }
}

/// The row shape written to the store.
///
/// The store owns the identity and timestamp columns; they are never part
/// of the record handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub sensor_id: String,
    pub humidity: f64,
    pub temperature: f64,
    pub status: Status,
}

impl PersistedRecord {
    /// Build the row for a reading and its decision.
    ///
    /// Consumes the reading so it cannot be persisted a second time.
    pub fn new(reading: Reading, classification: &Classification) -> Self {
        Self {
            sensor_id: reading.sensor_id,
            humidity: reading.humidity,
            temperature: reading.temperature,
            status: classification.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Thresholds;

    #[test]
    fn test_record_from_reading() {
        let reading = Reading::new("HELTEC-01", 35.0, 31.5);
        let decision = Thresholds::default().classify(reading.humidity, reading.temperature);
        let record = PersistedRecord::new(reading, &decision);

        assert_eq!(record.sensor_id, "HELTEC-01");
        assert_eq!(record.humidity, 35.0);
        assert_eq!(record.temperature, 31.5);
        assert_eq!(record.status, Status::Critical);
    }

    #[test]
    fn test_reading_display() {
        let reading = Reading::new("S1", 55.0, 22.0);
        assert_eq!(reading.to_string(), "Sensor: S1 | Humidity: 55% | Temp: 22°C");
    }
}
