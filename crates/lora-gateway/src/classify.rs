// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Irrigation decision made on the gateway.
//!
//! Every reading is classified on its own against two fixed thresholds.
//! There is no hysteresis: a sensor hovering around a threshold will flip
//! between states from one sample to the next.

use crate::reading::Reading;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default humidity threshold in percent.
pub const DEFAULT_HUMIDITY_THRESHOLD: f64 = 40.0;

/// Default temperature threshold in degrees Celsius.
pub const DEFAULT_TEMPERATURE_THRESHOLD: f64 = 30.0;

/// Irrigation status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Normal,
    Attention,
    Critical,
}

impl Status {
    /// Value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "NORMAL",
            Status::Attention => "ATTENTION",
            Status::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus the action suggested to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub status: Status,
    pub recommendation: &'static str,
}

/// Classification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Below this humidity (strictly) irrigation is needed.
    pub humidity: f64,
    /// Above this temperature (strictly) a dry soil becomes critical.
    pub temperature: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            humidity: DEFAULT_HUMIDITY_THRESHOLD,
            temperature: DEFAULT_TEMPERATURE_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Create thresholds from explicit values.
    pub fn new(humidity: f64, temperature: f64) -> Self {
        Self {
            humidity,
            temperature,
        }
    }

    /// Classify a humidity/temperature pair.
    ///
    /// Total: NaN compares false everywhere and lands on `Normal`.
    pub fn classify(&self, humidity: f64, temperature: f64) -> Classification {
        let dry = humidity < self.humidity;

        if dry && temperature > self.temperature {
            Classification {
                status: Status::Critical,
                recommendation: "Immediate irrigation — thermal risk",
            }
        } else if dry {
            Classification {
                status: Status::Attention,
                recommendation: "Schedule irrigation",
            }
        } else {
            Classification {
                status: Status::Normal,
                recommendation: "Monitoring",
            }
        }
    }

    /// Classify a reading.
    pub fn classify_reading(&self, reading: &Reading) -> Classification {
        self.classify(reading.humidity, reading.temperature)
    }
}
