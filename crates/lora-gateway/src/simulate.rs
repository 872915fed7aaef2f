// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synthetic sensor frames.
//!
//! Produces lines shaped like what a LoRa receiver prints on its serial
//! console: a JSON payload wrapped in receiver chatter, plus the odd line
//! that carries no payload at all. Used to exercise a store before any
//! node is deployed.

use serde_json::json;

/// Simulated node ids.
pub const SIMULATED_SENSORS: [&str; 3] = ["HELTEC-01", "HELTEC-02", "HELTEC-03"];

const PREFIXES: [&str; 4] = ["", "RX: ", "[LoRa] packet ", "+RCV="];

const CHATTER: [&str; 3] = ["LoRa init ok", "Waiting for packets...", "}CRC error{"];

/// One in this many lines is receiver chatter instead of a frame.
const CHATTER_ONE_IN: u32 = 8;

/// Frame generator.
pub struct Simulator {
    rng: fastrand::Rng,
    next_sensor: usize,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Create a generator with a random seed.
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
            next_sensor: 0,
        }
    }

    /// Create a reproducible generator.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            next_sensor: 0,
        }
    }

    /// Next serial line. Sensors are visited round-robin.
    pub fn next_line(&mut self) -> String {
        if self.rng.u32(0..CHATTER_ONE_IN) == 0 {
            return CHATTER[self.rng.usize(0..CHATTER.len())].to_string();
        }

        let sensor = SIMULATED_SENSORS[self.next_sensor];
        self.next_sensor = (self.next_sensor + 1) % SIMULATED_SENSORS.len();

        let payload = json!({
            "id": sensor,
            "umid": round1(self.range(20.0, 80.0)),
            "temp": round1(self.range(15.0, 38.0)),
        });
        let prefix = PREFIXES[self.rng.usize(0..PREFIXES.len())];

        if prefix.is_empty() {
            payload.to_string()
        } else {
            format!(
                "{}{} rssi=-{} snr={}",
                prefix,
                payload,
                self.rng.u32(40..120),
                round1(self.range(-5.0, 12.0))
            )
        }
    }

    fn range(&mut self, low: f64, high: f64) -> f64 {
        low + self.rng.f64() * (high - low)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl Iterator for Simulator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        Some(self.next_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_reading;

    #[test]
    fn test_frames_are_extractable_and_in_range() {
        let mut frames = 0;
        for line in Simulator::with_seed(7).take(500) {
            let Some(reading) = extract_reading(&line) else {
                assert!(CHATTER.contains(&line.as_str()), "unexpected line: {line}");
                continue;
            };
            frames += 1;
            assert!(SIMULATED_SENSORS.contains(&reading.sensor_id.as_str()));
            assert!((20.0..=80.0).contains(&reading.humidity), "{line}");
            assert!((15.0..=38.0).contains(&reading.temperature), "{line}");
        }
        assert!(frames > 300);
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a: Vec<String> = Simulator::with_seed(42).take(20).collect();
        let b: Vec<String> = Simulator::with_seed(42).take(20).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(55.56), 55.6);
        assert_eq!(round1(20.04), 20.0);
    }
}
