// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lenient frame extraction.
//!
//! The radio node interleaves JSON frames with free-form diagnostic text,
//! and the LoRa receiver often prefixes frames with its own annotations
//! (`RX: ...`, RSSI, etc.). Extraction therefore never fails: anything
//! that does not yield a usable JSON object is simply "no reading".
//!
//! # Frame format
//!
//! ```text
//! RX [-87dBm]: {"id":"HELTEC-01","umid":37.5,"temp":31.2} crc ok
//!              ^------------- first '{' to last '}' -------^
//! ```
//!
//! Recognised keys are `id`, `umid` and `temp`; anything else is ignored.

use crate::reading::{Reading, UNKNOWN_SENSOR};
use serde_json::{Map, Value};

/// Decode raw serial bytes into a trimmed line.
///
/// Invalid UTF-8 sequences are dropped rather than replaced, so a burst of
/// line noise in the middle of a frame does not leave U+FFFD characters in
/// the sensor id.
pub fn decode_line(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    for chunk in raw.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

/// Extract a reading from a decoded line.
///
/// Returns `None` for noise, partial frames, diagnostic text and malformed
/// JSON.
pub fn extract_reading(line: &str) -> Option<Reading> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if start > end {
        return None;
    }

    let span = &line[start..=end];

    // Take the leading value of the span: a stray '}' after a complete
    // object must not reject the frame.
    let value = match serde_json::Deserializer::from_str(span)
        .into_iter::<Value>()
        .next()
    {
        Some(Ok(value)) => value,
        Some(Err(err)) => {
            tracing::debug!(error = %err, "discarding malformed frame");
            return None;
        }
        None => return None,
    };

    let Value::Object(fields) = value else {
        tracing::debug!("discarding frame: payload is not a JSON object");
        return None;
    };

    Some(Reading {
        sensor_id: sensor_id(&fields),
        humidity: number_or_zero(fields.get("umid")),
        temperature: number_or_zero(fields.get("temp")),
    })
}

fn sensor_id(fields: &Map<String, Value>) -> String {
    match fields.get("id") {
        None | Some(Value::Null) => UNKNOWN_SENSOR.to_string(),
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
    }
}

/// Coerce a JSON field to a finite float, falling back to `0.0`.
fn number_or_zero(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}
