// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![cfg(unix)]

//! Process shutdown tests
//!
//! Run the gateway binary and stop it the way a service manager does.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};

#[test]
fn test_sigterm_stops_gateway_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("gw.db");

    let mut child = Command::new(env!("CARGO_BIN_EXE_lora-gateway"))
        .args(["--port", "/dev/ttyNOPE0", "--backend", "sqlite", "--sqlite-path"])
        .arg(&db)
        .args(["--persist-queue", "2", "run"])
        .env("RUST_LOG", "lora_gateway=info")
        .env_remove("GATEWAY_CONFIG")
        .env_remove("SERIAL_PORT")
        .env_remove("BAUD_RATE")
        .env_remove("DB_HOST")
        .env_remove("DB_DATABASE")
        .env_remove("DB_USER")
        .env_remove("DB_PASSWORD")
        .env_remove("DB_PORT")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut output = String::new();

    // The handler is installed before the loop logs its start.
    loop {
        let mut line = String::new();
        if stdout.read_line(&mut line).unwrap() == 0 {
            break;
        }
        output.push_str(&line);
        if line.contains("Starting gateway") {
            break;
        }
    }
    assert!(output.contains("Starting gateway"), "output: {}", output);

    let killed = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    stdout.read_to_string(&mut output).unwrap();
    let status = child.wait().unwrap();

    assert!(status.success(), "status: {:?}, output: {}", status, output);
    assert!(output.contains("Gateway stopped"), "output: {}", output);
    assert!(output.contains("Gateway shutdown complete"), "output: {}", output);
}
