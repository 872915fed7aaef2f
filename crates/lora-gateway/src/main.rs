// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LoRa Edge Gateway CLI
//!
//! Bridge a serial LoRa receiver to a PostgreSQL or SQLite store.
//!
//! # Usage
//!
//! ```bash
//! # Run against the default device and database
//! lora-gateway
//!
//! # Explicit device, local SQLite store
//! lora-gateway --port /dev/ttyACM0 --baud 9600 --backend sqlite --sqlite-path field.db
//!
//! # Back-fill from a captured serial log
//! lora-gateway replay capture.log
//!
//! # Check a decision
//! lora-gateway classify --humidity 35 --temperature 31
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lora_gateway::sink::{self, ReadingSink};
use lora_gateway::{
    Gateway, GatewayConfig, LineOutcome, MemorySink, Pipeline, Simulator, StopHandle,
    StorageBackend,
};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "lora-gateway")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Edge gateway: serial LoRa receiver to irrigation database")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path
    #[arg(short, long, global = true, env = "SERIAL_PORT")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long, global = true, env = "BAUD_RATE")]
    baud: Option<u32>,

    /// Storage backend
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Database host
    #[arg(long, global = true, env = "DB_HOST")]
    db_host: Option<String>,

    /// Database name
    #[arg(long, global = true, env = "DB_DATABASE")]
    db_name: Option<String>,

    /// Database user
    #[arg(long, global = true, env = "DB_USER")]
    db_user: Option<String>,

    /// Database password
    #[arg(long, global = true, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Database port
    #[arg(long, global = true, env = "DB_PORT")]
    db_port: Option<u16>,

    /// SQLite database file (sqlite backend)
    #[arg(long, global = true)]
    sqlite_path: Option<PathBuf>,

    /// Table receiving the readings
    #[arg(long, global = true)]
    table: Option<String>,

    /// Hand readings to a persistence worker through a queue of this size (0 = inline)
    #[arg(long, global = true)]
    persist_queue: Option<usize>,

    /// Verbose mode (show discarded lines and sink activity)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Run,
    /// Feed a captured serial log through the pipeline
    Replay {
        /// Capture file (use - for stdin)
        input: PathBuf,
    },
    /// Classify one humidity/temperature pair
    Classify {
        /// Soil humidity (%)
        #[arg(long, allow_negative_numbers = true)]
        humidity: f64,

        /// Temperature (°C)
        #[arg(long, allow_negative_numbers = true)]
        temperature: f64,
    },
    /// Generate synthetic frames and run them through the pipeline
    Simulate {
        /// Number of lines to generate
        #[arg(short = 'n', long, default_value_t = 30)]
        count: usize,

        /// Delay between lines in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        /// Write readings to the configured store
        #[arg(long)]
        persist: bool,
    },
    /// List the most recent stored readings
    Recent {
        /// Maximum rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Postgres,
    Sqlite,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Postgres => StorageBackend::Postgres,
            BackendArg::Sqlite => StorageBackend::Sqlite,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins unless --verbose is given
    let filter = if cli.verbose {
        EnvFilter::new("lora_gateway=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lora_gateway=info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let config = build_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Replay { input } => replay(&config, &input),
        Commands::Classify {
            humidity,
            temperature,
        } => {
            let decision = config.thresholds.classify(humidity, temperature);
            println!("Status:         {}", decision.status);
            println!("Recommendation: {}", decision.recommendation);
            Ok(())
        }
        Commands::Simulate {
            count,
            interval_ms,
            persist,
        } => simulate(&config, count, Duration::from_millis(interval_ms), persist),
        Commands::Recent { limit } => recent(&config, limit),
        Commands::Config => {
            let mut shown = config.clone();
            if !shown.storage.database.password.is_empty() {
                shown.storage.database.password = "***".to_string();
            }
            print!(
                "{}",
                toml::to_string_pretty(&shown).context("Failed to render configuration")?
            );
            Ok(())
        }
    }
}

/// Defaults, then the config file, then flags and environment.
fn build_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend.into();
    }
    if let Some(host) = &cli.db_host {
        config.storage.database.host = host.clone();
    }
    if let Some(name) = &cli.db_name {
        config.storage.database.database = name.clone();
    }
    if let Some(user) = &cli.db_user {
        config.storage.database.user = user.clone();
    }
    if let Some(password) = &cli.db_password {
        config.storage.database.password = password.clone();
    }
    if let Some(port) = cli.db_port {
        config.storage.database.port = port;
    }
    if let Some(path) = &cli.sqlite_path {
        config.storage.sqlite_path = path.clone();
    }
    if let Some(table) = &cli.table {
        config.storage.table = table.clone();
    }
    if let Some(queue) = cli.persist_queue {
        config.persist_queue = queue;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(config: &GatewayConfig) -> Result<()> {
    tracing::info!(
        port = %config.serial.port,
        backend = %config.storage.backend,
        table = %config.storage.table,
        persist_queue = config.persist_queue,
        "Starting LoRa gateway"
    );

    let gateway = Gateway::open(config).context("Failed to create gateway")?;

    // Setup shutdown signal handler
    ctrlc_handler(gateway.stop_handle());

    gateway.run();
    tracing::info!("Gateway shutdown complete");

    Ok(())
}

fn replay(config: &GatewayConfig, input: &Path) -> Result<()> {
    let sink = sink::open(&config.storage, config.persist_queue)
        .context("Failed to open storage sink")?;
    let mut pipeline =
        Pipeline::new(config.thresholds, sink).with_max_line_bytes(config.serial.max_line_bytes);

    if input.as_os_str() == "-" {
        pipeline.replay(io::stdin().lock())?;
    } else {
        let file = File::open(input)
            .with_context(|| format!("Failed to open capture {}", input.display()))?;
        pipeline.replay(BufReader::new(file))?;
    }

    let stats = pipeline.close();
    stats.log("Replay complete");
    Ok(())
}

fn simulate(config: &GatewayConfig, count: usize, interval: Duration, persist: bool) -> Result<()> {
    let sink: Box<dyn ReadingSink> = if persist {
        sink::open(&config.storage, config.persist_queue).context("Failed to open storage sink")?
    } else {
        Box::new(MemorySink::new())
    };
    let mut pipeline = Pipeline::new(config.thresholds, sink);

    for (idx, line) in Simulator::new().take(count).enumerate() {
        if idx > 0 && !interval.is_zero() {
            std::thread::sleep(interval);
        }
        let outcome = pipeline.process_line(&line);
        if outcome == LineOutcome::Discarded {
            println!("{:<70} -> discarded", line);
        } else {
            println!("{}", line);
        }
    }

    let stats = pipeline.close();
    stats.log("Simulation complete");
    Ok(())
}

fn recent(config: &GatewayConfig, limit: usize) -> Result<()> {
    let mut sink = sink::open(&config.storage, 0).context("Failed to open storage sink")?;
    let rows = sink
        .recent(limit)
        .with_context(|| format!("Failed to query {}", config.storage.table))?;

    if rows.is_empty() {
        println!("No readings stored.");
        return Ok(());
    }

    println!(
        "{:>8}  {:<26}  {:<12}  {:>8}  {:>8}  STATUS",
        "ID", "RECORDED", "SENSOR", "HUMIDITY", "TEMP"
    );
    for row in rows {
        println!(
            "{:>8}  {:<26}  {:<12}  {:>7.1}%  {:>6.1}°C  {}",
            row.id, row.recorded_at, row.sensor_id, row.humidity, row.temperature, row.status
        );
    }
    Ok(())
}

/// Setup shutdown signal handler.
///
/// With ctrlc's `termination` feature this also catches SIGTERM and SIGHUP,
/// so a service manager stop closes the port and drains the persist queue.
fn ctrlc_handler(stop_handle: StopHandle) {
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, shutting down...");
        stop_handle.stop();
    }) {
        tracing::warn!("Failed to install signal handler: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "lora-gateway",
            "--port",
            "/dev/ttyACM0",
            "--backend",
            "sqlite",
            "--table",
            "leituras",
            "recent",
            "--limit",
            "5",
        ])
        .unwrap();

        let config = build_config(&cli).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.table, "leituras");
        assert!(matches!(cli.command, Some(Commands::Recent { limit: 5 })));
    }

    #[test]
    fn test_invalid_table_rejected() {
        let cli = Cli::try_parse_from(["lora-gateway", "--table", "readings; drop"]).unwrap();
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_classify_accepts_negative_temperature() {
        let cli = Cli::try_parse_from([
            "lora-gateway",
            "classify",
            "--humidity",
            "35",
            "--temperature",
            "-4.5",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Classify { temperature, .. }) if temperature == -4.5
        ));
    }
}
