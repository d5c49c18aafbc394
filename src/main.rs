// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the metric Modbus server
use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use metric_modbus::config::{self, Config};
use metric_modbus::daemon::{Daemon, MetricSender};
use metric_modbus::metrics::MetricBatch;

/// Modbus TCP server publishing metrics read as JSON lines on stdin
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Modbus server address (host:port)
    #[arg(long)]
    modbus_address: Option<String>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Forward metric batches read from stdin to the ingestion task
async fn read_metrics_from_stdin(sender: MetricSender) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match MetricBatch::parse_line(line) {
            Ok(batch) => {
                if sender.send(batch).await.is_err() {
                    debug!("Ingestion task stopped, no longer reading stdin");
                    break;
                }
            }
            Err(err) => warn!("Skipping malformed metric line {}: {}", line_number, err),
        }
    }

    info!("Metric input closed after {} lines", line_number);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;
    config.apply_args(args.modbus_address.clone());
    config.validate()?;

    info!("Starting in daemon mode");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    if let Some(sender) = daemon.metric_sender() {
        tokio::spawn(async move {
            if let Err(err) = read_metrics_from_stdin(sender).await {
                warn!("Error reading metrics from stdin: {}", err);
            }
        });
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, terminating daemon"),
        Err(err) => warn!("Error waiting for shutdown signal: {}", err),
    }

    daemon.shutdown().await;
    daemon.join().await?;

    Ok(())
}
