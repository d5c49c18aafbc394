// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::debug;

use super::{Config, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./metric_modbus --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    // Parse the schema to a JSON Value to pretty-format it
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Split a `host:port` listen address.
///
/// IPv6 hosts must be bracketed (`[::1]:502`). The brackets are stripped from
/// the returned host.
pub fn split_host_port(address: &str) -> Result<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Address '{}' is not in host:port form", address))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("Invalid port in address '{}'", address))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        anyhow::bail!("Missing host in address '{}'", address);
    }
    if host.contains(':') && !address.starts_with('[') {
        anyhow::bail!("IPv6 address '{}' must be written as [host]:port", address);
    }
    Ok((host, port))
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Listen address**: `modbus.address` must be `host:port` with a port in 0-65535.
///   Hostnames are accepted and resolved at bind time; port 0 lets the OS pick.
/// - **Channel capacity**: `ingest.channel_capacity` must be at least 1
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    split_host_port(&config.modbus.address).context("Invalid Modbus listen address")?;

    if config.ingest.channel_capacity == 0 {
        anyhow::bail!("Ingest channel capacity must be at least 1");
    }

    Ok(())
}
