// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structures for configuring the Modbus TCP server
//! component of the application.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP server component.
///
/// # Fields
///
/// * `enabled` - Flag to enable or disable the Modbus server
/// * `address` - `host:port` the server listens on (default: `0.0.0.0:502`)
///
/// # Example
///
/// ```
/// use metric_modbus::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     address: "127.0.0.1:1502".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModbusConfig {
    /// Flag to enable or disable the Modbus server.
    ///
    /// When disabled, metrics are still ingested into the registers but no
    /// listener is opened.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// The `host:port` address the Modbus server will bind to.
    ///
    /// The host can be an IPv4/IPv6 address or a hostname. Port 502 is the
    /// standard Modbus TCP port. Use port 0 to let the OS pick one.
    pub address: String,
}

fn default_enabled() -> bool {
    true
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:502".to_string(),
        }
    }
}
