// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric output backed by a Modbus server
//!
//! [`ModbusOutput`] wraps the store and the server behind the usual output
//! lifecycle of a metric collector: `connect`, repeated `write` calls with
//! batches of metrics, and `close`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use log::info;

use crate::metrics::MetricRecord;

use super::ingest::{ingest, IngestReport};
use super::modbus_server::{ModbusServer, ModbusServerHandle};
use super::register_store::RegisterStore;

const SAMPLE_CONFIG: &str = r#"modbus:
  # Start the Modbus TCP server
  enabled: true
  # Address of the Modbus server
  address: "0.0.0.0:502"
"#;

/// Modbus server output for metric batches
pub struct ModbusOutput {
    address: String,
    store: Arc<RegisterStore>,
    server: Option<ModbusServerHandle>,
}

impl ModbusOutput {
    /// Create an output that will listen on `address` once connected
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            store: Arc::new(RegisterStore::new()),
            server: None,
        }
    }

    pub fn description() -> &'static str {
        "A Modbus server that outputs metrics"
    }

    /// Commented YAML sample accepted by [`Config::from_file`](crate::config::Config::from_file)
    pub fn sample_config() -> &'static str {
        SAMPLE_CONFIG
    }

    /// Reset the registers and start the Modbus server
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.close().await;
        }
        self.store = Arc::new(RegisterStore::new());
        let server = ModbusServer::start(&self.address, Arc::clone(&self.store))
            .await
            .with_context(|| format!("Failed to connect Modbus output on {}", self.address))?;
        info!("Modbus output connected on {}", server.local_addr());
        self.server = Some(server);
        Ok(())
    }

    /// Write a batch of metrics into the registers
    pub fn write(&self, metrics: &[MetricRecord]) -> Result<IngestReport> {
        if self.server.is_none() {
            anyhow::bail!("Modbus output on {} is not connected", self.address);
        }
        Ok(ingest(&self.store, metrics))
    }

    /// Stop the Modbus server, if running
    pub async fn close(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.close().await;
        }
        Ok(())
    }

    /// Address the server is bound to, once connected
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ModbusServerHandle::local_addr)
    }

    /// Store served by this output
    pub fn store(&self) -> Arc<RegisterStore> {
        Arc::clone(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_sample_config_is_loadable() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, ModbusOutput::sample_config())?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config, Config::default());
        assert!(!config_path.with_extension("sample.yaml").exists());
        assert!(!ModbusOutput::description().is_empty());
        Ok(())
    }

    #[test]
    fn test_write_before_connect_fails() {
        let output = ModbusOutput::new("127.0.0.1:0");
        let record = MetricRecord::new("cpu").with_field("usage", 1.0);
        assert!(output.write(&[record]).is_err());
    }

    #[tokio::test]
    async fn test_connect_write_close() -> Result<()> {
        let mut output = ModbusOutput::new("127.0.0.1:0");
        output.connect().await?;
        assert!(output.local_addr().is_some());

        let record = MetricRecord::new("cpu").with_field("usage", 12.0);
        let report = output.write(&[record])?;
        assert_eq!(report.applied, 1);
        assert_eq!(output.store().snapshot().len(), 1);

        output.close().await?;
        assert!(output.local_addr().is_none());
        assert!(output.write(&[]).is_err());
        Ok(())
    }
}
