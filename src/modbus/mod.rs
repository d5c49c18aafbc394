// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module exposes ingested metrics through a Modbus TCP server, allowing
//! external systems (PLCs, SCADA, HMI panels) to poll them as coils and
//! registers.
//!
//! ## Key Components
//!
//! - `RegisterStore`: the four register regions behind a single lock
//! - `ingest`: projects metric batches onto the registers
//! - `respond`: the six Modbus function handlers
//! - `ModbusServer`: TCP listener and per-connection `MetricModbusService`
//! - `ModbusOutput`: connect / write / close facade for metric collectors
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use metric_modbus::metrics::MetricRecord;
//! use metric_modbus::modbus::{ingest, ModbusServer, RegisterStore};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Arc::new(RegisterStore::new());
//! let server = ModbusServer::start("0.0.0.0:502", Arc::clone(&store)).await?;
//!
//! ingest(&store, &[MetricRecord::new("cpu").with_field("usage_idle", 97.5)]);
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```

pub mod ingest;
pub mod modbus_server;
pub mod output;
pub mod register_store;
pub mod responder;

pub use ingest::{ingest, IngestError, IngestReport};
pub use modbus_server::{
    MetricModbusService, ModbusServer, ModbusServerHandle, ServerError, MAX_READ_BITS,
    MAX_READ_REGISTERS,
};
pub use output::ModbusOutput;
pub use register_store::{RegisterBank, RegisterStore};
pub use responder::{respond, RegisterRequest, RegisterResponse};
