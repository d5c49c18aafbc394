// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric Modbus library
//!
//! Serves a live metric stream as a Modbus TCP server. Every metric field is
//! hashed onto one of the 65536 Modbus addresses and stored in the matching
//! coil, discrete input, input register or holding register, where any
//! off-the-shelf Modbus client can poll it.

pub mod config;
pub mod daemon;
pub mod mapping;
pub mod metrics;
pub mod modbus;
