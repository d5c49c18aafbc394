// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric field to Modbus address mapping
//!
//! Every scalar field of a metric record is identified by a textual key
//! (`<metric>_<field>`). The key is hashed with 32-bit FNV-1a and reduced
//! modulo 65536 to obtain a flat Modbus address, which is then split into
//! one of the four Modbus data regions:
//!
//! | Address range | Region | Local address |
//! |---------------|--------|---------------|
//! | 0 - 9999 | Coils | address |
//! | 10000 - 19999 | Discrete Inputs | address - 10000 |
//! | 20000 - 29999 | Input Registers | address - 20000 |
//! | 30000 - 65535 | Holding Registers | address - 30000 |
//!
//! The holding register region is wider (local addresses 0 - 35535) than the
//! three others. Distinct keys may hash to the same address; the last write
//! wins.

use std::fmt;

/// Separator placed between the metric name and the field name in a key
pub const KEY_SEPARATOR: char = '_';

/// First flat address of the discrete input region
pub const DISCRETE_INPUTS_BASE: u16 = 10_000;
/// First flat address of the input register region
pub const INPUT_REGISTERS_BASE: u16 = 20_000;
/// First flat address of the holding register region
pub const HOLDING_REGISTERS_BASE: u16 = 30_000;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Build the mapping key for one field of one metric
pub fn metric_field_key(metric: &str, field: &str) -> String {
    format!("{metric}{KEY_SEPARATOR}{field}")
}

/// 32-bit FNV-1a over the UTF-8 bytes of `key`
pub fn fnv1a_32(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Map a metric field key onto the flat 16-bit Modbus address space.
///
/// The result only depends on `key`.
///
/// ### Example
///
/// ```
/// use metric_modbus::mapping::map_key_to_address;
///
/// let a = map_key_to_address("cpu_usage_idle");
/// assert_eq!(a, map_key_to_address("cpu_usage_idle"));
/// ```
pub fn map_key_to_address(key: &str) -> u16 {
    (fnv1a_32(key) % 65_536) as u16
}

/// The four Modbus data regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Coils,
    DiscreteInputs,
    InputRegisters,
    HoldingRegisters,
}

impl Region {
    /// Flat address at which this region starts
    pub fn base(self) -> u16 {
        match self {
            Region::Coils => 0,
            Region::DiscreteInputs => DISCRETE_INPUTS_BASE,
            Region::InputRegisters => INPUT_REGISTERS_BASE,
            Region::HoldingRegisters => HOLDING_REGISTERS_BASE,
        }
    }

    /// `true` for the single-bit regions
    pub fn is_bit(self) -> bool {
        matches!(self, Region::Coils | Region::DiscreteInputs)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Coils => "coils",
            Region::DiscreteInputs => "discrete inputs",
            Region::InputRegisters => "input registers",
            Region::HoldingRegisters => "holding registers",
        };
        f.write_str(name)
    }
}

/// A flat address resolved into its region and region-local address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionAddress {
    pub region: Region,
    pub local: u16,
}

impl RegionAddress {
    /// Split a flat address according to the fixed region boundaries
    pub fn from_address(address: u16) -> Self {
        let region = match address {
            0..DISCRETE_INPUTS_BASE => Region::Coils,
            DISCRETE_INPUTS_BASE..INPUT_REGISTERS_BASE => Region::DiscreteInputs,
            INPUT_REGISTERS_BASE..HOLDING_REGISTERS_BASE => Region::InputRegisters,
            HOLDING_REGISTERS_BASE..=u16::MAX => Region::HoldingRegisters,
        };
        Self {
            region,
            local: address - region.base(),
        }
    }

    /// Resolve the address a metric field lands on
    pub fn for_field(metric: &str, field: &str) -> Self {
        Self::from_address(map_key_to_address(&metric_field_key(metric, field)))
    }

    /// Inverse of [`RegionAddress::from_address`]
    pub fn flat(self) -> u16 {
        self.region.base() + self.local
    }
}
