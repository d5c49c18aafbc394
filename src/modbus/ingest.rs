// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric ingestion into the register store
//!
//! Each field of each record is keyed, hashed onto a flat Modbus address and
//! written into the region that address falls in. Bit regions store
//! `value != 0`, register regions store the truncated 16-bit value.
//!
//! A whole batch is applied inside one [`RegisterStore::transaction`], so a
//! Modbus read never observes half of a batch.

use log::{debug, warn};
use thiserror::Error;

use crate::mapping::{map_key_to_address, Region, RegionAddress};
use crate::metrics::{ConversionError, FieldValue, MetricRecord};

use super::register_store::{RegisterBank, RegisterStore};

/// A field that could not be stored
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Field '{key}' has non-numeric {value_type} value and was skipped")]
    NonNumericField {
        key: String,
        value_type: &'static str,
    },

    #[error("Field '{key}' has non-finite value {value} and was skipped")]
    NonFiniteField { key: String, value: f64 },
}

/// Outcome of ingesting one batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    /// Number of fields written to the store
    pub applied: usize,
    /// Fields that were skipped
    pub rejected: Vec<IngestError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Store a single keyed value into the bank, returning where it landed
pub fn apply_field(bank: &mut RegisterBank, key: &str, value: u16) -> RegionAddress {
    let target = RegionAddress::from_address(map_key_to_address(key));
    match target.region {
        Region::Coils => bank.write_coil(target.local, value != 0),
        Region::DiscreteInputs => bank.write_discrete_input(target.local, value != 0),
        Region::InputRegisters => bank.write_input_register(target.local, value),
        Region::HoldingRegisters => bank.write_holding_register(target.local, value),
    }
    target
}

fn conversion_error(key: String, value: &FieldValue, err: ConversionError) -> IngestError {
    match (err, value) {
        (ConversionError::NonFinite, FieldValue::Float(v)) => {
            IngestError::NonFiniteField { key, value: *v }
        }
        (ConversionError::NonFinite, other) | (ConversionError::NonNumeric(_), other) => {
            IngestError::NonNumericField {
                key,
                value_type: other.type_name(),
            }
        }
    }
}

/// Apply a batch of metric records to the store.
///
/// Fields whose value cannot be narrowed to a register value are skipped and
/// reported; the rest of the batch is still applied.
pub fn ingest(store: &RegisterStore, batch: &[MetricRecord]) -> IngestReport {
    let mut report = IngestReport::default();

    store.transaction(|bank| {
        for record in batch {
            for (key, value) in record.keyed_fields() {
                match value.to_register_value() {
                    Ok(register_value) => {
                        let target = apply_field(bank, &key, register_value);
                        debug!(
                            "Stored {} = {} in {} at {}",
                            key, register_value, target.region, target.local
                        );
                        report.applied += 1;
                    }
                    Err(err) => report.rejected.push(conversion_error(key, value, err)),
                }
            }
        }
    });

    // Logged after the lock is released
    for rejected in &report.rejected {
        warn!("{}", rejected);
    }
    debug!(
        "Ingested batch of {} records: {} fields applied, {} rejected",
        batch.len(),
        report.applied,
        report.rejected.len()
    );

    report
}
