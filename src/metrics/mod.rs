// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric records as delivered by the collection pipeline
//!
//! A [`MetricRecord`] carries a name, a set of typed fields and a timestamp.
//! Only numeric fields can be projected onto Modbus registers; see
//! [`FieldValue::to_register_value`] for the narrowing rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mapping::metric_field_key;

/// A typed field value
///
/// Deserialized untagged, so JSON `42` becomes `Integer`, `42.5` becomes
/// `Float`, `true` becomes `Boolean` and `"up"` becomes `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
}

/// Why a field value cannot be narrowed to a register value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionError {
    /// Boolean or string field
    NonNumeric(&'static str),
    /// NaN or infinite float
    NonFinite,
}

impl FieldValue {
    /// Name of the value type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Unsigned(_) => "unsigned",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
        }
    }

    /// Narrow the value to a 16-bit register value.
    ///
    /// The fractional part is discarded and the result is taken modulo 65536,
    /// so `70000.9` gives `4464` and `-1.0` gives `65535`. Integers keep their
    /// low 16 bits, which is the same rule.
    pub fn to_register_value(&self) -> Result<u16, ConversionError> {
        match *self {
            FieldValue::Float(value) => {
                if !value.is_finite() {
                    return Err(ConversionError::NonFinite);
                }
                Ok(value.trunc().rem_euclid(65_536.0) as u16)
            }
            FieldValue::Integer(value) => Ok(value as u16),
            FieldValue::Unsigned(value) => Ok(value as u16),
            FieldValue::Boolean(_) | FieldValue::String(_) => {
                Err(ConversionError::NonNumeric(self.type_name()))
            }
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Unsigned(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// One metric sample with its fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Measurement name, e.g. `cpu`
    pub name: String,

    /// Field values, iterated in key order
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,

    /// Sample time. Carried along but not used for the register mapping.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create an empty record stamped with the current time
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Mapping keys of all fields, paired with their values
    pub fn keyed_fields(&self) -> impl Iterator<Item = (String, &FieldValue)> {
        self.fields
            .iter()
            .map(move |(field, value)| (metric_field_key(&self.name, field), value))
    }
}

/// A line of metric input: either one record or a whole batch
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricBatch {
    Many(Vec<MetricRecord>),
    One(MetricRecord),
}

impl MetricBatch {
    /// Parse one JSON line into a batch of records
    pub fn parse_line(line: &str) -> serde_json::Result<Vec<MetricRecord>> {
        let batch: MetricBatch = serde_json::from_str(line)?;
        Ok(batch.into())
    }
}

impl From<MetricBatch> for Vec<MetricRecord> {
    fn from(batch: MetricBatch) -> Self {
        match batch {
            MetricBatch::Many(records) => records,
            MetricBatch::One(record) => vec![record],
        }
    }
}
