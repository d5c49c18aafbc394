// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register storage shared by ingestion and the Modbus connections
//!
//! The four Modbus regions live in a single [`RegisterBank`] guarded by one
//! `Mutex`. Every public [`RegisterStore`] operation takes the lock for the
//! duration of the call, and [`RegisterStore::transaction`] lets a caller
//! apply several operations (a metric batch, a Modbus request) under one
//! lock acquisition.
//!
//! Addresses are region-local. Unwritten addresses read as `false` / `0`.
//! Reads running past `u16::MAX` wrap around to address 0.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Raw register maps, keyed by region-local address
#[derive(Debug, Default, Clone)]
pub struct RegisterBank {
    coils: HashMap<u16, bool>,
    discrete_inputs: HashMap<u16, bool>,
    input_registers: HashMap<u16, u16>,
    holding_registers: HashMap<u16, u16>,
}

impl RegisterBank {
    pub fn write_coil(&mut self, addr: u16, value: bool) {
        self.coils.insert(addr, value);
    }

    pub fn write_discrete_input(&mut self, addr: u16, value: bool) {
        self.discrete_inputs.insert(addr, value);
    }

    pub fn write_input_register(&mut self, addr: u16, value: u16) {
        self.input_registers.insert(addr, value);
    }

    pub fn write_holding_register(&mut self, addr: u16, value: u16) {
        self.holding_registers.insert(addr, value);
    }

    pub fn read_coils(&self, start: u16, count: u16) -> Vec<bool> {
        read_range(&self.coils, start, count)
    }

    pub fn read_discrete_inputs(&self, start: u16, count: u16) -> Vec<bool> {
        read_range(&self.discrete_inputs, start, count)
    }

    pub fn read_input_registers(&self, start: u16, count: u16) -> Vec<u16> {
        read_range(&self.input_registers, start, count)
    }

    pub fn read_holding_registers(&self, start: u16, count: u16) -> Vec<u16> {
        read_range(&self.holding_registers, start, count)
    }

    /// Number of addresses written so far, over all regions
    pub fn len(&self) -> usize {
        self.coils.len()
            + self.discrete_inputs.len()
            + self.input_registers.len()
            + self.holding_registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read `count` consecutive values starting at `start`, zero-filling gaps
fn read_range<T: Copy + Default>(map: &HashMap<u16, T>, start: u16, count: u16) -> Vec<T> {
    (0..count)
        .map(|offset| {
            map.get(&start.wrapping_add(offset))
                .copied()
                .unwrap_or_default()
        })
        .collect()
}

/// Thread-safe register store
///
/// Meant to be wrapped in an `Arc` and shared between the ingestion path and
/// every Modbus connection.
#[derive(Debug, Default)]
pub struct RegisterStore {
    bank: Mutex<RegisterBank>,
}

impl RegisterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegisterBank> {
        // The bank only holds plain maps, a panic while the lock was held
        // cannot leave it half-updated in a way later readers would care about.
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to all four regions.
    ///
    /// Nothing else can read or write the store until `f` returns, so a group
    /// of writes made here is observed either entirely or not at all.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut RegisterBank) -> R) -> R {
        let mut bank = self.lock();
        f(&mut bank)
    }

    /// Copy of the current register contents
    pub fn snapshot(&self) -> RegisterBank {
        self.lock().clone()
    }

    pub fn write_coil(&self, addr: u16, value: bool) {
        self.lock().write_coil(addr, value);
    }

    pub fn write_discrete_input(&self, addr: u16, value: bool) {
        self.lock().write_discrete_input(addr, value);
    }

    pub fn write_input_register(&self, addr: u16, value: u16) {
        self.lock().write_input_register(addr, value);
    }

    pub fn write_holding_register(&self, addr: u16, value: u16) {
        self.lock().write_holding_register(addr, value);
    }

    pub fn read_coils(&self, start: u16, count: u16) -> Vec<bool> {
        self.lock().read_coils(start, count)
    }

    pub fn read_discrete_inputs(&self, start: u16, count: u16) -> Vec<bool> {
        self.lock().read_discrete_inputs(start, count)
    }

    pub fn read_input_registers(&self, start: u16, count: u16) -> Vec<u16> {
        self.lock().read_input_registers(start, count)
    }

    pub fn read_holding_registers(&self, start: u16, count: u16) -> Vec<u16> {
        self.lock().read_holding_registers(start, count)
    }
}
