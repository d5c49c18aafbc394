// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus function handlers
//!
//! The six supported function codes form a closed set, modelled by
//! [`RegisterRequest`]. [`respond`] serves one request against the
//! [`RegisterStore`] while holding its lock, and returns the response data
//! in its wire layout:
//!
//! | Code | Function | Response data |
//! |------|----------|---------------|
//! | 0x01 | Read Coils | `quantity / 8 + 1` bytes, LSB-first bit packing |
//! | 0x02 | Read Discrete Inputs | same as Read Coils |
//! | 0x03 | Read Holding Registers | `quantity * 2` bytes, big-endian words |
//! | 0x04 | Read Input Registers | same as Read Holding Registers |
//! | 0x05 | Write Single Coil | echo, `0xFF00` is ON, anything else OFF |
//! | 0x06 | Write Single Register | echo |
//!
//! Note that the bit responses always carry one extra byte when `quantity`
//! is a multiple of eight. Existing masters polling this server rely on it.

use log::debug;

use super::register_store::{RegisterBank, RegisterStore};

/// Coil value that switches a coil on in a Write Single Coil request
pub const COIL_ON: u16 = 0xFF00;
/// Coil value echoed for a coil switched off
pub const COIL_OFF: u16 = 0x0000;

/// A decoded Modbus request for one of the supported functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
}

impl RegisterRequest {
    /// Modbus function code of the request
    pub fn function_code(&self) -> u8 {
        match self {
            RegisterRequest::ReadCoils { .. } => 0x01,
            RegisterRequest::ReadDiscreteInputs { .. } => 0x02,
            RegisterRequest::ReadHoldingRegisters { .. } => 0x03,
            RegisterRequest::ReadInputRegisters { .. } => 0x04,
            RegisterRequest::WriteSingleCoil { .. } => 0x05,
            RegisterRequest::WriteSingleRegister { .. } => 0x06,
        }
    }
}

/// Response data for a served request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterResponse {
    /// Packed bits of a coil or discrete input read
    Bits(Vec<u8>),
    /// Big-endian words of a register read
    Words(Vec<u8>),
    /// Acknowledgement of a single write, echoing the request
    Written { address: u16, value: u16 },
}

/// Pack booleans into bytes, bit `i % 8` of byte `i / 8` holding value `i`.
///
/// The output is always `values.len() / 8 + 1` bytes long, unused bits are 0.
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; values.len() / 8 + 1];
    for (i, _) in values.iter().enumerate().filter(|(_, on)| **on) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

/// Serialize register values as big-endian words in order
pub fn encode_registers(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_be_bytes()).collect()
}

/// Serve `request` against `store`.
///
/// The store lock is held for the whole request, so the response reflects a
/// single consistent state of the registers.
pub fn respond(store: &RegisterStore, request: RegisterRequest) -> RegisterResponse {
    store.transaction(|bank| respond_locked(bank, request))
}

fn respond_locked(bank: &mut RegisterBank, request: RegisterRequest) -> RegisterResponse {
    match request {
        RegisterRequest::ReadCoils { address, quantity } => {
            debug!("Reading {} coils starting from address {}", quantity, address);
            RegisterResponse::Bits(pack_bits(&bank.read_coils(address, quantity)))
        }
        RegisterRequest::ReadDiscreteInputs { address, quantity } => {
            debug!(
                "Reading {} discrete inputs starting from address {}",
                quantity, address
            );
            RegisterResponse::Bits(pack_bits(&bank.read_discrete_inputs(address, quantity)))
        }
        RegisterRequest::ReadHoldingRegisters { address, quantity } => {
            debug!(
                "Reading {} holding registers starting from address {}",
                quantity, address
            );
            RegisterResponse::Words(encode_registers(
                &bank.read_holding_registers(address, quantity),
            ))
        }
        RegisterRequest::ReadInputRegisters { address, quantity } => {
            debug!(
                "Reading {} input registers starting from address {}",
                quantity, address
            );
            RegisterResponse::Words(encode_registers(
                &bank.read_input_registers(address, quantity),
            ))
        }
        RegisterRequest::WriteSingleCoil { address, value } => {
            debug!("Writing value {:#06x} to coil {}", value, address);
            bank.write_coil(address, value == COIL_ON);
            RegisterResponse::Written { address, value }
        }
        RegisterRequest::WriteSingleRegister { address, value } => {
            debug!("Writing value {} to holding register {}", value, address);
            bank.write_holding_register(address, value);
            RegisterResponse::Written { address, value }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bits_three_coils() {
        assert_eq!(pack_bits(&[true, false, true]), vec![0b0000_0101]);
    }

    #[test]
    fn test_pack_bits_sizing() {
        assert_eq!(pack_bits(&[]), vec![0]);
        assert_eq!(pack_bits(&[true; 7]), vec![0x7F]);
        // Exact multiple of eight still gets a trailing byte
        assert_eq!(pack_bits(&[true; 8]), vec![0xFF, 0x00]);
        assert_eq!(pack_bits(&[true; 9]), vec![0xFF, 0x01]);
        assert_eq!(pack_bits(&[false; 16]).len(), 3);
    }

    #[test]
    fn test_encode_registers_big_endian() {
        assert_eq!(
            encode_registers(&[0x1234, 0x00FF]),
            vec![0x12, 0x34, 0x00, 0xFF]
        );
        assert!(encode_registers(&[]).is_empty());
    }

    #[test]
    fn test_function_codes() {
        let codes: Vec<u8> = [
            RegisterRequest::ReadCoils { address: 0, quantity: 1 },
            RegisterRequest::ReadDiscreteInputs { address: 0, quantity: 1 },
            RegisterRequest::ReadHoldingRegisters { address: 0, quantity: 1 },
            RegisterRequest::ReadInputRegisters { address: 0, quantity: 1 },
            RegisterRequest::WriteSingleCoil { address: 0, value: COIL_ON },
            RegisterRequest::WriteSingleRegister { address: 0, value: 1 },
        ]
        .iter()
        .map(RegisterRequest::function_code)
        .collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_read_coils_response() {
        let store = RegisterStore::new();
        store.write_coil(0, true);
        store.write_coil(2, true);

        let response = respond(&store, RegisterRequest::ReadCoils { address: 0, quantity: 3 });
        assert_eq!(response, RegisterResponse::Bits(vec![0b0000_0101]));
    }

    #[test]
    fn test_read_discrete_inputs_response() {
        let store = RegisterStore::new();
        store.write_discrete_input(11, true);

        let response = respond(
            &store,
            RegisterRequest::ReadDiscreteInputs { address: 8, quantity: 8 },
        );
        assert_eq!(response, RegisterResponse::Bits(vec![0b0000_1000, 0x00]));
    }

    #[test]
    fn test_read_holding_registers_response() {
        let store = RegisterStore::new();
        store.write_holding_register(10, 0x1234);
        store.write_holding_register(11, 0x00FF);

        let response = respond(
            &store,
            RegisterRequest::ReadHoldingRegisters { address: 10, quantity: 2 },
        );
        assert_eq!(response, RegisterResponse::Words(vec![0x12, 0x34, 0x00, 0xFF]));
    }

    #[test]
    fn test_read_input_registers_zero_fill() {
        let store = RegisterStore::new();
        store.write_input_register(1, 0xABCD);

        let response = respond(
            &store,
            RegisterRequest::ReadInputRegisters { address: 0, quantity: 3 },
        );
        assert_eq!(
            response,
            RegisterResponse::Words(vec![0x00, 0x00, 0xAB, 0xCD, 0x00, 0x00])
        );
    }

    #[test]
    fn test_zero_quantity_reads() {
        let store = RegisterStore::new();
        assert_eq!(
            respond(&store, RegisterRequest::ReadCoils { address: 5, quantity: 0 }),
            RegisterResponse::Bits(vec![0])
        );
        assert_eq!(
            respond(&store, RegisterRequest::ReadInputRegisters { address: 5, quantity: 0 }),
            RegisterResponse::Words(vec![])
        );
    }

    #[test]
    fn test_write_single_coil_semantics() {
        let store = RegisterStore::new();

        let ack = respond(
            &store,
            RegisterRequest::WriteSingleCoil { address: 4, value: COIL_ON },
        );
        assert_eq!(ack, RegisterResponse::Written { address: 4, value: COIL_ON });
        assert_eq!(store.read_coils(4, 1), vec![true]);

        for value in [COIL_OFF, 0x1234, 0x00FF, 0xFFFF] {
            store.write_coil(4, true);
            respond(&store, RegisterRequest::WriteSingleCoil { address: 4, value });
            assert_eq!(store.read_coils(4, 1), vec![false], "value {value:#06x}");
        }
    }

    #[test]
    fn test_write_single_register() {
        let store = RegisterStore::new();
        let ack = respond(
            &store,
            RegisterRequest::WriteSingleRegister { address: 35_535, value: 999 },
        );
        assert_eq!(ack, RegisterResponse::Written { address: 35_535, value: 999 });
        assert_eq!(store.read_holding_registers(35_535, 1), vec![999]);
        assert_eq!(store.read_input_registers(35_535, 1), vec![0]);
    }
}
