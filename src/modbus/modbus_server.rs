// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server exposing the metric registers
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! MBAP framing and PDU encoding are handled by `tokio-modbus`. Each accepted
//! connection gets its own [`MetricModbusService`], and all of them share the
//! same [`RegisterStore`] with the ingestion path.
//!
//! ## Lifecycle
//!
//! [`ModbusServer::start`] binds the listener and spawns the accept loop.
//! A bind failure is returned to the caller. Accept failures are logged and
//! accepting resumes. [`ModbusServerHandle::close`] stops the accept loop and
//! releases the listening socket; connections already accepted keep running
//! until their client goes away.

use std::{future, io, net::SocketAddr, sync::Arc, time::Duration};

use log::{debug, error, info};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle, time};
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::register_store::RegisterStore;
use super::responder::{respond, RegisterRequest, RegisterResponse, COIL_OFF, COIL_ON};

/// Pause before accepting again after an accept failure
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Largest coil or discrete input read that fits in one Modbus TCP frame
pub const MAX_READ_BITS: u16 = 2000;
/// Largest register read that fits in one Modbus TCP frame
pub const MAX_READ_REGISTERS: u16 = 125;

/// Errors raised while starting the Modbus server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind Modbus server to {address}: {source}")]
    Bind { address: String, source: io::Error },
}

/// Per-connection Modbus service backed by the shared register store
///
/// Supported function codes:
/// - 0x01: Read Coils
/// - 0x02: Read Discrete Inputs
/// - 0x03: Read Holding Registers
/// - 0x04: Read Input Registers
/// - 0x05: Write Single Coil
/// - 0x06: Write Single Register
///
/// Any other function code is answered with an IllegalFunction exception.
/// Reads larger than [`MAX_READ_BITS`] or [`MAX_READ_REGISTERS`] are answered
/// with IllegalDataValue.
pub struct MetricModbusService {
    store: Arc<RegisterStore>,
    peer: SocketAddr,
}

impl tokio_modbus::server::Service for MetricModbusService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request from {}: {:?}", self.peer, req);

        let res = match decode_request(&req) {
            Some(request) if !fits_in_frame(request) => {
                error!(
                    "Exception::IllegalDataValue - Function {:#04x} quantity does not fit in a frame: {req:?}",
                    request.function_code()
                );
                Err(ExceptionCode::IllegalDataValue)
            }
            Some(request) => encode_response(request, respond(&self.store, request)),
            None => {
                error!(
                    "Exception::IllegalFunction - Unimplemented function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

impl MetricModbusService {
    /// Create a service for the connection from `peer`
    pub fn new(store: Arc<RegisterStore>, peer: SocketAddr) -> Self {
        Self { store, peer }
    }
}

/// Map a codec request onto one of the supported functions
fn decode_request(req: &Request<'_>) -> Option<RegisterRequest> {
    let request = match *req {
        Request::ReadCoils(address, quantity) => RegisterRequest::ReadCoils { address, quantity },
        Request::ReadDiscreteInputs(address, quantity) => {
            RegisterRequest::ReadDiscreteInputs { address, quantity }
        }
        Request::ReadHoldingRegisters(address, quantity) => {
            RegisterRequest::ReadHoldingRegisters { address, quantity }
        }
        Request::ReadInputRegisters(address, quantity) => {
            RegisterRequest::ReadInputRegisters { address, quantity }
        }
        Request::WriteSingleCoil(address, on) => RegisterRequest::WriteSingleCoil {
            address,
            value: if on { COIL_ON } else { COIL_OFF },
        },
        Request::WriteSingleRegister(address, value) => {
            RegisterRequest::WriteSingleRegister { address, value }
        }
        _ => return None,
    };
    Some(request)
}

/// `false` for reads whose response would overflow a Modbus TCP frame
fn fits_in_frame(request: RegisterRequest) -> bool {
    match request {
        RegisterRequest::ReadCoils { quantity, .. }
        | RegisterRequest::ReadDiscreteInputs { quantity, .. } => quantity <= MAX_READ_BITS,
        RegisterRequest::ReadHoldingRegisters { quantity, .. }
        | RegisterRequest::ReadInputRegisters { quantity, .. } => quantity <= MAX_READ_REGISTERS,
        RegisterRequest::WriteSingleCoil { .. } | RegisterRequest::WriteSingleRegister { .. } => {
            true
        }
    }
}

/// Expand packed response bytes into one bool per bit.
///
/// The codec packs the bools back, so the frame carries exactly the bytes
/// produced by the responder, padding included.
fn unpack_bits(packed: &[u8]) -> Vec<bool> {
    packed
        .iter()
        .flat_map(|byte| (0..8).map(move |bit| byte & (1 << bit) != 0))
        .collect()
}

fn decode_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Turn the responder output into the codec response for `request`
fn encode_response(
    request: RegisterRequest,
    response: RegisterResponse,
) -> Result<Response, ExceptionCode> {
    let response = match (request, response) {
        (RegisterRequest::ReadCoils { .. }, RegisterResponse::Bits(bits)) => {
            Response::ReadCoils(unpack_bits(&bits))
        }
        (RegisterRequest::ReadDiscreteInputs { .. }, RegisterResponse::Bits(bits)) => {
            Response::ReadDiscreteInputs(unpack_bits(&bits))
        }
        (RegisterRequest::ReadHoldingRegisters { .. }, RegisterResponse::Words(words)) => {
            Response::ReadHoldingRegisters(decode_words(&words))
        }
        (RegisterRequest::ReadInputRegisters { .. }, RegisterResponse::Words(words)) => {
            Response::ReadInputRegisters(decode_words(&words))
        }
        (RegisterRequest::WriteSingleCoil { .. }, RegisterResponse::Written { address, value }) => {
            Response::WriteSingleCoil(address, value == COIL_ON)
        }
        (
            RegisterRequest::WriteSingleRegister { .. },
            RegisterResponse::Written { address, value },
        ) => Response::WriteSingleRegister(address, value),
        (request, response) => {
            error!(
                "Response {:?} does not match request {:?}",
                response, request
            );
            return Err(ExceptionCode::ServerDeviceFailure);
        }
    };
    Ok(response)
}

/// Entry point for starting the Modbus TCP server
pub struct ModbusServer;

impl ModbusServer {
    /// Bind `address` (`host:port`) and start serving `store`.
    ///
    /// ### Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be resolved or the
    /// listener cannot be bound. The server is not retried.
    pub async fn start(
        address: &str,
        store: Arc<RegisterStore>,
    ) -> Result<ModbusServerHandle, ServerError> {
        let bind_error = |source| ServerError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!("Modbus server listening on {}", local_addr);

        let task = tokio::spawn(accept_loop(Server::new(listener), store));

        Ok(ModbusServerHandle { local_addr, task })
    }
}

async fn accept_loop(server: Server, store: Arc<RegisterStore>) {
    let on_connected = move |stream, socket_addr| {
        let store = Arc::clone(&store);
        async move {
            accept_tcp_connection(stream, socket_addr, move |peer| {
                debug!("Modbus client connected from {}", peer);
                Ok(Some(MetricModbusService::new(Arc::clone(&store), peer)))
            })
        }
    };

    let on_process_error = |err| {
        error!("Modbus connection error: {err}");
    };

    loop {
        match server.serve(&on_connected, on_process_error).await {
            Ok(()) => break,
            Err(err) => {
                error!("Error accepting Modbus connection: {}", err);
                time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Handle on a running Modbus server
pub struct ModbusServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ModbusServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and release the listening socket.
    ///
    /// Connections that were already accepted are left running.
    pub async fn close(self) {
        info!("Shutting down Modbus server on {}", self.local_addr);
        self.task.abort();
        match self.task.await {
            Ok(()) => debug!("Modbus accept loop already finished"),
            Err(e) if e.is_cancelled() => debug!("Modbus accept loop cancelled"),
            Err(e) => error!("Modbus accept loop panicked: {}", e),
        }
        info!("Modbus server on {} closed", self.local_addr);
    }
}
