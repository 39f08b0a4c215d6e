//! Modbus RTU framing and response classification.
//!
//! Wire format: `[slave_id:1][function:1][payload:N][crc16:2 LE]`.
//! Only the three functions the device map needs are supported: read
//! holding registers, write single coil and write single register.

use std::fmt;

use rtulink_common::SlaveState;

/// Coil value for "on" in a write-single-coil request.
pub const COIL_ON: u16 = 0xFF00;
/// Coil value for "off" in a write-single-coil request.
pub const COIL_OFF: u16 = 0x0000;

/// Bit set on the function byte of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Bytes needed before the length of a response is known.
pub const MIN_HEADER_LEN: usize = 3;
/// Length of an exception response.
pub const EXCEPTION_LEN: usize = 5;
/// Length of a write-single echo.
pub const WRITE_ECHO_LEN: usize = 8;

const CRC_LEN: usize = 2;
const MIN_FRAME_LEN: usize = 4;

/// Supported Modbus function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    ReadHoldingRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
}

impl FunctionCode {
    pub fn code(&self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
        }
    }

    /// Function byte of the matching exception response.
    pub fn exception_code(&self) -> u8 {
        self.code() | EXCEPTION_FLAG
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(FunctionCode::ReadHoldingRegisters),
            0x05 => Some(FunctionCode::WriteSingleCoil),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, FunctionCode::ReadHoldingRegisters)
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.code())
    }
}

/// Exception code carried by a slave exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    /// A code outside the standard table, kept verbatim.
    Other(u8),
}

impl ExceptionCode {
    pub fn code(&self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailedToRespond => 0x0B,
            ExceptionCode::Other(code) => *code,
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionCode::Other(code) => write!(f, "Unknown (0x{:02X})", code),
            named => write!(f, "{:?} (0x{:02X})", named, named.code()),
        }
    }
}

/// A complete request frame, CRC included. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    function: FunctionCode,
    bytes: Vec<u8>,
}

impl Frame {
    fn build(slave_id: u8, function: FunctionCode, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(2 + payload.len() + CRC_LEN);
        bytes.push(slave_id);
        bytes.push(function.code());
        bytes.extend_from_slice(payload);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Self { function, bytes }
    }

    pub fn slave_id(&self) -> u8 {
        self.bytes[0]
    }

    pub fn function(&self) -> FunctionCode {
        self.function
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Address and value (or count) words following the function byte.
    pub fn words(&self) -> (u16, u16) {
        (
            u16::from_be_bytes([self.bytes[2], self.bytes[3]]),
            u16::from_be_bytes([self.bytes[4], self.bytes[5]]),
        )
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Modbus CRC16: polynomial 0xA001 (reflected), initial value 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn request(slave_id: u8, function: FunctionCode, first: u16, second: u16) -> Frame {
    let [a, b] = first.to_be_bytes();
    let [c, d] = second.to_be_bytes();
    Frame::build(slave_id, function, &[a, b, c, d])
}

/// Read `count` holding registers starting at `start` (function 0x03).
pub fn encode_read(slave_id: u8, start: u16, count: u16) -> Frame {
    request(slave_id, FunctionCode::ReadHoldingRegisters, start, count)
}

/// Write one coil (function 0x05).
pub fn encode_write_coil(slave_id: u8, address: u16, on: bool) -> Frame {
    let value = if on { COIL_ON } else { COIL_OFF };
    request(slave_id, FunctionCode::WriteSingleCoil, address, value)
}

/// Write one holding register (function 0x06).
pub fn encode_write_register(slave_id: u8, address: u16, value: u16) -> Frame {
    request(slave_id, FunctionCode::WriteSingleRegister, address, value)
}

/// Outcome of one transaction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionResult {
    /// Registers read, or `[address, value]` echoed by a write.
    Ok(Vec<u16>),
    CrcError,
    SlaveException(ExceptionCode),
    IncompleteFrame,
    MalformedFrame,
    /// The serial line failed; the session must be rebuilt.
    TransportError,
}

impl TransactionResult {
    /// Snapshot state written for this outcome.
    pub fn slave_state(&self) -> SlaveState {
        match self {
            TransactionResult::Ok(_) => SlaveState::Ok,
            TransactionResult::CrcError => SlaveState::CrcError,
            TransactionResult::SlaveException(_) => SlaveState::SlaveException,
            TransactionResult::IncompleteFrame => SlaveState::IncompleteFrame,
            TransactionResult::MalformedFrame => SlaveState::MalformedFrame,
            TransactionResult::TransportError => SlaveState::Disconnected,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TransactionResult::Ok(_))
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionResult::Ok(values) => write!(f, "OK {:?}", values),
            TransactionResult::SlaveException(code) => write!(f, "slave exception {}", code),
            other => f.write_str(other.slave_state().as_str()),
        }
    }
}

/// Number of bytes a complete response to `function` occupies, given the
/// bytes received so far. Returns [`MIN_HEADER_LEN`] until the header is in.
pub fn response_len(function: FunctionCode, head: &[u8]) -> usize {
    if head.len() < MIN_HEADER_LEN {
        return MIN_HEADER_LEN;
    }
    if head[1] == function.exception_code() {
        return EXCEPTION_LEN;
    }
    match function {
        FunctionCode::ReadHoldingRegisters => MIN_HEADER_LEN + head[2] as usize + CRC_LEN,
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => WRITE_ECHO_LEN,
    }
}

/// Classify the bytes received in answer to `request`.
///
/// The CRC is checked before anything else, so a corrupted exception frame
/// is a CRC error, not an exception.
pub fn decode(request: &Frame, bytes: &[u8]) -> TransactionResult {
    if bytes.len() < MIN_FRAME_LEN {
        return TransactionResult::IncompleteFrame;
    }

    let (body, trailer) = bytes.split_at(bytes.len() - CRC_LEN);
    if crc16(body).to_le_bytes() != trailer {
        return TransactionResult::CrcError;
    }

    let function = request.function();
    if body[1] == function.exception_code() {
        if bytes.len() != EXCEPTION_LEN {
            return TransactionResult::MalformedFrame;
        }
        return TransactionResult::SlaveException(ExceptionCode::from(body[2]));
    }

    if body[0] != request.slave_id() || body[1] != function.code() {
        return TransactionResult::MalformedFrame;
    }

    match function {
        FunctionCode::ReadHoldingRegisters => decode_registers(body),
        FunctionCode::WriteSingleCoil | FunctionCode::WriteSingleRegister => {
            if bytes.len() != WRITE_ECHO_LEN {
                return TransactionResult::MalformedFrame;
            }
            let address = u16::from_be_bytes([body[2], body[3]]);
            let value = u16::from_be_bytes([body[4], body[5]]);
            TransactionResult::Ok(vec![address, value])
        }
    }
}

fn decode_registers(body: &[u8]) -> TransactionResult {
    let Some((&byte_count, data)) = body[2..].split_first() else {
        return TransactionResult::MalformedFrame;
    };
    let byte_count = byte_count as usize;
    if data.len() != byte_count || byte_count % 2 != 0 {
        return TransactionResult::MalformedFrame;
    }
    let registers = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    TransactionResult::Ok(registers)
}
