// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

use crate::frame::ResponseCode;

/// debug-agent-core Error
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid buffer size
    BufferSize,
    /// Length Mismatch
    LengthMismatch(usize, usize),
    /// Invalid CRC
    Crc(u32, u32),
    /// Unexpected magic value
    Magic,
    /// Invalid command id
    CommandId(u8),
    /// Invalid subfunction id
    Subfunction(u8),
    /// Invalid or unsupported variable type
    VariableType(u8),
    /// Unsupported address width
    AddressSize(usize),
    /// Invalid trigger condition
    Condition(u8),
    /// Invalid trigger operand type
    OperandType(u8),
    /// Invalid loggable item type
    LoggableType(u8),
    /// Invalid memory region type
    RegionType(u8),
    /// Unknown runtime published value
    UnknownRpv(u16),
    /// Runtime published value could not be accessed
    RpvAccess(u16),
    /// Access to a forbidden or read-only memory region
    Forbidden(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;

        match self {
            BufferSize => write!(f, "Invalid buffer size"),
            LengthMismatch(expected, actual) => write!(
                f,
                "Length Mismatch: expected {expected} bytes, got {actual}"
            ),
            Crc(expected, actual) => write!(
                f,
                "Invalid CRC: expected = 0x{expected:0>8X}, actual = 0x{actual:0>8X}"
            ),
            Magic => write!(f, "Unexpected magic value"),
            CommandId(id) => write!(f, "Invalid command id: 0x{id:0>2X}"),
            Subfunction(id) => write!(f, "Invalid subfunction: 0x{id:0>2X}"),
            VariableType(t) => write!(f, "Invalid variable type: 0x{t:0>2X}"),
            AddressSize(size) => write!(f, "Unsupported address size: {size}"),
            Condition(c) => write!(f, "Invalid trigger condition: {c}"),
            OperandType(t) => write!(f, "Invalid operand type: {t}"),
            LoggableType(t) => write!(f, "Invalid loggable item type: {t}"),
            RegionType(t) => write!(f, "Invalid memory region type: {t}"),
            UnknownRpv(id) => write!(f, "Unknown runtime published value: 0x{id:0>4X}"),
            RpvAccess(id) => write!(f, "Cannot access runtime published value 0x{id:0>4X}"),
            Forbidden(addr) => write!(f, "Access to 0x{addr:X} is not allowed"),
        }
    }
}

impl From<Error> for ResponseCode {
    fn from(err: Error) -> Self {
        use Error::*;

        match err {
            BufferSize => ResponseCode::Overflow,
            CommandId(_) | Subfunction(_) => ResponseCode::UnsupportedFeature,
            Forbidden(_) => ResponseCode::Forbidden,
            RpvAccess(_) => ResponseCode::FailureToProceed,
            LengthMismatch(..) | Crc(..) | Magic | VariableType(_) | AddressSize(_) | Condition(_) | OperandType(_)
            | LoggableType(_) | RegionType(_) | UnknownRpv(_) => ResponseCode::InvalidRequest,
        }
    }
}
