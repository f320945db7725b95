// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::fmt;

mod datalog;
mod memory;
mod types;

pub use self::{datalog::*, memory::*, types::*};

/// Declare a fieldless wire enum with its `u8` conversions.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $err:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl TryFrom<u8> for $name {
            type Error = crate::Error;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(crate::Error::$err(value)),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(v: $name) -> u8 {
                v as u8
            }
        }
    };
}
pub(crate) use wire_enum;

/// Protocol major version.
pub const PROTOCOL_VERSION_MAJOR: u8 = 1;
/// Protocol minor version.
pub const PROTOCOL_VERSION_MINOR: u8 = 0;

/// Payload of a Discover request.
pub const DISCOVER_MAGIC: [u8; 4] = [0x7E, 0x18, 0xFC, 0x68];
/// Payload of a Connect request, echoed in its response.
pub const CONNECT_MAGIC: [u8; 4] = [0x82, 0x90, 0x22, 0x66];

/// Length of the firmware identifier.
pub const SOFTWARE_ID_LENGTH: usize = 16;

/// Firmware identifier used when the application does not provide one.
///
/// Post-build tooling is expected to patch this pattern in the binary with a
/// hash of the firmware.
pub static DEFAULT_SOFTWARE_ID: [u8; SOFTWARE_ID_LENGTH] = [
    0xC1, 0x5A, 0x13, 0x7B, 0x9E, 0x20, 0x44, 0xD1, 0x8F, 0x06, 0xB3, 0x5C, 0x71, 0xE8, 0x2A, 0x94,
];

/// Size of a request header: command, subfunction and length.
pub const REQUEST_HEADER_SIZE: usize = 4;
/// Size of a response header: command, subfunction, code and length.
pub const RESPONSE_HEADER_SIZE: usize = 5;
/// Size of the trailing CRC of every frame.
pub const CRC_SIZE: usize = 4;

/// Bit set in the command id of every response.
pub const RESPONSE_FLAG: u8 = 0x80;

wire_enum! {
    /// Top level command of a request.
    CommandId, CommandId {
        GetInfo = 0x01,
        CommControl = 0x02,
        MemoryControl = 0x03,
        UserCommand = 0x04,
        DataLogControl = 0x05,
    }
}

wire_enum! {
    GetInfo, Subfunction {
        GetProtocolVersion = 1,
        GetSoftwareId = 2,
        GetSupportedFeatures = 3,
        GetSpecialMemoryRegionCount = 4,
        GetSpecialMemoryLocation = 5,
        GetRpvCount = 6,
        GetRpvDefinition = 7,
        GetLoopCount = 8,
        GetLoopDefinition = 9,
    }
}

wire_enum! {
    CommControl, Subfunction {
        Discover = 1,
        Heartbeat = 2,
        GetParams = 3,
        Connect = 4,
        Disconnect = 5,
    }
}

wire_enum! {
    MemoryControl, Subfunction {
        Read = 1,
        Write = 2,
        WriteMasked = 3,
        ReadRpv = 4,
        WriteRpv = 5,
    }
}

wire_enum! {
    DataLogControl, Subfunction {
        GetSetup = 1,
        ConfigureDatalog = 2,
        ArmTrigger = 3,
        DisarmTrigger = 4,
        GetStatus = 5,
        GetAcquisitionMetadata = 6,
        ReadAcquisition = 7,
        ResetDatalogger = 8,
    }
}

/// Outcome of a request, sent back to the remote party.
///
/// `NoResponseToSend` and `ProcessAgain` are local to the dispatcher and
/// never appear on the wire.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    Ok = 0,
    InvalidRequest = 1,
    UnsupportedFeature = 2,
    Overflow = 3,
    Busy = 4,
    FailureToProceed = 5,
    Forbidden = 6,
    NoResponseToSend = 0xFE,
    ProcessAgain = 0xFF,
}

impl ResponseCode {
    pub(crate) const fn get_name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InvalidRequest => "Invalid request",
            Self::UnsupportedFeature => "Unsupported feature",
            Self::Overflow => "Overflow",
            Self::Busy => "Busy",
            Self::FailureToProceed => "Failure to proceed",
            Self::Forbidden => "Forbidden",
            Self::NoResponseToSend => "No response to send",
            Self::ProcessAgain => "Process again",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.get_name())
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> u8 {
        code as u8
    }
}

/// Local diagnostic of the reception state machine.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxError {
    #[default]
    None,
    Overflow,
    Disabled,
}

/// Local diagnostic of the transmission path.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxError {
    #[default]
    None,
    Overflow,
    Busy,
    Disabled,
}

/// A fully received request.
///
/// `data` borrows the reception buffer and stays valid until the transport
/// is asked to wait for the next request.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'r> {
    pub command_id: u8,
    pub subfunction_id: u8,
    pub data_length: u16,
    pub data: &'r [u8],
    pub crc: u32,
}

impl Request<'_> {
    /// CRC over the header and the payload.
    #[must_use]
    pub fn compute_crc(&self) -> u32 {
        let [len_hi, len_lo] = self.data_length.to_be_bytes();
        let header = [self.command_id, self.subfunction_id, len_hi, len_lo];
        crate::util::crc32(self.data, crate::util::crc32(&header, 0))
    }

    #[must_use]
    pub fn is_crc_valid(&self) -> bool {
        self.compute_crc() == self.crc
    }
}

/// Header of a response.
///
/// The payload lives in the transmission buffer of the transport.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub command_id: u8,
    pub subfunction_id: u8,
    pub response_code: ResponseCode,
    pub data_length: u16,
    pub crc: u32,
}

impl Response {
    /// A response answering `command_id`/`subfunction_id`, initially empty.
    #[must_use]
    pub const fn new(command_id: u8, subfunction_id: u8) -> Self {
        Self {
            command_id: command_id | RESPONSE_FLAG,
            subfunction_id,
            response_code: ResponseCode::Ok,
            data_length: 0,
            crc: 0,
        }
    }

    #[must_use]
    pub fn header(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let [len_hi, len_lo] = self.data_length.to_be_bytes();
        [
            self.command_id,
            self.subfunction_id,
            self.response_code.into(),
            len_hi,
            len_lo,
        ]
    }

    /// CRC over the header and `data`.
    #[must_use]
    pub fn compute_crc(&self, data: &[u8]) -> u32 {
        crate::util::crc32(data, crate::util::crc32(&self.header(), 0))
    }
}
