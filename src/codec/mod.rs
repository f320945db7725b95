// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request decoders and response encoders of protocol version 1.0.
//!
//! Decoders validate a request payload completely before anything is acted
//! upon. Encoders write into the transmission buffer and never past its end:
//! a response that does not fit yields [`Error::BufferSize`].

use crate::{error::*, frame::*, util::*};

mod datalog;
mod memory;

pub use self::{datalog::*, memory::*};

type Result<T> = core::result::Result<T, Error>;

/// Maximum length of the display name sent on discovery.
pub const MAX_DISPLAY_NAME_SIZE: usize = 32;
/// Maximum length of a loop name.
pub const MAX_LOOP_NAME_SIZE: usize = 32;

fn finish(writer: &Writer<'_>) -> Result<usize> {
    writer.finish().ok_or(Error::BufferSize)
}

fn expect_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::LengthMismatch(expected, data.len()));
    }
    Ok(())
}

fn truncated(name: &str, max: usize) -> &[u8] {
    let bytes = name.as_bytes();
    &bytes[..bytes.len().min(max)]
}

/// Features advertised to the server.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SupportedFeatures {
    pub memory_write: bool,
    pub datalogging: bool,
    pub user_command: bool,
    pub sixtyfour_bits: bool,
}

impl From<SupportedFeatures> for u8 {
    fn from(f: SupportedFeatures) -> u8 {
        let mut flags = 0;
        if f.memory_write {
            flags |= 0x80;
        }
        if f.datalogging {
            flags |= 0x40;
        }
        if f.user_command {
            flags |= 0x20;
        }
        if f.sixtyfour_bits {
            flags |= 0x10;
        }
        flags
    }
}

/// Timing and buffer parameters of the link.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommParams {
    pub rx_buffer_size: u16,
    pub tx_buffer_size: u16,
    pub max_bitrate: u32,
    pub heartbeat_timeout_us: u32,
    pub rx_timeout_us: u32,
    pub address_size: u8,
}

/// Loop kind, as described to the server.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopType {
    FixedFrequency { timestep_100ns: u32 },
    VariableFrequency,
}

impl LoopType {
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::FixedFrequency { .. } => 0,
            Self::VariableFrequency => 1,
        }
    }
}

/// Everything a loop definition response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopDefinition<'n> {
    pub loop_type: LoopType,
    pub datalogging_allowed: bool,
    pub name: &'n str,
}

#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialMemoryLocationRequest {
    pub region_type: MemoryRegionType,
    pub region_index: u8,
}

#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpvDefinitionRequest {
    pub start_index: u16,
    pub count: u16,
}

#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRequest {
    pub session_id: u32,
    pub challenge: u16,
}

// GetInfo

pub fn encode_protocol_version(buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(PROTOCOL_VERSION_MAJOR);
    w.put_u8(PROTOCOL_VERSION_MINOR);
    finish(&w)
}

pub fn encode_software_id(software_id: &[u8; SOFTWARE_ID_LENGTH], buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_slice(software_id);
    finish(&w)
}

pub fn encode_supported_features(features: SupportedFeatures, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(features.into());
    finish(&w)
}

pub fn encode_special_memory_region_count(
    readonly_count: u8,
    forbidden_count: u8,
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(readonly_count);
    w.put_u8(forbidden_count);
    finish(&w)
}

pub fn decode_special_memory_location(data: &[u8]) -> Result<SpecialMemoryLocationRequest> {
    expect_len(data, 2)?;
    Ok(SpecialMemoryLocationRequest {
        region_type: MemoryRegionType::try_from(data[0])?,
        region_index: data[1],
    })
}

pub fn encode_special_memory_location(
    request: SpecialMemoryLocationRequest,
    range: &AddressRange,
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(request.region_type.into());
    w.put_u8(request.region_index);
    w.put_address(range.start);
    w.put_address(range.end);
    finish(&w)
}

pub fn encode_rpv_count(count: u16, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u16(count);
    finish(&w)
}

pub fn decode_rpv_definition(data: &[u8]) -> Result<RpvDefinitionRequest> {
    expect_len(data, 4)?;
    let mut r = Reader::new(data);
    let start_index = r.u16().ok_or(Error::BufferSize)?;
    let count = r.u16().ok_or(Error::BufferSize)?;
    Ok(RpvDefinitionRequest { start_index, count })
}

pub fn encode_rpv_definitions(rpvs: &[RuntimePublishedValue], buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    for rpv in rpvs {
        w.put_u16(rpv.id);
        w.put_u8(rpv.var_type.into());
    }
    finish(&w)
}

pub fn encode_loop_count(count: u8, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(count);
    finish(&w)
}

pub fn decode_loop_definition(data: &[u8]) -> Result<u8> {
    expect_len(data, 1)?;
    Ok(data[0])
}

pub fn encode_loop_definition(
    loop_id: u8,
    definition: &LoopDefinition<'_>,
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(loop_id);
    w.put_u8(definition.loop_type.value());
    w.put_u8(if definition.datalogging_allowed { 0x80 } else { 0 });
    if let LoopType::FixedFrequency { timestep_100ns } = definition.loop_type {
        w.put_u32(timestep_100ns);
    }
    let name = truncated(definition.name, MAX_LOOP_NAME_SIZE);
    w.put_u8(name.len() as u8);
    w.put_slice(name);
    finish(&w)
}

// CommControl

pub fn decode_discover(data: &[u8]) -> Result<()> {
    expect_len(data, DISCOVER_MAGIC.len())?;
    if data != DISCOVER_MAGIC {
        return Err(Error::Magic);
    }
    Ok(())
}

pub fn encode_discover(
    software_id: &[u8; SOFTWARE_ID_LENGTH],
    display_name: &str,
    buf: &mut [u8],
) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(PROTOCOL_VERSION_MAJOR);
    w.put_u8(PROTOCOL_VERSION_MINOR);
    w.put_slice(software_id);
    let name = truncated(display_name, MAX_DISPLAY_NAME_SIZE);
    w.put_u8(name.len() as u8);
    w.put_slice(name);
    finish(&w)
}

pub fn decode_heartbeat(data: &[u8]) -> Result<HeartbeatRequest> {
    expect_len(data, 6)?;
    let mut r = Reader::new(data);
    let session_id = r.u32().ok_or(Error::BufferSize)?;
    let challenge = r.u16().ok_or(Error::BufferSize)?;
    Ok(HeartbeatRequest {
        session_id,
        challenge,
    })
}

pub fn encode_heartbeat(session_id: u32, challenge_response: u16, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u32(session_id);
    w.put_u16(challenge_response);
    finish(&w)
}

pub fn encode_comm_params(params: &CommParams, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u16(params.rx_buffer_size);
    w.put_u16(params.tx_buffer_size);
    w.put_u32(params.max_bitrate);
    w.put_u32(params.heartbeat_timeout_us);
    w.put_u32(params.rx_timeout_us);
    w.put_u8(params.address_size);
    finish(&w)
}

pub fn decode_connect(data: &[u8]) -> Result<()> {
    expect_len(data, CONNECT_MAGIC.len())?;
    if data != CONNECT_MAGIC {
        return Err(Error::Magic);
    }
    Ok(())
}

pub fn encode_connect(session_id: u32, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_slice(&CONNECT_MAGIC);
    w.put_u32(session_id);
    finish(&w)
}

pub fn decode_disconnect(data: &[u8]) -> Result<u32> {
    expect_len(data, 4)?;
    Reader::new(data).u32().ok_or(Error::BufferSize)
}
