// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Datalogging control payloads.

use byteorder::{BigEndian, ByteOrder};

use super::*;

/// Size of the fixed part of a configure request.
pub const CONFIGURE_HEADER_SIZE: usize = 16;

/// Size of the `[finished, rolling counter, acquisition id]` prefix of every
/// acquisition chunk.
pub const READ_ACQUISITION_HEADER_SIZE: usize = 4;

/// A decoded configure request.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigureRequest {
    pub loop_id: u8,
    pub config_id: u16,
    pub config: Configuration,
}

/// Static setup of the datalogger.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataloggingSetup {
    pub buffer_size: u32,
    pub encoding: EncodingType,
    pub max_signal_count: u8,
}

/// Header of one acquisition chunk.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionChunk {
    pub finished: bool,
    pub rolling_counter: u8,
    pub acquisition_id: u16,
}

fn truncated_at(r: &Reader<'_>, data: &[u8]) -> Error {
    Error::LengthMismatch(r.position() + 1, data.len())
}

fn decode_operand(r: &mut Reader<'_>, data: &[u8]) -> Result<Operand> {
    let operand_type = OperandType::try_from(r.u8().ok_or_else(|| truncated_at(r, data))?)?;
    let operand = match operand_type {
        OperandType::Literal => Operand::Literal(r.f32().ok_or_else(|| truncated_at(r, data))?),
        OperandType::Rpv => Operand::Rpv(r.u16().ok_or_else(|| truncated_at(r, data))?),
        OperandType::Var => {
            let var_type = VariableType::try_from(r.u8().ok_or_else(|| truncated_at(r, data))?)?;
            let address = r.address().ok_or_else(|| truncated_at(r, data))?;
            Operand::Var { address, var_type }
        }
        OperandType::VarBit => {
            let var_type = VariableType::try_from(r.u8().ok_or_else(|| truncated_at(r, data))?)?;
            let address = r.address().ok_or_else(|| truncated_at(r, data))?;
            let bitoffset = r.u8().ok_or_else(|| truncated_at(r, data))?;
            let bitsize = r.u8().ok_or_else(|| truncated_at(r, data))?;
            Operand::VarBit {
                address,
                var_type,
                bitoffset,
                bitsize,
            }
        }
    };
    Ok(operand)
}

fn decode_item(r: &mut Reader<'_>, data: &[u8]) -> Result<LoggableItem> {
    let item_type = LoggableType::try_from(r.u8().ok_or_else(|| truncated_at(r, data))?)?;
    let item = match item_type {
        LoggableType::Memory => {
            let address = r.address().ok_or_else(|| truncated_at(r, data))?;
            let size = r.u8().ok_or_else(|| truncated_at(r, data))?;
            LoggableItem::Memory { address, size }
        }
        LoggableType::Rpv => LoggableItem::Rpv(r.u16().ok_or_else(|| truncated_at(r, data))?),
        LoggableType::Time => LoggableItem::Time,
    };
    Ok(item)
}

/// Decode a configure request.
///
/// Counts above the supported maximum yield [`Error::BufferSize`]; a
/// truncated payload or trailing bytes yield [`Error::LengthMismatch`].
pub fn decode_configure(data: &[u8]) -> Result<ConfigureRequest> {
    if data.len() < CONFIGURE_HEADER_SIZE {
        return Err(Error::LengthMismatch(CONFIGURE_HEADER_SIZE, data.len()));
    }
    let mut config = Configuration::default();
    let mut r = Reader::new(data);
    // The header length was checked above.
    let loop_id = r.u8().unwrap_or_default();
    let config_id = r.u16().unwrap_or_default();
    config.decimation = r.u16().unwrap_or_default();
    config.probe_location = r.u8().unwrap_or_default();
    config.timeout_100ns = r.u32().unwrap_or_default();
    let condition = r.u8().unwrap_or_default();
    config.trigger.hold_time_100ns = r.u32().unwrap_or_default();
    let operand_count = r.u8().unwrap_or_default();

    config.trigger.condition = TriggerConditionId::try_from(condition)?;
    if usize::from(operand_count) > MAX_OPERANDS {
        return Err(Error::BufferSize);
    }
    config.trigger.operand_count = operand_count;
    for operand in config.trigger.operands.iter_mut().take(operand_count.into()) {
        *operand = decode_operand(&mut r, data)?;
    }

    let items_count = r.u8().ok_or_else(|| truncated_at(&r, data))?;
    if usize::from(items_count) > MAX_SIGNALS {
        return Err(Error::BufferSize);
    }
    config.items_count = items_count;
    for item in config.items_to_log.iter_mut().take(items_count.into()) {
        *item = decode_item(&mut r, data)?;
    }

    if !r.is_empty() {
        return Err(Error::LengthMismatch(r.position(), data.len()));
    }
    Ok(ConfigureRequest {
        loop_id,
        config_id,
        config,
    })
}

pub fn encode_datalogging_setup(setup: &DataloggingSetup, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u32(setup.buffer_size);
    w.put_u8(setup.encoding as u8);
    w.put_u8(setup.max_signal_count);
    finish(&w)
}

pub fn encode_datalogger_status(status: &DataloggerStatus, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u8(status.state.into());
    w.put_u32(status.bytes_to_acquire_from_trigger_to_completion);
    w.put_u32(status.write_counter_since_trigger);
    finish(&w)
}

pub fn encode_acquisition_metadata(meta: &AcquisitionMetadata, buf: &mut [u8]) -> Result<usize> {
    let mut w = Writer::new(buf);
    w.put_u16(meta.acquisition_id);
    w.put_u16(meta.config_id);
    w.put_u32(meta.number_of_points);
    w.put_u32(meta.data_size);
    w.put_u32(meta.points_after_trigger);
    finish(&w)
}

/// Frame a chunk whose `data_len` bytes of acquisition data were already
/// placed right after the header.
///
/// `crc` is appended after the data on the last chunk.
pub fn encode_read_acquisition(
    chunk: &AcquisitionChunk,
    data_len: usize,
    crc: Option<u32>,
    buf: &mut [u8],
) -> Result<usize> {
    let mut len = READ_ACQUISITION_HEADER_SIZE + data_len;
    if let Some(crc) = crc {
        if buf.len() < len + 4 {
            return Err(Error::BufferSize);
        }
        BigEndian::write_u32(&mut buf[len..], crc);
        len += 4;
    }
    if buf.len() < len {
        return Err(Error::BufferSize);
    }
    buf[0] = u8::from(chunk.finished);
    buf[1] = chunk.rolling_counter;
    BigEndian::write_u16(&mut buf[2..4], chunk.acquisition_id);
    Ok(len)
}
