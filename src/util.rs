// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers: byte cursors, address codec and CRC-32.

use byteorder::{BigEndian, ByteOrder};

use crate::{error::Error, frame::Address};

/// Width in bytes of a device address on the wire.
pub const ADDRESS_SIZE: usize = core::mem::size_of::<usize>();

/// Calculate a CRC-32 (reflected, polynomial `0xEDB88320`).
///
/// `start` is the CRC of the preceding data when a checksum is built over
/// several chunks, or `0` for a fresh computation.
#[must_use]
pub fn crc32(data: &[u8], start: u32) -> u32 {
    let mut crc = !start;
    for x in data {
        crc ^= u32::from(*x);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

/// Encode `address` big-endian on `width` bytes.
///
/// It returns the number of bytes written.
pub fn encode_address(address: usize, width: usize, buf: &mut [u8]) -> Result<usize, Error> {
    if buf.len() < width {
        return Err(Error::BufferSize);
    }
    let value = address as u64;
    match width {
        1 => buf[0] = value as u8,
        2 => BigEndian::write_u16(buf, value as u16),
        4 => BigEndian::write_u32(buf, value as u32),
        8 => BigEndian::write_u64(buf, value),
        _ => return Err(Error::AddressSize(width)),
    }
    Ok(width)
}

/// Decode a big-endian address of `width` bytes.
pub fn decode_address(buf: &[u8], width: usize) -> Result<usize, Error> {
    if buf.len() < width {
        return Err(Error::BufferSize);
    }
    let value = match width {
        1 => u64::from(buf[0]),
        2 => u64::from(BigEndian::read_u16(buf)),
        4 => u64::from(BigEndian::read_u32(buf)),
        8 => BigEndian::read_u64(buf),
        _ => return Err(Error::AddressSize(width)),
    };
    usize::try_from(value).map_err(|_| Error::AddressSize(width))
}

/// Sequential big-endian reader over a request payload.
///
/// Every getter returns `None` once the payload is exhausted and leaves the
/// cursor where it was.
#[derive(Debug, Clone)]
pub struct Reader<'b> {
    buf: &'b [u8],
    cursor: usize,
}

impl<'b> Reader<'b> {
    #[must_use]
    pub const fn new(buf: &'b [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, len: usize) -> Option<&'b [u8]> {
        if self.remaining() < len {
            return None;
        }
        let bytes = &self.buf[self.cursor..self.cursor + len];
        self.cursor += len;
        Some(bytes)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(BigEndian::read_u16)
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(BigEndian::read_u32)
    }

    pub fn f32(&mut self) -> Option<f32> {
        self.bytes(4).map(BigEndian::read_f32)
    }

    pub fn address(&mut self) -> Option<Address> {
        let bytes = self.bytes(ADDRESS_SIZE)?;
        decode_address(bytes, ADDRESS_SIZE).ok().map(Address)
    }
}

/// Sequential big-endian writer bounded by the capacity of its buffer.
///
/// A write that does not fit sets the overflow flag and writes nothing.
#[derive(Debug)]
pub struct Writer<'b> {
    buf: &'b mut [u8],
    cursor: usize,
    overflow: bool,
}

impl<'b> Writer<'b> {
    pub const fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            overflow: false,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    #[must_use]
    pub const fn overflow(&self) -> bool {
        self.overflow
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Reserve `len` bytes and hand them out for in-place writing.
    pub fn reserve(&mut self, len: usize) -> Option<&mut [u8]> {
        if self.overflow || self.remaining() < len {
            self.overflow = true;
            return None;
        }
        let start = self.cursor;
        self.cursor += len;
        Some(&mut self.buf[start..start + len])
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        if let Some(dst) = self.reserve(data.len()) {
            dst.copy_from_slice(data);
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_slice(&[v]);
    }

    pub fn put_u16(&mut self, v: u16) {
        if let Some(dst) = self.reserve(2) {
            BigEndian::write_u16(dst, v);
        }
    }

    pub fn put_u32(&mut self, v: u32) {
        if let Some(dst) = self.reserve(4) {
            BigEndian::write_u32(dst, v);
        }
    }

    pub fn put_address(&mut self, address: Address) {
        if let Some(dst) = self.reserve(ADDRESS_SIZE) {
            // The native width is always a valid one.
            let _ = encode_address(address.value(), ADDRESS_SIZE, dst);
        }
    }

    /// Number of bytes written, or `None` if anything overflowed.
    #[must_use]
    pub const fn finish(&self) -> Option<usize> {
        if self.overflow { None } else { Some(self.cursor) }
    }
}
