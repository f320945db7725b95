// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::Error,
    frame::LoggableItem,
    guard::MemoryGuard,
    rpv::RpvTable,
    util::crc32,
};

/// Size of a logged timestamp.
pub const TIME_SIZE: usize = 4;

/// Size of one logged entry holding `items`.
pub fn entry_size(items: &[LoggableItem], rpvs: &RpvTable<'_>) -> Result<usize, Error> {
    items.iter().try_fold(0, |size, item| {
        let item_size = match *item {
            LoggableItem::Memory { size, .. } => usize::from(size),
            LoggableItem::Rpv(id) => rpvs.get(id).ok_or(Error::UnknownRpv(id))?.var_type.size(),
            LoggableItem::Time => TIME_SIZE,
        };
        Ok(size + item_size)
    })
}

/// Ring buffer of fixed size entries, with a streaming reader.
///
/// Once full, every new entry evicts the oldest one.
#[derive(Debug)]
pub struct RawEncoder<'a> {
    buffer: &'a mut [u8],
    entry_size: usize,
    max_entries: usize,
    write_index: usize,
    first_valid_index: usize,
    full: bool,
    write_counter: u32,
    reader: ReaderState,
}

#[derive(Debug, Clone, Copy, Default)]
struct ReaderState {
    consumed: usize,
    crc: u32,
}

impl<'a> RawEncoder<'a> {
    #[must_use]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            entry_size: 0,
            max_entries: 0,
            write_index: 0,
            first_valid_index: 0,
            full: false,
            write_counter: 0,
            reader: ReaderState::default(),
        }
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Prepare for entries of `entry_size` bytes, dropping all content.
    pub fn configure(&mut self, entry_size: usize) -> Result<(), Error> {
        if entry_size == 0 || entry_size > self.buffer.len() {
            self.entry_size = 0;
            self.max_entries = 0;
            self.reset();
            return Err(Error::BufferSize);
        }
        self.entry_size = entry_size;
        self.max_entries = self.buffer.len() / entry_size;
        self.reset();
        Ok(())
    }

    /// Drop all content, keeping the entry size.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.first_valid_index = 0;
        self.full = false;
        self.write_counter = 0;
        self.reset_reader();
    }

    #[must_use]
    pub const fn entry_size(&self) -> usize {
        self.entry_size
    }

    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    #[must_use]
    pub const fn entry_count(&self) -> usize {
        if self.full {
            self.max_entries
        } else {
            self.write_index
        }
    }

    /// Size of the valid content.
    #[must_use]
    pub const fn data_size(&self) -> usize {
        self.entry_count() * self.entry_size
    }

    /// Entries written since the last reset, wrapping.
    #[must_use]
    pub const fn write_counter(&self) -> u32 {
        self.write_counter
    }

    /// Append one entry made of the current values of `items`.
    ///
    /// Values that cannot be read are logged as zeros.
    pub fn encode(
        &mut self,
        items: &[LoggableItem],
        guard: &MemoryGuard<'_>,
        rpvs: &RpvTable<'_>,
        timestamp_100ns: u32,
    ) {
        if self.max_entries == 0 {
            return;
        }
        let start = self.write_index * self.entry_size;
        let entry = &mut self.buffer[start..start + self.entry_size];
        let mut cursor = 0;
        for item in items {
            let remaining = &mut entry[cursor..];
            let written = match *item {
                LoggableItem::Memory { address, size } => {
                    let dst = &mut remaining[..usize::from(size)];
                    if guard.read(address, dst).is_err() {
                        dst.fill(0);
                    }
                    dst.len()
                }
                LoggableItem::Rpv(id) => encode_rpv(id, rpvs, remaining),
                LoggableItem::Time => {
                    BigEndian::write_u32(&mut remaining[..TIME_SIZE], timestamp_100ns);
                    TIME_SIZE
                }
            };
            cursor += written;
        }
        self.advance();
    }

    fn advance(&mut self) {
        self.write_index += 1;
        self.write_counter = self.write_counter.wrapping_add(1);
        if self.write_index >= self.max_entries {
            self.write_index = 0;
            self.full = true;
        }
        if self.full {
            self.first_valid_index = self.write_index;
        }
    }

    /// Restart streaming from the oldest entry.
    pub fn reset_reader(&mut self) {
        self.reader = ReaderState::default();
    }

    /// Copy the next bytes of the content, oldest entry first.
    ///
    /// It returns the number of bytes copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let total = self.data_size();
        let ring_size = self.max_entries * self.entry_size;
        let start = self.first_valid_index * self.entry_size;
        let mut n = 0;
        while n < out.len() && self.reader.consumed < total {
            let offset = (start + self.reader.consumed) % ring_size;
            let chunk = (ring_size - offset)
                .min(total - self.reader.consumed)
                .min(out.len() - n);
            let src = &self.buffer[offset..offset + chunk];
            out[n..n + chunk].copy_from_slice(src);
            self.reader.crc = crc32(src, self.reader.crc);
            self.reader.consumed += chunk;
            n += chunk;
        }
        n
    }

    /// Whether the whole content has been read.
    #[must_use]
    pub const fn read_finished(&self) -> bool {
        self.reader.consumed >= self.data_size()
    }

    /// CRC of everything read so far.
    #[must_use]
    pub const fn read_crc(&self) -> u32 {
        self.reader.crc
    }
}

fn encode_rpv(id: u16, rpvs: &RpvTable<'_>, dst: &mut [u8]) -> usize {
    let Some(rpv) = rpvs.get(id) else {
        return 0;
    };
    let size = rpv.var_type.size();
    let dst = &mut dst[..size];
    match rpvs.read(&rpv).ok().and_then(|v| v.write_be(dst)) {
        Some(written) => written,
        None => {
            dst.fill(0);
            size
        }
    }
}
