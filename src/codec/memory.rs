// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory and published value access payloads.

use super::*;
use crate::rpv::RpvTable;

/// Iterator over the blocks of a memory read request.
///
/// The whole payload is validated on construction; an invalid payload
/// yields no block at all.
#[derive(Debug, Clone)]
pub struct ReadMemoryBlocksParser<'r> {
    reader: Reader<'r>,
    valid: bool,
    required_tx_size: usize,
}

impl<'r> ReadMemoryBlocksParser<'r> {
    #[must_use]
    pub fn new(data: &'r [u8]) -> Self {
        let mut reader = Reader::new(data);
        let mut required_tx_size = 0usize;
        let mut valid = true;
        while !reader.is_empty() {
            let Some(length) = reader.address().and_then(|_| reader.u16()) else {
                valid = false;
                break;
            };
            required_tx_size += ADDRESS_SIZE + 2 + usize::from(length);
        }
        Self {
            reader: Reader::new(data),
            valid,
            required_tx_size,
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Size of the response answering every block.
    #[must_use]
    pub const fn required_tx_size(&self) -> usize {
        self.required_tx_size
    }
}

impl<'r> Iterator for ReadMemoryBlocksParser<'r> {
    type Item = MemoryBlock<'r>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.valid {
            return None;
        }
        let start_address = self.reader.address()?;
        let length = self.reader.u16()?;
        Some(MemoryBlock::read(start_address, length))
    }
}

/// Iterator over the blocks of a (masked) memory write request.
#[derive(Debug, Clone)]
pub struct WriteMemoryBlocksParser<'r> {
    reader: Reader<'r>,
    masked: bool,
    valid: bool,
    required_tx_size: usize,
}

impl<'r> WriteMemoryBlocksParser<'r> {
    #[must_use]
    pub fn new(data: &'r [u8], masked: bool) -> Self {
        let mut parser = Self {
            reader: Reader::new(data),
            masked,
            valid: true,
            required_tx_size: 0,
        };
        let mut probe = parser.clone();
        while !probe.reader.is_empty() {
            if probe.next_block().is_none() {
                parser.valid = false;
                break;
            }
            parser.required_tx_size += ADDRESS_SIZE + 2;
        }
        parser
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn required_tx_size(&self) -> usize {
        self.required_tx_size
    }

    fn next_block(&mut self) -> Option<MemoryBlock<'r>> {
        let start_address = self.reader.address()?;
        let length = self.reader.u16()?;
        let source_data = self.reader.bytes(usize::from(length))?;
        let mask = if self.masked {
            Some(self.reader.bytes(usize::from(length))?)
        } else {
            None
        };
        Some(MemoryBlock {
            start_address,
            length,
            source_data: Some(source_data),
            mask,
        })
    }
}

impl<'r> Iterator for WriteMemoryBlocksParser<'r> {
    type Item = MemoryBlock<'r>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.valid {
            return None;
        }
        self.next_block()
    }
}

/// Appends `[address, length, data]` per block read.
#[derive(Debug)]
pub struct ReadMemoryBlocksEncoder<'b> {
    writer: Writer<'b>,
}

impl<'b> ReadMemoryBlocksEncoder<'b> {
    pub const fn new(buf: &'b mut [u8]) -> Self {
        Self {
            writer: Writer::new(buf),
        }
    }

    /// Write the block header and return the slot its data goes to.
    pub fn write(&mut self, block: &MemoryBlock<'_>) -> Option<&mut [u8]> {
        self.writer.put_address(block.start_address);
        self.writer.put_u16(block.length);
        self.writer.reserve(block.len())
    }

    pub fn finish(&self) -> Result<usize> {
        finish(&self.writer)
    }
}

/// Appends `[address, length]` per block written.
#[derive(Debug)]
pub struct WriteMemoryBlocksEncoder<'b> {
    writer: Writer<'b>,
}

impl<'b> WriteMemoryBlocksEncoder<'b> {
    pub const fn new(buf: &'b mut [u8]) -> Self {
        Self {
            writer: Writer::new(buf),
        }
    }

    pub fn write(&mut self, block: &MemoryBlock<'_>) {
        self.writer.put_address(block.start_address);
        self.writer.put_u16(block.length);
    }

    pub fn finish(&self) -> Result<usize> {
        finish(&self.writer)
    }
}

/// Iterator over the ids of a published value read request.
#[derive(Debug, Clone)]
pub struct ReadRpvParser<'r> {
    reader: Reader<'r>,
    valid: bool,
}

impl<'r> ReadRpvParser<'r> {
    #[must_use]
    pub const fn new(data: &'r [u8]) -> Self {
        Self {
            reader: Reader::new(data),
            valid: data.len() % 2 == 0,
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Size of the response answering every id.
    #[must_use]
    pub fn required_tx_size(&self, rpvs: &RpvTable<'_>) -> Option<usize> {
        let mut ids = self.clone();
        let mut size = 0;
        for id in &mut ids {
            size += 2 + rpvs.get(id)?.var_type.size();
        }
        Some(size)
    }
}

impl Iterator for ReadRpvParser<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.valid {
            return None;
        }
        self.reader.u16()
    }
}

/// Iterator over the `(value definition, new value)` pairs of a published
/// value write request.
#[derive(Debug, Clone)]
pub struct WriteRpvParser<'r, 't> {
    reader: Reader<'r>,
    rpvs: &'t RpvTable<'t>,
    valid: bool,
    required_tx_size: usize,
}

impl<'r, 't> WriteRpvParser<'r, 't> {
    #[must_use]
    pub fn new(data: &'r [u8], rpvs: &'t RpvTable<'t>) -> Self {
        let mut parser = Self {
            reader: Reader::new(data),
            rpvs,
            valid: true,
            required_tx_size: 0,
        };
        let mut probe = parser.clone();
        while !probe.reader.is_empty() {
            if probe.next_value().is_none() {
                parser.valid = false;
                break;
            }
            parser.required_tx_size += 3;
        }
        parser
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn required_tx_size(&self) -> usize {
        self.required_tx_size
    }

    fn next_value(&mut self) -> Option<(RuntimePublishedValue, AnyType)> {
        let rpv = self.rpvs.get(self.reader.u16()?)?;
        let raw = self.reader.bytes(rpv.var_type.size())?;
        Some((rpv, AnyType::read_be(rpv.var_type, raw)?))
    }
}

impl Iterator for WriteRpvParser<'_, '_> {
    type Item = (RuntimePublishedValue, AnyType);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.valid {
            return None;
        }
        self.next_value()
    }
}

/// Appends `[id, value]` per published value read.
#[derive(Debug)]
pub struct ReadRpvEncoder<'b> {
    writer: Writer<'b>,
}

impl<'b> ReadRpvEncoder<'b> {
    pub const fn new(buf: &'b mut [u8]) -> Self {
        Self {
            writer: Writer::new(buf),
        }
    }

    pub fn write(&mut self, id: u16, value: &AnyType) {
        self.writer.put_u16(id);
        if let Some(dst) = self.writer.reserve(value.variable_type().size()) {
            let _ = value.write_be(dst);
        }
    }

    pub fn finish(&self) -> Result<usize> {
        finish(&self.writer)
    }
}

/// Appends `[id, size]` per published value written.
#[derive(Debug)]
pub struct WriteRpvEncoder<'b> {
    writer: Writer<'b>,
}

impl<'b> WriteRpvEncoder<'b> {
    pub const fn new(buf: &'b mut [u8]) -> Self {
        Self {
            writer: Writer::new(buf),
        }
    }

    pub fn write(&mut self, rpv: &RuntimePublishedValue) {
        self.writer.put_u16(rpv.id);
        self.writer.put_u8(rpv.var_type.size() as u8);
    }

    pub fn finish(&self) -> Result<usize> {
        finish(&self.writer)
    }
}
