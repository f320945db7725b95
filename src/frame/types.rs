// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::wire_enum;

/// An address in the memory space of the device.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub usize);

impl Address {
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }

    /// Address `offset` bytes further, wrapping around the address space.
    #[must_use]
    pub const fn offset(self, offset: usize) -> Self {
        Self(self.0.wrapping_add(offset))
    }
}

impl From<usize> for Address {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

wire_enum! {
    /// Type of a variable, encoded as `kind << 4 | log2(size)`.
    VariableType, VariableType {
        Sint8 = 0x00,
        Sint16 = 0x01,
        Sint32 = 0x02,
        Sint64 = 0x03,
        Uint8 = 0x10,
        Uint16 = 0x11,
        Uint32 = 0x12,
        Uint64 = 0x13,
        Float32 = 0x22,
        Float64 = 0x23,
        Boolean = 0x30,
    }
}

/// Kind of a [`VariableType`], without its size.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Sint,
    Uint,
    Float,
    Boolean,
}

impl VariableType {
    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        1 << (self as u8 & 0x0F)
    }

    #[must_use]
    pub const fn kind(self) -> TypeKind {
        match self as u8 >> 4 {
            0 => TypeKind::Sint,
            1 => TypeKind::Uint,
            2 => TypeKind::Float,
            _ => TypeKind::Boolean,
        }
    }

    /// The type of `kind` with exactly `size` bytes, if there is one.
    #[must_use]
    pub const fn from_kind(kind: TypeKind, size: usize) -> Option<Self> {
        use VariableType::*;

        let t = match (kind, size) {
            (TypeKind::Sint, 1) => Sint8,
            (TypeKind::Sint, 2) => Sint16,
            (TypeKind::Sint, 4) => Sint32,
            (TypeKind::Sint, 8) => Sint64,
            (TypeKind::Uint, 1) => Uint8,
            (TypeKind::Uint, 2) => Uint16,
            (TypeKind::Uint, 4) => Uint32,
            (TypeKind::Uint, 8) => Uint64,
            (TypeKind::Float, 4) => Float32,
            (TypeKind::Float, 8) => Float64,
            (TypeKind::Boolean, 1) => Boolean,
            _ => return None,
        };
        Some(t)
    }
}

/// A value of any supported [`VariableType`].
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnyType {
    Sint8(i8),
    Sint16(i16),
    Sint32(i32),
    Sint64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
}

impl AnyType {
    #[must_use]
    pub const fn variable_type(&self) -> VariableType {
        match self {
            Self::Sint8(_) => VariableType::Sint8,
            Self::Sint16(_) => VariableType::Sint16,
            Self::Sint32(_) => VariableType::Sint32,
            Self::Sint64(_) => VariableType::Sint64,
            Self::Uint8(_) => VariableType::Uint8,
            Self::Uint16(_) => VariableType::Uint16,
            Self::Uint32(_) => VariableType::Uint32,
            Self::Uint64(_) => VariableType::Uint64,
            Self::Float32(_) => VariableType::Float32,
            Self::Float64(_) => VariableType::Float64,
            Self::Boolean(_) => VariableType::Boolean,
        }
    }

    /// Raw bit pattern, zero-extended to 64 bits.
    #[must_use]
    pub fn to_bits(&self) -> u64 {
        match *self {
            Self::Sint8(v) => u64::from(v as u8),
            Self::Sint16(v) => u64::from(v as u16),
            Self::Sint32(v) => u64::from(v as u32),
            Self::Sint64(v) => v as u64,
            Self::Uint8(v) => u64::from(v),
            Self::Uint16(v) => u64::from(v),
            Self::Uint32(v) => u64::from(v),
            Self::Uint64(v) => v,
            Self::Float32(v) => u64::from(v.to_bits()),
            Self::Float64(v) => v.to_bits(),
            Self::Boolean(v) => u64::from(v),
        }
    }

    /// Reinterpret the low bits of `bits` as a value of `vtype`.
    #[must_use]
    pub fn from_bits(vtype: VariableType, bits: u64) -> Self {
        match vtype {
            VariableType::Sint8 => Self::Sint8(bits as u8 as i8),
            VariableType::Sint16 => Self::Sint16(bits as u16 as i16),
            VariableType::Sint32 => Self::Sint32(bits as u32 as i32),
            VariableType::Sint64 => Self::Sint64(bits as i64),
            VariableType::Uint8 => Self::Uint8(bits as u8),
            VariableType::Uint16 => Self::Uint16(bits as u16),
            VariableType::Uint32 => Self::Uint32(bits as u32),
            VariableType::Uint64 => Self::Uint64(bits),
            VariableType::Float32 => Self::Float32(f32::from_bits(bits as u32)),
            VariableType::Float64 => Self::Float64(f64::from_bits(bits)),
            VariableType::Boolean => Self::Boolean(bits as u8 != 0),
        }
    }

    /// Decode a value stored in device memory (native byte order).
    ///
    /// `bytes` must hold at least `vtype.size()` bytes.
    #[must_use]
    pub fn from_ne_bytes(vtype: VariableType, bytes: &[u8]) -> Option<Self> {
        let size = vtype.size();
        let src = bytes.get(..size)?;
        let mut raw = [0; 8];
        let bits = if cfg!(target_endian = "little") {
            raw[..size].copy_from_slice(src);
            u64::from_le_bytes(raw)
        } else {
            raw[8 - size..].copy_from_slice(src);
            u64::from_be_bytes(raw)
        };
        Some(Self::from_bits(vtype, bits))
    }

    /// Write the value big-endian on exactly its type size.
    ///
    /// It returns the number of bytes written.
    pub fn write_be(&self, buf: &mut [u8]) -> Option<usize> {
        let size = self.variable_type().size();
        let dst = buf.get_mut(..size)?;
        dst.copy_from_slice(&self.to_bits().to_be_bytes()[8 - size..]);
        Some(size)
    }

    /// Read a big-endian value of `vtype`.
    #[must_use]
    pub fn read_be(vtype: VariableType, buf: &[u8]) -> Option<Self> {
        let size = vtype.size();
        let src = buf.get(..size)?;
        let mut raw = [0; 8];
        raw[8 - size..].copy_from_slice(src);
        Some(Self::from_bits(vtype, u64::from_be_bytes(raw)))
    }

    /// Widen the value to one of the three comparison domains.
    #[must_use]
    pub fn to_compare(&self) -> CompareValue {
        match *self {
            Self::Sint8(v) => CompareValue::Sint(i64::from(v)),
            Self::Sint16(v) => CompareValue::Sint(i64::from(v)),
            Self::Sint32(v) => CompareValue::Sint(i64::from(v)),
            Self::Sint64(v) => CompareValue::Sint(v),
            Self::Uint8(v) => CompareValue::Uint(u64::from(v)),
            Self::Uint16(v) => CompareValue::Uint(u64::from(v)),
            Self::Uint32(v) => CompareValue::Uint(u64::from(v)),
            Self::Uint64(v) => CompareValue::Uint(v),
            Self::Float32(v) => CompareValue::Float(v),
            Self::Float64(v) => CompareValue::Float(v as f32),
            Self::Boolean(v) => CompareValue::Uint(u64::from(v)),
        }
    }
}

/// A value widened for comparison: integers to 64 bits, floats to `f32`.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareValue {
    Float(f32),
    Sint(i64),
    Uint(u64),
}

impl CompareValue {
    #[must_use]
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Float(v) => v,
            Self::Sint(v) => v as f32,
            Self::Uint(v) => v as f32,
        }
    }
}

/// A device variable published under a numeric id.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimePublishedValue {
    pub id: u16,
    pub var_type: VariableType,
}

wire_enum! {
    /// Kind of a special memory region.
    MemoryRegionType, RegionType {
        ReadOnly = 0,
        Forbidden = 1,
    }
}

/// A memory window, both ends inclusive.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: Address,
    pub end: Address,
}

impl AddressRange {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            start: Address(start),
            end: Address(end),
        }
    }

    #[must_use]
    pub const fn contains(&self, address: Address) -> bool {
        address.0 >= self.start.0 && address.0 <= self.end.0
    }

    /// Whether any byte of `[start, start + length)` lies in the range.
    ///
    /// An empty block is checked as its start address alone.
    #[must_use]
    pub const fn intersects(&self, start: Address, length: usize) -> bool {
        let last = start.0.saturating_add(length.saturating_sub(1));
        start.0 <= self.end.0 && last >= self.start.0
    }
}
