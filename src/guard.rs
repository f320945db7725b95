// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to device memory, filtered through forbidden and read-only ranges.

use crate::{
    error::Error,
    frame::{Address, AddressRange, AnyType, TypeKind, VariableType},
};

type Result<T> = core::result::Result<T, Error>;

/// Byte-level access to the memory space of the device.
pub trait MemoryAccess: Sync {
    /// Copy `dst.len()` bytes starting at `address` into `dst`.
    fn read(&self, address: Address, dst: &mut [u8]);

    /// Copy `src` to memory starting at `address`.
    fn write(&self, address: Address, src: &[u8]);
}

/// Direct access to the address space of the running program.
#[derive(Debug)]
pub struct RawMemory {
    _private: (),
}

impl RawMemory {
    /// # Safety
    ///
    /// Every address the remote party can name outside the configured
    /// forbidden ranges must be valid for reads and writes of any length it
    /// can request, and writes to it must not break the invariants of the
    /// program.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl MemoryAccess for RawMemory {
    fn read(&self, address: Address, dst: &mut [u8]) {
        let src = address.value() as *const u8;
        for (i, byte) in dst.iter_mut().enumerate() {
            // SAFETY: validity of the address is the contract of `RawMemory::new`.
            *byte = unsafe { core::ptr::read_volatile(src.wrapping_add(i)) };
        }
    }

    fn write(&self, address: Address, src: &[u8]) {
        let dst = address.value() as *mut u8;
        for (i, byte) in src.iter().enumerate() {
            // SAFETY: validity of the address is the contract of `RawMemory::new`.
            unsafe { core::ptr::write_volatile(dst.wrapping_add(i), *byte) };
        }
    }
}

/// Applies `new = (old | (src & mask)) & (src | !mask)`.
///
/// Bits outside `mask` keep their old value.
#[must_use]
pub const fn masked_byte(old: u8, src: u8, mask: u8) -> u8 {
    (old | (src & mask)) & (src | !mask)
}

/// Gatekeeper of every memory touch made on behalf of the remote party.
#[derive(Clone, Copy)]
pub struct MemoryGuard<'a> {
    memory: &'a dyn MemoryAccess,
    forbidden: &'a [AddressRange],
    readonly: &'a [AddressRange],
}

impl core::fmt::Debug for MemoryGuard<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("forbidden", &self.forbidden)
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

impl<'a> MemoryGuard<'a> {
    #[must_use]
    pub const fn new(
        memory: &'a dyn MemoryAccess,
        forbidden: &'a [AddressRange],
        readonly: &'a [AddressRange],
    ) -> Self {
        Self {
            memory,
            forbidden,
            readonly,
        }
    }

    #[must_use]
    pub const fn forbidden_ranges(&self) -> &'a [AddressRange] {
        self.forbidden
    }

    #[must_use]
    pub const fn readonly_ranges(&self) -> &'a [AddressRange] {
        self.readonly
    }

    #[must_use]
    pub fn is_forbidden(&self, start: Address, length: usize) -> bool {
        self.forbidden.iter().any(|r| r.intersects(start, length))
    }

    #[must_use]
    pub fn is_readonly(&self, start: Address, length: usize) -> bool {
        self.readonly.iter().any(|r| r.intersects(start, length))
    }

    pub fn check_read(&self, start: Address, length: usize) -> Result<()> {
        if self.is_forbidden(start, length) {
            return Err(Error::Forbidden(start.value()));
        }
        Ok(())
    }

    pub fn check_write(&self, start: Address, length: usize) -> Result<()> {
        if self.is_forbidden(start, length) || self.is_readonly(start, length) {
            return Err(Error::Forbidden(start.value()));
        }
        Ok(())
    }

    pub fn read(&self, start: Address, dst: &mut [u8]) -> Result<()> {
        self.check_read(start, dst.len())?;
        self.memory.read(start, dst);
        Ok(())
    }

    pub fn write(&self, start: Address, src: &[u8]) -> Result<()> {
        self.check_write(start, src.len())?;
        self.memory.write(start, src);
        Ok(())
    }

    /// Write only the bits of `src` selected by `mask`.
    pub fn write_masked(&self, start: Address, src: &[u8], mask: &[u8]) -> Result<()> {
        if src.len() != mask.len() {
            return Err(Error::BufferSize);
        }
        self.check_write(start, src.len())?;
        for (i, (s, m)) in src.iter().zip(mask).enumerate() {
            let address = start.offset(i);
            let mut old = [0];
            self.memory.read(address, &mut old);
            self.memory.write(address, &[masked_byte(old[0], *s, *m)]);
        }
        Ok(())
    }

    /// Read a variable of `var_type` stored at `address`.
    pub fn fetch_variable(&self, address: Address, var_type: VariableType) -> Result<AnyType> {
        let mut raw = [0; 8];
        let buf = &mut raw[..var_type.size()];
        self.read(address, buf)?;
        AnyType::from_ne_bytes(var_type, buf).ok_or(Error::BufferSize)
    }

    /// Read `bitsize` bits located `bitoffset` bits after `address`.
    ///
    /// The result has the kind of `var_type` and the smallest size holding
    /// `bitsize` bits. Signed values are sign-extended.
    pub fn fetch_bitfield(
        &self,
        address: Address,
        var_type: VariableType,
        bitoffset: u8,
        bitsize: u8,
    ) -> Result<AnyType> {
        let kind = var_type.kind();
        if bitsize == 0 || bitsize > 64 || kind == TypeKind::Float {
            return Err(Error::VariableType(var_type.into()));
        }
        let bits = usize::from(bitoffset) + usize::from(bitsize);
        let fetch_required_size = ((bits - 1) >> 3) + 1;
        if fetch_required_size > 16 {
            return Err(Error::BufferSize);
        }

        let mut raw = [0; 16];
        let word = if cfg!(target_endian = "little") {
            self.read(address, &mut raw[..fetch_required_size])?;
            u128::from_le_bytes(raw)
        } else {
            self.read(address, &mut raw[16 - fetch_required_size..])?;
            u128::from_be_bytes(raw)
        };

        let mask = if bitsize == 64 {
            u64::MAX
        } else {
            (1u64 << bitsize) - 1
        };
        let mut value = (word >> bitoffset) as u64 & mask;
        if kind == TypeKind::Sint && bitsize < 64 && (value >> (bitsize - 1)) & 1 == 1 {
            value |= !mask;
        }

        let output_size = match bitsize {
            1..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        };
        let output_type = VariableType::from_kind(kind, output_size)
            .ok_or(Error::VariableType(var_type.into()))?;
        Ok(AnyType::from_bits(output_type, value))
    }
}
