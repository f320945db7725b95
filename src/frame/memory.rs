// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Address;

/// One span of a batched memory command.
///
/// `source_data` and `mask` borrow the request payload and are only present
/// for write operations.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock<'d> {
    pub start_address: Address,
    pub length: u16,
    pub source_data: Option<&'d [u8]>,
    pub mask: Option<&'d [u8]>,
}

impl MemoryBlock<'_> {
    /// A block without payload, as found in a read request.
    #[must_use]
    pub const fn read(start_address: Address, length: u16) -> Self {
        Self {
            start_address,
            length,
            source_data: None,
            mask: None,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.length as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}
