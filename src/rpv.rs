// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime published values and the application callbacks backing them.

use crate::{
    error::Error,
    frame::{AnyType, RuntimePublishedValue},
};

/// Produce the current value of a published value.
pub type RpvReadCallback = fn(&RuntimePublishedValue) -> Result<AnyType, Error>;

/// Store a new value into a published value.
pub type RpvWriteCallback = fn(&RuntimePublishedValue, AnyType) -> Result<(), Error>;

/// The published value table of the application, with its callbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpvTable<'a> {
    values: &'a [RuntimePublishedValue],
    read: Option<RpvReadCallback>,
    write: Option<RpvWriteCallback>,
}

impl<'a> RpvTable<'a> {
    #[must_use]
    pub const fn new(
        values: &'a [RuntimePublishedValue],
        read: Option<RpvReadCallback>,
        write: Option<RpvWriteCallback>,
    ) -> Self {
        Self {
            values,
            read,
            write,
        }
    }

    #[must_use]
    pub const fn values(&self) -> &'a [RuntimePublishedValue] {
        self.values
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Published values are readable only with a read callback.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.read.is_some()
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    #[must_use]
    pub fn get(&self, id: u16) -> Option<RuntimePublishedValue> {
        self.values.iter().find(|rpv| rpv.id == id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    /// Read `rpv` through the application callback.
    ///
    /// A value of another type than declared is converted bit-wise.
    pub fn read(&self, rpv: &RuntimePublishedValue) -> Result<AnyType, Error> {
        let read = self.read.ok_or(Error::RpvAccess(rpv.id))?;
        let value = read(rpv)?;
        if value.variable_type() == rpv.var_type {
            Ok(value)
        } else {
            Ok(AnyType::from_bits(rpv.var_type, value.to_bits()))
        }
    }

    pub fn write(&self, rpv: &RuntimePublishedValue, value: AnyType) -> Result<(), Error> {
        let write = self.write.ok_or(Error::RpvAccess(rpv.id))?;
        write(rpv, value)
    }
}
