// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Triggered acquisition of memory and published values.

mod datalogger;
mod encoder;
mod trigger;

pub use self::{datalogger::*, encoder::*, trigger::*};

use crate::{
    error::Error,
    frame::{AnyType, CompareValue, Operand},
    guard::MemoryGuard,
    rpv::RpvTable,
};

/// Callback invoked once when the trigger fires.
pub type TriggerCallback = fn();

/// Read the current value of `operand`, widened for comparison.
///
/// An operand that cannot be read evaluates to `0.0`.
#[must_use]
pub fn fetch_operand(operand: &Operand, guard: &MemoryGuard<'_>, rpvs: &RpvTable<'_>) -> CompareValue {
    let value = match *operand {
        Operand::Literal(v) => Ok(AnyType::Float32(v)),
        Operand::Var { address, var_type } => guard.fetch_variable(address, var_type),
        Operand::VarBit {
            address,
            var_type,
            bitoffset,
            bitsize,
        } => guard.fetch_bitfield(address, var_type, bitoffset, bitsize),
        Operand::Rpv(id) => rpvs
            .get(id)
            .ok_or(Error::UnknownRpv(id))
            .and_then(|rpv| rpvs.read(&rpv)),
    };
    match value {
        Ok(v) => v.to_compare(),
        Err(err) => {
            log::debug!("Cannot fetch trigger operand: {err}");
            CompareValue::Float(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::{Address, AddressRange, RuntimePublishedValue, VariableType},
        testing::SimMemory,
    };

    const FORBIDDEN: [AddressRange; 1] = [AddressRange::new(0x1100, 0x11FF)];
    const RPVS: [RuntimePublishedValue; 1] = [RuntimePublishedValue {
        id: 0x10,
        var_type: VariableType::Sint16,
    }];

    fn read_rpv(_: &RuntimePublishedValue) -> Result<AnyType, Error> {
        Ok(AnyType::Sint16(-3))
    }

    #[test]
    fn fetch_operands() {
        let mem = SimMemory::new(0x1000);
        mem.fill(0x1000, &0x1234_u16.to_ne_bytes());
        let guard = MemoryGuard::new(&mem, &FORBIDDEN, &[]);
        let rpvs = RpvTable::new(&RPVS, Some(read_rpv), None);

        assert_eq!(
            fetch_operand(&Operand::Literal(1.5), &guard, &rpvs),
            CompareValue::Float(1.5)
        );
        assert_eq!(
            fetch_operand(
                &Operand::Var {
                    address: Address(0x1000),
                    var_type: VariableType::Uint16
                },
                &guard,
                &rpvs
            ),
            CompareValue::Uint(0x1234)
        );
        assert_eq!(
            fetch_operand(&Operand::Rpv(0x10), &guard, &rpvs),
            CompareValue::Sint(-3)
        );
    }

    #[test]
    fn unreadable_operand_is_zero() {
        let mem = SimMemory::new(0x1000);
        let guard = MemoryGuard::new(&mem, &FORBIDDEN, &[]);
        let rpvs = RpvTable::new(&RPVS, None, None);

        let forbidden = Operand::Var {
            address: Address(0x1100),
            var_type: VariableType::Uint32,
        };
        assert_eq!(
            fetch_operand(&forbidden, &guard, &rpvs),
            CompareValue::Float(0.0)
        );
        assert_eq!(
            fetch_operand(&Operand::Rpv(0x10), &guard, &rpvs),
            CompareValue::Float(0.0)
        );
        assert_eq!(
            fetch_operand(&Operand::Rpv(0x99), &guard, &rpvs),
            CompareValue::Float(0.0)
        );
    }
}
