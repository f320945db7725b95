// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A debug agent embedded in firmware.
//!
//! The agent answers a request/response protocol over any half-duplex byte
//! link. It gives a remote server access to memory, to a table of runtime
//! published values and to a triggered datalogger sampling inside one of the
//! periodic loops of the firmware.
//!
//! Nothing is allocated: every buffer is borrowed from the application
//! through [`Config`]. [`MainHandler`] runs in the main context, one
//! [`LoopHandler`] runs in each loop that may host the datalogger.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod codec;
mod comm;
mod config;
mod datalogging;
mod error;
mod frame;
mod guard;
mod handler;
mod ipc;
mod loop_handler;
mod rpv;
mod timebase;
mod util;

#[cfg(test)]
mod testing;

pub use self::{
    codec::*,
    comm::{CommConfig, CommHandler, RxState},
    config::*,
    datalogging::{
        Condition, DataLogger, RawEncoder, Trigger, TriggerCallback, entry_size, fetch_operand,
        log_points_after_trigger,
    },
    error::*,
    frame::*,
    guard::{MemoryAccess, MemoryGuard, RawMemory, masked_byte},
    handler::MainHandler,
    ipc::Mailbox,
    loop_handler::{Loop2Main, LoopChannel, LoopHandler, Main2Loop},
    rpv::{RpvReadCallback, RpvTable, RpvWriteCallback},
    timebase::{Timebase, us_to_100ns},
    util::{ADDRESS_SIZE, crc32},
};
