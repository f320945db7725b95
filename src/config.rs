// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build time limits and the runtime configuration of the agent.

use crate::{
    datalogging::DataLogger,
    frame::{
        AddressRange, DEFAULT_SOFTWARE_ID, ResponseCode, RuntimePublishedValue,
        SOFTWARE_ID_LENGTH,
    },
    guard::{MemoryAccess, MemoryGuard},
    loop_handler::LoopChannel,
    rpv::{RpvReadCallback, RpvTable, RpvWriteCallback},
};

pub use crate::{
    codec::MAX_DISPLAY_NAME_SIZE,
    frame::{MAX_OPERANDS, MAX_SIGNALS},
};

/// Maximum number of loops.
pub const MAX_LOOP: usize = 16;
/// A request not completed within this delay is discarded.
pub const COMM_RX_TIMEOUT_US: u32 = 50_000;
/// The session is dropped without a heartbeat within this delay.
pub const COMM_HEARTBEAT_TIMEOUT_US: u32 = 5_000_000;
pub const MINIMUM_RX_BUFFER_SIZE: usize = 32;
pub const MINIMUM_TX_BUFFER_SIZE: usize = 32;

/// Application handler of `UserCommand` requests.
///
/// It receives the subfunction and the request payload, writes its answer
/// into the response buffer and returns its length.
pub type UserCommandCallback = fn(u8, &[u8], &mut [u8]) -> Result<usize, ResponseCode>;

/// Everything the agent borrows from the application.
pub struct Config<'a> {
    pub(crate) memory: &'a dyn MemoryAccess,
    pub(crate) rx_buffer: Option<&'a mut [u8]>,
    pub(crate) tx_buffer: Option<&'a mut [u8]>,
    pub(crate) forbidden_ranges: &'a [AddressRange],
    pub(crate) readonly_ranges: &'a [AddressRange],
    pub(crate) published_values: &'a [RuntimePublishedValue],
    pub(crate) rpv_read: Option<RpvReadCallback>,
    pub(crate) rpv_write: Option<RpvWriteCallback>,
    pub(crate) user_command: Option<UserCommandCallback>,
    pub(crate) display_name: &'a str,
    pub(crate) software_id: &'a [u8; SOFTWARE_ID_LENGTH],
    pub(crate) max_bitrate: u32,
    pub(crate) session_counter_seed: u32,
    pub(crate) loops: &'a [LoopChannel<'a>],
    pub(crate) datalogger: Option<&'a mut DataLogger<'a>>,
    pub(crate) memory_write_enable: bool,
}

impl core::fmt::Debug for Config<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("forbidden_ranges", &self.forbidden_ranges)
            .field("readonly_ranges", &self.readonly_ranges)
            .field("published_values", &self.published_values)
            .field("display_name", &self.display_name)
            .field("max_bitrate", &self.max_bitrate)
            .field("loops", &self.loops.len())
            .field("datalogging", &self.datalogger.is_some())
            .field("memory_write_enable", &self.memory_write_enable)
            .finish_non_exhaustive()
    }
}

impl<'a> Config<'a> {
    /// An empty configuration accessing the target through `memory`.
    #[must_use]
    pub fn new(memory: &'a dyn MemoryAccess) -> Self {
        Self {
            memory,
            rx_buffer: None,
            tx_buffer: None,
            forbidden_ranges: &[],
            readonly_ranges: &[],
            published_values: &[],
            rpv_read: None,
            rpv_write: None,
            user_command: None,
            display_name: "",
            software_id: &DEFAULT_SOFTWARE_ID,
            max_bitrate: 0,
            session_counter_seed: 0,
            loops: &[],
            datalogger: None,
            memory_write_enable: true,
        }
    }

    #[must_use]
    pub fn set_buffers(mut self, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        self.rx_buffer = Some(rx_buffer);
        self.tx_buffer = Some(tx_buffer);
        self
    }

    #[must_use]
    pub fn set_forbidden_address_range(mut self, ranges: &'a [AddressRange]) -> Self {
        self.forbidden_ranges = ranges;
        self
    }

    #[must_use]
    pub fn set_readonly_address_range(mut self, ranges: &'a [AddressRange]) -> Self {
        self.readonly_ranges = ranges;
        self
    }

    #[must_use]
    pub fn set_published_values(
        mut self,
        values: &'a [RuntimePublishedValue],
        read: Option<RpvReadCallback>,
        write: Option<RpvWriteCallback>,
    ) -> Self {
        self.published_values = values;
        self.rpv_read = read;
        self.rpv_write = write;
        self
    }

    #[must_use]
    pub fn set_user_command_callback(mut self, callback: UserCommandCallback) -> Self {
        self.user_command = Some(callback);
        self
    }

    /// Name sent on discovery, truncated to [`MAX_DISPLAY_NAME_SIZE`] bytes.
    #[must_use]
    pub fn set_display_name(mut self, name: &'a str) -> Self {
        self.display_name = name;
        self
    }

    #[must_use]
    pub fn set_software_id(mut self, software_id: &'a [u8; SOFTWARE_ID_LENGTH]) -> Self {
        self.software_id = software_id;
        self
    }

    /// Bitrate advertised to the server; 0 means unlimited.
    #[must_use]
    pub fn set_max_bitrate(mut self, max_bitrate: u32) -> Self {
        self.max_bitrate = max_bitrate;
        self
    }

    /// First session id, ideally different on every boot.
    #[must_use]
    pub fn set_session_counter_seed(mut self, seed: u32) -> Self {
        self.session_counter_seed = seed;
        self
    }

    #[must_use]
    pub fn set_loops(mut self, loops: &'a [LoopChannel<'a>]) -> Self {
        self.loops = loops;
        self
    }

    /// Enable datalogging with `datalogger`, which must not be configured
    /// by anyone else.
    #[must_use]
    pub fn set_datalogging(mut self, datalogger: &'a mut DataLogger<'a>) -> Self {
        self.datalogger = Some(datalogger);
        self
    }

    #[must_use]
    pub fn set_memory_write_enable(mut self, enable: bool) -> Self {
        self.memory_write_enable = enable;
        self
    }

    /// The guard applying the configured memory regions.
    ///
    /// A datalogger should be built on this guard.
    #[must_use]
    pub fn memory_guard(&self) -> MemoryGuard<'a> {
        MemoryGuard::new(self.memory, self.forbidden_ranges, self.readonly_ranges)
    }

    #[must_use]
    pub fn rpv_table(&self) -> RpvTable<'a> {
        RpvTable::new(self.published_values, self.rpv_read, self.rpv_write)
    }
}
