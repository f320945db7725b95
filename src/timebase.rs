// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monotonic time advanced explicitly by the application.

/// A steppable clock counting in units of 100 ns.
///
/// The counter wraps around; elapsed time is computed with wrapping
/// arithmetic so a timeout shorter than the wrap period stays correct.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timebase {
    time_100ns: u32,
}

impl Timebase {
    #[must_use]
    pub const fn new() -> Self {
        Self { time_100ns: 0 }
    }

    /// Advance the clock by `timestep_100ns`.
    pub fn step(&mut self, timestep_100ns: u32) {
        self.time_100ns = self.time_100ns.wrapping_add(timestep_100ns);
    }

    pub fn reset(&mut self) {
        self.time_100ns = 0;
    }

    #[must_use]
    pub const fn timestamp(&self) -> u32 {
        self.time_100ns
    }

    /// Whether at least `timeout_100ns` elapsed since `timestamp`.
    #[must_use]
    pub const fn has_expired(&self, timestamp: u32, timeout_100ns: u32) -> bool {
        self.time_100ns.wrapping_sub(timestamp) >= timeout_100ns
    }
}

/// Convert microseconds to timebase units.
#[must_use]
pub const fn us_to_100ns(us: u32) -> u32 {
    us.saturating_mul(10)
}
