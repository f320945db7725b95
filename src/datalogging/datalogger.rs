// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RawEncoder, Trigger, TriggerCallback, encoder, fetch_operand};
use crate::{
    error::Error,
    frame::{
        AcquisitionMetadata, CompareValue, Configuration, DataloggerState, DataloggerStatus,
        LoggableItem, MAX_OPERANDS, Operand, TypeKind,
    },
    guard::MemoryGuard,
    rpv::RpvTable,
    timebase::Timebase,
};

/// Highest bit reachable by a bitfield operand.
const MAX_BITFIELD_END: usize = 128;

/// Number of entries to log after the trigger so that the trigger lands at
/// `probe_location / 255` of a buffer holding `max_entries`.
#[must_use]
pub const fn log_points_after_trigger(probe_location: u8, max_entries: usize) -> u32 {
    let after = (255 - probe_location as u64) * max_entries as u64;
    ((after + 127) / 255) as u32
}

/// Trigger driven acquisition into a caller provided buffer.
///
/// Sampling starts as soon as a configuration is accepted, so entries
/// preceding the trigger are available. Timing is taken from the timebase
/// passed to [`DataLogger::process`] only, which lets the logger move
/// between execution contexts with distinct clocks.
#[derive(Debug)]
pub struct DataLogger<'a> {
    guard: MemoryGuard<'a>,
    rpvs: RpvTable<'a>,
    encoder: RawEncoder<'a>,
    trigger_callback: Option<TriggerCallback>,
    config: Configuration,
    config_id: u16,
    state: DataloggerState,
    trigger: Trigger,
    decimation_counter: u16,
    arm_timestamp: Option<u32>,
    manual_trigger: bool,
    /// Encoder write counter when the trigger fired.
    trigger_write_counter: Option<u32>,
    log_points_after_trigger: u32,
    acquisition_id: u16,
}

impl<'a> DataLogger<'a> {
    #[must_use]
    pub fn new(guard: MemoryGuard<'a>, rpvs: RpvTable<'a>, buffer: &'a mut [u8]) -> Self {
        Self {
            guard,
            rpvs,
            encoder: RawEncoder::new(buffer),
            trigger_callback: None,
            config: Configuration::default(),
            config_id: 0,
            state: DataloggerState::Idle,
            trigger: Trigger::default(),
            decimation_counter: 0,
            arm_timestamp: None,
            manual_trigger: false,
            trigger_write_counter: None,
            log_points_after_trigger: 0,
            acquisition_id: 0,
        }
    }

    pub fn set_trigger_callback(&mut self, callback: Option<TriggerCallback>) {
        self.trigger_callback = callback;
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.encoder.buffer_size()
    }

    #[must_use]
    pub const fn state(&self) -> DataloggerState {
        self.state
    }

    #[must_use]
    pub const fn config_id(&self) -> u16 {
        self.config_id
    }

    #[must_use]
    pub const fn config(&self) -> &Configuration {
        &self.config
    }

    /// Id of the last completed acquisition.
    #[must_use]
    pub const fn acquisition_id(&self) -> u16 {
        self.acquisition_id
    }

    #[must_use]
    pub fn data_acquired(&self) -> bool {
        self.state == DataloggerState::AcquisitionCompleted
    }

    #[must_use]
    pub const fn encoder(&self) -> &RawEncoder<'a> {
        &self.encoder
    }

    /// Go back to `Idle`, dropping the configuration and the data.
    pub fn reset(&mut self) {
        self.config = Configuration::default();
        self.config_id = 0;
        self.encoder.reset();
        self.trigger = Trigger::default();
        self.decimation_counter = 0;
        self.arm_timestamp = None;
        self.manual_trigger = false;
        self.trigger_write_counter = None;
        self.log_points_after_trigger = 0;
        self.set_state(DataloggerState::Idle);
    }

    /// Replace the configuration and start sampling.
    ///
    /// A rejected configuration leaves the logger in `Error` until the next
    /// one is accepted or it is reset.
    pub fn configure(&mut self, config: &Configuration, config_id: u16) -> Result<(), Error> {
        self.reset();
        let entry_size = match self.validate(config) {
            Ok(size) => size,
            Err(err) => {
                log::warn!("Datalogging configuration {config_id} rejected: {err}");
                self.set_state(DataloggerState::Error);
                return Err(err);
            }
        };
        if let Err(err) = self.encoder.configure(entry_size) {
            log::warn!(
                "Datalogging entry of {entry_size} bytes does not fit a buffer of {} bytes",
                self.encoder.buffer_size()
            );
            self.set_state(DataloggerState::Error);
            return Err(err);
        }

        self.config = *config;
        self.config_id = config_id;
        self.trigger = Trigger::new(config.trigger.condition, config.trigger.hold_time_100ns);
        self.log_points_after_trigger =
            log_points_after_trigger(config.probe_location, self.encoder.max_entries());
        self.set_state(DataloggerState::Configured);
        Ok(())
    }

    /// Check `config` and compute its entry size.
    fn validate(&self, config: &Configuration) -> Result<usize, Error> {
        if config.decimation == 0 {
            return Err(Error::BufferSize);
        }
        let trigger = &config.trigger;
        let operand_count = usize::from(trigger.operand_count);
        if operand_count > MAX_OPERANDS || operand_count != trigger.condition.operand_count() {
            return Err(Error::Condition(trigger.condition.into()));
        }
        for operand in trigger.operands() {
            self.validate_operand(operand)?;
        }
        for item in config.items() {
            if let LoggableItem::Memory { address, size } = *item {
                if size == 0 {
                    return Err(Error::BufferSize);
                }
                self.guard.check_read(address, usize::from(size))?;
            }
        }
        let size = encoder::entry_size(config.items(), &self.rpvs)?;
        if size == 0 {
            return Err(Error::BufferSize);
        }
        Ok(size)
    }

    fn validate_operand(&self, operand: &Operand) -> Result<(), Error> {
        match *operand {
            Operand::Literal(v) => {
                if !v.is_finite() {
                    return Err(Error::OperandType(0));
                }
            }
            Operand::Var { address, var_type } => {
                self.guard.check_read(address, var_type.size())?;
            }
            Operand::VarBit {
                address,
                var_type,
                bitoffset,
                bitsize,
            } => {
                let end = usize::from(bitoffset) + usize::from(bitsize);
                if bitsize == 0
                    || bitsize > 64
                    || end > MAX_BITFIELD_END
                    || var_type.kind() == TypeKind::Float
                {
                    return Err(Error::VariableType(var_type.into()));
                }
                self.guard.check_read(address, ((end - 1) >> 3) + 1)?;
            }
            Operand::Rpv(id) => {
                if !self.rpvs.contains(id) {
                    return Err(Error::UnknownRpv(id));
                }
            }
        }
        Ok(())
    }

    /// Wait for the trigger.
    ///
    /// Arming a completed acquisition starts a new one with the same
    /// configuration. It returns `false` without a valid configuration.
    pub fn arm_trigger(&mut self) -> bool {
        match self.state {
            DataloggerState::Configured | DataloggerState::AcquisitionCompleted => {
                if self.state == DataloggerState::AcquisitionCompleted {
                    self.encoder.reset();
                    self.decimation_counter = 0;
                }
                self.trigger.reset();
                self.trigger_write_counter = None;
                self.arm_timestamp = None;
                self.manual_trigger = false;
                self.set_state(DataloggerState::Armed);
                true
            }
            DataloggerState::Armed | DataloggerState::Triggered => true,
            DataloggerState::Idle | DataloggerState::Error => false,
        }
    }

    /// Stop waiting for the trigger or abort the acquisition in progress.
    pub fn disarm_trigger(&mut self) {
        if matches!(
            self.state,
            DataloggerState::Armed | DataloggerState::Triggered
        ) {
            self.arm_timestamp = None;
            self.manual_trigger = false;
            self.trigger_write_counter = None;
            self.set_state(DataloggerState::Configured);
        }
    }

    /// Fire the trigger on the next [`DataLogger::process`] while armed.
    pub fn force_trigger(&mut self) {
        self.manual_trigger = true;
    }

    /// Sample once. To be called at the rate of the owning loop.
    pub fn process(&mut self, timebase: &Timebase) {
        if self.state == DataloggerState::Armed {
            if self.arm_timestamp.is_none() {
                self.arm_timestamp = Some(timebase.timestamp());
            }
            if self.check_trigger(timebase) {
                self.trigger_write_counter = Some(self.encoder.write_counter());
                self.set_state(DataloggerState::Triggered);
                if let Some(callback) = self.trigger_callback {
                    callback();
                }
            }
        }

        if matches!(
            self.state,
            DataloggerState::Configured | DataloggerState::Armed | DataloggerState::Triggered
        ) {
            if self.decimation_counter == 0 {
                self.encoder.encode(
                    self.config.items(),
                    &self.guard,
                    &self.rpvs,
                    timebase.timestamp(),
                );
            }
            self.decimation_counter += 1;
            if self.decimation_counter >= self.config.decimation {
                self.decimation_counter = 0;
            }
        }

        let timed_out = matches!(
            self.state,
            DataloggerState::Armed | DataloggerState::Triggered
        ) && self.config.timeout_100ns != 0
            && self
                .arm_timestamp
                .is_some_and(|ts| timebase.has_expired(ts, self.config.timeout_100ns));
        let enough_points = self.state == DataloggerState::Triggered
            && self.write_counter_since_trigger() >= self.log_points_after_trigger;
        if timed_out || enough_points {
            if timed_out && !enough_points {
                log::info!("Datalogging timeout");
            }
            self.acquisition_id = self.acquisition_id.wrapping_add(1);
            self.encoder.reset_reader();
            self.set_state(DataloggerState::AcquisitionCompleted);
        }
    }

    fn check_trigger(&mut self, timebase: &Timebase) -> bool {
        if self.manual_trigger {
            self.manual_trigger = false;
            return true;
        }
        let mut values = [CompareValue::Float(0.0); MAX_OPERANDS];
        let operands = self.config.trigger.operands();
        for (value, operand) in values.iter_mut().zip(operands) {
            *value = fetch_operand(operand, &self.guard, &self.rpvs);
        }
        self.trigger.check(&values[..operands.len()], timebase)
    }

    fn write_counter_since_trigger(&self) -> u32 {
        self.trigger_write_counter
            .map_or(0, |c| self.encoder.write_counter().wrapping_sub(c))
    }

    #[must_use]
    pub fn status(&self) -> DataloggerStatus {
        let entry_size = self.encoder.entry_size() as u32;
        DataloggerStatus {
            state: self.state,
            bytes_to_acquire_from_trigger_to_completion: self
                .log_points_after_trigger
                .saturating_mul(entry_size),
            write_counter_since_trigger: self.write_counter_since_trigger(),
        }
    }

    /// Description of the completed acquisition.
    #[must_use]
    pub fn metadata(&self) -> Option<AcquisitionMetadata> {
        if !self.data_acquired() {
            return None;
        }
        let number_of_points = self.encoder.entry_count() as u32;
        Some(AcquisitionMetadata {
            acquisition_id: self.acquisition_id,
            config_id: self.config_id,
            number_of_points,
            data_size: self.encoder.data_size() as u32,
            points_after_trigger: self.write_counter_since_trigger().min(number_of_points),
        })
    }

    /// Copy the next bytes of the completed acquisition into `out`.
    pub fn read_acquisition(&mut self, out: &mut [u8]) -> usize {
        if !self.data_acquired() {
            return 0;
        }
        self.encoder.read(out)
    }

    #[must_use]
    pub const fn read_finished(&self) -> bool {
        self.encoder.read_finished()
    }

    #[must_use]
    pub const fn read_crc(&self) -> u32 {
        self.encoder.read_crc()
    }

    /// Stream the acquisition again from its first entry.
    pub fn reset_reader(&mut self) {
        self.encoder.reset_reader();
    }

    fn set_state(&mut self, state: DataloggerState) {
        if self.state != state {
            log::debug!("Datalogger state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
