// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Address, VariableType, wire_enum};

/// Maximum number of operands of a trigger condition.
pub const MAX_OPERANDS: usize = 4;
/// Maximum number of items logged per entry.
pub const MAX_SIGNALS: usize = 32;

wire_enum! {
    /// Condition that fires the trigger.
    TriggerConditionId, Condition {
        AlwaysTrue = 0,
        Equal = 1,
        NotEqual = 2,
        LessThan = 3,
        LessOrEqualThan = 4,
        GreaterThan = 5,
        GreaterOrEqualThan = 6,
        ChangeMoreThan = 7,
        IsWithin = 8,
    }
}

impl TriggerConditionId {
    /// Number of operands the condition consumes.
    #[must_use]
    pub const fn operand_count(self) -> usize {
        match self {
            Self::AlwaysTrue => 0,
            Self::IsWithin => 3,
            _ => 2,
        }
    }
}

wire_enum! {
    OperandType, OperandType {
        Literal = 0,
        Var = 1,
        VarBit = 2,
        Rpv = 3,
    }
}

/// A value the trigger condition reads.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Literal(f32),
    Var {
        address: Address,
        var_type: VariableType,
    },
    VarBit {
        address: Address,
        var_type: VariableType,
        bitoffset: u8,
        bitsize: u8,
    },
    Rpv(u16),
}

impl Default for Operand {
    fn default() -> Self {
        Self::Literal(0.0)
    }
}

wire_enum! {
    LoggableType, LoggableType {
        Memory = 0,
        Rpv = 1,
        Time = 2,
    }
}

/// A signal copied into every logged entry.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggableItem {
    Memory {
        address: Address,
        size: u8,
    },
    Rpv(u16),
    #[default]
    Time,
}

/// Trigger part of a [`Configuration`].
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub condition: TriggerConditionId,
    pub operand_count: u8,
    pub operands: [Operand; MAX_OPERANDS],
    pub hold_time_100ns: u32,
}

impl TriggerConfig {
    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        let count = usize::from(self.operand_count).min(MAX_OPERANDS);
        &self.operands[..count]
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            condition: TriggerConditionId::AlwaysTrue,
            operand_count: 0,
            operands: [Operand::default(); MAX_OPERANDS],
            hold_time_100ns: 0,
        }
    }
}

/// A complete acquisition setup as sent by the server.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Configuration {
    pub decimation: u16,
    pub probe_location: u8,
    pub timeout_100ns: u32,
    pub trigger: TriggerConfig,
    pub items_count: u8,
    pub items_to_log: [LoggableItem; MAX_SIGNALS],
}

impl Configuration {
    #[must_use]
    pub fn items(&self) -> &[LoggableItem] {
        let count = usize::from(self.items_count).min(MAX_SIGNALS);
        &self.items_to_log[..count]
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            decimation: 1,
            probe_location: 0,
            timeout_100ns: 0,
            trigger: TriggerConfig::default(),
            items_count: 0,
            items_to_log: [LoggableItem::default(); MAX_SIGNALS],
        }
    }
}

/// State of the datalogger.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DataloggerState {
    #[default]
    Idle = 0,
    Configured = 1,
    Armed = 2,
    Triggered = 3,
    AcquisitionCompleted = 4,
    Error = 5,
}

impl From<DataloggerState> for u8 {
    fn from(state: DataloggerState) -> u8 {
        state as u8
    }
}

/// Encoding of the acquisition buffer.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncodingType {
    #[default]
    Raw = 0,
}

/// Counters reported by a status request.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataloggerStatus {
    pub state: DataloggerState,
    pub bytes_to_acquire_from_trigger_to_completion: u32,
    pub write_counter_since_trigger: u32,
}

/// Description of a completed acquisition.
#[cfg_attr(all(feature = "defmt", target_os = "none"), derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquisitionMetadata {
    pub acquisition_id: u16,
    pub config_id: u16,
    pub number_of_points: u32,
    pub data_size: u32,
    pub points_after_trigger: u32,
}
