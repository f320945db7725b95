// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use core::cmp::Ordering;

use crate::{
    frame::{CompareValue, TriggerConditionId},
    timebase::Timebase,
};

fn abs(v: f32) -> f32 {
    if v < 0.0 { -v } else { v }
}

fn as_f64(v: CompareValue) -> f64 {
    match v {
        CompareValue::Float(v) => f64::from(v),
        CompareValue::Sint(v) => v as f64,
        CompareValue::Uint(v) => v as f64,
    }
}

/// Order two values across the float, signed and unsigned domains.
///
/// A float on either side compares as `f32`; mixed integers compare
/// exactly. `None` means a NaN is involved.
#[must_use]
pub fn compare(a: CompareValue, b: CompareValue) -> Option<Ordering> {
    use CompareValue::*;

    match (a, b) {
        (Sint(a), Sint(b)) => Some(a.cmp(&b)),
        (Uint(a), Uint(b)) => Some(a.cmp(&b)),
        (Sint(a), Uint(b)) => Some(match u64::try_from(a) {
            Ok(a) => a.cmp(&b),
            Err(_) => Ordering::Less,
        }),
        (Uint(a), Sint(b)) => Some(match u64::try_from(b) {
            Ok(b) => a.cmp(&b),
            Err(_) => Ordering::Greater,
        }),
        (a, b) => a.as_f32().partial_cmp(&b.as_f32()),
    }
}

/// Signed difference `current - previous` in the domain of `current`.
fn delta(current: CompareValue, previous: CompareValue) -> f64 {
    use CompareValue::*;

    match (current, previous) {
        (Sint(c), Sint(p)) => (i128::from(c) - i128::from(p)) as f64,
        (Uint(c), Uint(p)) => (i128::from(c) - i128::from(p)) as f64,
        (c, p) => as_f64(c) - as_f64(p),
    }
}

/// A trigger condition with its evaluation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Condition {
    AlwaysTrue,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqualThan,
    GreaterThan,
    GreaterOrEqualThan,
    /// Fires on a change larger than the threshold, in its direction.
    ChangeMoreThan { previous: Option<CompareValue> },
    IsWithin,
}

impl From<TriggerConditionId> for Condition {
    fn from(id: TriggerConditionId) -> Self {
        use TriggerConditionId as Id;

        match id {
            Id::AlwaysTrue => Self::AlwaysTrue,
            Id::Equal => Self::Equal,
            Id::NotEqual => Self::NotEqual,
            Id::LessThan => Self::LessThan,
            Id::LessOrEqualThan => Self::LessOrEqualThan,
            Id::GreaterThan => Self::GreaterThan,
            Id::GreaterOrEqualThan => Self::GreaterOrEqualThan,
            Id::ChangeMoreThan => Self::ChangeMoreThan { previous: None },
            Id::IsWithin => Self::IsWithin,
        }
    }
}

impl Condition {
    /// Evaluate the condition on `operands`.
    ///
    /// Missing operands make every condition but `AlwaysTrue` false.
    pub fn evaluate(&mut self, operands: &[CompareValue]) -> bool {
        match (self, operands) {
            (Self::AlwaysTrue, _) => true,
            (Self::Equal, [a, b, ..]) => compare(*a, *b) == Some(Ordering::Equal),
            (Self::NotEqual, [a, b, ..]) => compare(*a, *b) != Some(Ordering::Equal),
            (Self::LessThan, [a, b, ..]) => compare(*a, *b) == Some(Ordering::Less),
            (Self::LessOrEqualThan, [a, b, ..]) => {
                matches!(compare(*a, *b), Some(Ordering::Less | Ordering::Equal))
            }
            (Self::GreaterThan, [a, b, ..]) => compare(*a, *b) == Some(Ordering::Greater),
            (Self::GreaterOrEqualThan, [a, b, ..]) => {
                matches!(compare(*a, *b), Some(Ordering::Greater | Ordering::Equal))
            }
            (Self::ChangeMoreThan { previous }, [value, threshold, ..]) => {
                let Some(prev) = previous.replace(*value) else {
                    return false;
                };
                let threshold = as_f64(*threshold);
                let delta = delta(*value, prev);
                if threshold > 0.0 {
                    delta > threshold
                } else if threshold < 0.0 {
                    delta < threshold
                } else {
                    false
                }
            }
            (Self::IsWithin, [a, b, margin, ..]) => {
                abs(a.as_f32() - b.as_f32()) < abs(margin.as_f32())
            }
            _ => false,
        }
    }

    /// Forget any state collected by previous evaluations.
    pub fn reset(&mut self) {
        if let Self::ChangeMoreThan { previous } = self {
            *previous = None;
        }
    }
}

/// A condition that must hold continuously for a hold time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    condition: Condition,
    hold_time_100ns: u32,
    true_since: Option<u32>,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(TriggerConditionId::AlwaysTrue, 0)
    }
}

impl Trigger {
    #[must_use]
    pub fn new(condition: TriggerConditionId, hold_time_100ns: u32) -> Self {
        Self {
            condition: condition.into(),
            hold_time_100ns,
            true_since: None,
        }
    }

    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Evaluate the condition now and tell whether it held long enough.
    pub fn check(&mut self, operands: &[CompareValue], timebase: &Timebase) -> bool {
        if !self.condition.evaluate(operands) {
            self.true_since = None;
            return false;
        }
        let since = *self.true_since.get_or_insert(timebase.timestamp());
        timebase.has_expired(since, self.hold_time_100ns)
    }

    pub fn reset(&mut self) {
        self.condition.reset();
        self.true_since = None;
    }
}
