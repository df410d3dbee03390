//! Arithmetic pipeline between a stored integer and its displayed value.
//!
//! Operations run in declaration order on read and are undone in reverse
//! order on write. Rounding has no inverse; it only shapes the displayed value.

use serde::{Deserialize, Serialize};

/// Time units understood by `convert`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// 1/60 of a second
    Frames,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Unit {
    /// Length in 1/3000 s ticks, so every unit is an exact integer
    fn ticks(self) -> f64 {
        match self {
            Unit::Frames => 50.0,
            Unit::Milliseconds => 3.0,
            Unit::Seconds => 3_000.0,
            Unit::Minutes => 180_000.0,
            Unit::Hours => 10_800_000.0,
            Unit::Days => 259_200_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rounding {
    Floor,
    Ceil,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    #[serde(alias = "+")]
    Add(f64),
    #[serde(alias = "-")]
    Subtract(f64),
    #[serde(alias = "*")]
    Multiply(f64),
    #[serde(alias = "/")]
    Divide(f64),
    Convert { from: Unit, to: Unit },
    Round(Rounding),
}

impl Operation {
    fn forward(&self, value: f64) -> f64 {
        match *self {
            Operation::Add(n) => value + n,
            Operation::Subtract(n) => value - n,
            Operation::Multiply(n) => value * n,
            Operation::Divide(n) => value / n,
            Operation::Convert { from, to } => value * from.ticks() / to.ticks(),
            Operation::Round(Rounding::Floor) => value.floor(),
            Operation::Round(Rounding::Ceil) => value.ceil(),
            Operation::Round(Rounding::Round) => value.round(),
        }
    }

    fn inverse(&self, value: f64) -> f64 {
        match *self {
            Operation::Add(n) => value - n,
            Operation::Subtract(n) => value + n,
            Operation::Multiply(n) => value / n,
            Operation::Divide(n) => value * n,
            Operation::Convert { from, to } => value * to.ticks() / from.ticks(),
            Operation::Round(_) => value,
        }
    }

    /// Reason the operation cannot be applied, if any
    pub fn check(&self) -> Option<&'static str> {
        match *self {
            Operation::Multiply(n) | Operation::Divide(n) if n == 0.0 => {
                Some("multiply/divide by zero is not invertible")
            }
            Operation::Add(n) | Operation::Subtract(n) | Operation::Multiply(n) | Operation::Divide(n)
                if !n.is_finite() =>
            {
                Some("operand must be finite")
            }
            _ => None,
        }
    }
}

/// Raw stored value to displayed value
pub fn apply(operations: &[Operation], raw: f64) -> f64 {
    operations.iter().fold(raw, |value, op| op.forward(value))
}

/// Displayed value back to the stored value (not yet rounded to an integer)
pub fn invert(operations: &[Operation], display: f64) -> f64 {
    operations
        .iter()
        .rev()
        .fold(display, |value, op| op.inverse(value))
}
