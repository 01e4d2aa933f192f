//! Retry delay calculation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shape of the delay curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `base * 2^(attempt-1)`
    Exponential,
    /// `base * (1 + 0.5 * (attempt-1))`
    Linear,
    /// `base` for every attempt
    Fixed,
}

impl std::str::FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential" => Ok(Self::Exponential),
            "linear" => Ok(Self::Linear),
            "fixed" => Ok(Self::Fixed),
            _ => Err(format!("Unknown backoff kind: {s}")),
        }
    }
}

/// Delay before retry number `attempt` (1-based).
///
/// An attempt of 0 is treated as 1 so callers cannot underflow the exponent.
pub fn calculate_backoff(kind: BackoffKind, base: Duration, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    match kind {
        BackoffKind::Exponential => {
            let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
            base.checked_mul(factor).unwrap_or(Duration::MAX)
        }
        BackoffKind::Linear => base.mul_f64(1.0 + 0.5 * f64::from(attempt - 1)),
        BackoffKind::Fixed => base,
    }
}
