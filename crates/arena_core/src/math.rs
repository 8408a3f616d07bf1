//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation math uses fixed-point arithmetic so that the same
//! sequence of tick deltas produces bit-identical state on any CPU.

use std::time::Duration;

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Continuous position on the arena grid, in cells.
///
/// `row` grows from the Red king (row 0) toward the Blue king (row 33).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Row coordinate.
    #[serde(with = "fixed_serde")]
    pub row: Fixed,
    /// Column coordinate.
    #[serde(with = "fixed_serde")]
    pub col: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for optional fixed-point numbers, as raw bits.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as `Option<i64>` raw bits.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Fixed::to_bits).serialize(serializer)
    }

    /// Deserialize from `Option<i64>` raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<i64>::deserialize(deserializer)?.map(Fixed::from_bits))
    }
}

/// Serde support for human-edited config values.
///
/// Config files carry decimals like `2.6`; they are converted once at load.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as a decimal number.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize from a decimal number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("{value} out of fixed-point range")))
    }
}

impl GridPos {
    /// Create a new grid position.
    #[must_use]
    pub const fn new(row: Fixed, col: Fixed) -> Self {
        Self { row, col }
    }

    /// Position at the integer cell `(row, col)`.
    #[must_use]
    pub fn cell(row: i32, col: i32) -> Self {
        Self {
            row: Fixed::from_num(row),
            col: Fixed::from_num(col),
        }
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dr = self.row - other.row;
        let dc = self.col - other.col;
        dr * dr + dc * dc
    }

    /// Euclidean distance in cells.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Integer cell containing this position (floor of both axes).
    #[must_use]
    pub fn floor_cell(self) -> (i32, i32) {
        (self.row.floor().to_num(), self.col.floor().to_num())
    }

    /// Move toward `target` by at most `step` cells.
    ///
    /// Returns `target` itself when it is closer than `step`.
    #[must_use]
    pub fn step_toward(self, target: Self, step: Fixed) -> Self {
        let distance = self.distance(target);
        if distance <= step || distance == Fixed::ZERO {
            return target;
        }
        let scale = step / distance;
        Self {
            row: self.row + (target.row - self.row) * scale,
            col: self.col + (target.col - self.col) * scale,
        }
    }

    /// Offset by the given deltas.
    #[must_use]
    pub fn offset(self, d_row: Fixed, d_col: Fixed) -> Self {
        Self {
            row: self.row + d_row,
            col: self.col + d_col,
        }
    }

    /// Clamp into `[0, rows - 1] x [0, cols - 1]`.
    #[must_use]
    pub fn clamped(self, rows: u32, cols: u32) -> Self {
        let max_row = Fixed::from_num(rows.saturating_sub(1));
        let max_col = Fixed::from_num(cols.saturating_sub(1));
        Self {
            row: self.row.clamp(Fixed::ZERO, max_row),
            col: self.col.clamp(Fixed::ZERO, max_col),
        }
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::from_num(1) {
        value
    } else {
        Fixed::from_num(1)
    };

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    // Perfect squares whose root is the initial upper bound never move it.
    if high.saturating_mul(high) <= value {
        high
    } else {
        low
    }
}

/// Convert a tick delta into fixed-point seconds.
///
/// Quantized to whole microseconds so the conversion is exact and
/// platform independent.
#[must_use]
pub fn seconds(delta: Duration) -> Fixed {
    let micros = i64::try_from(delta.as_micros()).unwrap_or(i64::MAX);
    Fixed::saturating_from_num(micros) / Fixed::from_num(1_000_000)
}

/// Reciprocal of a rate, e.g. attacks/second to seconds/attack.
///
/// A non-positive rate yields `Fixed::MAX` (never ready).
#[must_use]
pub fn interval_of(rate: Fixed) -> Fixed {
    if rate <= Fixed::ZERO {
        Fixed::MAX
    } else {
        Fixed::from_num(1) / rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_squared() {
        let a = GridPos::cell(3, 0);
        let b = GridPos::cell(0, 4);
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
    }

    #[test]
    fn test_distance_is_close_to_exact() {
        let a = GridPos::cell(0, 0);
        let b = GridPos::cell(3, 4);
        let diff = (a.distance(b) - Fixed::from_num(5)).abs();
        assert!(diff < Fixed::from_num(1) / Fixed::from_num(10_000));
    }

    #[test]
    fn test_sqrt_of_perfect_squares_is_exact() {
        assert_eq!(fixed_sqrt(Fixed::from_num(1)), Fixed::from_num(1));
        assert_eq!(fixed_sqrt(Fixed::from_num(16)), Fixed::from_num(4));
        assert_eq!(fixed_sqrt(Fixed::ZERO), Fixed::ZERO);
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_step_toward_never_overshoots() {
        let start = GridPos::cell(0, 0);
        let target = GridPos::cell(0, 1);
        assert_eq!(start.step_toward(target, Fixed::from_num(5)), target);

        let half = start.step_toward(target, Fixed::from_num(0.5));
        assert_eq!(half.row, Fixed::ZERO);
        assert!(half.col > Fixed::from_num(0.49) && half.col < Fixed::from_num(0.51));
    }

    #[test]
    fn test_clamped_stays_on_grid() {
        let outside = GridPos::new(Fixed::from_num(-0.5), Fixed::from_num(40));
        let clamped = outside.clamped(34, 18);
        assert_eq!(clamped, GridPos::cell(0, 17));
    }

    #[test]
    fn test_seconds_from_duration() {
        assert_eq!(seconds(Duration::from_millis(250)), Fixed::from_num(0.25));
        assert_eq!(seconds(Duration::from_secs(2)), Fixed::from_num(2));
    }

    #[test]
    fn test_interval_of_rate() {
        assert_eq!(interval_of(Fixed::from_num(2)), Fixed::from_num(0.5));
        assert_eq!(interval_of(Fixed::ZERO), Fixed::MAX);
    }
}
