//! Fixed-point math utilities for deterministic decision making.
//!
//! Raw engine data arrives as `f32`. It is converted to fixed-point exactly
//! once, when a [`WorldSnapshot`](crate::snapshot::WorldSnapshot) is built, so
//! every distance comparison, ratio and spatial query downstream produces the
//! same answer on every machine.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all decision math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Convert a raw engine float into [`Fixed`].
///
/// Returns `None` for NaN, infinities and values outside the fixed range.
#[must_use]
pub fn fixed_from_f32(value: f32) -> Option<Fixed> {
    if !value.is_finite() {
        return None;
    }
    Fixed::checked_from_num(value)
}

/// Planar (map-surface) vector.
///
/// `x` is world x and `y` is world z; elevation is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// World x.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// World z.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
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

impl Vec2Fixed {
    /// Create a new planar vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Normalize vector using fixed-point math.
    ///
    /// Components are first divided by the larger magnitude so the length
    /// is taken over values in `[-1, 1]` and cannot saturate. The zero
    /// vector normalizes to zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let largest = self.x.saturating_abs().max(self.y.saturating_abs());
        if largest == Fixed::ZERO {
            return Self::ZERO;
        }
        let unit = Self::new(self.x / largest, self.y / largest);
        let len = unit.length();
        Self::new(unit.x / len, unit.y / len)
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(
            self.x.saturating_mul(factor),
            self.y.saturating_mul(factor),
        )
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

/// World-space position or velocity. `y` is elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// World x.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Elevation.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// World z.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

impl Vec3Fixed {
    /// Create a new world vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Build from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y), Fixed::from_num(z))
    }

    /// Convert raw engine floats, rejecting non-finite components.
    #[must_use]
    pub fn from_f32(x: f32, y: f32, z: f32) -> Option<Self> {
        Some(Self::new(
            fixed_from_f32(x)?,
            fixed_from_f32(y)?,
            fixed_from_f32(z)?,
        ))
    }

    /// Project onto the map surface.
    #[must_use]
    pub const fn planar(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.z)
    }

    /// Exact squared Euclidean distance in world space.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> DistanceSq {
        DistanceSq::ZERO
            .plus_axis(self.x, other.x)
            .plus_axis(self.y, other.y)
            .plus_axis(self.z, other.z)
    }

    /// Convert to raw floats for the execution boundary.
    #[must_use]
    pub fn to_f32(self) -> [f32; 3] {
        [self.x.to_num(), self.y.to_num(), self.z.to_num()]
    }
}

/// Exact squared distance, in units of `Fixed::DELTA²`.
///
/// Axis differences are taken over the raw bits in 128-bit integers, so
/// their squares never overflow. A three-axis sum can exceed `u128`; the
/// carry is kept as the most significant field, which keeps the derived
/// ordering exact for any pair of [`Fixed`] positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DistanceSq {
    carry: u8,
    low: u128,
}

impl DistanceSq {
    /// Zero distance.
    pub const ZERO: Self = Self { carry: 0, low: 0 };

    /// Square of a length. A negative length squares its magnitude.
    #[must_use]
    pub fn of_length(length: Fixed) -> Self {
        Self::ZERO.plus_axis(length, Fixed::ZERO)
    }

    fn plus_axis(self, a: Fixed, b: Fixed) -> Self {
        let diff = (i128::from(a.to_bits()) - i128::from(b.to_bits())).unsigned_abs();
        // |diff| < 2^64, so the square fits.
        let (low, overflow) = self.low.overflowing_add(diff * diff);
        Self {
            carry: self.carry + u8::from(overflow),
            low,
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

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}
