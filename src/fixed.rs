//! Signed fixed-point arithmetic and trigonometry.
//!
//! Animation math for cores without an FPU: a 24.8 fixed-point number type
//! with wraparound arithmetic, a table-driven sine/cosine, and an
//! overflow-tiered Newton-Raphson square root. All operations stay within
//! native 32-bit arithmetic.

use core::ops::{Add, Mul, Neg, Sub};

/// Fractional bits carried by [`Fixed`].
pub const FRAC_BITS: u32 = 8;

/// The raw representation of 1.0.
pub const FIXED_ONE: i32 = 1 << FRAC_BITS;

/// Quarter turn in angle units. A full rotation is four quarter turns
/// (1024 units), so one unit is about a third of a degree.
pub const QUARTER_TURN: i32 = FIXED_ONE;

const FRACTION_MASK: i32 = FIXED_ONE - 1;

/// Sine over the first quadrant, sampled every sixteenth of a quarter turn.
///
/// Values precomputed offline from the odd polynomial
/// `sin x = x - 0.166592452584 x^3 + 0.00809167377688 x^5` and scaled by 256.
const SIN_LUT: [i32; 17] = [
    0, 25, 49, 74, 97, 120, 142, 162, 181, 197, 212, 225, 236, 245, 251, 255, 256,
];

/// Angle units per table bin.
const LUT_BIN: i32 = FIXED_ONE / (SIN_LUT.len() as i32 - 1);

/// Signed fixed-point number with [`FRAC_BITS`] fractional bits.
///
/// Raw value 256 represents 1.0. Addition, subtraction and multiplication
/// wrap on overflow; staying in range is the caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i32);

/// Angle measured in fixed-point units, [`QUARTER_TURN`] units per quarter turn.
pub type Angle = Fixed;

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(FIXED_ONE);

    /// Wrap a raw 24.8 representation.
    #[inline]
    pub const fn from_raw(raw: i32) -> Fixed {
        Fixed(raw)
    }

    /// The raw 24.8 representation.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[inline]
    pub const fn from_int(value: i32) -> Fixed {
        Fixed(value << FRAC_BITS)
    }

    /// Integer part, rounded toward negative infinity.
    #[inline]
    pub const fn to_int(self) -> i32 {
        self.0 >> FRAC_BITS
    }

    /// Sine of an angle.
    ///
    /// The sign is split off first, the magnitude is reduced into the first
    /// quadrant (mirroring the fractional part in odd quadrants), and the
    /// result is linearly interpolated between two adjacent [`SIN_LUT`]
    /// entries. Quadrants 2 and 3 negate the value before the original sign
    /// is reapplied, so `sin(-x) == -sin(x)` holds exactly.
    pub fn sin(self) -> Fixed {
        let mut sign = if self.0 < 0 { -1 } else { 1 };
        let x = self.0.unsigned_abs();

        let quadrant = x >> FRAC_BITS;
        let mut frac = (x as i32) & FRACTION_MASK;
        if quadrant % 2 == 1 {
            frac = FIXED_ONE - frac;
        }

        let bin = (frac / LUT_BIN) as usize;
        let offset = frac % LUT_BIN;
        // A mirrored fraction can land exactly on the last table entry.
        let value = if offset == 0 {
            SIN_LUT[bin]
        } else {
            (offset * SIN_LUT[bin + 1] + (LUT_BIN - offset) * SIN_LUT[bin]) / LUT_BIN
        };

        if quadrant % 4 >= 2 {
            sign = -sign;
        }
        Fixed(value * sign)
    }

    /// Cosine of an angle, as the quarter-turn phase shift of [`Fixed::sin`].
    #[inline]
    pub fn cos(self) -> Fixed {
        Fixed(QUARTER_TURN.wrapping_sub(self.0)).sin()
    }

    /// Square root in the same 24.8 scale.
    ///
    /// A negative input yields the root of its magnitude; zero returns zero
    /// without touching the solver. The root of `m` is found by
    /// Newton-Raphson on `y = (y + (m << 8) / y) / 2`; because the scaled
    /// radicand can exceed 32 bits, one of four variants is picked by the
    /// magnitude's high bits, each splitting the `<< 8` around the division
    /// to trade a little precision for overflow headroom. The largest inputs
    /// drop their low byte, solve at full precision and rescale the root.
    pub fn sqrt(self) -> Fixed {
        let m = self.0.unsigned_abs();
        if m == 0 {
            return Fixed::ZERO;
        }
        let root = if m < 1 << 23 {
            // Full precision: converges within one fixed-point unit.
            newton_root(m, 8, 0, 6)
        } else if m < 1 << 27 {
            newton_root(m, 4, 4, 6)
        } else if m < 1 << 29 {
            newton_root(m, 2, 6, 6)
        } else {
            newton_root(m >> 8, 8, 0, 5) << 4
        };
        Fixed(root as i32)
    }
}

/// Newton-Raphson iterations for `sqrt(m << 8)`, with the radicand scale
/// split into a pre-division and post-division shift.
fn newton_root(m: u32, pre: u32, post: u32, iterations: u32) -> u32 {
    let mut y = initial_guess(m);
    let mut i = 0;
    while i < iterations {
        y = (y + (((m << pre) / y) << post)) / 2;
        i += 1;
    }
    y
}

/// Coarse `2^((log2 m + 8) / 2)` starting point for the solver.
///
/// The highest set bit is located byte by byte from the top, then within the
/// top byte. The guess overshoots the root by at most 2x, which the fixed
/// iteration count brings down below the per-variant precision floor.
fn initial_guess(m: u32) -> u32 {
    let mut byte = 3u32;
    while byte > 0 && (m >> (byte * 8)) & 0xFF == 0 {
        byte -= 1;
    }
    let mut top = (m >> (byte * 8)) & 0xFF;
    let mut bit = byte * 8;
    while top > 1 {
        top >>= 1;
        bit += 1;
    }
    1 << ((bit + FRAC_BITS) / 2 + 1)
}

impl Add for Fixed {
    type Output = Fixed;

    #[inline]
    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    #[inline]
    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for Fixed {
    type Output = Fixed;

    #[inline]
    fn neg(self) -> Fixed {
        Fixed(self.0.wrapping_neg())
    }
}

impl Mul for Fixed {
    type Output = Fixed;

    /// Fixed-point product without widening beyond 32 bits.
    ///
    /// Both operands split at the binary point; the four cross products sum
    /// to the result already in 24.8 scale:
    /// `((h1*h2) << 8) + h1*l2 + h2*l1 + ((l1*l2) >> 8)`.
    fn mul(self, rhs: Fixed) -> Fixed {
        let h1 = self.0 >> FRAC_BITS;
        let l1 = self.0 & FRACTION_MASK;
        let h2 = rhs.0 >> FRAC_BITS;
        let l2 = rhs.0 & FRACTION_MASK;

        let high = h1.wrapping_mul(h2) << FRAC_BITS;
        let cross = h1.wrapping_mul(l2).wrapping_add(h2.wrapping_mul(l1));
        let low = (l1 * l2) >> FRAC_BITS;

        Fixed(high.wrapping_add(cross).wrapping_add(low))
    }
}
