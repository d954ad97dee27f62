/// Bit width of a fixed-point value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedWidth {
    W8,
    W16,
    W32,
}

impl FixedWidth {
    pub const fn bits(self) -> u32 {
        match self {
            FixedWidth::W8 => 8,
            FixedWidth::W16 => 16,
            FixedWidth::W32 => 32,
        }
    }

    pub const fn min(self) -> i64 {
        match self {
            FixedWidth::W8 => i8::MIN as i64,
            FixedWidth::W16 => i16::MIN as i64,
            FixedWidth::W32 => i32::MIN as i64,
        }
    }

    pub const fn max(self) -> i64 {
        match self {
            FixedWidth::W8 => i8::MAX as i64,
            FixedWidth::W16 => i16::MAX as i64,
            FixedWidth::W32 => i32::MAX as i64,
        }
    }

    /// Width of the long accumulator used by multiply-accumulate-long.
    pub const fn widen(self) -> FixedWidth {
        match self {
            FixedWidth::W8 => FixedWidth::W16,
            FixedWidth::W16 | FixedWidth::W32 => FixedWidth::W32,
        }
    }

    #[inline(always)]
    fn saturate(self, value: i64) -> i32 {
        value.clamp(self.min(), self.max()) as i32
    }

    #[inline(always)]
    fn wrap(self, value: i64) -> i32 {
        match self {
            FixedWidth::W8 => value as i8 as i32,
            FixedWidth::W16 => value as i16 as i32,
            FixedWidth::W32 => value as i32,
        }
    }
}

/// Shift a full-precision product back to `frac_bits`, rounding to nearest.
#[inline(always)]
fn round_shift(product: i64, frac_bits: u8) -> i64 {
    if frac_bits == 0 {
        product
    } else {
        (product + (1i64 << (frac_bits - 1))) >> frac_bits
    }
}

/// A fixed-point value: raw integer, bit width and fractional position.
///
/// Every operation computes in `i64` and saturates back to the declared
/// width. Nothing wraps unless [`Fixed::wrapping_add`] is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixed {
    raw: i32,
    width: FixedWidth,
    frac_bits: u8,
}

impl Fixed {
    /// Build a value from a wide raw integer, saturating it to `width`.
    #[inline(always)]
    pub fn saturating_from_raw(raw: i64, width: FixedWidth, frac_bits: u8) -> Self {
        Self {
            raw: width.saturate(raw),
            width,
            frac_bits,
        }
    }

    /// Build a value from a raw integer already representable in `width`.
    #[inline(always)]
    pub fn from_raw(raw: i32, width: FixedWidth, frac_bits: u8) -> Self {
        debug_assert!((raw as i64) >= width.min() && (raw as i64) <= width.max());
        Self {
            raw,
            width,
            frac_bits,
        }
    }

    /// Convert from `f32`, rounding half away from zero and saturating.
    ///
    /// NaN converts to zero.
    pub fn from_f32(value: f32, width: FixedWidth, frac_bits: u8) -> Self {
        let scaled = (value as f64 * (1u64 << frac_bits) as f64).round();
        let raw = if scaled.is_nan() {
            0
        } else {
            scaled.clamp(width.min() as f64, width.max() as f64) as i64
        };
        Self::saturating_from_raw(raw, width, frac_bits)
    }

    pub fn to_f32(self) -> f32 {
        (self.raw as f64 / (1u64 << self.frac_bits) as f64) as f32
    }

    #[inline(always)]
    pub fn raw(self) -> i32 {
        self.raw
    }

    #[inline(always)]
    pub fn width(self) -> FixedWidth {
        self.width
    }

    #[inline(always)]
    pub fn frac_bits(self) -> u8 {
        self.frac_bits
    }

    #[inline(always)]
    pub fn saturating_add(self, rhs: Self) -> Self {
        debug_assert_eq!(self.frac_bits, rhs.frac_bits);
        Self::saturating_from_raw(self.raw as i64 + rhs.raw as i64, self.width, self.frac_bits)
    }

    #[inline(always)]
    pub fn wrapping_add(self, rhs: Self) -> Self {
        debug_assert_eq!(self.frac_bits, rhs.frac_bits);
        Self {
            raw: self.width.wrap(self.raw as i64 + rhs.raw as i64),
            ..self
        }
    }

    /// `self * rhs`, rounded at the fractional position and saturated.
    #[inline(always)]
    pub fn saturating_mul(self, rhs: Self) -> Self {
        debug_assert_eq!(self.frac_bits, rhs.frac_bits);
        let product = round_shift(self.raw as i64 * rhs.raw as i64, self.frac_bits);
        Self::saturating_from_raw(product, self.width, self.frac_bits)
    }

    /// `self + a * b` at the width of `self`, one saturation at the end.
    #[inline(always)]
    pub fn saturating_mla(self, a: Self, b: Self) -> Self {
        debug_assert_eq!(self.width, a.width);
        let product = round_shift(a.raw as i64 * b.raw as i64, a.frac_bits);
        Self::saturating_from_raw(self.raw as i64 + product, self.width, self.frac_bits)
    }

    /// `self + a * b` where `self` is the long (double width) accumulator.
    #[inline(always)]
    pub fn saturating_mlal(self, a: Self, b: Self) -> Self {
        debug_assert_eq!(self.width, a.width.widen());
        let product = round_shift(a.raw as i64 * b.raw as i64, a.frac_bits);
        Self::saturating_from_raw(self.raw as i64 + product, self.width, self.frac_bits)
    }

    /// Narrow to a smaller width, saturating.
    #[inline(always)]
    pub fn saturating_narrow(self, width: FixedWidth) -> Self {
        Self::saturating_from_raw(self.raw as i64, width, self.frac_bits)
    }
}
