use super::fixed::{Fixed, FixedWidth};

/// 8-bit fixed-point element (raw storage).
///
/// The fractional position is a property of the tensor, so it is passed to
/// every conversion rather than stored per element.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Qs8(pub i8);

/// 16-bit fixed-point element (raw storage).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Qs16(pub i16);

impl Qs8 {
    pub const MIN: Self = Qs8(i8::MIN);
    pub const MAX: Self = Qs8(i8::MAX);

    #[inline(always)]
    pub fn fixed(self, frac_bits: u8) -> Fixed {
        Fixed::from_raw(self.0 as i32, FixedWidth::W8, frac_bits)
    }

    #[inline(always)]
    pub fn from_fixed(value: Fixed) -> Self {
        Qs8(value.saturating_narrow(FixedWidth::W8).raw() as i8)
    }

    pub fn from_f32(value: f32, frac_bits: u8) -> Self {
        Qs8(Fixed::from_f32(value, FixedWidth::W8, frac_bits).raw() as i8)
    }

    pub fn to_f32(self, frac_bits: u8) -> f32 {
        self.fixed(frac_bits).to_f32()
    }
}

impl Qs16 {
    pub const MIN: Self = Qs16(i16::MIN);
    pub const MAX: Self = Qs16(i16::MAX);

    #[inline(always)]
    pub fn fixed(self, frac_bits: u8) -> Fixed {
        Fixed::from_raw(self.0 as i32, FixedWidth::W16, frac_bits)
    }

    #[inline(always)]
    pub fn from_fixed(value: Fixed) -> Self {
        Qs16(value.saturating_narrow(FixedWidth::W16).raw() as i16)
    }

    pub fn from_f32(value: f32, frac_bits: u8) -> Self {
        Qs16(Fixed::from_f32(value, FixedWidth::W16, frac_bits).raw() as i16)
    }

    pub fn to_f32(self, frac_bits: u8) -> f32 {
        self.fixed(frac_bits).to_f32()
    }
}
