use std::fmt::Debug;

use half::f16;

use super::data_type::ElementKind;
use super::fixed::{Fixed, FixedWidth};
use super::scalar::{Qs16, Qs8};

/// Element operations the tiling templates are generic over.
///
/// `frac_bits` is the fractional position of the tensor being processed; the
/// floating-point implementations ignore it.
pub trait GemmScalar: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Accumulator held in registers during the reduction loop.
    type Acc: Copy + Debug + Send + Sync;

    const KIND: ElementKind;

    /// Lanes per 16-byte vector.
    const VECTOR_WIDTH: usize = Self::KIND.vector_width();

    fn acc_zero(frac_bits: u8) -> Self::Acc;

    /// `acc + a * b` with the product rounded before the add.
    fn mul_acc(acc: Self::Acc, a: Self, b: Self, frac_bits: u8) -> Self::Acc;

    /// `acc + a * b` with a single rounding.
    fn fused_mul_acc(acc: Self::Acc, a: Self, b: Self, frac_bits: u8) -> Self::Acc;

    /// Bring the accumulator back to the storage type.
    fn narrow(acc: Self::Acc, frac_bits: u8) -> Self;

    /// `self * alpha`.
    fn scale(self, alpha: Self, frac_bits: u8) -> Self;

    /// `self + beta * src`.
    fn scaled_add(self, src: Self, beta: Self, frac_bits: u8) -> Self;

    fn from_f32(value: f32, frac_bits: u8) -> Self;

    fn to_f32(self, frac_bits: u8) -> f32;
}

impl GemmScalar for f32 {
    type Acc = f32;

    const KIND: ElementKind = ElementKind::F32;

    #[inline(always)]
    fn acc_zero(_: u8) -> f32 {
        0.0
    }

    #[inline(always)]
    fn mul_acc(acc: f32, a: f32, b: f32, _: u8) -> f32 {
        acc + a * b
    }

    #[inline(always)]
    fn fused_mul_acc(acc: f32, a: f32, b: f32, _: u8) -> f32 {
        a.mul_add(b, acc)
    }

    #[inline(always)]
    fn narrow(acc: f32, _: u8) -> f32 {
        acc
    }

    #[inline(always)]
    fn scale(self, alpha: f32, _: u8) -> f32 {
        self * alpha
    }

    #[inline(always)]
    fn scaled_add(self, src: f32, beta: f32, _: u8) -> f32 {
        self + src * beta
    }

    #[inline(always)]
    fn from_f32(value: f32, _: u8) -> f32 {
        value
    }

    #[inline(always)]
    fn to_f32(self, _: u8) -> f32 {
        self
    }
}

impl GemmScalar for f16 {
    type Acc = f16;

    const KIND: ElementKind = ElementKind::F16;

    #[inline(always)]
    fn acc_zero(_: u8) -> f16 {
        f16::ZERO
    }

    #[inline(always)]
    fn mul_acc(acc: f16, a: f16, b: f16, _: u8) -> f16 {
        let product = f16::from_f32(a.to_f32() * b.to_f32());
        f16::from_f32(acc.to_f32() + product.to_f32())
    }

    #[inline(always)]
    fn fused_mul_acc(acc: f16, a: f16, b: f16, _: u8) -> f16 {
        // The product of two halves is exact in f32.
        f16::from_f32(a.to_f32().mul_add(b.to_f32(), acc.to_f32()))
    }

    #[inline(always)]
    fn narrow(acc: f16, _: u8) -> f16 {
        acc
    }

    #[inline(always)]
    fn scale(self, alpha: f16, _: u8) -> f16 {
        f16::from_f32(self.to_f32() * alpha.to_f32())
    }

    #[inline(always)]
    fn scaled_add(self, src: f16, beta: f16, _: u8) -> f16 {
        let product = f16::from_f32(src.to_f32() * beta.to_f32());
        f16::from_f32(self.to_f32() + product.to_f32())
    }

    #[inline(always)]
    fn from_f32(value: f32, _: u8) -> f16 {
        f16::from_f32(value)
    }

    #[inline(always)]
    fn to_f32(self, _: u8) -> f32 {
        f16::to_f32(self)
    }
}

impl GemmScalar for Qs8 {
    type Acc = Fixed;

    const KIND: ElementKind = ElementKind::Qs8;

    #[inline(always)]
    fn acc_zero(frac_bits: u8) -> Fixed {
        Fixed::from_raw(0, FixedWidth::W16, frac_bits)
    }

    #[inline(always)]
    fn mul_acc(acc: Fixed, a: Qs8, b: Qs8, frac_bits: u8) -> Fixed {
        acc.saturating_mlal(a.fixed(frac_bits), b.fixed(frac_bits))
    }

    #[inline(always)]
    fn fused_mul_acc(acc: Fixed, a: Qs8, b: Qs8, frac_bits: u8) -> Fixed {
        Self::mul_acc(acc, a, b, frac_bits)
    }

    #[inline(always)]
    fn narrow(acc: Fixed, _: u8) -> Qs8 {
        Qs8::from_fixed(acc)
    }

    #[inline(always)]
    fn scale(self, alpha: Qs8, frac_bits: u8) -> Qs8 {
        Qs8::from_fixed(self.fixed(frac_bits).saturating_mul(alpha.fixed(frac_bits)))
    }

    #[inline(always)]
    fn scaled_add(self, src: Qs8, beta: Qs8, frac_bits: u8) -> Qs8 {
        let dst = self.fixed(frac_bits);
        Qs8::from_fixed(dst.saturating_mla(src.fixed(frac_bits), beta.fixed(frac_bits)))
    }

    fn from_f32(value: f32, frac_bits: u8) -> Qs8 {
        Qs8::from_f32(value, frac_bits)
    }

    fn to_f32(self, frac_bits: u8) -> f32 {
        Qs8::to_f32(self, frac_bits)
    }
}

impl GemmScalar for Qs16 {
    type Acc = Fixed;

    const KIND: ElementKind = ElementKind::Qs16;

    #[inline(always)]
    fn acc_zero(frac_bits: u8) -> Fixed {
        Fixed::from_raw(0, FixedWidth::W32, frac_bits)
    }

    #[inline(always)]
    fn mul_acc(acc: Fixed, a: Qs16, b: Qs16, frac_bits: u8) -> Fixed {
        acc.saturating_mlal(a.fixed(frac_bits), b.fixed(frac_bits))
    }

    #[inline(always)]
    fn fused_mul_acc(acc: Fixed, a: Qs16, b: Qs16, frac_bits: u8) -> Fixed {
        Self::mul_acc(acc, a, b, frac_bits)
    }

    #[inline(always)]
    fn narrow(acc: Fixed, _: u8) -> Qs16 {
        Qs16::from_fixed(acc)
    }

    #[inline(always)]
    fn scale(self, alpha: Qs16, frac_bits: u8) -> Qs16 {
        Qs16::from_fixed(self.fixed(frac_bits).saturating_mul(alpha.fixed(frac_bits)))
    }

    #[inline(always)]
    fn scaled_add(self, src: Qs16, beta: Qs16, frac_bits: u8) -> Qs16 {
        let dst = self.fixed(frac_bits);
        Qs16::from_fixed(dst.saturating_mla(src.fixed(frac_bits), beta.fixed(frac_bits)))
    }

    fn from_f32(value: f32, frac_bits: u8) -> Qs16 {
        Qs16::from_f32(value, frac_bits)
    }

    fn to_f32(self, frac_bits: u8) -> f32 {
        Qs16::to_f32(self, frac_bits)
    }
}
