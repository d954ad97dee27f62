//! Multiply-accumulate tile templates and per-target schedules.
//!
//! Each work-item of a multiply kernel owns one output tile and walks the
//! reduction dimension in three phases:
//!
//! ```text
//! Setup           base addresses of its A rows, B columns and output tile
//! Block loop      k in steps of S::UNROLL, then a scalar tail
//! Epilogue        narrow accumulators, optional alpha scale, store
//! ```
//!
//! The tile templates are generic over the element type ([`GemmScalar`]) and
//! the instruction schedule ([`Schedule`]):
//!
//! | Schedule | Unroll | Issue order | Multiply-add |
//! |----------|--------|-------------|--------------|
//! | [`Midgard`] | 2 | load, compute, load, compute | separate multiply and add |
//! | [`Bifrost`] | 8 | all loads, then all computes | fused |
//!
//! Fixed-point types accumulate in the widened type through saturating
//! multiply-accumulate-long, which is the same on both schedules, so fixed
//! results are bit-exact across targets.

use crate::arch::GpuTarget;
use crate::tensor::TensorView;
use crate::types::GemmScalar;

use super::tiling::{ReshapeInfo, TileShape, INTERLEAVE_HEIGHT, MAX_DIRECT_COLS, MAX_DIRECT_ROWS};

const BIFROST_UNROLL: usize = 8;

/// Register tile of accumulators owned by one work-item.
pub struct Tile<T: GemmScalar> {
    acc: [[T::Acc; MAX_DIRECT_COLS]; MAX_DIRECT_ROWS],
    rows: usize,
    cols: usize,
    frac_bits: u8,
}

impl<T: GemmScalar> Tile<T> {
    #[inline(always)]
    pub fn new(rows: usize, cols: usize, frac_bits: u8) -> Self {
        debug_assert!(rows <= MAX_DIRECT_ROWS && cols <= MAX_DIRECT_COLS);
        Self {
            acc: [[T::acc_zero(frac_bits); MAX_DIRECT_COLS]; MAX_DIRECT_ROWS],
            rows,
            cols,
            frac_bits,
        }
    }

    /// Run the block loop and scalar tail over `k_total` steps.
    ///
    /// `load_a(k, i)` returns A for tile row `i`, `load_b(k, j)` returns B
    /// for tile column `j`.
    #[inline(always)]
    pub fn accumulate<S, A, B>(&mut self, k_total: usize, load_a: A, load_b: B)
    where
        S: Schedule,
        A: Fn(usize, usize) -> T,
        B: Fn(usize, usize) -> T,
    {
        let mut k = 0;
        while k + S::UNROLL <= k_total {
            S::accumulate_block(self, k, &load_a, &load_b);
            k += S::UNROLL;
        }

        let fp = self.frac_bits;
        let mut b = [T::default(); MAX_DIRECT_COLS];
        for k in k..k_total {
            for (j, b) in b.iter_mut().enumerate().take(self.cols) {
                *b = load_b(k, j);
            }
            for i in 0..self.rows {
                let a = load_a(k, i);
                for j in 0..self.cols {
                    self.acc[i][j] = S::mac(self.acc[i][j], a, b[j], fp);
                }
            }
        }
    }

    /// Narrow, scale by `alpha` and hand every element of the top-left
    /// `rows`×`cols` corner to `store(i, j, value)`.
    #[inline(always)]
    pub fn store<F>(&self, rows: usize, cols: usize, alpha: Option<T>, mut store: F)
    where
        F: FnMut(usize, usize, T),
    {
        let fp = self.frac_bits;
        for i in 0..rows {
            for j in 0..cols {
                let mut value = T::narrow(self.acc[i][j], fp);
                if let Some(alpha) = alpha {
                    value = value.scale(alpha, fp);
                }
                store(i, j, value);
            }
        }
    }
}

/// Instruction schedule of one GPU generation.
pub trait Schedule: Send + Sync + 'static {
    const TARGET: GpuTarget;
    const UNROLL: usize;
    const NAME: &'static str;

    /// One multiply-accumulate step as the target issues it.
    fn mac<T: GemmScalar>(acc: T::Acc, a: T, b: T, frac_bits: u8) -> T::Acc;

    /// Accumulate `UNROLL` consecutive steps of k starting at `k0`.
    fn accumulate_block<T, A, B>(tile: &mut Tile<T>, k0: usize, load_a: &A, load_b: &B)
    where
        T: GemmScalar,
        A: Fn(usize, usize) -> T,
        B: Fn(usize, usize) -> T;
}

/// Midgard: unroll 2, each step loads its operands then issues multiply and
/// add separately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Midgard;

impl Schedule for Midgard {
    const TARGET: GpuTarget = GpuTarget::Midgard;
    const UNROLL: usize = 2;
    const NAME: &'static str = "midgard";

    #[inline(always)]
    fn mac<T: GemmScalar>(acc: T::Acc, a: T, b: T, frac_bits: u8) -> T::Acc {
        T::mul_acc(acc, a, b, frac_bits)
    }

    #[inline(always)]
    fn accumulate_block<T, A, B>(tile: &mut Tile<T>, k0: usize, load_a: &A, load_b: &B)
    where
        T: GemmScalar,
        A: Fn(usize, usize) -> T,
        B: Fn(usize, usize) -> T,
    {
        let fp = tile.frac_bits;
        let mut b = [T::default(); MAX_DIRECT_COLS];
        for k in k0..k0 + Self::UNROLL {
            for (j, b) in b.iter_mut().enumerate().take(tile.cols) {
                *b = load_b(k, j);
            }
            for i in 0..tile.rows {
                let a = load_a(k, i);
                for j in 0..tile.cols {
                    tile.acc[i][j] = T::mul_acc(tile.acc[i][j], a, b[j], fp);
                }
            }
        }
    }
}

/// Bifrost: unroll 8, every operand of the block is loaded before the first
/// fused multiply-add is issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bifrost;

impl Schedule for Bifrost {
    const TARGET: GpuTarget = GpuTarget::Bifrost;
    const UNROLL: usize = BIFROST_UNROLL;
    const NAME: &'static str = "bifrost";

    #[inline(always)]
    fn mac<T: GemmScalar>(acc: T::Acc, a: T, b: T, frac_bits: u8) -> T::Acc {
        T::fused_mul_acc(acc, a, b, frac_bits)
    }

    #[inline(always)]
    fn accumulate_block<T, A, B>(tile: &mut Tile<T>, k0: usize, load_a: &A, load_b: &B)
    where
        T: GemmScalar,
        A: Fn(usize, usize) -> T,
        B: Fn(usize, usize) -> T,
    {
        let fp = tile.frac_bits;
        let mut a = [[T::default(); MAX_DIRECT_ROWS]; BIFROST_UNROLL];
        let mut b = [[T::default(); MAX_DIRECT_COLS]; BIFROST_UNROLL];
        for u in 0..BIFROST_UNROLL {
            for i in 0..tile.rows {
                a[u][i] = load_a(k0 + u, i);
            }
            for j in 0..tile.cols {
                b[u][j] = load_b(k0 + u, j);
            }
        }

        for u in 0..BIFROST_UNROLL {
            for i in 0..tile.rows {
                for j in 0..tile.cols {
                    tile.acc[i][j] = T::fused_mul_acc(tile.acc[i][j], a[u][i], b[u][j], fp);
                }
            }
        }
    }
}

/// Operands and problem size of one multiply launch.
#[derive(Debug, Clone, Copy)]
pub struct MultiplyArgs {
    pub a: TensorView,
    pub b: TensorView,
    pub dst: TensorView,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// Number of B slices; output slice `z` reads B slice `z % b_depth`.
    pub b_depth: usize,
    pub frac_bits: u8,
}

/// One work-item of the reshaped kernel: a 4×W output tile read from the
/// interleaved A and transposed B.
#[inline(always)]
pub fn reshaped_work_item<T, S>(args: &MultiplyArgs, reshape: &ReshapeInfo, alpha: Option<T>, gid: [usize; 3])
where
    T: GemmScalar,
    S: Schedule,
{
    let [x, y, z] = gid;
    let w = reshape.transpose_width;
    let h = reshape.mult_transpose_width;
    let v = reshape.mult_interleave_height;
    let MultiplyArgs { a, b, dst, .. } = *args;

    // Setup
    let sa = a.info().stride(0);
    let sb = b.info().stride(0);
    let a_base = a.offset_3d(0, y / v, z) + (y % v) * INTERLEAVE_HEIGHT * sa;
    let b_base = b.offset_3d(0, x / h, z % args.b_depth) + (x % h) * w * sb;
    let a_step = INTERLEAVE_HEIGHT * v * sa;
    let b_step = w * h * sb;

    // Block loop
    let mut tile = Tile::<T>::new(INTERLEAVE_HEIGHT, w, args.frac_bits);
    tile.accumulate::<S, _, _>(
        args.k,
        |k, i| unsafe { a.load::<T>(a_base + k * a_step + i * sa) },
        |k, j| unsafe { b.load::<T>(b_base + k * b_step + j * sb) },
    );

    // Epilogue
    let row0 = y * INTERLEAVE_HEIGHT;
    let col0 = x * w;
    // Padded operands make the whole tile valid to compute; edge tiles store
    // only their in-range corner.
    let rows = INTERLEAVE_HEIGHT.min(args.m - row0);
    let cols = w.min(args.n - col0);
    tile.store(rows, cols, alpha, |i, j, value| unsafe {
        dst.store(dst.offset_3d(col0 + j, row0 + i, z), value);
    });
}

/// One work-item of the direct kernel: a `rows`×`cols` tile read straight
/// from row-major A and B. Edge tiles compute only their in-range part.
#[inline(always)]
pub fn direct_work_item<T, S>(args: &MultiplyArgs, shape: &TileShape, alpha: Option<T>, gid: [usize; 3])
where
    T: GemmScalar,
    S: Schedule,
{
    let [x, y, z] = gid;
    let MultiplyArgs { a, b, dst, .. } = *args;

    let row0 = y * shape.rows;
    let col0 = x * shape.cols;
    let rows = shape.rows.min(args.m - row0);
    let cols = shape.cols.min(args.n - col0);
    let bz = z % args.b_depth;

    let mut tile = Tile::<T>::new(rows, cols, args.frac_bits);
    tile.accumulate::<S, _, _>(
        args.k,
        |k, i| unsafe { a.load::<T>(a.offset_3d(k, row0 + i, z)) },
        |k, j| unsafe { b.load::<T>(b.offset_3d(col0 + j, k, bz)) },
    );

    tile.store(rows, cols, alpha, |i, j, value| unsafe {
        dst.store(dst.offset_3d(col0 + j, row0 + i, z), value);
    });
}
