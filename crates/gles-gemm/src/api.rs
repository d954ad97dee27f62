use crate::arch::{default_registry, gpu_target, GemmConfig, GpuTarget, KernelDispatch};
use crate::core::{Interleave4x4Kernel, MatrixAdditionKernel, MatrixMultiplyKernel, Transpose1xWKernel};
use crate::error::{GemmError, Result};
use crate::tensor::{TensorInfo, TensorShape, TensorView};
use crate::types::{DataType, GemmScalar};

fn data_type_of<T: GemmScalar>(frac_bits: u8) -> DataType {
    T::KIND.with_frac_bits(frac_bits)
}

fn check_len(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(GemmError::DimensionMismatch(format!(
            "{} size mismatch: expected {}, got {}",
            what, expected, got
        )));
    }
    Ok(())
}

/// Simple matrix multiplication: C = A × B
///
/// # Arguments
/// - `a`: Matrix A data in row-major order
/// - `m`: Number of rows in A
/// - `k`: Number of columns in A / rows in B
/// - `b`: Matrix B data in row-major order
/// - `n`: Number of columns in B
///
/// Uses the process target ([`gpu_target`]) and the default registry.
/// Fixed-point types are taken at fractional position 0; use [`Gemm`] to
/// choose another.
///
/// # Example
///
/// ```
/// use gles_gemm::matmul;
///
/// let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 2x3
/// let b = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2
///
/// let c = matmul(&a, 2, 3, &b, 2).unwrap();
/// assert_eq!(c, vec![22.0, 28.0, 49.0, 64.0]);
/// ```
pub fn matmul<T: KernelDispatch>(a: &[T], m: usize, k: usize, b: &[T], n: usize) -> Result<Vec<T>> {
    let mut c = vec![T::default(); m * n];
    Gemm::<T>::new(m, n, k).execute(a, b, &mut c)?;
    Ok(c)
}

/// Strided batched multiplication: C[z] = A[z] × B[z % b_depth].
///
/// `a` holds `batch_size` contiguous M×K matrices and `b` holds `b_depth`
/// contiguous K×N matrices. With `b_depth == 1` every batch shares the same
/// weights.
///
/// # Example
///
/// ```
/// use gles_gemm::matmul_strided_batched;
///
/// let a = vec![
///     1.0f32, 0.0, 0.0, 1.0, // A[0] = I
///     2.0, 0.0, 0.0, 2.0,    // A[1] = 2I
/// ];
/// let b = vec![1.0f32, 2.0, 3.0, 4.0]; // shared B
///
/// let c = matmul_strided_batched(&a, &b, 2, 1, 2, 2, 2).unwrap();
/// assert_eq!(c, vec![1.0, 2.0, 3.0, 4.0, 2.0, 4.0, 6.0, 8.0]);
/// ```
pub fn matmul_strided_batched<T: KernelDispatch>(
    a: &[T],
    b: &[T],
    batch_size: usize,
    b_depth: usize,
    m: usize,
    k: usize,
    n: usize,
) -> Result<Vec<T>> {
    if batch_size == 0 {
        return Ok(Vec::new());
    }
    let mut c = vec![T::default(); batch_size * m * n];
    Gemm::<T>::new(m, n, k)
        .batches(batch_size, b_depth)
        .execute(a, b, &mut c)?;
    Ok(c)
}

/// Naive triple loop with the Midgard multiply-add order, for checking
/// kernels.
pub fn matmul_reference<T: GemmScalar>(
    a: &[T],
    m: usize,
    k: usize,
    b: &[T],
    n: usize,
    alpha: f32,
    frac_bits: u8,
) -> Vec<T> {
    assert_eq!(a.len(), m * k, "A dimensions mismatch");
    assert_eq!(b.len(), k * n, "B dimensions mismatch");

    let alpha = (alpha != 1.0).then(|| T::from_f32(alpha, frac_bits));
    let mut c = vec![T::default(); m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = T::acc_zero(frac_bits);
            for p in 0..k {
                acc = T::mul_acc(acc, a[i * k + p], b[p * n + j], frac_bits);
            }
            let mut value = T::narrow(acc, frac_bits);
            if let Some(alpha) = alpha {
                value = value.scale(alpha, frac_bits);
            }
            c[i * n + j] = value;
        }
    }
    c
}

/// Builder for a full `C = alpha · A × B + beta · C` multiply.
///
/// Resolves a [`GemmConfig`] (from the default registry unless one is
/// given), reshapes the operands when the config asks for it, runs the
/// multiply kernel and, when `beta` is non-zero, the addition kernel.
///
/// # Example
///
/// ```
/// use gles_gemm::{Gemm, GpuTarget, Qs8};
///
/// // 1.5 × 2.0 in Q3.4
/// let a = vec![Qs8::from_f32(1.5, 4)];
/// let b = vec![Qs8::from_f32(2.0, 4)];
/// let mut c = vec![Qs8::default()];
///
/// Gemm::<Qs8>::new(1, 1, 1)
///     .frac_bits(4)
///     .target(GpuTarget::Bifrost)
///     .execute(&a, &b, &mut c)
///     .unwrap();
/// assert_eq!(c[0].to_f32(4), 3.0);
/// ```
pub struct Gemm<T: GemmScalar> {
    m: usize,
    n: usize,
    k: usize,
    batches: usize,
    b_depth: usize,
    alpha: f32,
    beta: f32,
    frac_bits: u8,
    target: Option<GpuTarget>,
    config: Option<GemmConfig>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: KernelDispatch> Gemm<T> {
    /// Create a new GEMM builder.
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            batches: 1,
            b_depth: 1,
            alpha: 1.0,
            beta: 0.0,
            frac_bits: 0,
            target: None,
            config: None,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Scale of the product.
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Scale of the existing contents of C.
    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    /// Fractional position of every fixed-point operand.
    pub fn frac_bits(mut self, frac_bits: u8) -> Self {
        self.frac_bits = frac_bits;
        self
    }

    /// Target whose schedule and tuning to use.
    pub fn target(mut self, target: GpuTarget) -> Self {
        self.target = Some(target);
        self
    }

    /// Use this config instead of looking one up.
    pub fn config(mut self, config: GemmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Run `batches` multiplies; B holds `b_depth` matrices.
    pub fn batches(mut self, batches: usize, b_depth: usize) -> Self {
        self.batches = batches;
        self.b_depth = b_depth;
        self
    }

    /// The config [`Gemm::execute`] will use.
    pub fn resolved_config(&self) -> GemmConfig {
        self.config.unwrap_or_else(|| {
            let target = self.target.unwrap_or_else(gpu_target);
            default_registry().lookup(data_type_of::<T>(self.frac_bits), self.m, target)
        })
    }

    /// Execute the operation. `c` must hold `batches · m · n` elements.
    pub fn execute(&self, a: &[T], b: &[T], c: &mut [T]) -> Result<()> {
        let (m, n, k) = (self.m, self.n, self.k);
        check_len("A", self.batches * m * k, a.len())?;
        check_len("B", self.b_depth * k * n, b.len())?;
        check_len("C", self.batches * m * n, c.len())?;

        let dt = data_type_of::<T>(self.frac_bits);
        let a_info = TensorInfo::new(TensorShape::new(&[k, m, self.batches]), dt);
        let b_info = TensorInfo::new(TensorShape::new(&[n, k, self.b_depth]), dt);
        let dst_info = TensorInfo::new(TensorShape::new(&[n, m, self.batches]), dt);
        let config = self.resolved_config();

        let bias = (self.beta != 0.0).then(|| c.to_vec());

        unsafe {
            let a_view = TensorView::new_const(a.as_ptr() as *const u8, a_info);
            let b_view = TensorView::new_const(b.as_ptr() as *const u8, b_info);
            let dst_view = TensorView::new(c.as_mut_ptr() as *mut u8, dst_info);

            match config.reshape_info(dt) {
                Some(reshape) => {
                    let a_reshaped_info = Interleave4x4Kernel::output_info(&a_info, reshape.mult_interleave_height);
                    let b_reshaped_info = Transpose1xWKernel::output_info(&b_info, reshape.mult_transpose_width);
                    let interleave = Interleave4x4Kernel::configure(&a_info, &a_reshaped_info, reshape.mult_interleave_height)?;
                    let transpose = Transpose1xWKernel::configure(&b_info, &b_reshaped_info, reshape.mult_transpose_width)?;
                    let multiply = MatrixMultiplyKernel::configure(&a_reshaped_info, &b_reshaped_info, &dst_info, self.alpha, &config)?;

                    let mut a_reshaped = vec![T::default(); a_reshaped_info.shape().total_size()];
                    let mut b_reshaped = vec![T::default(); b_reshaped_info.shape().total_size()];
                    let a_reshaped_view = TensorView::new(a_reshaped.as_mut_ptr() as *mut u8, a_reshaped_info);
                    let b_reshaped_view = TensorView::new(b_reshaped.as_mut_ptr() as *mut u8, b_reshaped_info);

                    interleave.run(&a_view, &a_reshaped_view);
                    transpose.run(&b_view, &b_reshaped_view);
                    multiply.run(&a_reshaped_view, &b_reshaped_view, &dst_view);
                }
                None => {
                    let multiply = MatrixMultiplyKernel::configure(&a_info, &b_info, &dst_info, self.alpha, &config)?;
                    multiply.run(&a_view, &b_view, &dst_view);
                }
            }

            if let Some(mut bias) = bias {
                let addition = MatrixAdditionKernel::configure(&dst_info, &dst_info, self.beta)?;
                let bias_view = TensorView::new(bias.as_mut_ptr() as *mut u8, dst_info);
                addition.run(&bias_view, &dst_view);
            }
        }

        Ok(())
    }
}
