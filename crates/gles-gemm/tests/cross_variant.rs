//! Cross-variant checks: every (path, target, type) combination must agree
//! with the reference triple loop and with each other.

use gles_gemm::{
    matmul_reference, Gemm, GemmConfig, GpuTarget, Qs16, Qs8, DataType, GemmScalar,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TARGETS: [GpuTarget; 2] = [GpuTarget::Midgard, GpuTarget::Bifrost];

fn configs(target: GpuTarget) -> Vec<GemmConfig> {
    vec![
        GemmConfig::reshaped(target, 1, 1),
        GemmConfig::reshaped(target, 2, 1),
        GemmConfig::reshaped(target, 1, 2),
        GemmConfig::reshaped(target, 2, 2),
        GemmConfig::direct(target, 1, 4),
        GemmConfig::direct(target, 2, 8),
        GemmConfig::direct(target, 4, 16),
    ]
}

fn random_f32(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn naive_f64(a: &[f32], m: usize, k: usize, b: &[f32], n: usize, alpha: f32) -> Vec<f64> {
    let mut c = vec![0.0f64; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f64;
            for p in 0..k {
                sum += a[i * k + p] as f64 * b[p * n + j] as f64;
            }
            c[i * n + j] = sum * alpha as f64;
        }
    }
    c
}

#[test]
fn test_4x8_times_8x4_with_alpha() {
    let (m, k, n) = (4, 8, 4);
    let alpha = 0.75;

    for seed in [1u64, 7, 42, 1234, 9001] {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = random_f32(&mut rng, m * k);
        let b = random_f32(&mut rng, k * n);
        let expected = naive_f64(&a, m, k, &b, n, alpha);

        for target in TARGETS {
            for config in configs(target) {
                let mut c = vec![0.0f32; m * n];
                Gemm::<f32>::new(m, n, k)
                    .alpha(alpha)
                    .config(config)
                    .execute(&a, &b, &mut c)
                    .unwrap();

                for (got, want) in c.iter().zip(&expected) {
                    assert!(
                        (*got as f64 - want).abs() < 1e-5,
                        "seed {} {:?}: got {}, want {}",
                        seed,
                        config,
                        got,
                        want
                    );
                }
            }
        }
    }
}

#[test]
fn test_reshape_roundtrip_matches_direct_bit_for_bit() {
    // Same schedule, same k order: reshaping must not change a single bit.
    let (m, n, k) = (13, 21, 19);
    let mut rng = StdRng::seed_from_u64(5);
    let a = random_f32(&mut rng, m * k);
    let b = random_f32(&mut rng, k * n);
    let bias = random_f32(&mut rng, m * n);

    for target in TARGETS {
        let run = |config: GemmConfig| {
            let mut c = bias.clone();
            Gemm::<f32>::new(m, n, k)
                .alpha(1.5)
                .beta(0.25)
                .config(config)
                .execute(&a, &b, &mut c)
                .unwrap();
            c
        };
        let direct = run(GemmConfig::direct(target, 4, 4));
        for config in configs(target) {
            assert_eq!(run(config), direct, "{:?}", config);
        }
    }
}

#[test]
fn test_midgard_and_bifrost_agree_within_rounding() {
    let (m, n, k) = (20, 33, 64);
    let mut rng = StdRng::seed_from_u64(77);
    let a = random_f32(&mut rng, m * k);
    let b = random_f32(&mut rng, k * n);

    let run = |target: GpuTarget| {
        let mut c = vec![0.0f32; m * n];
        Gemm::<f32>::new(m, n, k)
            .config(GemmConfig::reshaped(target, 2, 2))
            .execute(&a, &b, &mut c)
            .unwrap();
        c
    };
    let midgard = run(GpuTarget::Midgard);
    let bifrost = run(GpuTarget::Bifrost);
    for (x, y) in midgard.iter().zip(&bifrost) {
        assert!((x - y).abs() < 1e-4, "{} vs {}", x, y);
    }
}

#[test]
fn test_qs16_saturates_at_both_ends() {
    let fp = 8;
    let big = Qs16::from_f32(100.0, fp);
    let a = vec![big, big];
    let b = vec![big, Qs16::from_f32(-100.0, fp)];

    for target in TARGETS {
        for config in configs(target) {
            let mut c = vec![Qs16::default(); 2];
            Gemm::<Qs16>::new(1, 2, 1)
                .frac_bits(fp)
                .config(config)
                .execute(&a[..1], &b, &mut c)
                .unwrap();
            assert_eq!(c, vec![Qs16::MAX, Qs16::MIN], "{:?}", config);
        }
    }
}

#[test]
fn test_qs8_saturates_at_both_ends() {
    let fp = 1;
    let k = 4;
    let a = vec![Qs8(127); k];
    let b: Vec<Qs8> = (0..k).flat_map(|_| [Qs8(127), Qs8(-127)]).collect();

    for target in TARGETS {
        for config in configs(target) {
            let mut c = vec![Qs8::default(); 2];
            Gemm::<Qs8>::new(1, 2, k)
                .frac_bits(fp)
                .config(config)
                .execute(&a, &b, &mut c)
                .unwrap();
            assert_eq!(c, vec![Qs8::MAX, Qs8::MIN], "{:?}", config);
        }
    }
}

#[test]
fn test_f16_midgard_and_bifrost_agree_within_rounding() {
    let (m, n, k) = (9, 17, 70);
    let a: Vec<gles_gemm::f16> = fixed_operands(3, m * k, -0.5..0.5, 0);
    let b: Vec<gles_gemm::f16> = fixed_operands(4, k * n, -0.5..0.5, 0);

    let run = |config: GemmConfig| {
        let mut c = vec![gles_gemm::f16::ZERO; m * n];
        Gemm::<gles_gemm::f16>::new(m, n, k)
            .config(config)
            .execute(&a, &b, &mut c)
            .unwrap();
        c
    };
    for (midgard, bifrost) in configs(GpuTarget::Midgard).into_iter().zip(configs(GpuTarget::Bifrost)) {
        for (x, y) in run(midgard).iter().zip(&run(bifrost)) {
            assert!(
                (x.to_f32() - y.to_f32()).abs() < 4e-3,
                "{:?} vs {:?}: {} vs {}",
                midgard,
                bifrost,
                x,
                y
            );
        }
    }
}

#[test]
fn test_batched_weights_use_modulo_slice() {
    let (m, n, k) = (6, 5, 7);
    let batches = 6;
    let b_depth = 3;
    let mut rng = StdRng::seed_from_u64(11);
    let a: Vec<Qs8> = (0..batches * m * k).map(|_| Qs8(rng.gen_range(-40..40))).collect();
    let b: Vec<Qs8> = (0..b_depth * k * n).map(|_| Qs8(rng.gen_range(-40..40))).collect();
    let fp = 3;

    for target in TARGETS {
        for config in configs(target) {
            let mut c = vec![Qs8::default(); batches * m * n];
            Gemm::<Qs8>::new(m, n, k)
                .frac_bits(fp)
                .batches(batches, b_depth)
                .config(config)
                .execute(&a, &b, &mut c)
                .unwrap();

            for z in 0..batches {
                let bz = z % b_depth;
                let expected = matmul_reference(
                    &a[z * m * k..(z + 1) * m * k],
                    m,
                    k,
                    &b[bz * k * n..(bz + 1) * k * n],
                    n,
                    1.0,
                    fp,
                );
                assert_eq!(&c[z * m * n..(z + 1) * m * n], &expected[..], "{:?} z={}", config, z);
            }
        }
    }
}

fn fixed_operands<T: GemmScalar>(
    seed: u64,
    len: usize,
    range: std::ops::Range<f32>,
    frac_bits: u8,
) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| T::from_f32(rng.gen_range(range.clone()), frac_bits))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_qs8_all_variants_bit_exact(
        m in 1usize..20,
        n in 1usize..40,
        k in 1usize..24,
        frac_bits in 0u8..7,
        seed in any::<u64>(),
        alpha in prop_oneof![Just(1.0f32), Just(0.5f32)],
    ) {
        let range = -4.0f32..4.0;
        let a: Vec<Qs8> = fixed_operands(seed, m * k, range.clone(), frac_bits);
        let b: Vec<Qs8> = fixed_operands(seed ^ 0x5a5a, k * n, range, frac_bits);
        let expected = matmul_reference(&a, m, k, &b, n, alpha, frac_bits);

        for target in TARGETS {
            for config in configs(target) {
                let mut c = vec![Qs8::default(); m * n];
                Gemm::<Qs8>::new(m, n, k)
                    .alpha(alpha)
                    .frac_bits(frac_bits)
                    .config(config)
                    .execute(&a, &b, &mut c)
                    .unwrap();
                prop_assert_eq!(&c, &expected, "{:?}", config);
            }
        }
    }

    #[test]
    fn prop_qs16_all_variants_bit_exact(
        m in 1usize..12,
        n in 1usize..20,
        k in 1usize..40,
        frac_bits in 0u8..15,
        seed in any::<u64>(),
    ) {
        let range = -60.0f32..60.0;
        let a: Vec<Qs16> = fixed_operands(seed, m * k, range.clone(), frac_bits);
        let b: Vec<Qs16> = fixed_operands(seed.wrapping_add(1), k * n, range, frac_bits);
        let expected = matmul_reference(&a, m, k, &b, n, 1.0, frac_bits);

        for target in TARGETS {
            for config in configs(target) {
                let mut c = vec![Qs16::default(); m * n];
                Gemm::<Qs16>::new(m, n, k)
                    .frac_bits(frac_bits)
                    .config(config)
                    .execute(&a, &b, &mut c)
                    .unwrap();
                prop_assert_eq!(&c, &expected, "{:?}", config);
            }
        }
    }

    #[test]
    fn prop_f16_paths_agree_per_target(
        m in 1usize..10,
        n in 1usize..30,
        k in 1usize..20,
        seed in any::<u64>(),
    ) {
        let a: Vec<gles_gemm::f16> = fixed_operands(seed, m * k, -1.0..1.0, 0);
        let b: Vec<gles_gemm::f16> = fixed_operands(seed ^ 1, k * n, -1.0..1.0, 0);

        for target in TARGETS {
            let run = |config: GemmConfig| {
                let mut c = vec![gles_gemm::f16::ZERO; m * n];
                Gemm::<gles_gemm::f16>::new(m, n, k)
                    .config(config)
                    .execute(&a, &b, &mut c)
                    .unwrap();
                c
            };
            let direct = run(GemmConfig::direct(target, 1, 1));
            for config in configs(target) {
                prop_assert_eq!(run(config), direct.clone(), "{:?}", config);
            }
        }
    }
}

#[test]
fn test_data_type_of_reshaped_buffers_carries_frac_bits() {
    let registry = gles_gemm::KernelRegistry::with_defaults();
    let config = registry.lookup(DataType::Qs8 { frac_bits: 5 }, 64, GpuTarget::Bifrost);
    let reshape = config.reshape_info(DataType::Qs8 { frac_bits: 5 }).unwrap();
    assert_eq!(reshape.transpose_width, 16);
    assert_eq!(reshape.mult_interleave_height, 2);
}
