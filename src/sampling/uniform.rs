use rand::Rng;

use crate::ring::ntt::NttPoly;
use crate::ring::rns::{RnsBasis, RnsPoly};

/// n values uniform in [0, modulus), by rejection on the next power of two.
pub fn sample_uniform_mod<R: Rng>(n: usize, modulus: u64, rng: &mut R) -> Vec<u64> {
    let mask = if modulus.is_power_of_two() {
        modulus - 1
    } else {
        u64::MAX >> modulus.leading_zeros()
    };

    (0..n)
        .map(|_| loop {
            let val = rng.random::<u64>() & mask;
            if val < modulus {
                break val;
            }
        })
        .collect()
}

/// Uniform element of R_Q, sampled directly in NTT form.
///
/// The NTT is a bijection per prime, so uniform evaluations are a uniform
/// polynomial.
pub fn sample_uniform_rns<R: Rng>(basis: &RnsBasis, rng: &mut R) -> RnsPoly {
    let components = basis.plans.iter()
        .map(|plan| {
            let q = plan.modulus();
            NttPoly {
                evals: sample_uniform_mod(basis.ring_degree, q, rng),
                modulus: q,
                plan: plan.clone(),
            }
        })
        .collect();
    RnsPoly { components, ring_degree: basis.ring_degree }
}

/// Coefficients uniform in {-1, 0, 1}.
pub fn sample_ternary<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| {
            let val = loop {
                let r = rng.random::<u8>() & 0x03;
                if r < 3 {
                    break r;
                }
            };
            val as i64 - 1
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_uniform_mod() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let vals = sample_uniform_mod(1024, 65537, &mut rng);
        assert_eq!(vals.len(), 1024);
        assert!(vals.iter().all(|&c| c < 65537));
        assert!(vals.iter().any(|&c| c > 32768));
    }

    #[test]
    fn test_uniform_rns_in_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let basis = RnsBasis::new(vec![65537, 97], 16).unwrap();
        let poly = sample_uniform_rns(&basis, &mut rng);
        assert_eq!(poly.num_components(), 2);
        assert!(poly.components[1].evals.iter().all(|&e| e < 97));
    }

    #[test]
    fn test_ternary() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let poly = sample_ternary(1024, &mut rng);
        assert!(poly.iter().all(|&c| (-1..=1).contains(&c)));
        for v in -1..=1 {
            let count = poly.iter().filter(|&&c| c == v).count();
            assert!(count > 200 && count < 500, "{v}: {count}");
        }
    }
}
