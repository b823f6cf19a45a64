use crate::error::Result;
use crate::params::{Parameters, ParametersBuilder, SchemeType, SecurityLevel};

/// 2^40, matched to the 40-bit middle primes of the regression chain.
pub const DEFAULT_SCALE: f64 = (1u64 << 40) as f64;

/// Approximate-scheme parameters for least squares (depth 2).
///
/// Chain [60, 40, 40, 60]: one 60-bit data prime at the bottom to hold the
/// final values, two 40-bit primes consumed by rescaling, and the 60-bit
/// special prime.
pub fn regression(level: SecurityLevel) -> Result<Parameters> {
    let ring_degree = match level {
        SecurityLevel::Tc128 => 8192,
        SecurityLevel::Tc192 | SecurityLevel::Tc256 => 16384,
    };
    ParametersBuilder::new(SchemeType::Approximate)
        .ring_degree(ring_degree)
        .coeff_modulus_bits(&[60, 40, 40, 60])
        .security(level)
        .build()
}

/// Batched-scheme parameters for record aggregation (depth 1).
pub fn batched(level: SecurityLevel) -> Result<Parameters> {
    let (ring_degree, bits): (usize, &[u32]) = match level {
        SecurityLevel::Tc128 => (4096, &[36, 36, 37]),
        SecurityLevel::Tc192 => (8192, &[43, 43, 44]),
        SecurityLevel::Tc256 => (8192, &[39, 39, 40]),
    };
    ParametersBuilder::new(SchemeType::Batched)
        .ring_degree(ring_degree)
        .coeff_modulus_bits(bits)
        .plain_modulus_bits(20)
        .security(level)
        .build()
}
