//! HomomorphicEncryption.org standard bounds on the total coefficient modulus.
//!
//! Values are for a ternary secret and σ ≈ 3.2; exceeding them drops the
//! estimated security below the requested level.

use crate::params::SecurityLevel;

const TABLE: &[(usize, [u32; 3])] = &[
    (1024, [27, 19, 14]),
    (2048, [54, 37, 29]),
    (4096, [109, 75, 58]),
    (8192, [218, 152, 118]),
    (16384, [438, 305, 237]),
    (32768, [881, 611, 476]),
];

/// Largest permitted bit count of ∏ q_i, or `None` for unsupported n.
pub fn max_coeff_modulus_bits(ring_degree: usize, level: SecurityLevel) -> Option<u32> {
    let column = match level {
        SecurityLevel::Tc128 => 0,
        SecurityLevel::Tc192 => 1,
        SecurityLevel::Tc256 => 2,
    };
    TABLE.iter()
        .find(|(n, _)| *n == ring_degree)
        .map(|(_, bits)| bits[column])
}

/// Smallest tabulated ring degree whose bound admits `total_bits`.
pub fn min_ring_degree(total_bits: u32, level: SecurityLevel) -> Option<usize> {
    TABLE.iter()
        .map(|(n, _)| *n)
        .find(|&n| max_coeff_modulus_bits(n, level).is_some_and(|max| total_bits <= max))
}

pub fn is_secure(ring_degree: usize, total_bits: u32, level: SecurityLevel) -> bool {
    max_coeff_modulus_bits(ring_degree, level).is_some_and(|max| total_bits <= max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        assert_eq!(max_coeff_modulus_bits(8192, SecurityLevel::Tc128), Some(218));
        assert_eq!(max_coeff_modulus_bits(16384, SecurityLevel::Tc256), Some(237));
        assert_eq!(max_coeff_modulus_bits(3000, SecurityLevel::Tc128), None);
    }

    #[test]
    fn test_regression_chain_fits() {
        // [60, 40, 40, 60]
        assert!(is_secure(8192, 200, SecurityLevel::Tc128));
        assert!(!is_secure(8192, 200, SecurityLevel::Tc192));
        assert!(is_secure(16384, 200, SecurityLevel::Tc256));
        assert_eq!(min_ring_degree(200, SecurityLevel::Tc192), Some(16384));
    }
}
