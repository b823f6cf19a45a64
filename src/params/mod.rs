pub mod presets;
pub mod primes;
pub mod security;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CipherfitError, Result};
use crate::ring::modular::is_prime;
use crate::ring::rns::modulus_product;

/// Which homomorphic scheme a parameter set drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeType {
    /// Exact integer arithmetic mod t over `n` batched slots (BFV).
    Batched,
    /// Approximate real arithmetic over `n/2` slots (CKKS).
    Approximate,
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeType::Batched => write!(f, "batched"),
            SchemeType::Approximate => write!(f, "approximate"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityLevel {
    Tc128,
    Tc192,
    Tc256,
}

impl SecurityLevel {
    pub fn bits(self) -> u32 {
        match self {
            SecurityLevel::Tc128 => 128,
            SecurityLevel::Tc192 => 192,
            SecurityLevel::Tc256 => 256,
        }
    }
}

pub const MIN_RING_DEGREE: usize = 1024;
pub const MAX_RING_DEGREE: usize = 32768;
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Encryption parameters.
///
/// The last prime of `coeff_modulus` is the special key-switching prime; the
/// others are data primes. Level k carries the first `L - k` data primes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    scheme: SchemeType,
    ring_degree: usize,
    coeff_modulus: Vec<u64>,
    plain_modulus: Option<u64>,
    security: SecurityLevel,
    sigma: f64,
}

impl Parameters {
    pub fn scheme(&self) -> SchemeType {
        self.scheme
    }

    pub fn ring_degree(&self) -> usize {
        self.ring_degree
    }

    pub fn coeff_modulus(&self) -> &[u64] {
        &self.coeff_modulus
    }

    /// Primes that carry ciphertext data (all but the last).
    pub fn data_moduli(&self) -> &[u64] {
        &self.coeff_modulus[..self.coeff_modulus.len().saturating_sub(1)]
    }

    pub fn special_modulus(&self) -> u64 {
        self.coeff_modulus.last().copied().unwrap_or(0)
    }

    pub fn plain_modulus(&self) -> Option<u64> {
        self.plain_modulus
    }

    pub fn security(&self) -> SecurityLevel {
        self.security
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Deepest reachable level (one data prime left).
    pub fn max_level(&self) -> usize {
        self.data_moduli().len().saturating_sub(1)
    }

    /// n/2 complex slots for the approximate scheme, n integer slots when batched.
    pub fn slot_count(&self) -> usize {
        match self.scheme {
            SchemeType::Approximate => self.ring_degree / 2,
            SchemeType::Batched => self.ring_degree,
        }
    }

    pub fn total_coeff_modulus_bits(&self) -> u32 {
        modulus_product(&self.coeff_modulus).bits() as u32
    }

    /// Reject any combination that is malformed or below the security level.
    pub fn validate(&self) -> Result<()> {
        let n = self.ring_degree;
        if !n.is_power_of_two() || !(MIN_RING_DEGREE..=MAX_RING_DEGREE).contains(&n) {
            return Err(CipherfitError::Parameter(format!(
                "ring degree must be a power of two in \
                 [{MIN_RING_DEGREE}, {MAX_RING_DEGREE}], got {n}"
            )));
        }
        if self.coeff_modulus.len() < 2 {
            return Err(CipherfitError::Parameter(
                "need at least one data prime and the special prime".into(),
            ));
        }

        let two_n = 2 * n as u64;
        let mut seen = HashSet::new();
        for &q in &self.coeff_modulus {
            if q >> primes::MAX_PRIME_BITS != 0 {
                return Err(CipherfitError::Parameter(format!(
                    "prime {q} exceeds {} bits", primes::MAX_PRIME_BITS
                )));
            }
            if !is_prime(q) || q % two_n != 1 {
                return Err(CipherfitError::Parameter(format!(
                    "{q} is not an NTT-friendly prime for n = {n}"
                )));
            }
            if !seen.insert(q) {
                return Err(CipherfitError::Parameter(format!("prime {q} repeated")));
            }
        }

        let total_bits = self.total_coeff_modulus_bits();
        if !security::is_secure(n, total_bits, self.security) {
            return Err(CipherfitError::Parameter(format!(
                "{total_bits}-bit coefficient modulus exceeds the {}-bit bound of {} for n = {n}",
                self.security.bits(),
                security::max_coeff_modulus_bits(n, self.security).unwrap_or(0),
            )));
        }

        match (self.scheme, self.plain_modulus) {
            (SchemeType::Approximate, Some(_)) => {
                return Err(CipherfitError::Parameter(
                    "approximate scheme takes no plain modulus".into(),
                ));
            }
            (SchemeType::Batched, None) => {
                return Err(CipherfitError::Parameter(
                    "batched scheme needs a plain modulus".into(),
                ));
            }
            (SchemeType::Batched, Some(t)) => {
                if !is_prime(t) || t % two_n != 1 {
                    return Err(CipherfitError::Parameter(format!(
                        "plain modulus {t} does not support batching for n = {n}"
                    )));
                }
                if self.coeff_modulus.iter().any(|&q| q <= t) {
                    return Err(CipherfitError::Parameter(
                        "plain modulus must be below every coefficient prime".into(),
                    ));
                }
            }
            (SchemeType::Approximate, None) => {}
        }

        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(CipherfitError::Parameter(format!("invalid sigma {}", self.sigma)));
        }
        Ok(())
    }
}

/// Builder for [`Parameters`].
pub struct ParametersBuilder {
    scheme: SchemeType,
    ring_degree: usize,
    coeff_modulus: Vec<u64>,
    coeff_modulus_bits: Vec<u32>,
    plain_modulus: Option<u64>,
    plain_modulus_bits: Option<u32>,
    security: SecurityLevel,
    sigma: f64,
}

impl ParametersBuilder {
    pub fn new(scheme: SchemeType) -> Self {
        Self {
            scheme,
            ring_degree: 8192,
            coeff_modulus: Vec::new(),
            coeff_modulus_bits: Vec::new(),
            plain_modulus: None,
            plain_modulus_bits: None,
            security: SecurityLevel::Tc128,
            sigma: DEFAULT_SIGMA,
        }
    }

    pub fn ring_degree(mut self, n: usize) -> Self {
        self.ring_degree = n;
        self
    }

    pub fn coeff_modulus(mut self, primes: Vec<u64>) -> Self {
        self.coeff_modulus = primes;
        self
    }

    /// Generate the chain from prime sizes at build time.
    pub fn coeff_modulus_bits(mut self, bits: &[u32]) -> Self {
        self.coeff_modulus_bits = bits.to_vec();
        self
    }

    pub fn plain_modulus(mut self, t: u64) -> Self {
        self.plain_modulus = Some(t);
        self
    }

    /// Pick the largest batching prime of this size at build time.
    pub fn plain_modulus_bits(mut self, bits: u32) -> Self {
        self.plain_modulus_bits = Some(bits);
        self
    }

    pub fn security(mut self, level: SecurityLevel) -> Self {
        self.security = level;
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn build(self) -> Result<Parameters> {
        let given = (self.coeff_modulus.is_empty(), self.coeff_modulus_bits.is_empty());
        let coeff_modulus = match given {
            (false, true) => self.coeff_modulus,
            (true, false) => primes::generate_primes(&self.coeff_modulus_bits, self.ring_degree)?,
            (true, true) => {
                return Err(CipherfitError::Parameter("no coefficient modulus given".into()));
            }
            (false, false) => {
                return Err(CipherfitError::Parameter(
                    "give either explicit primes or prime sizes, not both".into(),
                ));
            }
        };

        let plain_modulus = match (self.plain_modulus, self.plain_modulus_bits) {
            (Some(_), Some(_)) => {
                return Err(CipherfitError::Parameter(
                    "give either a plain modulus or its size, not both".into(),
                ));
            }
            (Some(t), None) => Some(t),
            (None, Some(bits)) => Some(primes::batching_plain_modulus(bits, self.ring_degree)?),
            (None, None) => None,
        };

        let params = Parameters {
            scheme: self.scheme,
            ring_degree: self.ring_degree,
            coeff_modulus,
            plain_modulus,
            security: self.security,
            sigma: self.sigma,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Client-side knobs that do not affect the encryption parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Largest acceptable spread across slots that should all hold one value.
    pub precision_tolerance: f64,
    /// Encoding scale for fresh approximate plaintexts.
    pub scale: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            precision_tolerance: 1e-3,
            scale: presets::DEFAULT_SCALE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(bits: &[u32]) -> ParametersBuilder {
        ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus_bits(bits)
    }

    #[test]
    fn test_build_approximate() {
        let p = approx(&[40, 30, 39]).build().unwrap();
        assert_eq!(p.data_moduli().len(), 2);
        assert_eq!(p.max_level(), 1);
        assert_eq!(p.slot_count(), 2048);
        assert_eq!(p.total_coeff_modulus_bits(), 109);
    }

    #[test]
    fn test_rejects_insecure_chain() {
        let err = approx(&[40, 40, 40]).build().unwrap_err();
        assert!(matches!(err, CipherfitError::Parameter(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejects_structural_errors() {
        assert!(approx(&[50]).build().is_err());
        assert!(approx(&[40, 30, 30]).ring_degree(3000).build().is_err());
        assert!(approx(&[40, 30, 30]).plain_modulus(1032193).build().is_err());
        assert!(approx(&[40, 30, 30]).sigma(f64::NAN).build().is_err());
        assert!(ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus(vec![65537, 65537])
            .build()
            .is_err());
    }

    #[test]
    fn test_batched_needs_batching_prime() {
        let ok = ParametersBuilder::new(SchemeType::Batched)
            .ring_degree(4096)
            .coeff_modulus_bits(&[36, 36, 37])
            .plain_modulus_bits(20)
            .build()
            .unwrap();
        assert_eq!(ok.plain_modulus(), Some(1032193));
        assert_eq!(ok.slot_count(), 4096);

        let missing = ParametersBuilder::new(SchemeType::Batched)
            .ring_degree(4096)
            .coeff_modulus_bits(&[36, 36, 37])
            .build();
        assert!(missing.is_err());

        // 12289 ≡ 1 mod 4096 but not mod 8192
        let bad = ParametersBuilder::new(SchemeType::Batched)
            .ring_degree(4096)
            .coeff_modulus_bits(&[36, 36, 37])
            .plain_modulus(12289)
            .build();
        assert!(bad.is_err());
    }
}
