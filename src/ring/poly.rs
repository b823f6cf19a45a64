use crate::error::{CipherfitError, Result};
use crate::ring::modular::{
    barrett_constant, center, mod_add, mod_mul, mod_neg, mod_sub, reduce_signed,
};

/// Polynomial in coefficient representation over Z_q[X]/(X^n + 1).
#[derive(Clone, Debug)]
pub struct CoeffPoly {
    pub coeffs: Vec<u64>,
    pub modulus: u64,
}

impl CoeffPoly {
    pub fn zero(n: usize, modulus: u64) -> Self {
        Self { coeffs: vec![0u64; n], modulus }
    }

    /// Coefficients are reduced mod q.
    pub fn from_coeffs(coeffs: Vec<u64>, modulus: u64) -> Self {
        let coeffs = coeffs.into_iter().map(|c| c % modulus).collect();
        Self { coeffs, modulus }
    }

    /// Embed a signed integer polynomial into Z_q.
    pub fn from_signed(values: &[i64], modulus: u64) -> Self {
        let coeffs = values.iter().map(|&v| reduce_signed(v, modulus)).collect();
        Self { coeffs, modulus }
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() {
            return Err(CipherfitError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        if self.modulus != other.modulus {
            return Err(CipherfitError::ModulusMismatch);
        }
        Ok(())
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let coeffs = self.coeffs.iter()
            .zip(&other.coeffs)
            .map(|(&a, &b)| mod_add(a, b, self.modulus))
            .collect();
        Ok(Self { coeffs, modulus: self.modulus })
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let coeffs = self.coeffs.iter()
            .zip(&other.coeffs)
            .map(|(&a, &b)| mod_sub(a, b, self.modulus))
            .collect();
        Ok(Self { coeffs, modulus: self.modulus })
    }

    pub fn neg(&self) -> Self {
        let coeffs = self.coeffs.iter().map(|&a| mod_neg(a, self.modulus)).collect();
        Self { coeffs, modulus: self.modulus }
    }

    /// Schoolbook negacyclic product. Reference path for tests.
    pub fn mul_naive(&self, other: &Self) -> Result<Self> {
        self.check_compatible(other)?;
        let n = self.len();
        let q = self.modulus;
        let bk = barrett_constant(q);
        let mut result = vec![0u64; n];

        for (i, &a) in self.coeffs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in other.coeffs.iter().enumerate() {
                if b == 0 {
                    continue;
                }
                let prod = mod_mul(a, b, q, bk);
                let idx = i + j;
                if idx < n {
                    result[idx] = mod_add(result[idx], prod, q);
                } else {
                    // X^n = -1
                    result[idx - n] = mod_sub(result[idx - n], prod, q);
                }
            }
        }

        Ok(Self { coeffs: result, modulus: q })
    }

    /// Coefficients mapped to (-q/2, q/2].
    pub fn centered_coeffs(&self) -> Vec<i64> {
        self.coeffs.iter().map(|&c| center(c, self.modulus)).collect()
    }

    /// Apply σ_k: X → X^k.
    ///
    /// X^i goes to X^{ik mod 2n}; exponents landing in [n, 2n) wrap with a sign
    /// flip since X^n = -1. For odd k this is a ring automorphism.
    pub fn automorphism(&self, k: usize) -> Self {
        let n = self.len();
        let q = self.modulus;
        let mut result = vec![0u64; n];

        for (i, &c) in self.coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            let exp = (i * k) % (2 * n);
            if exp < n {
                result[exp] = mod_add(result[exp], c, q);
            } else {
                result[exp - n] = mod_sub(result[exp - n], c, q);
            }
        }

        Self { coeffs: result, modulus: q }
    }
}

impl PartialEq for CoeffPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.coeffs == other.coeffs
    }
}
