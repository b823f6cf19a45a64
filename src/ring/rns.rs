use std::sync::Arc;
use concrete_ntt::prime64::Plan;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, ToPrimitive, Zero};
use rayon::prelude::*;

use crate::error::{CipherfitError, Result};
use crate::ring::modular::{barrett_constant, center, mod_inv, mod_mul};
use crate::ring::ntt::{make_plan, NttPoly};
use crate::ring::poly::CoeffPoly;

/// Polynomial in RNS representation: one NTT-form residue per prime.
///
/// The polynomial lives in Z_Q[X]/(X^n+1) with Q = ∏ q_i.
#[derive(Clone, Debug)]
pub struct RnsPoly {
    pub components: Vec<NttPoly>,
    pub ring_degree: usize,
}

/// Precomputed data for an RNS basis.
#[derive(Clone, Debug)]
pub struct RnsBasis {
    pub moduli: Vec<u64>,
    pub plans: Vec<Arc<Plan>>,
    pub ring_degree: usize,
    pub barrett_ks: Vec<u64>,
    /// (Q/q_i)^{-1} mod q_i
    pub q_star_inv: Vec<u64>,
    /// Q/q_i
    q_star: Vec<BigUint>,
    product: BigUint,
}

impl RnsBasis {
    /// Build a basis, creating an NTT plan per prime.
    pub fn new(moduli: Vec<u64>, ring_degree: usize) -> Result<Self> {
        let plans = moduli.iter()
            .map(|&q| make_plan(ring_degree, q))
            .collect::<Result<Vec<_>>>()?;
        Self::from_plans(plans, ring_degree)
    }

    /// Build a basis over already-created plans (shared between levels).
    pub fn from_plans(plans: Vec<Arc<Plan>>, ring_degree: usize) -> Result<Self> {
        if plans.is_empty() {
            return Err(CipherfitError::Parameter("empty RNS basis".into()));
        }
        let moduli: Vec<u64> = plans.iter().map(|p| p.modulus()).collect();
        let barrett_ks: Vec<u64> = moduli.iter().map(|&q| barrett_constant(q)).collect();

        let product: BigUint = moduli.iter().map(|&q| BigUint::from(q)).product();
        let q_star: Vec<BigUint> = moduli.iter().map(|&q| &product / q).collect();

        let q_star_inv = moduli.iter()
            .zip(&q_star)
            .map(|(&qi, star)| {
                let residue = (star % qi).to_u64().unwrap_or(0);
                mod_inv(residue, qi).ok_or_else(|| CipherfitError::Parameter(format!(
                    "RNS moduli are not pairwise coprime (q = {qi})"
                )))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { moduli, plans, ring_degree, barrett_ks, q_star_inv, q_star, product })
    }

    pub fn num_moduli(&self) -> usize {
        self.moduli.len()
    }

    /// Q = ∏ q_i
    pub fn modulus_product(&self) -> &BigUint {
        &self.product
    }

    /// Basis over the first `k` primes.
    pub fn prefix(&self, k: usize) -> Result<Self> {
        if k == 0 || k > self.num_moduli() {
            return Err(CipherfitError::DimensionMismatch { expected: self.num_moduli(), got: k });
        }
        Self::from_plans(self.plans[..k].to_vec(), self.ring_degree)
    }

    /// CRT-reconstruct one coefficient, centered in (-Q/2, Q/2].
    ///
    /// `residues[i]` is the coefficient mod `q_i` in [0, q_i).
    pub fn reconstruct_centered(&self, residues: &[u64]) -> BigInt {
        let mut acc = BigUint::zero();
        for (i, &r) in residues.iter().enumerate() {
            let t = mod_mul(r, self.q_star_inv[i], self.moduli[i], self.barrett_ks[i]);
            acc += &self.q_star[i] * t;
        }
        acc %= &self.product;
        let half = &self.product >> 1u32;
        if acc > half {
            BigInt::from(acc) - BigInt::from(self.product.clone())
        } else {
            BigInt::from(acc)
        }
    }
}

impl RnsPoly {
    pub fn zero(basis: &RnsBasis) -> Self {
        let components = basis.moduli.iter()
            .zip(&basis.plans)
            .map(|(&q, plan)| NttPoly::zero(basis.ring_degree, q, plan.clone()))
            .collect();
        Self { components, ring_degree: basis.ring_degree }
    }

    /// Embed a signed small polynomial into every prime of the basis.
    pub fn from_signed(values: &[i64], basis: &RnsBasis) -> Result<Self> {
        if values.len() != basis.ring_degree {
            return Err(CipherfitError::DimensionMismatch {
                expected: basis.ring_degree,
                got: values.len(),
            });
        }
        let components = basis.plans.iter()
            .map(|plan| NttPoly::from_signed(values, plan.clone()))
            .collect();
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Embed arbitrary-size signed integer coefficients.
    pub fn from_bigints(values: &[BigInt], basis: &RnsBasis) -> Result<Self> {
        if values.len() != basis.ring_degree {
            return Err(CipherfitError::DimensionMismatch {
                expected: basis.ring_degree,
                got: values.len(),
            });
        }
        let components = basis.plans.par_iter()
            .map(|plan| {
                let q = plan.modulus();
                let big_q = BigInt::from(q);
                let coeffs = values.iter()
                    .map(|v| {
                        let r: BigInt = v % &big_q;
                        let r = if r.is_negative() { r + &big_q } else { r };
                        r.to_u64().unwrap_or(0)
                    })
                    .collect();
                NttPoly::from_coeffs(coeffs, plan.clone())
            })
            .collect();
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    /// Build from per-prime residues in NTT form, checking shape and range.
    pub fn from_ntt_residues(residues: Vec<Vec<u64>>, basis: &RnsBasis) -> Result<Self> {
        if residues.len() != basis.num_moduli() {
            return Err(CipherfitError::DimensionMismatch {
                expected: basis.num_moduli(),
                got: residues.len(),
            });
        }
        let mut components = Vec::with_capacity(residues.len());
        for (evals, plan) in residues.into_iter().zip(&basis.plans) {
            let q = plan.modulus();
            if evals.len() != basis.ring_degree {
                return Err(CipherfitError::DimensionMismatch {
                    expected: basis.ring_degree,
                    got: evals.len(),
                });
            }
            if evals.iter().any(|&e| e >= q) {
                return Err(CipherfitError::InvalidInput(format!(
                    "residue out of range for prime {q}"
                )));
            }
            components.push(NttPoly { evals, modulus: q, plan: plan.clone() });
        }
        Ok(Self { components, ring_degree: basis.ring_degree })
    }

    pub fn to_ntt_residues(&self) -> Vec<Vec<u64>> {
        self.components.iter().map(|c| c.evals.clone()).collect()
    }

    /// Inverse-transform every component.
    pub fn to_coeff_polys(&self) -> Vec<CoeffPoly> {
        self.components.par_iter().map(|c| c.to_coeff_poly()).collect()
    }

    /// Centered CRT reconstruction of every coefficient.
    pub fn to_centered_bigints(&self, basis: &RnsBasis) -> Result<Vec<BigInt>> {
        self.check_basis(basis)?;
        let coeff = self.to_coeff_polys();
        let out = (0..self.ring_degree)
            .into_par_iter()
            .map(|pos| {
                let residues: Vec<u64> = coeff.iter().map(|c| c.coeffs[pos]).collect();
                basis.reconstruct_centered(&residues)
            })
            .collect();
        Ok(out)
    }

    /// Centered coefficients as floats; used by approximate decoding.
    pub fn to_centered_f64(&self, basis: &RnsBasis) -> Result<Vec<f64>> {
        Ok(self.to_centered_bigints(basis)?
            .iter()
            .map(|v| v.to_f64().unwrap_or(f64::NAN))
            .collect())
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn moduli(&self) -> Vec<u64> {
        self.components.iter().map(|c| c.modulus).collect()
    }

    fn check_basis(&self, basis: &RnsBasis) -> Result<()> {
        if self.num_components() != basis.num_moduli() {
            return Err(CipherfitError::DimensionMismatch {
                expected: basis.num_moduli(),
                got: self.num_components(),
            });
        }
        if self.components.iter().zip(&basis.moduli).any(|(c, &q)| c.modulus != q) {
            return Err(CipherfitError::ModulusMismatch);
        }
        Ok(())
    }

    fn check_shape(&self, other: &Self) -> Result<()> {
        if self.components.len() != other.components.len() {
            return Err(CipherfitError::DimensionMismatch {
                expected: self.components.len(),
                got: other.components.len(),
            });
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_shape(other)?;
        self.components.iter_mut()
            .zip(&other.components)
            .try_for_each(|(a, b)| a.add_assign(b))
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_shape(other)?;
        self.components.iter_mut()
            .zip(&other.components)
            .try_for_each(|(a, b)| a.sub_assign(b))
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.add_assign(other)?;
        Ok(out)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.sub_assign(other)?;
        Ok(out)
    }

    pub fn neg(&self) -> Self {
        let components = self.components.iter().map(|a| a.neg()).collect();
        Self { components, ring_degree: self.ring_degree }
    }

    /// Component-wise product (= polynomial product mod Q).
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.check_shape(other)?;
        let components = self.components.par_iter()
            .zip(other.components.par_iter())
            .map(|(a, b)| a.mul(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    /// Multiply by an integer constant given by its residue per prime.
    pub fn scalar_mul_residues(&self, residues: &[u64]) -> Result<Self> {
        if residues.len() != self.components.len() {
            return Err(CipherfitError::DimensionMismatch {
                expected: self.components.len(),
                got: residues.len(),
            });
        }
        let mut out = self.clone();
        for (c, &r) in out.components.iter_mut().zip(residues) {
            c.scalar_mul_assign(r);
        }
        Ok(out)
    }

    /// Drop the last prime without touching the value (valid when |x| < Q'/2).
    pub fn drop_last(&self) -> Result<Self> {
        if self.components.len() < 2 {
            return Err(CipherfitError::DepthExceeded("no prime left to drop".into()));
        }
        let mut components = self.components.clone();
        components.pop();
        Ok(Self { components, ring_degree: self.ring_degree })
    }

    /// round(x / q_last) over the remaining primes.
    ///
    /// With r the centered residue of x mod q_last, the result is
    /// (x - r) · q_last^{-1} mod q_j for every remaining q_j.
    pub fn divide_round_by_last(&self) -> Result<Self> {
        let (last, rest) = self.components.split_last()
            .ok_or(CipherfitError::DepthExceeded("empty RNS polynomial".into()))?;
        if rest.is_empty() {
            return Err(CipherfitError::DepthExceeded("no prime left after division".into()));
        }
        let q_last = last.modulus;
        let centered: Vec<i64> = last.to_coeffs()
            .into_iter()
            .map(|c| center(c, q_last))
            .collect();

        let components = rest.par_iter()
            .map(|comp| {
                let qj = comp.modulus;
                let inv = mod_inv(q_last % qj, qj).ok_or(CipherfitError::ModulusMismatch)?;
                let r = NttPoly::from_signed(&centered, comp.plan.clone());
                let mut out = comp.sub(&r)?;
                out.scalar_mul_assign(inv);
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { components, ring_degree: self.ring_degree })
    }

    /// Apply X → X^k to every component.
    pub fn automorphism(&self, k: usize) -> Self {
        let components = self.components.par_iter()
            .map(|c| {
                let permuted = c.to_coeff_poly().automorphism(k);
                NttPoly::from_coeffs(permuted.coeffs, c.plan.clone())
            })
            .collect();
        Self { components, ring_degree: self.ring_degree }
    }

    pub fn is_zero(&self) -> bool {
        self.components.iter().all(|c| c.is_zero())
    }
}

impl PartialEq for RnsPoly {
    fn eq(&self, other: &Self) -> bool {
        self.ring_degree == other.ring_degree && self.components == other.components
    }
}

/// Product of `moduli` as a big integer.
pub fn modulus_product(moduli: &[u64]) -> BigUint {
    moduli.iter().fold(BigUint::one(), |acc, &q| acc * q)
}
