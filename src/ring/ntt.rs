use std::sync::Arc;
use concrete_ntt::prime64::Plan;

use crate::error::{CipherfitError, Result};
use crate::ring::modular::{barrett_constant, mod_add, mod_mul, mod_neg, mod_sub, reduce_signed};
use crate::ring::poly::CoeffPoly;

/// Polynomial in NTT (evaluation) representation over Z_q[X]/(X^n + 1).
///
/// Uses `concrete-ntt` for the transforms. Pointwise products stay unnormalized;
/// `plan.normalize` is applied on the way back to coefficients.
#[derive(Clone, Debug)]
pub struct NttPoly {
    pub evals: Vec<u64>,
    pub modulus: u64,
    pub plan: Arc<Plan>,
}

/// Build a negacyclic NTT plan; q must be prime and ≡ 1 (mod 2n).
pub fn make_plan(n: usize, modulus: u64) -> Result<Arc<Plan>> {
    if !n.is_power_of_two() || n < 16 {
        return Err(CipherfitError::Parameter(format!(
            "ring degree must be a power of two >= 16, got {n}"
        )));
    }
    let plan = Plan::try_new(n, modulus).ok_or_else(|| CipherfitError::Parameter(format!(
        "cannot create NTT plan for n={n}, q={modulus} (need prime q ≡ 1 mod {})",
        2 * n
    )))?;
    Ok(Arc::new(plan))
}

impl NttPoly {
    pub fn zero(n: usize, modulus: u64, plan: Arc<Plan>) -> Self {
        Self { evals: vec![0u64; n], modulus, plan }
    }

    /// Forward transform of coefficients already reduced mod q.
    pub fn from_coeffs(mut coeffs: Vec<u64>, plan: Arc<Plan>) -> Self {
        plan.fwd(&mut coeffs);
        Self { evals: coeffs, modulus: plan.modulus(), plan }
    }

    pub fn from_coeff_poly(poly: &CoeffPoly, plan: Arc<Plan>) -> Result<Self> {
        if poly.modulus != plan.modulus() {
            return Err(CipherfitError::ModulusMismatch);
        }
        Ok(Self::from_coeffs(poly.coeffs.clone(), plan))
    }

    /// Forward transform of a signed small-integer polynomial.
    pub fn from_signed(values: &[i64], plan: Arc<Plan>) -> Self {
        let q = plan.modulus();
        let coeffs = values.iter().map(|&v| reduce_signed(v, q)).collect();
        Self::from_coeffs(coeffs, plan)
    }

    pub fn to_coeffs(&self) -> Vec<u64> {
        let mut coeffs = self.evals.clone();
        self.plan.inv(&mut coeffs);
        self.plan.normalize(&mut coeffs);
        coeffs
    }

    pub fn to_coeff_poly(&self) -> CoeffPoly {
        CoeffPoly { coeffs: self.to_coeffs(), modulus: self.modulus }
    }

    pub fn len(&self) -> usize {
        self.evals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evals.is_empty()
    }

    fn check_compatible(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() || self.modulus != other.modulus {
            return Err(CipherfitError::ModulusMismatch);
        }
        Ok(())
    }

    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_add(*a, b, q);
        }
        Ok(())
    }

    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_sub(*a, b, q);
        }
        Ok(())
    }

    /// Pointwise product (= negacyclic polynomial product).
    pub fn mul_assign(&mut self, other: &Self) -> Result<()> {
        self.check_compatible(other)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        for (a, &b) in self.evals.iter_mut().zip(&other.evals) {
            *a = mod_mul(*a, b, q, bk);
        }
        Ok(())
    }

    /// self += a * b, pointwise.
    pub fn mul_acc(&mut self, a: &Self, b: &Self) -> Result<()> {
        self.check_compatible(a)?;
        self.check_compatible(b)?;
        let q = self.modulus;
        let bk = barrett_constant(q);
        for ((acc, &x), &y) in self.evals.iter_mut().zip(&a.evals).zip(&b.evals) {
            *acc = mod_add(*acc, mod_mul(x, y, q, bk), q);
        }
        Ok(())
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

    pub fn mul(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        out.mul_assign(other)?;
        Ok(out)
    }

    pub fn neg(&self) -> Self {
        let evals = self.evals.iter().map(|&a| mod_neg(a, self.modulus)).collect();
        Self { evals, modulus: self.modulus, plan: self.plan.clone() }
    }

    pub fn scalar_mul_assign(&mut self, scalar: u64) {
        let q = self.modulus;
        let s = scalar % q;
        let bk = barrett_constant(q);
        for a in self.evals.iter_mut() {
            *a = mod_mul(*a, s, q, bk);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.evals.iter().all(|&e| e == 0)
    }
}

impl PartialEq for NttPoly {
    fn eq(&self, other: &Self) -> bool {
        self.modulus == other.modulus && self.evals == other.evals
    }
}
