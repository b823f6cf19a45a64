use std::collections::HashMap;
use std::sync::Arc;

use num_traits::ToPrimitive;

use crate::context::Context;
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::params::SchemeType;
use crate::ring::modular::{barrett_constant, center, mod_mul, reduce_signed};
use crate::ring::ntt::NttPoly;
use crate::ring::rns::RnsPoly;

/// Packs n integers mod t as a 2 × n/2 matrix.
///
/// Row 0, column j sits at the root ψ^{3^j}; row 1 at ψ^{-3^j}. The Galois
/// element 3 rotates both rows left by one column and 2n-1 swaps the rows.
#[derive(Clone, Debug)]
pub struct BatchEncoder {
    context: Arc<Context>,
    plain_modulus: u64,
    /// slot → NTT evaluation index under the plain-modulus plan
    index_map: Vec<usize>,
}

impl BatchEncoder {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let unsupported = CipherfitError::Unsupported {
            op: "BatchEncoder",
            scheme: context.scheme(),
        };
        if context.scheme() != SchemeType::Batched {
            return Err(unsupported);
        }
        let (Some(t), Some(plan)) = (context.plain_modulus(), context.plain_plan()) else {
            return Err(unsupported);
        };
        let n = context.ring_degree();
        let two_n = 2 * n;

        // the transform of X lists the root behind each evaluation index
        let mut x = vec![0u64; n];
        x[1] = 1;
        let roots = NttPoly::from_coeffs(x, plan.clone()).evals;

        let psi = roots[0];
        let bk = barrett_constant(t);
        let mut exponent_of = HashMap::with_capacity(n);
        let psi_sq = mod_mul(psi, psi, t, bk);
        let mut power = psi;
        for e in (1..two_n).step_by(2) {
            exponent_of.insert(power, e);
            power = mod_mul(power, psi_sq, t, bk);
        }
        let mut index_of_exponent = vec![usize::MAX; two_n];
        for (idx, root) in roots.iter().enumerate() {
            let e = *exponent_of.get(root).ok_or_else(|| {
                CipherfitError::Parameter("plain modulus NTT is not negacyclic".into())
            })?;
            index_of_exponent[e] = idx;
        }

        let row = n / 2;
        let mut index_map = vec![0usize; n];
        let mut g = 1usize;
        for j in 0..row {
            index_map[j] = index_of_exponent[g];
            index_map[j + row] = index_of_exponent[two_n - g];
            g = (g * 3) % two_n;
        }

        Ok(Self { context, plain_modulus: t, index_map })
    }

    pub fn slot_count(&self) -> usize {
        self.index_map.len()
    }

    pub fn row_size(&self) -> usize {
        self.index_map.len() / 2
    }

    pub fn plain_modulus(&self) -> u64 {
        self.plain_modulus
    }

    /// Encode signed values (reduced mod t) at the top level.
    pub fn encode(&self, values: &[i64]) -> Result<Plaintext> {
        self.encode_at(values, 0)
    }

    pub fn encode_at(&self, values: &[i64], level: usize) -> Result<Plaintext> {
        if values.len() > self.slot_count() {
            return Err(CipherfitError::DimensionMismatch {
                expected: self.slot_count(),
                got: values.len(),
            });
        }
        let t = self.plain_modulus;
        let mut evals = vec![0u64; self.slot_count()];
        for (slot, &v) in values.iter().enumerate() {
            evals[self.index_map[slot]] = reduce_signed(v, t);
        }
        let plan = self.plain_plan()?;
        let m = NttPoly { evals, modulus: t, plan: plan.clone() }.to_coeffs();
        self.plaintext_from_plain_coeffs(&m, level)
    }

    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<i64>> {
        let t = self.plain_modulus;
        Ok(self.decode_unsigned(plain)?
            .into_iter()
            .map(|v| center(v, t))
            .collect())
    }

    /// Slot values in [0, t).
    pub fn decode_unsigned(&self, plain: &Plaintext) -> Result<Vec<u64>> {
        let coeffs = self.plain_coeffs(plain)?;
        let plan = self.plain_plan()?;
        let evals = NttPoly::from_coeffs(coeffs, plan.clone()).evals;
        Ok(self.index_map.iter().map(|&idx| evals[idx]).collect())
    }

    /// One character code per slot.
    pub fn encode_string(&self, text: &str) -> Result<Plaintext> {
        let mut codes = Vec::with_capacity(text.len());
        for ch in text.chars() {
            let code = ch as u64;
            if code >= self.plain_modulus {
                return Err(CipherfitError::Encoding(format!(
                    "character {ch:?} exceeds the plain modulus"
                )));
            }
            codes.push(code as i64);
        }
        self.encode(&codes)
    }

    /// Inverse of `encode_string`; stops at the first empty slot.
    pub fn decode_string(&self, plain: &Plaintext) -> Result<String> {
        self.decode_unsigned(plain)?
            .into_iter()
            .take_while(|&c| c != 0)
            .map(|c| {
                u32::try_from(c).ok().and_then(char::from_u32).ok_or_else(|| {
                    CipherfitError::Encoding(format!("slot value {c} is not a character"))
                })
            })
            .collect()
    }

    fn plain_plan(&self) -> Result<&Arc<concrete_ntt::prime64::Plan>> {
        self.context.plain_plan().ok_or(CipherfitError::Unsupported {
            op: "BatchEncoder",
            scheme: self.context.scheme(),
        })
    }

    /// Polynomial coefficients mod t held by `plain`.
    pub(crate) fn plain_coeffs(&self, plain: &Plaintext) -> Result<Vec<u64>> {
        let level_ctx = self.context.level(plain.level)?;
        if level_ctx.parms_id != plain.parms_id {
            return Err(CipherfitError::LevelMismatch(
                "plaintext does not belong to this context".into(),
            ));
        }
        let t = self.plain_modulus;
        let centered = plain.poly.to_centered_bigints(&level_ctx.basis)?;
        Ok(centered.iter()
            .map(|c| {
                let r = c % t as i64;
                reduce_signed(r.to_i64().unwrap_or(0), t)
            })
            .collect())
    }

    pub(crate) fn plaintext_from_plain_coeffs(
        &self,
        coeffs: &[u64],
        level: usize,
    ) -> Result<Plaintext> {
        lift_plain_coeffs(&self.context, coeffs, level)
    }
}

/// Lift coefficients mod t to their centered representatives at `level`.
pub(crate) fn lift_plain_coeffs(
    context: &Context,
    coeffs: &[u64],
    level: usize,
) -> Result<Plaintext> {
    let t = context.plain_modulus().ok_or(CipherfitError::Unsupported {
        op: "batched plaintext",
        scheme: context.scheme(),
    })?;
    let level_ctx = context.level(level)?;
    let centered: Vec<i64> = coeffs.iter().map(|&c| center(c % t, t)).collect();
    let poly = RnsPoly::from_signed(&centered, &level_ctx.basis)?;
    Ok(Plaintext { poly, parms_id: level_ctx.parms_id, level, scale: 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{presets, SecurityLevel};

    fn encoder() -> BatchEncoder {
        let ctx = Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap();
        BatchEncoder::new(ctx).unwrap()
    }

    #[test]
    fn test_roundtrip_signed() {
        let enc = encoder();
        let values: Vec<i64> = vec![1, -2, 3, 500_000, -500_000, 0, 42];
        let plain = enc.encode(&values).unwrap();
        let decoded = enc.decode(&plain).unwrap();
        assert_eq!(&decoded[..values.len()], &values[..]);
        assert!(decoded[values.len()..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_slot_products_are_pointwise() {
        let enc = encoder();
        let a = enc.encode(&[2, 3, 4]).unwrap();
        let b = enc.encode(&[5, 6, 7]).unwrap();
        let t = enc.plain_modulus();
        let plan = enc.context.plain_plan().unwrap().clone();
        let pa = NttPoly::from_coeffs(enc.plain_coeffs(&a).unwrap(), plan.clone());
        let pb = NttPoly::from_coeffs(enc.plain_coeffs(&b).unwrap(), plan);
        let prod = pa.mul(&pb).unwrap().to_coeffs();
        let plain = enc.plaintext_from_plain_coeffs(&prod, 0).unwrap();
        let decoded = enc.decode(&plain).unwrap();
        assert_eq!(&decoded[..3], &[10, 18, 28]);
        assert_eq!(t, 1032193);
    }

    #[test]
    fn test_automorphism_rotates_rows() {
        let enc = encoder();
        let row = enc.row_size();
        let mut values = vec![0i64; enc.slot_count()];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as i64 + 1;
        }
        let plain = enc.encode(&values).unwrap();
        let rotated_coeffs = crate::ring::poly::CoeffPoly::from_coeffs(
            enc.plain_coeffs(&plain).unwrap(),
            enc.plain_modulus(),
        )
        .automorphism(3)
        .coeffs;
        let rotated = enc.plaintext_from_plain_coeffs(&rotated_coeffs, 0).unwrap();
        let rotated = enc.decode(&rotated).unwrap();
        assert_eq!(rotated[0], 2);
        assert_eq!(rotated[row - 1], 1);
        assert_eq!(rotated[row], row as i64 + 2);

        let swapped_coeffs = crate::ring::poly::CoeffPoly::from_coeffs(
            enc.plain_coeffs(&plain).unwrap(),
            enc.plain_modulus(),
        )
        .automorphism(2 * 4096 - 1)
        .coeffs;
        let swapped = enc.plaintext_from_plain_coeffs(&swapped_coeffs, 0).unwrap();
        let swapped = enc.decode(&swapped).unwrap();
        assert_eq!(swapped[0], row as i64 + 1);
    }

    #[test]
    fn test_string_roundtrip() {
        let enc = encoder();
        let plain = enc.encode_string("héllo").unwrap();
        assert_eq!(enc.decode_string(&plain).unwrap(), "héllo");
    }
}
