//! Homomorphic evaluation.
//!
//! Every operation checks its preconditions (matching `ParmsId`, matching
//! scale, ciphertext size, remaining depth) before it touches a residue, so a
//! misaligned pipeline fails loudly instead of decrypting to garbage.

pub mod keyswitch;
pub mod modswitch;
pub mod rotate;
pub mod tensor;

use std::sync::Arc;

use num_traits::ToPrimitive;
use tracing::instrument;

use crate::ciphertext::Ciphertext;
use crate::context::{Context, LevelContext};
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::keys::RelinKeys;
use crate::params::SchemeType;
use crate::ring::rns::RnsPoly;

/// Relative scale difference tolerated by add and sub.
pub const SCALE_TOLERANCE: f64 = 1e-9;
/// Relative scale difference `set_scale` may paper over.
pub const SET_SCALE_TOLERANCE: f64 = 1e-4;

/// Stateless evaluator over a shared context. Holds no key material.
#[derive(Clone, Debug)]
pub struct Evaluator {
    context: Arc<Context>,
}

impl Evaluator {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// ct_out = a + b. Sizes may differ; the shorter operand is padded.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        let len = a.polys.len().max(b.polys.len());
        let mut polys = Vec::with_capacity(len);
        for i in 0..len {
            match (a.polys.get(i), b.polys.get(i)) {
                (Some(x), Some(y)) => polys.push(x.add(y)?),
                (Some(x), None) | (None, Some(x)) => polys.push(x.clone()),
                (None, None) => {}
            }
        }
        Ok(Ciphertext { polys, ..a.clone_header() })
    }

    /// ct_out = a - b.
    pub fn sub(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        self.check_pair(a, b)?;
        let len = a.polys.len().max(b.polys.len());
        let mut polys = Vec::with_capacity(len);
        for i in 0..len {
            match (a.polys.get(i), b.polys.get(i)) {
                (Some(x), Some(y)) => polys.push(x.sub(y)?),
                (Some(x), None) => polys.push(x.clone()),
                (None, Some(y)) => polys.push(y.neg()),
                (None, None) => {}
            }
        }
        Ok(Ciphertext { polys, ..a.clone_header() })
    }

    pub fn negate(&self, ct: &Ciphertext) -> Ciphertext {
        Ciphertext {
            polys: ct.polys.iter().map(RnsPoly::neg).collect(),
            ..ct.clone_header()
        }
    }

    /// Sum of a non-empty list of ciphertexts sharing level and scale.
    pub fn add_many(&self, cts: &[Ciphertext]) -> Result<Ciphertext> {
        let (first, rest) = cts.split_first().ok_or_else(|| {
            CipherfitError::InvalidInput("add_many needs at least one ciphertext".into())
        })?;
        rest.iter().try_fold(first.clone(), |acc, ct| self.add(&acc, ct))
    }

    pub fn add_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let term = self.plain_term(ct, plain)?;
        let mut out = ct.clone();
        out.polys[0].add_assign(&term)?;
        Ok(out)
    }

    pub fn sub_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let term = self.plain_term(ct, plain)?;
        let mut out = ct.clone();
        out.polys[0].sub_assign(&term)?;
        Ok(out)
    }

    /// Tensor product; the result has size 2 and scale scale(a)·scale(b).
    #[instrument(skip_all)]
    pub fn multiply(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        if a.parms_id != b.parms_id {
            return Err(level_mismatch(a, b));
        }
        for ct in [a, b] {
            if ct.size() != 1 {
                return Err(CipherfitError::InvalidSize { expected: 1, got: ct.size() });
            }
        }
        let level_ctx = self.level_of(a)?;
        let scale = a.scale * b.scale;

        let polys = match self.context.scheme() {
            SchemeType::Approximate => {
                check_scale_fits(level_ctx, scale)?;
                let (a0, a1) = (&a.polys[0], &a.polys[1]);
                let (b0, b1) = (&b.polys[0], &b.polys[1]);
                let mut cross = a0.mul(b1)?;
                cross.add_assign(&a1.mul(b0)?)?;
                vec![a0.mul(b0)?, cross, a1.mul(b1)?]
            }
            SchemeType::Batched => {
                tensor::exact_tensor(&self.context, level_ctx, &a.polys, &b.polys)?
            }
        };
        Ok(Ciphertext { polys, parms_id: a.parms_id, level: a.level, scale })
    }

    pub fn square(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.multiply(ct, ct)
    }

    /// ct × plain; size is unchanged and the scales multiply.
    #[instrument(skip_all)]
    pub fn multiply_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        if ct.parms_id != plain.parms_id {
            return Err(CipherfitError::LevelMismatch(format!(
                "ciphertext at level {} but plaintext at level {}", ct.level, plain.level
            )));
        }
        let level_ctx = self.level_of(ct)?;
        let scale = ct.scale * plain.scale;
        if self.context.scheme() == SchemeType::Approximate {
            check_scale_fits(level_ctx, scale)?;
        }
        let polys = ct.polys.iter()
            .map(|c| c.mul(&plain.poly))
            .collect::<Result<Vec<_>>>()?;
        Ok(Ciphertext { polys, scale, ..ct.clone_header() })
    }

    /// (c0, c1, c2) → (c0, c1) + switch_key(c2, s² → s).
    #[instrument(skip_all)]
    pub fn relinearize(&self, ct: &Ciphertext, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        if ct.size() != 2 {
            return Err(CipherfitError::InvalidSize { expected: 2, got: ct.size() });
        }
        if relin_keys.parms_id != self.context.key_parms_id() {
            return Err(CipherfitError::LevelMismatch(
                "relinearization keys belong to different parameters".into(),
            ));
        }
        let level_ctx = self.level_of(ct)?;
        let (d0, d1) = self.switch_key(&ct.polys[2], &relin_keys.key, level_ctx)?;
        let c0 = ct.polys[0].add(&d0)?;
        let c1 = ct.polys[1].add(&d1)?;
        Ok(Ciphertext { polys: vec![c0, c1], ..ct.clone_header() })
    }

    /// Overwrite the scale tag when it is already within `SET_SCALE_TOLERANCE`.
    pub fn set_scale(&self, ct: &Ciphertext, scale: f64) -> Result<Ciphertext> {
        if !scales_close(ct.scale, scale, SET_SCALE_TOLERANCE) {
            return Err(CipherfitError::LevelMismatch(format!(
                "scale {:e} is too far from {:e} to be re-tagged", ct.scale, scale
            )));
        }
        let mut out = ct.clone();
        out.scale = scale;
        Ok(out)
    }

    pub(crate) fn level_of(&self, ct: &Ciphertext) -> Result<&LevelContext> {
        let level_ctx = self.context.level(ct.level)?;
        if level_ctx.parms_id != ct.parms_id {
            return Err(CipherfitError::LevelMismatch(
                "ciphertext does not belong to this context".into(),
            ));
        }
        Ok(level_ctx)
    }

    fn check_pair(&self, a: &Ciphertext, b: &Ciphertext) -> Result<()> {
        if a.parms_id != b.parms_id {
            return Err(level_mismatch(a, b));
        }
        self.level_of(a)?;
        if !scales_close(a.scale, b.scale, SCALE_TOLERANCE) {
            return Err(CipherfitError::LevelMismatch(format!(
                "scales {:e} and {:e} differ; align them first", a.scale, b.scale
            )));
        }
        Ok(())
    }

    /// The polynomial a plaintext contributes to c0.
    fn plain_term(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<RnsPoly> {
        if ct.parms_id != plain.parms_id {
            return Err(CipherfitError::LevelMismatch(format!(
                "ciphertext at level {} but plaintext at level {}", ct.level, plain.level
            )));
        }
        let level_ctx = self.level_of(ct)?;
        match self.context.scheme() {
            SchemeType::Approximate => {
                if !scales_close(ct.scale, plain.scale, SCALE_TOLERANCE) {
                    return Err(CipherfitError::LevelMismatch(format!(
                        "plaintext scale {:e} differs from ciphertext scale {:e}",
                        plain.scale, ct.scale
                    )));
                }
                Ok(plain.poly.clone())
            }
            SchemeType::Batched => plain.poly.scalar_mul_residues(&level_ctx.delta_residues),
        }
    }
}

impl Ciphertext {
    /// Same tags, no polynomials.
    fn clone_header(&self) -> Ciphertext {
        Ciphertext {
            polys: Vec::new(),
            parms_id: self.parms_id,
            level: self.level,
            scale: self.scale,
        }
    }
}

fn level_mismatch(a: &Ciphertext, b: &Ciphertext) -> CipherfitError {
    CipherfitError::LevelMismatch(format!(
        "operands at levels {} and {}; mod switch one of them first", a.level, b.level
    ))
}

fn scales_close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs())
}

/// A product scale must stay below the level modulus or the message wraps.
fn check_scale_fits(level_ctx: &LevelContext, scale: f64) -> Result<()> {
    let modulus = level_ctx.modulus_product().to_f64().unwrap_or(f64::INFINITY);
    if !scale.is_finite() || scale >= modulus {
        return Err(CipherfitError::DepthExceeded(format!(
            "scale 2^{:.1} exceeds the level {} modulus 2^{:.1}",
            scale.log2(), level_ctx.level, modulus.log2()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoding::{BatchEncoder, CkksEncoder};
    use crate::encrypt::{Decryptor, Encryptor};
    use crate::keys::{GaloisKeys, KeyGenerator};
    use crate::params::{ParametersBuilder, presets, SecurityLevel};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    pub(crate) struct Fixture {
        pub ctx: Arc<Context>,
        pub encryptor: Encryptor,
        pub decryptor: Decryptor,
        pub relin: RelinKeys,
        pub galois: GaloisKeys,
        pub evaluator: Evaluator,
        pub rng: ChaCha20Rng,
    }

    pub(crate) fn fixture(ctx: Arc<Context>) -> Fixture {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();
        let relin = keygen.create_relin_keys_with_rng(&mut rng).unwrap();
        let galois = keygen.create_galois_keys_with_rng(&mut rng).unwrap();
        Fixture {
            encryptor: Encryptor::new(ctx.clone(), pk).unwrap(),
            decryptor: Decryptor::new(ctx.clone(), keygen.secret_key().clone()).unwrap(),
            relin,
            galois,
            evaluator: Evaluator::new(ctx.clone()),
            ctx,
            rng,
        }
    }

    /// n = 4096 with data primes 40, 30 and a 39-bit special prime.
    pub(crate) fn small_ckks() -> Arc<Context> {
        let params = ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus_bits(&[40, 30, 39])
            .build()
            .unwrap();
        Context::new(params).unwrap()
    }

    pub(crate) fn batched() -> Arc<Context> {
        Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap()
    }

    fn close(a: &[f64], b: &[f64], tol: f64) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_ckks_add_sub_negate() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let scale = (1u64 << 30) as f64;
        let plain = enc.encode(&[1.5, 2.0], scale, 0).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[0.25, -4.0], scale, 0).unwrap();
        let b = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();

        let sum = f.evaluator.add(&a, &b).unwrap();
        let diff = f.evaluator.sub(&a, &b).unwrap();
        let neg = f.evaluator.negate(&a);
        let dec = |ct: &Ciphertext| enc.decode(&f.decryptor.decrypt(ct).unwrap()).unwrap();
        close(&dec(&sum), &[1.75, -2.0], 1e-3);
        close(&dec(&diff), &[1.25, 6.0], 1e-3);
        close(&dec(&neg), &[-1.5, -2.0], 1e-3);

        let plain = enc.encode(&[10.0], scale, 0).unwrap();
        close(&dec(&f.evaluator.add_plain(&a, &plain).unwrap()), &[11.5, 2.0], 1e-3);
        close(&dec(&f.evaluator.sub_plain(&a, &plain).unwrap()), &[-8.5, 2.0], 1e-3);
    }

    #[test]
    fn test_ckks_multiply_relinearize() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let scale = (1u64 << 30) as f64;
        let plain = enc.encode(&[3.0, -1.5], scale, 0).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[2.0, 4.0], scale, 0).unwrap();
        let b = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();

        let prod = f.evaluator.multiply(&a, &b).unwrap();
        assert_eq!(prod.size(), 2);
        assert!(matches!(
            f.evaluator.multiply(&prod, &a),
            Err(CipherfitError::InvalidSize { expected: 1, got: 2 })
        ));
        let relin = f.evaluator.relinearize(&prod, &f.relin).unwrap();
        assert_eq!(relin.size(), 1);
        assert!(matches!(
            f.evaluator.relinearize(&relin, &f.relin),
            Err(CipherfitError::InvalidSize { expected: 2, got: 1 })
        ));
        let decoded = enc.decode(&f.decryptor.decrypt(&relin).unwrap()).unwrap();
        close(&decoded, &[6.0, -6.0], 1e-2);
    }

    #[test]
    fn test_multiply_plain_and_scale_overflow() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let scale = (1u64 << 30) as f64;
        let plain = enc.encode(&[1.5], scale, 0).unwrap();
        let ct = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[4.0], (1u64 << 20) as f64, 0).unwrap();
        let prod = f.evaluator.multiply_plain(&ct, &plain).unwrap();
        assert_eq!(prod.size(), 1);
        assert_eq!(prod.scale(), scale * (1u64 << 20) as f64);
        let decoded = enc.decode(&f.decryptor.decrypt(&prod).unwrap()).unwrap();
        assert!((decoded[0] - 6.0).abs() < 1e-2);

        // 2^30 · 2^30 · 2^20 is beyond the 70-bit level 0 modulus
        let big = f.evaluator.multiply(&ct, &ct).unwrap();
        let big = f.evaluator.relinearize(&big, &f.relin).unwrap();
        assert!(matches!(
            f.evaluator.multiply_plain(&big, &plain),
            Err(CipherfitError::DepthExceeded(_))
        ));
    }

    #[test]
    fn test_mismatched_operands_rejected() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let plain = enc.encode(&[1.0], (1u64 << 25) as f64, 0).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[1.0], (1u64 << 26) as f64, 0).unwrap();
        let b = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[1.0], (1u64 << 25) as f64, 1).unwrap();
        let c = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();

        assert!(matches!(f.evaluator.add(&a, &b), Err(CipherfitError::LevelMismatch(_))));
        assert!(matches!(f.evaluator.sub(&a, &c), Err(CipherfitError::LevelMismatch(_))));
        assert!(matches!(f.evaluator.multiply(&a, &c), Err(CipherfitError::LevelMismatch(_))));
        assert!(matches!(f.evaluator.add_many(&[]), Err(CipherfitError::InvalidInput(_))));

        assert!(f.evaluator.set_scale(&a, a.scale() * (1.0 + 1e-6)).is_ok());
        assert!(matches!(
            f.evaluator.set_scale(&a, a.scale() * 1.01),
            Err(CipherfitError::LevelMismatch(_))
        ));
    }

    #[test]
    fn test_batched_arithmetic_is_exact() {
        let mut f = fixture(batched());
        let enc = BatchEncoder::new(f.ctx.clone()).unwrap();
        let plain = enc.encode(&[3, -7, 100, 12]).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let plain = enc.encode(&[5, 6, -2, 0]).unwrap();
        let b = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let dec = |ct: &Ciphertext| enc.decode(&f.decryptor.decrypt(ct).unwrap()).unwrap();

        assert_eq!(&dec(&f.evaluator.add(&a, &b).unwrap())[..4], &[8, -1, 98, 12]);
        assert_eq!(&dec(&f.evaluator.sub(&a, &b).unwrap())[..4], &[-2, -13, 102, 12]);

        let prod = f.evaluator.multiply(&a, &b).unwrap();
        assert_eq!(&dec(&prod)[..4], &[15, -42, -200, 0]);
        let relin = f.evaluator.relinearize(&prod, &f.relin).unwrap();
        assert_eq!(&dec(&relin)[..4], &[15, -42, -200, 0]);
        assert!(f.decryptor.invariant_noise_budget(&relin).unwrap() > 0);

        let plain = enc.encode(&[2, 2, 2, 2]).unwrap();
        assert_eq!(&dec(&f.evaluator.multiply_plain(&a, &plain).unwrap())[..4], &[6, -14, 200, 24]);
        assert_eq!(&dec(&f.evaluator.add_plain(&a, &plain).unwrap())[..4], &[5, -5, 102, 14]);
        assert_eq!(&dec(&f.evaluator.square(&b).unwrap())[..4], &[25, 36, 4, 0]);
    }
}
