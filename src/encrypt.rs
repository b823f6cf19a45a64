use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::ciphertext::Ciphertext;
use crate::context::{Context, LevelContext};
use crate::encoding::batch::lift_plain_coeffs;
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::keys::{rlwe_sample, PublicKey, SecretKey};
use crate::params::SchemeType;
use crate::ring::rns::RnsPoly;
use crate::sampling::{sample_ternary, GaussianSampler};

/// Turns plaintexts into ciphertexts under a public key, a secret key, or both.
pub struct Encryptor {
    context: Arc<Context>,
    public_key: Option<PublicKey>,
    secret_key: Option<SecretKey>,
}

impl Encryptor {
    pub fn new(context: Arc<Context>, public_key: PublicKey) -> Result<Self> {
        if public_key.parms_id != context.first_parms_id() {
            return Err(CipherfitError::LevelMismatch(
                "public key belongs to different parameters".into(),
            ));
        }
        Ok(Self { context, public_key: Some(public_key), secret_key: None })
    }

    pub fn with_secret_key(context: Arc<Context>, secret_key: SecretKey) -> Result<Self> {
        check_secret_key(&context, &secret_key)?;
        Ok(Self { context, public_key: None, secret_key: Some(secret_key) })
    }

    pub fn set_secret_key(&mut self, secret_key: SecretKey) -> Result<()> {
        check_secret_key(&self.context, &secret_key)?;
        self.secret_key = Some(secret_key);
        Ok(())
    }

    pub fn encrypt_asymmetric(&self, plain: &Plaintext) -> Result<Ciphertext> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.encrypt_asymmetric_with_rng(plain, &mut rng)
    }

    /// (p0·u + e0 + M, p1·u + e1) at the top level, then reduced to the
    /// plaintext's level before M is added.
    pub fn encrypt_asymmetric_with_rng<R: Rng>(
        &self,
        plain: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let pk = self.public_key.as_ref()
            .ok_or_else(|| CipherfitError::MissingKey("encryptor has no public key".into()))?;
        let level_ctx = self.plaintext_level(plain)?;
        let top = &self.context.level(0)?.basis;
        let n = self.context.ring_degree();
        let sampler = GaussianSampler::new(self.context.parameters().sigma());

        let u = RnsPoly::from_signed(&sample_ternary(n, rng), top)?;
        let e0 = RnsPoly::from_signed(&sampler.sample_poly(n, rng), top)?;
        let e1 = RnsPoly::from_signed(&sampler.sample_poly(n, rng), top)?;

        let mut c0 = pk.p0.mul(&u)?.add(&e0)?;
        let mut c1 = pk.p1.mul(&u)?.add(&e1)?;
        // an encryption of zero stays one modulo any divisor of Q
        while c0.num_components() > level_ctx.num_moduli() {
            c0 = c0.drop_last()?;
            c1 = c1.drop_last()?;
        }

        c0.add_assign(&self.message_term(plain, level_ctx)?)?;
        Ok(Ciphertext {
            polys: vec![c0, c1],
            parms_id: level_ctx.parms_id,
            level: plain.level,
            scale: plain.scale,
        })
    }

    pub fn encrypt_symmetric(&self, plain: &Plaintext) -> Result<Ciphertext> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.encrypt_symmetric_with_rng(plain, &mut rng)
    }

    /// (-a·s + e + M, a) directly at the plaintext's level.
    pub fn encrypt_symmetric_with_rng<R: Rng>(
        &self,
        plain: &Plaintext,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        let sk = self.secret_key.as_ref().ok_or_else(|| {
            CipherfitError::MissingKey("symmetric encryption needs the secret key".into())
        })?;
        let level_ctx = self.plaintext_level(plain)?;
        let s = sk.restricted(level_ctx.num_moduli());
        let sigma = self.context.parameters().sigma();
        let (mut c0, c1) = rlwe_sample(&level_ctx.basis, &s, sigma, rng)?;
        c0.add_assign(&self.message_term(plain, level_ctx)?)?;
        Ok(Ciphertext {
            polys: vec![c0, c1],
            parms_id: level_ctx.parms_id,
            level: plain.level,
            scale: plain.scale,
        })
    }

    fn plaintext_level(&self, plain: &Plaintext) -> Result<&LevelContext> {
        let level_ctx = self.context.level(plain.level)?;
        if level_ctx.parms_id != plain.parms_id {
            return Err(CipherfitError::LevelMismatch(
                "plaintext does not belong to this context".into(),
            ));
        }
        Ok(level_ctx)
    }

    /// M for the approximate scheme, Δ_ℓ·m for the batched one.
    fn message_term(&self, plain: &Plaintext, level_ctx: &LevelContext) -> Result<RnsPoly> {
        match self.context.scheme() {
            SchemeType::Approximate => Ok(plain.poly.clone()),
            SchemeType::Batched => plain.poly.scalar_mul_residues(&level_ctx.delta_residues),
        }
    }
}

fn check_secret_key(context: &Context, secret_key: &SecretKey) -> Result<()> {
    if secret_key.parms_id != context.key_parms_id() {
        return Err(CipherfitError::LevelMismatch(
            "secret key belongs to different parameters".into(),
        ));
    }
    Ok(())
}

/// Recovers plaintexts with the secret key.
pub struct Decryptor {
    context: Arc<Context>,
    secret_key: SecretKey,
}

impl Decryptor {
    pub fn new(context: Arc<Context>, secret_key: SecretKey) -> Result<Self> {
        check_secret_key(&context, &secret_key)?;
        Ok(Self { context, secret_key })
    }

    /// Σ c_i·s^i over the ciphertext's primes.
    fn phase(&self, ct: &Ciphertext) -> Result<(&LevelContext, RnsPoly)> {
        let level_ctx = self.context.level(ct.level)?;
        if level_ctx.parms_id != ct.parms_id {
            return Err(CipherfitError::LevelMismatch(
                "ciphertext does not belong to this context".into(),
            ));
        }
        let s = self.secret_key.restricted(level_ctx.num_moduli());
        let mut s_power = s.clone();
        let mut phase = ct.polys[0].clone();
        for (i, c) in ct.polys.iter().enumerate().skip(1) {
            phase.add_assign(&c.mul(&s_power)?)?;
            if i + 1 < ct.polys.len() {
                s_power = s_power.mul(&s)?;
            }
        }
        Ok((level_ctx, phase))
    }

    pub fn decrypt(&self, ct: &Ciphertext) -> Result<Plaintext> {
        let (level_ctx, phase) = self.phase(ct)?;
        match self.context.scheme() {
            SchemeType::Approximate => Ok(Plaintext {
                poly: phase,
                parms_id: level_ctx.parms_id,
                level: ct.level,
                scale: ct.scale,
            }),
            SchemeType::Batched => {
                let t = self.plain_modulus()?;
                let q = BigInt::from(level_ctx.modulus_product().clone());
                let coeffs: Vec<u64> = phase.to_centered_bigints(&level_ctx.basis)?
                    .iter()
                    .map(|x| {
                        // round(t·x / Q) mod t
                        let rounded = div_round(&(x * t), &q);
                        let mut r = rounded % t;
                        if r.is_negative() {
                            r += t;
                        }
                        r.to_u64().unwrap_or(0)
                    })
                    .collect();
                lift_plain_coeffs(&self.context, &coeffs, ct.level)
            }
        }
    }

    /// Remaining bits before batched decryption fails.
    pub fn invariant_noise_budget(&self, ct: &Ciphertext) -> Result<u32> {
        let t = self.plain_modulus()?;
        let (level_ctx, phase) = self.phase(ct)?;
        let q = BigInt::from(level_ctx.modulus_product().clone());
        let half_q = &q >> 1u32;
        let mut max_noise = BigInt::zero();
        for x in phase.to_centered_bigints(&level_ctx.basis)? {
            // the message vanishes since t·Δ ≡ -(Q mod t) is small
            let mut v = (x * t) % &q;
            if v > half_q {
                v -= &q;
            } else if v < -&half_q {
                v += &q;
            }
            let v = v.abs();
            if v > max_noise {
                max_noise = v;
            }
        }
        let q_bits = level_ctx.modulus_product().bits() as i64;
        let noise_bits = max_noise.bits() as i64;
        Ok((q_bits - noise_bits - 1).max(0) as u32)
    }

    fn plain_modulus(&self) -> Result<u64> {
        self.context.plain_modulus().ok_or(CipherfitError::Unsupported {
            op: "batched decryption",
            scheme: self.context.scheme(),
        })
    }
}

/// round(a / b) for b > 0, halves away from zero.
pub(crate) fn div_round(a: &BigInt, b: &BigInt) -> BigInt {
    let twice = a * 2i64 + if a.is_negative() { -b } else { b.clone() };
    twice / (b * 2i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{BatchEncoder, CkksEncoder};
    use crate::keys::KeyGenerator;
    use crate::params::{presets, ParametersBuilder, SecurityLevel};

    fn ckks_setup() -> (Arc<Context>, KeyGenerator, ChaCha20Rng) {
        let params = ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus_bits(&[40, 30, 39])
            .build()
            .unwrap();
        let ctx = Context::new(params).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        (ctx, keygen, rng)
    }

    #[test]
    fn test_ckks_symmetric_and_asymmetric_roundtrip() {
        let (ctx, keygen, mut rng) = ckks_setup();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();
        let mut encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
        let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key().clone()).unwrap();
        let encoder = CkksEncoder::new(ctx.clone()).unwrap();

        let values = [3.25, -1.5, 100.0];
        let plain = encoder.encode(&values, (1u64 << 30) as f64, 0).unwrap();

        assert!(matches!(
            encryptor.encrypt_symmetric_with_rng(&plain, &mut rng),
            Err(CipherfitError::MissingKey(_))
        ));
        encryptor.set_secret_key(keygen.secret_key().clone()).unwrap();

        for ct in [
            encryptor.encrypt_asymmetric_with_rng(&plain, &mut rng).unwrap(),
            encryptor.encrypt_symmetric_with_rng(&plain, &mut rng).unwrap(),
        ] {
            assert_eq!(ct.size(), 1);
            let decoded = encoder.decode(&decryptor.decrypt(&ct).unwrap()).unwrap();
            for (d, v) in decoded.iter().zip(values.iter()) {
                assert!((d - v).abs() < 1e-3, "{d} vs {v}");
            }
        }
    }

    #[test]
    fn test_ckks_encrypts_at_lower_level() {
        let (ctx, keygen, mut rng) = ckks_setup();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();
        let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
        let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key().clone()).unwrap();
        let encoder = CkksEncoder::new(ctx.clone()).unwrap();

        let plain = encoder.encode(&[7.0], (1u64 << 25) as f64, 1).unwrap();
        let ct = encryptor.encrypt_asymmetric_with_rng(&plain, &mut rng).unwrap();
        assert_eq!(ct.level(), 1);
        assert_eq!(ct.num_moduli(), 1);
        let decoded = encoder.decode(&decryptor.decrypt(&ct).unwrap()).unwrap();
        assert!((decoded[0] - 7.0).abs() < 1e-2);
    }

    #[test]
    fn test_batched_roundtrip_and_noise_budget() {
        let ctx = Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();
        let encryptor = Encryptor::new(ctx.clone(), pk).unwrap();
        let decryptor = Decryptor::new(ctx.clone(), keygen.secret_key().clone()).unwrap();
        let encoder = BatchEncoder::new(ctx.clone()).unwrap();

        let values = vec![5, -9, 1000, 0, 123456];
        let plain = encoder.encode(&values).unwrap();
        let ct = encryptor.encrypt_asymmetric_with_rng(&plain, &mut rng).unwrap();
        let decoded = encoder.decode(&decryptor.decrypt(&ct).unwrap()).unwrap();
        assert_eq!(&decoded[..5], &values[..]);
        assert!(decryptor.invariant_noise_budget(&ct).unwrap() > 20);
    }

    #[test]
    fn test_div_round() {
        let r = |a: i64, b: i64| div_round(&BigInt::from(a), &BigInt::from(b));
        assert_eq!(r(7, 2), BigInt::from(4));
        assert_eq!(r(-7, 2), BigInt::from(-4));
        assert_eq!(r(5, 3), BigInt::from(2));
        assert_eq!(r(-4, 3), BigInt::from(-1));
    }
}
