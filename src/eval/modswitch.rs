use tracing::instrument;

use crate::ciphertext::Ciphertext;
use crate::context::LevelContext;
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::params::SchemeType;
use crate::ring::rns::RnsPoly;

impl Evaluator {
    /// Divide by the level's last prime and move one level down.
    ///
    /// Approximate scheme only: the scale shrinks by the dropped prime, which
    /// is what keeps repeated products from overflowing the modulus.
    #[instrument(skip_all)]
    pub fn rescale_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        if self.context.scheme() != SchemeType::Approximate {
            return Err(CipherfitError::Unsupported {
                op: "rescale_to_next",
                scheme: self.context.scheme(),
            });
        }
        if ct.size() != 1 {
            return Err(CipherfitError::InvalidSize { expected: 1, got: ct.size() });
        }
        let level_ctx = self.level_of(ct)?;
        let next = self.next_level(ct.level)?;
        let q_last = level_ctx.last_modulus() as f64;
        let polys = ct.polys.iter()
            .map(RnsPoly::divide_round_by_last)
            .collect::<Result<Vec<_>>>()?;
        Ok(Ciphertext {
            polys,
            parms_id: next.parms_id,
            level: next.level,
            scale: ct.scale / q_last,
        })
    }

    /// Move one level down leaving the scale untouched.
    ///
    /// Approximate ciphertexts simply forget the last prime; batched ones are
    /// scaled by Q_{ℓ+1}/Q_ℓ with rounding so the message stays at Δ_{ℓ+1}.
    pub fn mod_switch_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.level_of(ct)?;
        let next = self.next_level(ct.level)?;
        let polys = match self.context.scheme() {
            SchemeType::Approximate => ct.polys.iter()
                .map(RnsPoly::drop_last)
                .collect::<Result<Vec<_>>>()?,
            SchemeType::Batched => ct.polys.iter()
                .map(RnsPoly::divide_round_by_last)
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Ciphertext { polys, parms_id: next.parms_id, level: next.level, scale: ct.scale })
    }

    /// Mod switch until `ct` sits at `level`. Levels only go down.
    pub fn mod_switch_to(&self, ct: &Ciphertext, level: usize) -> Result<Ciphertext> {
        if level < ct.level {
            return Err(CipherfitError::LevelMismatch(format!(
                "cannot switch from level {} up to level {level}", ct.level
            )));
        }
        self.context.level(level)?;
        let mut out = ct.clone();
        while out.level < level {
            out = self.mod_switch_to_next(&out)?;
        }
        Ok(out)
    }

    /// Bring a plaintext down to `level` by dropping primes.
    pub fn mod_switch_plain_to(&self, plain: &Plaintext, level: usize) -> Result<Plaintext> {
        if level < plain.level {
            return Err(CipherfitError::LevelMismatch(format!(
                "cannot switch plaintext from level {} up to level {level}", plain.level
            )));
        }
        let target = self.context.level(level)?;
        let mut poly = plain.poly.clone();
        while poly.num_components() > target.num_moduli() {
            poly = poly.drop_last()?;
        }
        Ok(Plaintext { poly, parms_id: target.parms_id, level, scale: plain.scale })
    }

    fn next_level(&self, level: usize) -> Result<&LevelContext> {
        if level >= self.context.max_level() {
            return Err(CipherfitError::DepthExceeded(format!(
                "level {level} is the last level of the modulus chain"
            )));
        }
        self.context.level(level + 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::encoding::{BatchEncoder, CkksEncoder};
    use crate::error::CipherfitError;
    use crate::eval::tests::{batched, fixture, small_ckks};

    #[test]
    fn test_rescale_divides_scale_by_last_prime() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let scale = (1u64 << 30) as f64;
        let plain = enc.encode(&[2.5, -3.0], scale, 0).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        let prod = f.evaluator.multiply(&a, &a).unwrap();
        let prod = f.evaluator.relinearize(&prod, &f.relin).unwrap();

        let q_last = f.ctx.level(0).unwrap().last_modulus() as f64;
        let rescaled = f.evaluator.rescale_to_next(&prod).unwrap();
        assert_eq!(rescaled.level(), 1);
        assert_eq!(rescaled.num_moduli(), 1);
        assert_eq!(rescaled.scale(), scale * scale / q_last);
        let decoded = enc.decode(&f.decryptor.decrypt(&rescaled).unwrap()).unwrap();
        assert!((decoded[0] - 6.25).abs() < 1e-2);
        assert!((decoded[1] - 9.0).abs() < 1e-2);

        assert!(matches!(
            f.evaluator.rescale_to_next(&rescaled),
            Err(CipherfitError::DepthExceeded(_))
        ));
    }

    #[test]
    fn test_mod_switch_keeps_value_and_scale() {
        let mut f = fixture(small_ckks());
        let enc = CkksEncoder::new(f.ctx.clone()).unwrap();
        let scale = (1u64 << 30) as f64;
        let plain = enc.encode(&[4.0], scale, 0).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();

        let down = f.evaluator.mod_switch_to(&a, 1).unwrap();
        assert_eq!(down.level(), 1);
        assert_eq!(down.scale(), scale);
        let decoded = enc.decode(&f.decryptor.decrypt(&down).unwrap()).unwrap();
        assert!((decoded[0] - 4.0).abs() < 1e-3);

        assert!(matches!(
            f.evaluator.mod_switch_to(&down, 0),
            Err(CipherfitError::LevelMismatch(_))
        ));
        assert!(matches!(
            f.evaluator.mod_switch_to_next(&down),
            Err(CipherfitError::DepthExceeded(_))
        ));
        assert_eq!(f.evaluator.mod_switch_to(&a, 0).unwrap().level(), 0);

        let plain = enc.encode(&[1.0], scale, 0).unwrap();
        let plain = f.evaluator.mod_switch_plain_to(&plain, 1).unwrap();
        let sum = f.evaluator.add_plain(&down, &plain).unwrap();
        let decoded = enc.decode(&f.decryptor.decrypt(&sum).unwrap()).unwrap();
        assert!((decoded[0] - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_batched_mod_switch_and_no_rescale() {
        let mut f = fixture(batched());
        let enc = BatchEncoder::new(f.ctx.clone()).unwrap();
        let plain = enc.encode(&[9, -4, 77]).unwrap();
        let a = f.encryptor.encrypt_asymmetric_with_rng(&plain, &mut f.rng).unwrap();
        assert!(matches!(
            f.evaluator.rescale_to_next(&a),
            Err(CipherfitError::Unsupported { .. })
        ));
        let down = f.evaluator.mod_switch_to_next(&a).unwrap();
        assert_eq!(down.level(), 1);
        let decoded = enc.decode(&f.decryptor.decrypt(&down).unwrap()).unwrap();
        assert_eq!(&decoded[..3], &[9, -4, 77]);
    }
}
