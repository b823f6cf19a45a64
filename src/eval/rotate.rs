use tracing::instrument;

use crate::ciphertext::Ciphertext;
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::keys::GaloisKeys;
use crate::params::SchemeType;

impl Evaluator {
    /// X → X^g followed by a switch from σ_g(s) back to s.
    #[instrument(skip_all, fields(element = element))]
    pub fn apply_galois(
        &self,
        ct: &Ciphertext,
        element: usize,
        keys: &GaloisKeys,
    ) -> Result<Ciphertext> {
        if ct.size() != 1 {
            return Err(CipherfitError::InvalidSize { expected: 1, got: ct.size() });
        }
        if keys.parms_id != self.context.key_parms_id() {
            return Err(CipherfitError::LevelMismatch(
                "Galois keys belong to different parameters".into(),
            ));
        }
        let level_ctx = self.level_of(ct)?;
        let key = keys.get(element)?;
        let c0 = ct.polys[0].automorphism(element);
        let c1 = ct.polys[1].automorphism(element);
        let (d0, d1) = self.switch_key(&c1, key, level_ctx)?;
        Ok(Ciphertext { polys: vec![c0.add(&d0)?, d1], ..ct.clone_header() })
    }

    /// Rotate slots left by `steps` (right when negative).
    ///
    /// Batched ciphertexts rotate both rows of the 2 × n/2 matrix. Without a
    /// key for the exact element, the rotation is composed from the
    /// power-of-two keys.
    pub fn rotate(&self, ct: &Ciphertext, steps: i64, keys: &GaloisKeys) -> Result<Ciphertext> {
        let row = self.row_size();
        let steps = steps.rem_euclid(row as i64) as usize;
        if steps == 0 {
            return Ok(ct.clone());
        }
        let element = self.context.galois_element(steps);
        if keys.has_key(element) {
            return self.apply_galois(ct, element, keys);
        }
        let mut out = ct.clone();
        for bit in 0..row.trailing_zeros() {
            if steps & (1 << bit) != 0 {
                out = self.apply_galois(&out, self.context.galois_element(1 << bit), keys)?;
            }
        }
        Ok(out)
    }

    /// Swap the two rows of a batched ciphertext.
    pub fn rotate_columns(&self, ct: &Ciphertext, keys: &GaloisKeys) -> Result<Ciphertext> {
        if self.context.scheme() != SchemeType::Batched {
            return Err(CipherfitError::Unsupported {
                op: "rotate_columns",
                scheme: self.context.scheme(),
            });
        }
        self.apply_galois(ct, self.context.conjugation_element(), keys)
    }

    /// Every slot ends up holding the sum of all slots.
    ///
    /// log2(row) rotate-and-add rounds, plus a row swap for batched
    /// ciphertexts.
    #[instrument(skip_all)]
    pub fn sum_elements(&self, ct: &Ciphertext, keys: &GaloisKeys) -> Result<Ciphertext> {
        let row = self.row_size();
        let mut acc = ct.clone();
        for bit in 0..row.trailing_zeros() {
            let rotated = self.apply_galois(&acc, self.context.galois_element(1 << bit), keys)?;
            acc = self.add(&acc, &rotated)?;
        }
        if self.context.scheme() == SchemeType::Batched {
            let swapped = self.rotate_columns(&acc, keys)?;
            acc = self.add(&acc, &swapped)?;
        }
        Ok(acc)
    }

    fn row_size(&self) -> usize {
        match self.context.scheme() {
            SchemeType::Approximate => self.context.slot_count(),
            SchemeType::Batched => self.context.slot_count() / 2,
        }
    }
}
