use std::collections::BTreeMap;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;
use zeroize::Zeroize;

use crate::context::{Context, ParmsId};
use crate::error::{CipherfitError, Result};
use crate::params::SchemeType;
use crate::ring::rns::{RnsBasis, RnsPoly};
use crate::sampling::{sample_ternary, sample_uniform_rns, GaussianSampler};

/// Ternary secret s over every prime of the chain, special prime included.
#[derive(Clone)]
pub struct SecretKey {
    pub(crate) poly: RnsPoly,
    pub(crate) parms_id: ParmsId,
}

impl SecretKey {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    /// s restricted to the first `k` primes.
    pub(crate) fn restricted(&self, k: usize) -> RnsPoly {
        RnsPoly {
            components: self.poly.components[..k].to_vec(),
            ring_degree: self.poly.ring_degree,
        }
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        for comp in &mut self.poly.components {
            comp.evals.zeroize();
        }
    }
}

/// pk = (-a·s + e, a) over the top data level.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub(crate) p0: RnsPoly,
    pub(crate) p1: RnsPoly,
    pub(crate) parms_id: ParmsId,
}

impl PublicKey {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }
}

/// Hybrid key-switching key from s' to s with one entry per data prime.
///
/// Entry i is (-a_i·s + e_i + [P mod q_i]_i·s', a_i) over the key basis,
/// where [·]_i is nonzero only in component i.
#[derive(Clone, Debug)]
pub struct KeySwitchKey {
    pub(crate) keys: Vec<(RnsPoly, RnsPoly)>,
}

impl KeySwitchKey {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key-switching key from s² to s.
#[derive(Clone, Debug)]
pub struct RelinKeys {
    pub(crate) key: KeySwitchKey,
    pub(crate) parms_id: ParmsId,
}

impl RelinKeys {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }
}

/// Key-switching keys from σ_g(s) to s, by Galois element g.
#[derive(Clone, Debug)]
pub struct GaloisKeys {
    pub(crate) keys: BTreeMap<usize, KeySwitchKey>,
    pub(crate) parms_id: ParmsId,
}

impl GaloisKeys {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    pub fn has_key(&self, element: usize) -> bool {
        self.keys.contains_key(&element)
    }

    pub fn elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.keys().copied()
    }

    pub(crate) fn get(&self, element: usize) -> Result<&KeySwitchKey> {
        self.keys.get(&element).ok_or_else(|| {
            CipherfitError::MissingKey(format!("no Galois key for element {element}"))
        })
    }
}

/// Creates the secret key and every public artifact derived from it.
pub struct KeyGenerator {
    context: Arc<Context>,
    secret_key: SecretKey,
}

impl KeyGenerator {
    /// Fresh secret key from an OS-seeded ChaCha20 stream.
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Self::with_rng(context, &mut rng)
    }

    pub fn with_rng<R: Rng>(context: Arc<Context>, rng: &mut R) -> Result<Self> {
        let basis = context.key_basis();
        let s = sample_ternary(basis.ring_degree, rng);
        let poly = RnsPoly::from_signed(&s, basis)?;
        let secret_key = SecretKey { poly, parms_id: context.key_parms_id() };
        Ok(Self { context, secret_key })
    }

    /// Resume from an existing secret key.
    pub fn from_secret_key(context: Arc<Context>, secret_key: SecretKey) -> Result<Self> {
        if secret_key.parms_id != context.key_parms_id() {
            return Err(CipherfitError::LevelMismatch(
                "secret key belongs to different parameters".into(),
            ));
        }
        Ok(Self { context, secret_key })
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn create_public_key(&self) -> Result<PublicKey> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.create_public_key_with_rng(&mut rng)
    }

    pub fn create_public_key_with_rng<R: Rng>(&self, rng: &mut R) -> Result<PublicKey> {
        let top = self.context.level(0)?;
        let basis = &top.basis;
        let s = self.secret_key.restricted(basis.num_moduli());
        let (p0, p1) = rlwe_sample(basis, &s, self.context.parameters().sigma(), rng)?;
        Ok(PublicKey { p0, p1, parms_id: top.parms_id })
    }

    pub fn create_relin_keys(&self) -> Result<RelinKeys> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.create_relin_keys_with_rng(&mut rng)
    }

    pub fn create_relin_keys_with_rng<R: Rng>(&self, rng: &mut R) -> Result<RelinKeys> {
        let s_squared = self.secret_key.poly.mul(&self.secret_key.poly)?;
        let key = self.create_key_switch_key(&s_squared, rng)?;
        Ok(RelinKeys { key, parms_id: self.context.key_parms_id() })
    }

    /// Keys for the power-of-two rotations used by `sum_elements`, plus the
    /// column swap for the batched scheme.
    pub fn create_galois_keys(&self) -> Result<GaloisKeys> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.create_galois_keys_with_rng(&mut rng)
    }

    pub fn create_galois_keys_with_rng<R: Rng>(&self, rng: &mut R) -> Result<GaloisKeys> {
        let elements = default_galois_elements(&self.context);
        self.galois_keys_for_elements_with_rng(&elements, rng)
    }

    /// Keys for left rotations by each of `steps`.
    pub fn galois_keys_for_steps(&self, steps: &[usize]) -> Result<GaloisKeys> {
        let mut rng = ChaCha20Rng::from_os_rng();
        let elements: Vec<usize> = steps.iter().map(|&s| self.context.galois_element(s)).collect();
        self.galois_keys_for_elements_with_rng(&elements, &mut rng)
    }

    pub fn galois_keys_for_elements_with_rng<R: Rng>(
        &self,
        elements: &[usize],
        rng: &mut R,
    ) -> Result<GaloisKeys> {
        let two_n = 2 * self.context.ring_degree();
        let mut keys = BTreeMap::new();
        for &element in elements {
            if element % 2 == 0 || element >= two_n {
                return Err(CipherfitError::InvalidInput(format!(
                    "{element} is not a Galois element for n = {}", self.context.ring_degree()
                )));
            }
            if element == 1 || keys.contains_key(&element) {
                continue;
            }
            let s_auto = self.secret_key.poly.automorphism(element);
            keys.insert(element, self.create_key_switch_key(&s_auto, rng)?);
        }
        debug!(count = keys.len(), "galois keys generated");
        Ok(GaloisKeys { keys, parms_id: self.context.key_parms_id() })
    }

    fn create_key_switch_key<R: Rng>(
        &self,
        s_prime: &RnsPoly,
        rng: &mut R,
    ) -> Result<KeySwitchKey> {
        let basis = self.context.key_basis();
        let sigma = self.context.parameters().sigma();
        let special_mod_data = self.context.special_mod_data();

        let mut keys = Vec::with_capacity(special_mod_data.len());
        for (i, &p_mod_qi) in special_mod_data.iter().enumerate() {
            let (mut k0, k1) = rlwe_sample(basis, &self.secret_key.poly, sigma, rng)?;
            let mut gadget = s_prime.components[i].clone();
            gadget.scalar_mul_assign(p_mod_qi);
            k0.components[i].add_assign(&gadget)?;
            keys.push((k0, k1));
        }
        Ok(KeySwitchKey { keys })
    }
}

/// (−a·s + e, a) with a uniform and e discrete Gaussian.
pub(crate) fn rlwe_sample<R: Rng>(
    basis: &RnsBasis,
    s: &RnsPoly,
    sigma: f64,
    rng: &mut R,
) -> Result<(RnsPoly, RnsPoly)> {
    let a = sample_uniform_rns(basis, rng);
    let e = GaussianSampler::new(sigma).sample_poly(basis.ring_degree, rng);
    let e = RnsPoly::from_signed(&e, basis)?;
    let b = e.sub(&a.mul(s)?)?;
    Ok((b, a))
}

fn default_galois_elements(context: &Context) -> Vec<usize> {
    let row = match context.scheme() {
        SchemeType::Approximate => context.slot_count(),
        SchemeType::Batched => context.slot_count() / 2,
    };
    let mut elements: Vec<usize> = (0..row.trailing_zeros())
        .map(|i| context.galois_element(1 << i))
        .collect();
    if context.scheme() == SchemeType::Batched {
        elements.push(context.conjugation_element());
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParametersBuilder, SchemeType};
    use num_bigint::BigInt;
    use num_traits::Signed;

    fn context() -> Arc<Context> {
        let params = ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus_bits(&[40, 30, 39])
            .build()
            .unwrap();
        Context::new(params).unwrap()
    }

    #[test]
    fn test_public_key_is_rlwe_sample() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        let pk = keygen.create_public_key_with_rng(&mut rng).unwrap();

        // p0 + p1·s = e, small
        let basis = &ctx.level(0).unwrap().basis;
        let s = keygen.secret_key().restricted(basis.num_moduli());
        let e = pk.p0.add(&pk.p1.mul(&s).unwrap()).unwrap();
        let coeffs = e.to_centered_bigints(basis).unwrap();
        assert!(coeffs.iter().all(|c| c.abs() <= BigInt::from(20)));
    }

    #[test]
    fn test_key_switch_key_shape() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        let rk = keygen.create_relin_keys_with_rng(&mut rng).unwrap();
        assert_eq!(rk.key.len(), 2);
        assert_eq!(rk.key.keys[0].0.num_components(), 3);
        assert_eq!(rk.parms_id(), ctx.key_parms_id());
    }

    #[test]
    fn test_default_galois_elements() {
        let ctx = context();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keygen = KeyGenerator::with_rng(ctx.clone(), &mut rng).unwrap();
        let gk = keygen.create_galois_keys_with_rng(&mut rng).unwrap();
        // 2048 slots → rotations by 1, 2, ..., 1024
        assert_eq!(gk.elements().count(), 11);
        assert!(gk.has_key(5));
        assert!(gk.get(3).is_err());
        assert!(keygen.galois_keys_for_elements_with_rng(&[4], &mut rng).is_err());
    }

    #[test]
    fn test_foreign_secret_key_rejected() {
        let ctx = context();
        let other = Context::new(
            ParametersBuilder::new(SchemeType::Approximate)
                .ring_degree(4096)
                .coeff_modulus_bits(&[40, 39])
                .build()
                .unwrap(),
        )
        .unwrap();
        let sk = KeyGenerator::with_rng(other, &mut ChaCha20Rng::seed_from_u64(1))
            .unwrap()
            .secret_key()
            .clone();
        assert!(KeyGenerator::from_secret_key(ctx, sk).is_err());
    }
}
