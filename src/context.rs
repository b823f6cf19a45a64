use std::fmt;
use std::sync::Arc;

use concrete_ntt::prime64::Plan;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CipherfitError, Result};
use crate::params::primes::NttFriendlyPrimes;
use crate::params::{Parameters, SchemeType};
use crate::ring::modular::mod_pow;
use crate::ring::ntt::make_plan;
use crate::ring::rns::RnsBasis;

/// Canonical identifier of one level of a parameter set.
///
/// Two ciphertexts may meet in a binary operation only if their ids agree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParmsId(pub [u8; 32]);

impl ParmsId {
    fn compute(scheme: SchemeType, ring_degree: usize, moduli: &[u64], plain: Option<u64>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(match scheme {
            SchemeType::Batched => [0u8],
            SchemeType::Approximate => [1u8],
        });
        hasher.update((ring_degree as u64).to_le_bytes());
        hasher.update((moduli.len() as u64).to_le_bytes());
        for q in moduli {
            hasher.update(q.to_le_bytes());
        }
        hasher.update(plain.unwrap_or(0).to_le_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Debug for ParmsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParmsId(")?;
        for b in &self.0[..6] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Precomputation for one level of the modulus chain.
#[derive(Debug)]
pub struct LevelContext {
    pub level: usize,
    pub parms_id: ParmsId,
    /// Data primes present at this level.
    pub basis: RnsBasis,
    /// Data primes of this level followed by the special prime.
    pub extended_basis: RnsBasis,
    /// floor(Q_ℓ / t) mod q_j, batched scheme only.
    pub delta_residues: Vec<u64>,
}

impl LevelContext {
    pub fn num_moduli(&self) -> usize {
        self.basis.num_moduli()
    }

    pub fn last_modulus(&self) -> u64 {
        self.basis.moduli[self.basis.num_moduli() - 1]
    }

    pub fn modulus_product(&self) -> &BigUint {
        self.basis.modulus_product()
    }
}

/// Immutable, shareable derived state for a parameter set.
pub struct Context {
    params: Parameters,
    levels: Vec<LevelContext>,
    key_basis: RnsBasis,
    key_parms_id: ParmsId,
    /// P mod q_i for every data prime.
    special_mod_data: Vec<u64>,
    aux_basis: Option<RnsBasis>,
    plain_plan: Option<Arc<Plan>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scheme", &self.params.scheme())
            .field("ring_degree", &self.params.ring_degree())
            .field("levels", &self.levels.len())
            .finish()
    }
}

impl Context {
    /// Validate `params` and precompute every level.
    pub fn new(params: Parameters) -> Result<Arc<Self>> {
        params.validate()?;
        let n = params.ring_degree();
        let scheme = params.scheme();
        let plain = params.plain_modulus();

        let plans = params.coeff_modulus().iter()
            .map(|&q| make_plan(n, q))
            .collect::<Result<Vec<_>>>()?;
        let num_data = params.data_moduli().len();
        let special_plan = plans[num_data].clone();
        let special = params.special_modulus();

        let mut levels = Vec::with_capacity(num_data);
        for level in 0..num_data {
            let k = num_data - level;
            let basis = RnsBasis::from_plans(plans[..k].to_vec(), n)?;
            let mut ext_plans = plans[..k].to_vec();
            ext_plans.push(special_plan.clone());
            let extended_basis = RnsBasis::from_plans(ext_plans, n)?;

            let delta_residues = match plain {
                Some(t) => {
                    let delta = basis.modulus_product() / t;
                    basis.moduli.iter()
                        .map(|&q| (&delta % q).to_u64().unwrap_or(0))
                        .collect()
                }
                None => Vec::new(),
            };

            levels.push(LevelContext {
                level,
                parms_id: ParmsId::compute(scheme, n, &basis.moduli, plain),
                basis,
                extended_basis,
                delta_residues,
            });
        }

        let key_basis = RnsBasis::from_plans(plans, n)?;
        let key_parms_id = ParmsId::compute(scheme, n, &key_basis.moduli, plain);
        let special_mod_data = params.data_moduli().iter().map(|&q| special % q).collect();

        let (aux_basis, plain_plan) = match plain {
            Some(t) => (
                Some(build_aux_basis(&params, levels[0].modulus_product())?),
                Some(make_plan(n, t)?),
            ),
            None => (None, None),
        };

        debug!(
            scheme = %scheme,
            ring_degree = n,
            levels = levels.len(),
            bits = params.total_coeff_modulus_bits(),
            "context ready"
        );

        Ok(Arc::new(Self {
            params,
            levels,
            key_basis,
            key_parms_id,
            special_mod_data,
            aux_basis,
            plain_plan,
        }))
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn scheme(&self) -> SchemeType {
        self.params.scheme()
    }

    pub fn ring_degree(&self) -> usize {
        self.params.ring_degree()
    }

    pub fn slot_count(&self) -> usize {
        self.params.slot_count()
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, level: usize) -> Result<&LevelContext> {
        self.levels.get(level).ok_or_else(|| CipherfitError::DepthExceeded(format!(
            "level {level} is past the last level {}", self.max_level()
        )))
    }

    pub fn level_by_id(&self, id: &ParmsId) -> Option<&LevelContext> {
        self.levels.iter().find(|l| &l.parms_id == id)
    }

    pub fn first_parms_id(&self) -> ParmsId {
        self.levels[0].parms_id
    }

    /// All primes, data then special; keys live here.
    pub fn key_basis(&self) -> &RnsBasis {
        &self.key_basis
    }

    pub fn key_parms_id(&self) -> ParmsId {
        self.key_parms_id
    }

    pub fn special_modulus(&self) -> u64 {
        self.params.special_modulus()
    }

    pub(crate) fn special_mod_data(&self) -> &[u64] {
        &self.special_mod_data
    }

    pub fn plain_modulus(&self) -> Option<u64> {
        self.params.plain_modulus()
    }

    pub(crate) fn aux_basis(&self) -> Option<&RnsBasis> {
        self.aux_basis.as_ref()
    }

    pub(crate) fn plain_plan(&self) -> Option<&Arc<Plan>> {
        self.plain_plan.as_ref()
    }

    /// Galois element that rotates slots left by `steps`.
    ///
    /// Approximate slots follow powers of 5; batched rows follow powers of 3.
    pub fn galois_element(&self, steps: usize) -> usize {
        let two_n = 2 * self.ring_degree() as u64;
        let generator = match self.scheme() {
            SchemeType::Approximate => 5,
            SchemeType::Batched => 3,
        };
        let row = match self.scheme() {
            SchemeType::Approximate => self.slot_count(),
            SchemeType::Batched => self.slot_count() / 2,
        };
        mod_pow(generator, (steps % row) as u64, two_n) as usize
    }

    /// X → X^{2n-1}: complex conjugation, or the row swap when batched.
    pub fn conjugation_element(&self) -> usize {
        2 * self.ring_degree() - 1
    }
}

/// Primes of 60 bits outside the chain whose product exceeds 4·n·Q.
///
/// The tensor product of two centered ciphertext polynomials is bounded by
/// n·Q²/2, so Q·A > 4·n·Q² leaves room for exact reconstruction.
fn build_aux_basis(params: &Parameters, q_top: &BigUint) -> Result<RnsBasis> {
    let n = params.ring_degree();
    let bound = q_top * (4 * n as u64);
    let mut product = BigUint::from(1u64);
    let mut primes = Vec::new();
    for q in NttFriendlyPrimes::new(60, n)? {
        if params.coeff_modulus().contains(&q) {
            continue;
        }
        product *= q;
        primes.push(q);
        if product > bound {
            return RnsBasis::new(primes, n);
        }
    }
    Err(CipherfitError::Parameter("not enough auxiliary primes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::presets;
    use crate::params::{ParametersBuilder, SecurityLevel};

    fn small_ckks() -> Parameters {
        ParametersBuilder::new(SchemeType::Approximate)
            .ring_degree(4096)
            .coeff_modulus_bits(&[40, 30, 39])
            .build()
            .unwrap()
    }

    #[test]
    fn test_levels_drop_one_prime_each() {
        let ctx = Context::new(presets::regression(SecurityLevel::Tc128).unwrap()).unwrap();
        assert_eq!(ctx.max_level(), 2);
        assert_eq!(ctx.level(0).unwrap().num_moduli(), 3);
        assert_eq!(ctx.level(2).unwrap().num_moduli(), 1);
        assert_eq!(ctx.level(1).unwrap().extended_basis.num_moduli(), 3);
        assert!(matches!(ctx.level(3), Err(CipherfitError::DepthExceeded(_))));
        assert_eq!(ctx.key_basis().num_moduli(), 4);
    }

    #[test]
    fn test_parms_ids_are_distinct_and_stable() {
        let a = Context::new(small_ckks()).unwrap();
        let b = Context::new(small_ckks()).unwrap();
        assert_eq!(a.first_parms_id(), b.first_parms_id());
        assert_ne!(a.level(0).unwrap().parms_id, a.level(1).unwrap().parms_id);
        assert_ne!(a.key_parms_id(), a.first_parms_id());
        let id = a.level(1).unwrap().parms_id;
        assert_eq!(a.level_by_id(&id).unwrap().level, 1);
    }

    #[test]
    fn test_batched_context_has_aux_basis() {
        let ctx = Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap();
        let aux = ctx.aux_basis().unwrap();
        let q = ctx.level(0).unwrap().modulus_product();
        assert!(aux.modulus_product() > &(q * 4u64 * 4096u64));
        assert!(ctx.plain_plan().is_some());
        assert_eq!(ctx.level(0).unwrap().delta_residues.len(), 2);
    }

    #[test]
    fn test_galois_elements() {
        let ctx = Context::new(small_ckks()).unwrap();
        assert_eq!(ctx.galois_element(0), 1);
        assert_eq!(ctx.galois_element(1), 5);
        assert_eq!(ctx.galois_element(2), 25);
        assert_eq!(ctx.conjugation_element(), 8191);
    }
}
