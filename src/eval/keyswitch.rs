use rayon::prelude::*;

use crate::context::LevelContext;
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::keys::KeySwitchKey;
use crate::ring::ntt::NttPoly;
use crate::ring::rns::RnsPoly;

impl Evaluator {
    /// Hybrid key switching with one RNS component per digit.
    ///
    /// For d over the k primes of `level_ctx`, returns (Δ0, Δ1) with
    /// Δ0 + Δ1·s ≈ d·s' where s' is the key's source secret:
    ///
    ///   Δ_j = round( Σ_i [d]_{q_i} · key_i / P )   over Q_ℓ
    ///
    /// Each [d]_{q_i} is lifted from [0, q_i) to every prime of Q_ℓ·P, the
    /// products accumulate in NTT form, and the special prime is divided out.
    pub(crate) fn switch_key(
        &self,
        d: &RnsPoly,
        key: &KeySwitchKey,
        level_ctx: &LevelContext,
    ) -> Result<(RnsPoly, RnsPoly)> {
        let k = level_ctx.num_moduli();
        if d.num_components() != k {
            return Err(CipherfitError::DimensionMismatch { expected: k, got: d.num_components() });
        }
        if key.keys.len() < k {
            return Err(CipherfitError::MissingKey(format!(
                "key-switching key has {} digits, level needs {k}", key.keys.len()
            )));
        }
        let special_index = self.context.key_basis().num_moduli() - 1;
        let ext = &level_ctx.extended_basis;
        let n = ext.ring_degree;

        let digits: Vec<Vec<u64>> = d.components.par_iter().map(NttPoly::to_coeffs).collect();

        let accumulated = ext.plans.par_iter()
            .enumerate()
            .map(|(j, plan)| {
                let qj = ext.moduli[j];
                // key component that lines up with prime j of the extended basis
                let key_index = if j < k { j } else { special_index };
                let mut acc0 = NttPoly::zero(n, qj, plan.clone());
                let mut acc1 = NttPoly::zero(n, qj, plan.clone());
                for (i, digit) in digits.iter().enumerate() {
                    let lifted = if i == j {
                        d.components[i].clone()
                    } else {
                        NttPoly::from_coeffs(digit.iter().map(|&c| c % qj).collect(), plan.clone())
                    };
                    let (k0, k1) = &key.keys[i];
                    acc0.mul_acc(&lifted, &k0.components[key_index])?;
                    acc1.mul_acc(&lifted, &k1.components[key_index])?;
                }
                Ok((acc0, acc1))
            })
            .collect::<Result<Vec<_>>>()?;

        let (comps0, comps1): (Vec<_>, Vec<_>) = accumulated.into_iter().unzip();
        let delta0 = RnsPoly { components: comps0, ring_degree: n }.divide_round_by_last()?;
        let delta1 = RnsPoly { components: comps1, ring_degree: n }.divide_round_by_last()?;
        Ok((delta0, delta1))
    }
}
