use num_bigint::BigInt;
use rayon::prelude::*;

use crate::context::{Context, LevelContext};
use crate::encrypt::div_round;
use crate::error::{CipherfitError, Result};
use crate::ring::rns::{RnsBasis, RnsPoly};

/// Batched ciphertext product without approximation.
///
/// Both operands are lifted from Q_ℓ to Q_ℓ ∪ A, where A is the context's
/// auxiliary basis, so the tensor (d0, d1, d2) is computed over the integers.
/// Each d_i is then mapped to round(t·d_i / Q_ℓ) mod Q_ℓ.
pub(crate) fn exact_tensor(
    context: &Context,
    level_ctx: &LevelContext,
    a: &[RnsPoly],
    b: &[RnsPoly],
) -> Result<Vec<RnsPoly>> {
    let unsupported = || CipherfitError::Unsupported {
        op: "exact tensor",
        scheme: context.scheme(),
    };
    let t = context.plain_modulus().ok_or_else(unsupported)?;
    let aux = context.aux_basis().ok_or_else(unsupported)?;

    let mut plans = level_ctx.basis.plans.clone();
    plans.extend(aux.plans.iter().cloned());
    let wide = RnsBasis::from_plans(plans, level_ctx.basis.ring_degree)?;

    let lift = |p: &RnsPoly| -> Result<RnsPoly> {
        RnsPoly::from_bigints(&p.to_centered_bigints(&level_ctx.basis)?, &wide)
    };
    let (a0, a1) = (lift(&a[0])?, lift(&a[1])?);
    let (b0, b1) = (lift(&b[0])?, lift(&b[1])?);

    let d0 = a0.mul(&b0)?;
    let mut d1 = a0.mul(&b1)?;
    d1.add_assign(&a1.mul(&b0)?)?;
    let d2 = a1.mul(&b1)?;

    let q = BigInt::from(level_ctx.modulus_product().clone());
    let t = BigInt::from(t);
    [d0, d1, d2].iter()
        .map(|d| {
            let scaled: Vec<BigInt> = d.to_centered_bigints(&wide)?
                .par_iter()
                .map(|x| div_round(&(x * &t), &q))
                .collect();
            RnsPoly::from_bigints(&scaled, &level_ctx.basis)
        })
        .collect()
}
