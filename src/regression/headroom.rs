//! Magnitude limits of the least-squares pipeline.
//!
//! An approximate value v at scale s on level k decrypts correctly only while
//! |v|·s < Q_k/2. The fit's intermediates grow like N·Σx² and Σy·Σx², so
//! data that encrypt fine can still wrap around the bottom prime without any
//! error being raised. The client holds the cleartext and checks every
//! intermediate before encrypting.

use num_traits::ToPrimitive;

use crate::context::Context;
use crate::error::{CipherfitError, Result};

/// Bits kept free under Q_k/2 for noise and rounding.
pub const HEADROOM_BITS: f64 = 2.0;

struct Bound {
    quantity: &'static str,
    magnitude: f64,
    scale: f64,
    level: usize,
}

fn sum_abs(values: &[f64]) -> f64 {
    values.iter().map(|v| v.abs()).sum()
}

/// log2(Q_level / 2)
fn half_modulus_bits(context: &Context, level: usize) -> Result<f64> {
    let modulus = context.level(level)?.modulus_product();
    let bits = modulus.to_f64().map(f64::log2).unwrap_or(modulus.bits() as f64);
    Ok(bits - 1.0)
}

/// Reject `x`, `y` when some intermediate of [`least_squares`] would exceed
/// its level modulus.
///
/// Inputs are taken as encoded at level 0 with `scale`; sums are bounded by
/// sums of absolute values.
///
/// [`least_squares`]: crate::regression::least_squares
pub fn check_fit_magnitudes(context: &Context, scale: f64, x: &[f64], y: &[f64]) -> Result<()> {
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(CipherfitError::InvalidInput("data contain a non-finite value".into()));
    }
    let n = x.len() as f64;
    let sx = sum_abs(x);
    let sy = sum_abs(y);
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a * b).abs()).sum();
    let sxx: f64 = x.iter().map(|a| a * a).sum();
    let slot_product = x.iter().zip(y)
        .map(|(a, b)| (a * b).abs().max(a * a))
        .fold(0.0, f64::max);

    let q_a = context.level(0)?.last_modulus() as f64;
    let q_b = context.level(1)?.last_modulus() as f64;
    let s1 = scale * scale / q_a;
    let s2 = scale * s1 / q_b;

    let sums = sx.max(sy);
    let sum_products = sxy.max(sxx);
    let cross = (sx * sy).max(sx * sx);
    let counted = n * sum_products;
    let mixed = (sy * sxx).max(sx * sxy);

    let bounds = [
        Bound { quantity: "x·y", magnitude: slot_product, scale: scale * scale, level: 0 },
        Bound { quantity: "Σx", magnitude: sums, scale, level: 0 },
        Bound { quantity: "Σx·Σy", magnitude: cross, scale: scale * scale, level: 0 },
        Bound { quantity: "Σx", magnitude: sums, scale, level: 1 },
        Bound { quantity: "Σxy", magnitude: sum_products, scale: s1, level: 1 },
        Bound { quantity: "N·Σxy", magnitude: counted, scale: s1 * q_b, level: 1 },
        Bound { quantity: "Σy·Σx²", magnitude: mixed, scale: scale * s1, level: 1 },
        Bound { quantity: "N·Σxy − Σx·Σy", magnitude: counted + cross, scale: s1, level: 2 },
        Bound { quantity: "Σy·Σx² − Σx·Σxy", magnitude: 2.0 * mixed, scale: s2, level: 2 },
    ];

    for bound in bounds {
        let room = half_modulus_bits(context, bound.level)? - HEADROOM_BITS;
        let needed = bound.magnitude.log2() + bound.scale.log2();
        if needed > room {
            return Err(CipherfitError::InvalidInput(format!(
                "{} reaches 2^{needed:.1} at level {} where only 2^{room:.1} fits; \
                 scale the data down",
                bound.quantity, bound.level
            )));
        }
    }
    Ok(())
}
