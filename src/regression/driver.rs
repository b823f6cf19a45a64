//! Server side: the least-squares and prediction pipelines over ciphertexts.
//!
//! Level and scale flow for inputs at level ℓ with scale Δ, q_k the last
//! prime of level k:
//!
//! ```text
//! Sx, Sy          ℓ     Δ
//! Sxy, Sxx        ℓ+1   s = Δ²/q_ℓ
//! mA, mC          ℓ+2   s          (N encoded at ℓ+1 with scale q_{ℓ+1})
//! mB, mD          ℓ+2   s          (rescaled to ℓ+1, then mod switched)
//! bA, bB          ℓ+2   Δ·s/q_{ℓ+1}
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::encoding::{CkksEncoder, Plaintext};
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::keys::{GaloisKeys, RelinKeys};
use crate::params::{Parameters, SchemeType};
use crate::regression::protocol::{
    Count, Failure, PredictionRequest, PredictionResponse, RegressionRequest, RegressionResponse,
};
use crate::regression::{CancelToken, MIN_POINTS};
use crate::serialize::Artifact;

/// Encrypted numerators and common denominator of the fit.
#[derive(Clone, Debug)]
pub struct EncryptedFit {
    /// N·Σxy − Σx·Σy
    pub numerator_slope: Ciphertext,
    /// Σy·Σx² − Σx·Σxy
    pub numerator_intercept: Ciphertext,
    /// N·Σx² − (Σx)²
    pub denominator: Ciphertext,
}

fn trace_step(step: &'static str, ct: &Ciphertext) {
    debug!(step, level = ct.level(), scale = ct.scale(), size = ct.size(), "least squares step");
}

/// N as a constant plaintext at `level`, scaled by that level's last prime so
/// the following rescale leaves the other factor's scale unchanged.
pub fn encode_count(context: &Arc<Context>, count: u64, level: usize) -> Result<Plaintext> {
    let scale = context.level(level)?.last_modulus() as f64;
    CkksEncoder::new(context.clone())?.encode_scalar(count as f64, scale, level)
}

/// rescale(relinearize(a · b))
fn product(
    ev: &Evaluator,
    a: &Ciphertext,
    b: &Ciphertext,
    relin_keys: &RelinKeys,
) -> Result<Ciphertext> {
    let prod = ev.multiply(a, b)?;
    let prod = ev.relinearize(&prod, relin_keys)?;
    ev.rescale_to_next(&prod)
}

/// a − b after bringing both to the deeper level and b to a's scale.
fn sub_aligned(ev: &Evaluator, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
    let level = a.level().max(b.level());
    let a = ev.mod_switch_to(a, level)?;
    let b = ev.mod_switch_to(b, level)?;
    let b = ev.set_scale(&b, a.scale())?;
    ev.sub(&a, &b)
}

/// Encrypted least squares over `x` and `y` (one point per slot, unused
/// slots zero).
///
/// `count` is N encoded by [`encode_count`] one level below the inputs.
/// Every intermediate is owned by this call and dropped on return,
/// including early returns on error or cancellation.
pub fn least_squares(
    ev: &Evaluator,
    x: &Ciphertext,
    y: &Ciphertext,
    count: &Plaintext,
    relin_keys: &RelinKeys,
    galois_keys: &GaloisKeys,
    cancel: &CancelToken,
) -> Result<EncryptedFit> {
    let context = ev.context();
    if context.scheme() != SchemeType::Approximate {
        return Err(CipherfitError::Unsupported { op: "least_squares", scheme: context.scheme() });
    }
    if x.level() + 2 > context.max_level() {
        return Err(CipherfitError::DepthExceeded(format!(
            "least squares needs two levels below level {}, the chain ends at {}",
            x.level(), context.max_level()
        )));
    }

    cancel.check()?;
    let sx = ev.sum_elements(x, galois_keys)?;
    trace_step("sum_x", &sx);
    let sy = ev.sum_elements(y, galois_keys)?;
    trace_step("sum_y", &sy);

    cancel.check()?;
    let sxy = ev.sum_elements(&product(ev, x, y, relin_keys)?, galois_keys)?;
    trace_step("sum_xy", &sxy);
    let sxx = ev.sum_elements(&product(ev, x, x, relin_keys)?, galois_keys)?;
    trace_step("sum_xx", &sxx);

    cancel.check()?;
    let count = ev.mod_switch_plain_to(count, sxy.level())?;
    let m_a = ev.rescale_to_next(&ev.multiply_plain(&sxy, &count)?)?;
    let m_b = ev.mod_switch_to_next(&product(ev, &sx, &sy, relin_keys)?)?;
    let numerator_slope = sub_aligned(ev, &m_a, &m_b)?;
    trace_step("numerator_slope", &numerator_slope);

    cancel.check()?;
    let m_c = ev.rescale_to_next(&ev.multiply_plain(&sxx, &count)?)?;
    let m_d = ev.mod_switch_to_next(&product(ev, &sx, &sx, relin_keys)?)?;
    let denominator = sub_aligned(ev, &m_c, &m_d)?;
    trace_step("denominator", &denominator);

    cancel.check()?;
    let b_a = product(ev, &ev.mod_switch_to(&sy, sxx.level())?, &sxx, relin_keys)?;
    let b_b = product(ev, &ev.mod_switch_to(&sx, sxy.level())?, &sxy, relin_keys)?;
    let numerator_intercept = sub_aligned(ev, &b_a, &b_b)?;
    trace_step("numerator_intercept", &numerator_intercept);

    if numerator_slope.level() != denominator.level()
        || numerator_intercept.level() != denominator.level()
    {
        return Err(CipherfitError::LevelMismatch(format!(
            "fit outputs at levels {}, {}, {}",
            numerator_slope.level(), numerator_intercept.level(), denominator.level()
        )));
    }

    Ok(EncryptedFit { numerator_slope, numerator_intercept, denominator })
}

/// m·x + b with b aligned to the product's level and scale.
pub fn predict(
    ev: &Evaluator,
    m: &Ciphertext,
    x: &Ciphertext,
    b: &Ciphertext,
    relin_keys: &RelinKeys,
    cancel: &CancelToken,
) -> Result<Ciphertext> {
    cancel.check()?;
    let aux = product(ev, m, x, relin_keys)?;
    trace_step("m_times_x", &aux);

    cancel.check()?;
    let b = ev.mod_switch_to(b, aux.level())?;
    let b = ev.set_scale(&b, aux.scale())?;
    let prediction = ev.add(&aux, &b)?;
    trace_step("prediction", &prediction);
    Ok(prediction)
}

fn load_context(parameters: &[u8]) -> Result<Arc<Context>> {
    Context::new(Parameters::load(parameters)?)
}

/// Load, validate, compute and save one regression request.
pub fn serve_regression(
    request: &RegressionRequest,
    cancel: &CancelToken,
) -> Result<RegressionResponse> {
    let context = load_context(&request.parameters)?;
    let x = Ciphertext::load(&context, &request.x)?;
    let y = Ciphertext::load(&context, &request.y)?;
    let relin_keys = RelinKeys::load(&context, &request.relin_keys)?;
    let galois_keys = GaloisKeys::load(&context, &request.galois_keys)?;
    let count = match &request.count {
        Count::Scalar(n) => {
            if (*n as usize) < MIN_POINTS {
                return Err(CipherfitError::InvalidInput(format!(
                    "a fit needs at least {MIN_POINTS} points, got {n}"
                )));
            }
            encode_count(&context, *n, x.level() + 1)?
        }
        Count::Encoded(bytes) => Plaintext::load(&context, bytes)?,
    };
    info!(level = x.level(), "serving regression request");

    let evaluator = Evaluator::new(context);
    let fit = least_squares(&evaluator, &x, &y, &count, &relin_keys, &galois_keys, cancel)?;
    Ok(RegressionResponse {
        numerator_slope: fit.numerator_slope.save()?,
        numerator_intercept: fit.numerator_intercept.save()?,
        denominator: fit.denominator.save()?,
    })
}

pub fn serve_prediction(
    request: &PredictionRequest,
    cancel: &CancelToken,
) -> Result<PredictionResponse> {
    let context = load_context(&request.parameters)?;
    let m = Ciphertext::load(&context, &request.m)?;
    let x = Ciphertext::load(&context, &request.x)?;
    let b = Ciphertext::load(&context, &request.b)?;
    let relin_keys = RelinKeys::load(&context, &request.relin_keys)?;
    info!(level = x.level(), "serving prediction request");

    let evaluator = Evaluator::new(context);
    let prediction = predict(&evaluator, &m, &x, &b, &relin_keys, cancel)?;
    Ok(PredictionResponse { prediction: prediction.save()? })
}

/// `serve_regression` with errors turned into a structured [`Failure`].
pub fn handle_regression(
    request: &RegressionRequest,
    cancel: &CancelToken,
) -> std::result::Result<RegressionResponse, Failure> {
    serve_regression(request, cancel).map_err(|err| {
        warn!(kind = ?err.kind(), fatal = err.is_fatal(), "regression request failed: {err}");
        Failure::from(err)
    })
}

pub fn handle_prediction(
    request: &PredictionRequest,
    cancel: &CancelToken,
) -> std::result::Result<PredictionResponse, Failure> {
    serve_prediction(request, cancel).map_err(|err| {
        warn!(kind = ?err.kind(), fatal = err.is_fatal(), "prediction request failed: {err}");
        Failure::from(err)
    })
}
