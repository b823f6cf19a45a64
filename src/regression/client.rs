//! Client side: request building and cleartext finishing.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ciphertext::Ciphertext;
use crate::error::{CipherfitError, Result};
use crate::regression::protocol::{
    Count, PredictionRequest, PredictionResponse, RegressionRequest, RegressionResponse,
};
use crate::regression::headroom::check_fit_magnitudes;
use crate::regression::MIN_POINTS;
use crate::serialize::Artifact;
use crate::session::Session;

/// Decrypted value whose slots disagree by more than the configured
/// tolerance. Attached to the result, never raised.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecisionWarning {
    pub quantity: String,
    pub spread: f64,
    pub tolerance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub warnings: Vec<PrecisionWarning>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub value: f64,
    pub warnings: Vec<PrecisionWarning>,
}

impl Session {
    pub fn regression_request(&self, x: &[f64], y: &[f64]) -> Result<RegressionRequest> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.regression_request_with_rng(x, y, &mut rng)
    }

    /// Encrypt the data and bundle it with the evaluation keys.
    ///
    /// Rejects mismatched lengths, fewer than three points and data whose
    /// intermediates would overflow the modulus chain before anything is
    /// encrypted.
    pub fn regression_request_with_rng<R: Rng>(
        &self,
        x: &[f64],
        y: &[f64],
        rng: &mut R,
    ) -> Result<RegressionRequest> {
        if x.len() != y.len() {
            return Err(CipherfitError::DimensionMismatch { expected: x.len(), got: y.len() });
        }
        if x.len() < MIN_POINTS {
            return Err(CipherfitError::InvalidInput(format!(
                "a fit needs at least {MIN_POINTS} points, got {}", x.len()
            )));
        }
        let encoder = self.ckks_encoder()?;
        let scale = self.config().scale;
        check_fit_magnitudes(self.context(), scale, x, y)?;
        let x_plain = encoder.encode(x, scale, 0)?;
        let y_plain = encoder.encode(y, scale, 0)?;
        let x_ct = self.encryptor().encrypt_symmetric_with_rng(&x_plain, rng)?;
        let y_ct = self.encryptor().encrypt_symmetric_with_rng(&y_plain, rng)?;
        debug!(points = x.len(), "regression request built");

        Ok(RegressionRequest {
            x: x_ct.save()?,
            y: y_ct.save()?,
            count: Count::Scalar(x.len() as u64),
            parameters: self.parameters().save()?,
            relin_keys: self.relin_keys().save()?,
            galois_keys: self.galois_keys().save()?,
        })
    }

    /// Decrypt the three sums and divide in cleartext.
    pub fn finish_regression(&self, response: &RegressionResponse) -> Result<LinearFit> {
        let mut warnings = Vec::new();
        let numerator_slope =
            self.decrypt_uniform(&response.numerator_slope, "numerator_slope", &mut warnings)?;
        let numerator_intercept = self.decrypt_uniform(
            &response.numerator_intercept,
            "numerator_intercept",
            &mut warnings,
        )?;
        let denominator =
            self.decrypt_uniform(&response.denominator, "denominator", &mut warnings)?;

        if denominator.abs() <= self.config().precision_tolerance {
            return Err(CipherfitError::InvalidInput(
                "x values do not vary; the slope is undefined".into(),
            ));
        }
        Ok(LinearFit {
            slope: numerator_slope / denominator,
            intercept: numerator_intercept / denominator,
            warnings,
        })
    }

    pub fn prediction_request(&self, fit: &LinearFit, x: f64) -> Result<PredictionRequest> {
        let mut rng = ChaCha20Rng::from_os_rng();
        self.prediction_request_with_rng(fit, x, &mut rng)
    }

    pub fn prediction_request_with_rng<R: Rng>(
        &self,
        fit: &LinearFit,
        x: f64,
        rng: &mut R,
    ) -> Result<PredictionRequest> {
        let scale = self.config().scale;
        // m·x rescaled by this prime lands back on `scale`, where b sits
        let slope_scale = self.context().level(0)?.last_modulus() as f64;
        let mut encrypt = |value: f64, scale: f64| -> Result<Vec<u8>> {
            let plain = self.ckks_encoder()?.encode_scalar(value, scale, 0)?;
            self.encryptor().encrypt_symmetric_with_rng(&plain, rng)?.save()
        };
        Ok(PredictionRequest {
            m: encrypt(fit.slope, slope_scale)?,
            x: encrypt(x, scale)?,
            b: encrypt(fit.intercept, scale)?,
            parameters: self.parameters().save()?,
            relin_keys: self.relin_keys().save()?,
        })
    }

    pub fn finish_prediction(&self, response: &PredictionResponse) -> Result<Prediction> {
        let mut warnings = Vec::new();
        let value = self.decrypt_uniform(&response.prediction, "prediction", &mut warnings)?;
        Ok(Prediction { value, warnings })
    }

    /// Slot 0 of a ciphertext whose slots should all agree.
    fn decrypt_uniform(
        &self,
        bytes: &[u8],
        quantity: &str,
        warnings: &mut Vec<PrecisionWarning>,
    ) -> Result<f64> {
        let ct = Ciphertext::load(self.context(), bytes)?;
        let slots = self.ckks_encoder()?.decode(&self.decryptor().decrypt(&ct)?)?;
        let (min, max) = slots.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let spread = max - min;
        let tolerance = self.config().precision_tolerance;
        if spread > tolerance {
            warn!(quantity, spread, tolerance, "decrypted value is less precise than requested");
            warnings.push(PrecisionWarning { quantity: quantity.to_string(), spread, tolerance });
        }
        slots.first().copied().ok_or_else(|| CipherfitError::Encoding("no slots decoded".into()))
    }
}
