use std::f64::consts::PI;
use std::sync::Arc;

use num_bigint::BigInt;
use num_complex::Complex64;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::context::Context;
use crate::encoding::Plaintext;
use crate::error::{CipherfitError, Result};
use crate::params::{presets, SchemeType};
use crate::ring::rns::RnsPoly;

/// Canonical-embedding encoder for the approximate scheme.
///
/// Slot j holds the evaluation at ζ^{5^j} where ζ = exp(iπ/n), so the Galois
/// element 5^r rotates slots left by r. There are n/2 complex slots; real
/// inputs use the real parts.
#[derive(Clone, Debug)]
pub struct CkksEncoder {
    context: Arc<Context>,
    slots: usize,
    /// 5^j mod 2n
    rot_group: Vec<usize>,
    /// exp(2πik / 2n) for k in 0..=2n
    ksi_pows: Vec<Complex64>,
    default_scale: f64,
}

impl CkksEncoder {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        if context.scheme() != SchemeType::Approximate {
            return Err(CipherfitError::Unsupported {
                op: "CkksEncoder",
                scheme: context.scheme(),
            });
        }
        let n = context.ring_degree();
        let m = 2 * n;
        let slots = n / 2;

        let mut rot_group = Vec::with_capacity(slots);
        let mut five_pow = 1usize;
        for _ in 0..slots {
            rot_group.push(five_pow);
            five_pow = (five_pow * 5) % m;
        }

        let ksi_pows = (0..=m)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * k as f64 / m as f64))
            .collect();

        Ok(Self { context, slots, rot_group, ksi_pows, default_scale: presets::DEFAULT_SCALE })
    }

    /// Scale used by `encode_default`.
    pub fn with_default_scale(mut self, scale: f64) -> Self {
        self.default_scale = scale;
        self
    }

    pub fn default_scale(&self) -> f64 {
        self.default_scale
    }

    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Encode reals at the default scale and the top level.
    pub fn encode_default(&self, values: &[f64]) -> Result<Plaintext> {
        self.encode(values, self.default_scale, 0)
    }

    /// Encode up to `slot_count` reals; missing slots are zero.
    pub fn encode(&self, values: &[f64], scale: f64, level: usize) -> Result<Plaintext> {
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.encode_complex(&complex, scale, level)
    }

    pub fn encode_complex(
        &self,
        values: &[Complex64],
        scale: f64,
        level: usize,
    ) -> Result<Plaintext> {
        if values.len() > self.slots {
            return Err(CipherfitError::DimensionMismatch {
                expected: self.slots,
                got: values.len(),
            });
        }
        check_scale(scale)?;

        let mut u = vec![Complex64::new(0.0, 0.0); self.slots];
        u[..values.len()].copy_from_slice(values);
        self.fft_special_inv(&mut u);

        let n = self.context.ring_degree();
        let mut coeffs = vec![0.0f64; n];
        for (i, z) in u.iter().enumerate() {
            coeffs[i] = (z.re * scale).round();
            coeffs[i + self.slots] = (z.im * scale).round();
        }
        self.plaintext_from_coeffs(&coeffs, scale, level)
    }

    /// Every slot holds `value`: the constant polynomial round(value·scale).
    pub fn encode_scalar(&self, value: f64, scale: f64, level: usize) -> Result<Plaintext> {
        check_scale(scale)?;
        let mut coeffs = vec![0.0f64; self.context.ring_degree()];
        coeffs[0] = (value * scale).round();
        self.plaintext_from_coeffs(&coeffs, scale, level)
    }

    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<f64>> {
        Ok(self.decode_complex(plain)?.into_iter().map(|z| z.re).collect())
    }

    pub fn decode_complex(&self, plain: &Plaintext) -> Result<Vec<Complex64>> {
        let level_ctx = self.context.level(plain.level)?;
        if level_ctx.parms_id != plain.parms_id {
            return Err(CipherfitError::LevelMismatch(
                "plaintext does not belong to this context".into(),
            ));
        }
        let coeffs = plain.poly.to_centered_f64(&level_ctx.basis)?;
        let mut u: Vec<Complex64> = (0..self.slots)
            .map(|i| Complex64::new(coeffs[i], coeffs[i + self.slots]) / plain.scale)
            .collect();
        self.fft_special(&mut u);
        Ok(u)
    }

    fn plaintext_from_coeffs(&self, coeffs: &[f64], scale: f64, level: usize) -> Result<Plaintext> {
        let level_ctx = self.context.level(level)?;
        let bound = level_ctx.modulus_product().to_f64().unwrap_or(f64::INFINITY) / 2.0;
        let max = coeffs.iter().fold(0.0f64, |acc, c| acc.max(c.abs()));
        if !max.is_finite() || max >= bound {
            return Err(CipherfitError::Encoding(format!(
                "scaled value {max:e} does not fit the level {level} modulus"
            )));
        }

        // i64 covers values below 2^62
        let poly = if max < (1u64 << 62) as f64 {
            let ints: Vec<i64> = coeffs.iter().map(|&c| c as i64).collect();
            RnsPoly::from_signed(&ints, &level_ctx.basis)?
        } else {
            let big = coeffs.iter()
                .map(|&c| BigInt::from_f64(c).ok_or_else(|| {
                    CipherfitError::Encoding(format!("cannot represent {c}"))
                }))
                .collect::<Result<Vec<_>>>()?;
            RnsPoly::from_bigints(&big, &level_ctx.basis)?
        };

        Ok(Plaintext { poly, parms_id: level_ctx.parms_id, level, scale })
    }

    /// Slots → coefficient-side values (inverse special FFT).
    fn fft_special_inv(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        let m = 2 * self.context.ring_degree();
        let mut len = size;
        while len >= 1 {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = m / lenq;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (lenq - (self.rot_group[j] % lenq)) * gap;
                    let u = vals[i + j] + vals[i + j + lenh];
                    let v = (vals[i + j] - vals[i + j + lenh]) * self.ksi_pows[idx];
                    vals[i + j] = u;
                    vals[i + j + lenh] = v;
                }
            }
            len >>= 1;
        }
        bit_reverse(vals);
        let inv = 1.0 / size as f64;
        for v in vals.iter_mut() {
            *v *= inv;
        }
    }

    /// Coefficient-side values → slots.
    fn fft_special(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        let m = 2 * self.context.ring_degree();
        bit_reverse(vals);
        let mut len = 2;
        while len <= size {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = m / lenq;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (self.rot_group[j] % lenq) * gap;
                    let u = vals[i + j];
                    let v = vals[i + j + lenh] * self.ksi_pows[idx];
                    vals[i + j] = u + v;
                    vals[i + j + lenh] = u - v;
                }
            }
            len <<= 1;
        }
    }
}

fn check_scale(scale: f64) -> Result<()> {
    if !scale.is_finite() || scale < 1.0 {
        return Err(CipherfitError::Encoding(format!("invalid scale {scale}")));
    }
    Ok(())
}

fn bit_reverse<T>(vals: &mut [T]) {
    let n = vals.len();
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            vals.swap(i, j);
        }
    }
}
