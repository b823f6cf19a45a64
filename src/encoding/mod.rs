pub mod batch;
pub mod ckks;

pub use batch::BatchEncoder;
pub use ckks::CkksEncoder;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{Context, ParmsId};
use crate::error::{CipherfitError, Result};
use crate::params::SchemeType;
use crate::ring::rns::RnsPoly;

/// Encoded polynomial at a level, in NTT form over that level's primes.
///
/// Batched plaintexts hold the centered lift of m mod t and carry scale 1.
#[derive(Clone, Debug)]
pub struct Plaintext {
    pub(crate) poly: RnsPoly,
    pub(crate) parms_id: ParmsId,
    pub(crate) level: usize,
    pub(crate) scale: f64,
}

impl Plaintext {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Cleartext slot contents for either scheme.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SlotValues {
    Integers(Vec<i64>),
    Reals(Vec<f64>),
}

impl SlotValues {
    pub fn len(&self) -> usize {
        match self {
            SlotValues::Integers(v) => v.len(),
            SlotValues::Reals(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scheme-specialised encoder.
#[derive(Clone, Debug)]
pub enum Encoder {
    Batched(BatchEncoder),
    Approximate(CkksEncoder),
}

impl Encoder {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        match context.scheme() {
            SchemeType::Batched => Ok(Encoder::Batched(BatchEncoder::new(context)?)),
            SchemeType::Approximate => Ok(Encoder::Approximate(CkksEncoder::new(context)?)),
        }
    }

    pub fn scheme(&self) -> SchemeType {
        match self {
            Encoder::Batched(_) => SchemeType::Batched,
            Encoder::Approximate(_) => SchemeType::Approximate,
        }
    }

    pub fn slot_count(&self) -> usize {
        match self {
            Encoder::Batched(e) => e.slot_count(),
            Encoder::Approximate(e) => e.slot_count(),
        }
    }

    /// Encode at `level` (default 0); `scale` defaults to the encoder's own
    /// and is ignored by the batched scheme.
    pub fn encode(
        &self,
        values: &SlotValues,
        scale: Option<f64>,
        level: Option<usize>,
    ) -> Result<Plaintext> {
        let level = level.unwrap_or(0);
        match (self, values) {
            (Encoder::Batched(e), SlotValues::Integers(v)) => e.encode_at(v, level),
            (Encoder::Approximate(e), SlotValues::Reals(v)) => {
                e.encode(v, scale.unwrap_or(e.default_scale()), level)
            }
            (Encoder::Approximate(e), SlotValues::Integers(v)) => {
                let reals: Vec<f64> = v.iter().map(|&x| x as f64).collect();
                e.encode(&reals, scale.unwrap_or(e.default_scale()), level)
            }
            (Encoder::Batched(_), SlotValues::Reals(_)) => Err(CipherfitError::Encoding(
                "batched scheme encodes integers only".into(),
            )),
        }
    }

    pub fn decode(&self, plain: &Plaintext) -> Result<SlotValues> {
        match self {
            Encoder::Batched(e) => Ok(SlotValues::Integers(e.decode(plain)?)),
            Encoder::Approximate(e) => Ok(SlotValues::Reals(e.decode(plain)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{presets, SecurityLevel};

    #[test]
    fn test_encoder_dispatch() {
        let ctx = Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap();
        let enc = Encoder::new(ctx).unwrap();
        assert_eq!(enc.scheme(), SchemeType::Batched);
        assert_eq!(enc.slot_count(), 4096);

        let plain = enc.encode(&SlotValues::Integers(vec![7, -7]), None, None).unwrap();
        match enc.decode(&plain).unwrap() {
            SlotValues::Integers(v) => assert_eq!(&v[..2], &[7, -7]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(enc.encode(&SlotValues::Reals(vec![0.5]), None, None).is_err());
    }

    #[test]
    fn test_wrong_scheme_encoders_rejected() {
        let ctx = Context::new(presets::batched(SecurityLevel::Tc128).unwrap()).unwrap();
        assert!(matches!(
            CkksEncoder::new(ctx),
            Err(CipherfitError::Unsupported { .. })
        ));
    }
}
