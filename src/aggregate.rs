//! Totals and averages over encrypted records.
//!
//! Each record is one ciphertext whose slots hold attributes (weight, age,
//! ...). The server adds records slot-wise; the client divides by the record
//! count after decryption.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::encoding::SlotValues;
use crate::error::{CipherfitError, Result};
use crate::eval::Evaluator;
use crate::keys::GaloisKeys;
use crate::params::Parameters;
use crate::regression::CancelToken;
use crate::serialize::Artifact;
use crate::session::Session;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TotalRequest {
    pub parameters: Vec<u8>,
    pub records: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TotalResponse {
    pub encrypted_sum: Vec<u8>,
    pub count: u64,
}

/// Slot-wise sum of every record.
pub fn encrypted_total(ev: &Evaluator, records: &[Ciphertext]) -> Result<Ciphertext> {
    ev.add_many(records)
}

/// Fold one record to the total of its slots, replicated in every slot.
pub fn slot_total(
    ev: &Evaluator,
    record: &Ciphertext,
    galois_keys: &GaloisKeys,
) -> Result<Ciphertext> {
    ev.sum_elements(record, galois_keys)
}

pub fn average(total: f64, count: usize) -> Result<f64> {
    if count == 0 {
        return Err(CipherfitError::InvalidInput("average of zero records".into()));
    }
    Ok(total / count as f64)
}

pub fn serve_total(request: &TotalRequest, cancel: &CancelToken) -> Result<TotalResponse> {
    let context = Context::new(Parameters::load(&request.parameters)?)?;
    let mut records = Vec::with_capacity(request.records.len());
    for bytes in &request.records {
        cancel.check()?;
        records.push(Ciphertext::load(&context, bytes)?);
    }
    info!(records = records.len(), "serving total request");
    let total = encrypted_total(&Evaluator::new(context), &records)?;
    Ok(TotalResponse { encrypted_sum: total.save()?, count: records.len() as u64 })
}

impl Session {
    pub fn total_request(&self, records: &[Ciphertext]) -> Result<TotalRequest> {
        Ok(TotalRequest {
            parameters: self.parameters().save()?,
            records: records.iter().map(Artifact::save).collect::<Result<Vec<_>>>()?,
        })
    }

    /// Per-slot averages of the records behind `response`.
    pub fn finish_average(&self, response: &TotalResponse) -> Result<Vec<f64>> {
        let total = Ciphertext::load(self.context(), &response.encrypted_sum)?;
        let count = response.count as usize;
        match self.decrypt(&total)? {
            SlotValues::Integers(v) => v.into_iter().map(|t| average(t as f64, count)).collect(),
            SlotValues::Reals(v) => v.into_iter().map(|t| average(t, count)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{presets, ClientConfig, SecurityLevel};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_average_weight_over_records() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let params = presets::batched(SecurityLevel::Tc128).unwrap();
        let session = Session::with_rng(params, ClientConfig::default(), &mut rng).unwrap();

        // weight, height
        let rows = [[70i64, 180], [82, 175], [64, 168], [91, 190]];
        let records: Vec<Ciphertext> = rows.iter()
            .map(|r| session.encrypt_with_rng(&SlotValues::Integers(r.to_vec()), &mut rng).unwrap())
            .collect();

        let request = session.total_request(&records).unwrap();
        let response = serve_total(&request, &CancelToken::new()).unwrap();
        assert_eq!(response.count, 4);
        let averages = session.finish_average(&response).unwrap();
        assert_eq!(averages[0], 76.75);
        assert_eq!(averages[1], 178.25);
    }

    #[test]
    fn test_slot_total_and_empty_average() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let params = presets::batched(SecurityLevel::Tc128).unwrap();
        let session = Session::with_rng(params, ClientConfig::default(), &mut rng).unwrap();
        let ct = session.encrypt_with_rng(&SlotValues::Integers(vec![3, 4, 5]), &mut rng).unwrap();
        let total = slot_total(&session.evaluator(), &ct, session.galois_keys()).unwrap();
        match session.decrypt(&total).unwrap() {
            SlotValues::Integers(v) => assert!(v.iter().all(|&x| x == 12)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(average(1.0, 0).is_err());
    }
}
