use crate::context::ParmsId;
use crate::ring::rns::RnsPoly;

/// RLWE ciphertext (c_0, c_1[, c_2]) at some level of the chain.
///
/// `size()` counts the components beyond c_0: 1 for a fresh or relinearized
/// ciphertext, 2 straight after a ciphertext product.
#[derive(Clone, Debug)]
pub struct Ciphertext {
    pub(crate) polys: Vec<RnsPoly>,
    pub(crate) parms_id: ParmsId,
    pub(crate) level: usize,
    pub(crate) scale: f64,
}

impl Ciphertext {
    pub fn parms_id(&self) -> ParmsId {
        self.parms_id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn size(&self) -> usize {
        self.polys.len() - 1
    }

    /// Number of primes the ciphertext currently lives over.
    pub fn num_moduli(&self) -> usize {
        self.polys.first().map_or(0, |p| p.num_components())
    }

    /// Approximate in-memory footprint of the residues.
    pub fn byte_len(&self) -> usize {
        self.polys.iter()
            .map(|p| p.num_components() * p.ring_degree * std::mem::size_of::<u64>())
            .sum()
    }
}
