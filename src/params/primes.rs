use std::collections::HashMap;

use crate::error::{CipherfitError, Result};
use crate::ring::modular::is_prime;

/// Largest supported prime size; keeps products inside u128 without tricks.
pub const MAX_PRIME_BITS: u32 = 60;

/// Walks NTT-friendly primes q = k·2n + 1 downward from 2^bits.
#[derive(Clone, Debug)]
pub struct NttFriendlyPrimes {
    step: u64,
    lower: u64,
    next: u64,
}

impl NttFriendlyPrimes {
    /// Primes with exactly `bits` bits and q ≡ 1 (mod 2n).
    pub fn new(bits: u32, ring_degree: usize) -> Result<Self> {
        if !(2..=62).contains(&bits) {
            return Err(CipherfitError::Parameter(format!("unsupported prime size {bits}")));
        }
        let step = 2 * ring_degree as u64;
        let upper = 1u64 << bits;
        let lower = 1u64 << (bits - 1);
        if step >= upper {
            return Err(CipherfitError::Parameter(format!(
                "{bits}-bit primes cannot be ≡ 1 mod {step}"
            )));
        }
        // largest k·step + 1 below 2^bits
        let next = ((upper - 1) / step) * step + 1;
        Ok(Self { step, lower, next })
    }
}

impl Iterator for NttFriendlyPrimes {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.next > self.lower {
            let candidate = self.next;
            self.next = candidate.saturating_sub(self.step);
            if is_prime(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Distinct NTT-friendly primes with the requested bit sizes, in order.
///
/// Primes of equal size are handed out largest first.
pub fn generate_primes(bit_sizes: &[u32], ring_degree: usize) -> Result<Vec<u64>> {
    let mut generators: HashMap<u32, NttFriendlyPrimes> = HashMap::new();
    let mut primes = Vec::with_capacity(bit_sizes.len());

    for &bits in bit_sizes {
        if bits > MAX_PRIME_BITS {
            return Err(CipherfitError::Parameter(format!(
                "prime size {bits} exceeds {MAX_PRIME_BITS} bits"
            )));
        }
        let generator = match generators.entry(bits) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(NttFriendlyPrimes::new(bits, ring_degree)?)
            }
        };
        let q = generator.next().ok_or_else(|| CipherfitError::Parameter(format!(
            "ran out of {bits}-bit primes ≡ 1 mod {}", 2 * ring_degree
        )))?;
        primes.push(q);
    }
    Ok(primes)
}

/// Largest `bits`-bit prime t ≡ 1 (mod 2n), suitable for batching.
pub fn batching_plain_modulus(bits: u32, ring_degree: usize) -> Result<u64> {
    NttFriendlyPrimes::new(bits, ring_degree)?
        .next()
        .ok_or_else(|| CipherfitError::Parameter(format!(
            "no {bits}-bit batching prime for n = {ring_degree}"
        )))
}
