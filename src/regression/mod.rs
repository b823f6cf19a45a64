//! Encrypted least-squares fit and prediction.
//!
//! The server side ([`driver`]) only ever sees ciphertexts and evaluation
//! keys. The client side ([`client`]) builds requests and performs the final
//! divisions after decryption; that division is the one place where the fit
//! exists in cleartext.

pub mod client;
pub mod driver;
pub mod headroom;
pub mod protocol;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CipherfitError, Result};

pub use client::{LinearFit, Prediction, PrecisionWarning};
pub use driver::{
    encode_count, handle_prediction, handle_regression, least_squares, predict, serve_prediction,
    serve_regression, EncryptedFit,
};
pub use headroom::check_fit_magnitudes;
pub use protocol::{
    Count, Failure, PredictionRequest, PredictionResponse, RegressionRequest, RegressionResponse,
};

/// Fewest points a fit is computed from.
pub const MIN_POINTS: usize = 3;

/// Shared flag the transport flips to abandon a request.
///
/// Drivers poll it between steps; a cancelled request returns
/// `CipherfitError::Cancelled` and drops every intermediate ciphertext.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CipherfitError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(CipherfitError::Cancelled)));
    }
}
