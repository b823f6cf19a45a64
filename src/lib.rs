//! # cipherfit: encrypted least squares over leveled RLWE
//!
//! Two schemes share one RNS arithmetic core:
//!
//! - **Approximate** (CKKS-style): real numbers scaled by Δ, with
//!   `rescale_to_next` dividing out one prime after each product.
//! - **Batched** (BFV-style): integers mod t packed into a 2 × n/2 matrix,
//!   with exact products.
//!
//! Every ciphertext carries a level, a scale and a size. Binary operations
//! refuse operands whose `ParmsId` or scale disagree; alignment is always an
//! explicit `mod_switch_to` / `set_scale` step.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cipherfit::prelude::*;
//!
//! let params = presets::regression(SecurityLevel::Tc128).unwrap();
//! let session = Session::new(params).unwrap();
//!
//! // client
//! let x = [1.0, 2.0, 3.0, 5.0, 6.0, 8.0, 9.0, 10.0];
//! let y = [1.5, 2.0, 4.0, 4.6, 4.7, 8.5, 8.8, 9.0];
//! let request = session.regression_request(&x, &y).unwrap();
//!
//! // server: no secret key involved
//! let response = serve_regression(&request, &CancelToken::new()).unwrap();
//!
//! // client
//! let fit = session.finish_regression(&response).unwrap();
//! println!("y = {:.4}·x + {:.4}", fit.slope, fit.intercept);
//! ```

pub mod aggregate;
pub mod ciphertext;
pub mod context;
pub mod encoding;
pub mod encrypt;
pub mod error;
pub mod eval;
pub mod keys;
pub mod params;
pub mod regression;
pub mod ring;
pub mod sampling;
pub mod serialize;
pub mod session;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::ciphertext::Ciphertext;
    pub use crate::context::{Context, ParmsId};
    pub use crate::encoding::{BatchEncoder, CkksEncoder, Encoder, Plaintext, SlotValues};
    pub use crate::encrypt::{Decryptor, Encryptor};
    pub use crate::error::{CipherfitError, ErrorKind, Result};
    pub use crate::eval::Evaluator;
    pub use crate::keys::{GaloisKeys, KeyGenerator, PublicKey, RelinKeys, SecretKey};
    pub use crate::params::{
        presets, ClientConfig, Parameters, ParametersBuilder, SchemeType, SecurityLevel,
    };
    pub use crate::regression::{
        least_squares, predict, serve_prediction, serve_regression, CancelToken, LinearFit,
        Prediction, PrecisionWarning,
    };
    pub use crate::serialize::Artifact;
    pub use crate::session::Session;
}
