//! Messages exchanged with the regression server.
//!
//! Every field is an artifact produced by [`crate::serialize`]. Embedding the
//! bytes in a text envelope is left to the transport.

use serde::{Deserialize, Serialize};

use crate::error::{CipherfitError, ErrorKind};

/// Number of points in the fit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Count {
    /// Encoded by the server.
    Scalar(u64),
    /// A saved plaintext at level 1 whose scale equals level 1's last prime.
    Encoded(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegressionRequest {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
    pub count: Count,
    pub parameters: Vec<u8>,
    pub relin_keys: Vec<u8>,
    pub galois_keys: Vec<u8>,
}

/// Slope is `numerator_slope / denominator`, intercept
/// `numerator_intercept / denominator`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegressionResponse {
    pub numerator_slope: Vec<u8>,
    pub numerator_intercept: Vec<u8>,
    pub denominator: Vec<u8>,
}

/// `x` and `b` share one scale; `m` is encoded at the last prime of their
/// level so the rescaled product m·x comes back to that scale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub m: Vec<u8>,
    pub x: Vec<u8>,
    pub b: Vec<u8>,
    pub parameters: Vec<u8>,
    pub relin_keys: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: Vec<u8>,
}

/// Structured failure surfaced to the caller instead of a result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CipherfitError> for Failure {
    fn from(err: &CipherfitError) -> Self {
        Failure { kind: err.kind(), message: err.to_string() }
    }
}

impl From<CipherfitError> for Failure {
    fn from(err: CipherfitError) -> Self {
        Failure::from(&err)
    }
}
