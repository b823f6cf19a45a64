use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::SchemeType;

#[derive(Debug, Error)]
pub enum CipherfitError {
    /// The (ring degree, modulus chain, security level) combination is rejected.
    #[error("invalid parameters: {0}")]
    Parameter(String),

    /// Operands disagree on level/parameters, or their scales are not aligned.
    #[error("level mismatch: {0}")]
    LevelMismatch(String),

    /// No modulus left in the chain for the requested rescale or multiply.
    #[error("multiplicative depth exceeded: {0}")]
    DepthExceeded(String),

    #[error("invalid ciphertext size: expected {expected}, got {got}")]
    InvalidSize { expected: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("modulus mismatch")]
    ModulusMismatch,

    #[error("{op} is not available for the {scheme} scheme")]
    Unsupported { op: &'static str, scheme: SchemeType },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("key not available: {0}")]
    MissingKey(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<bincode::Error> for CipherfitError {
    fn from(err: bincode::Error) -> Self {
        CipherfitError::Serialization(err.to_string())
    }
}

/// Coarse error classification reported back across the transport boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parameter,
    LevelMismatch,
    DepthExceeded,
    InvalidOperand,
    MissingKey,
    InvalidInput,
    Serialization,
    Cancelled,
}

impl CipherfitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CipherfitError::Parameter(_) => ErrorKind::Parameter,
            CipherfitError::LevelMismatch(_) => ErrorKind::LevelMismatch,
            CipherfitError::DepthExceeded(_) => ErrorKind::DepthExceeded,
            CipherfitError::InvalidSize { .. }
            | CipherfitError::DimensionMismatch { .. }
            | CipherfitError::ModulusMismatch
            | CipherfitError::Unsupported { .. }
            | CipherfitError::Encoding(_) => ErrorKind::InvalidOperand,
            CipherfitError::MissingKey(_) => ErrorKind::MissingKey,
            CipherfitError::InvalidInput(_) => ErrorKind::InvalidInput,
            CipherfitError::Serialization(_) => ErrorKind::Serialization,
            CipherfitError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Parameter and depth failures repeat identically for the same inputs.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CipherfitError::Parameter(_) | CipherfitError::DepthExceeded(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CipherfitError>;
