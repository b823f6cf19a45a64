pub mod gaussian;
pub mod uniform;

pub use gaussian::{sample_gaussian, GaussianSampler};
pub use uniform::{sample_ternary, sample_uniform_mod, sample_uniform_rns};
