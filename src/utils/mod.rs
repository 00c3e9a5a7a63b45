//! Linear algebra helpers for the leastsq-rs library.

pub mod qr;
pub mod weights;

pub use qr::QrDecomposition;
pub use weights::WeightFactor;
