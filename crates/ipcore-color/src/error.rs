//! Color subsystem errors.

use ipcore_core::IpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("invalid LUT format: {0}")]
    InvalidLut(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("can't handle non-linear prelut with a channel lut. Try baking the non-linear portion of the prelut into the channel lut")]
    UnsupportedPrelut,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ColorError> for IpError {
    fn from(err: ColorError) -> Self {
        IpError::ReadFailed(err.to_string())
    }
}
