//! Error types for the PPM compressor.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PpmError>;

#[derive(Error, Debug)]
pub enum PpmError {
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] std::collections::TryReserveError),

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("malformed task graph: {0}")]
    Structural(String),

    #[error("dictionary too big: {size} buckets (max {max}); raise k or the size limit")]
    DictTooBig { size: u32, max: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model file: {0}")]
    InvalidFormat(String),
}

impl PpmError {
    /// Build a Structural error from anything displayable.
    pub fn structural(msg: impl Into<String>) -> Self {
        PpmError::Structural(msg.into())
    }
}
