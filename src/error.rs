use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Truncated bitstream: {0}")]
    Truncated(String),

    #[error("Malformed bitstream: {0}")]
    Malformed(String),

    #[error("Band {band} cannot be decoded before its parent band {parent}")]
    ParentNotDecoded { band: usize, parent: usize },

    #[error("CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("Coding parameter error: {0}")]
    Params(String),

    #[error("Coding parameter mismatch: {0}")]
    ParamsMismatch(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
