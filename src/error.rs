//! Library-wide error and result types.

use thiserror::Error;

/// Result alias used throughout nxcodec.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Every failure aborts the single operation that produced it; no codec
/// logs, retries or partially recovers. Messages are kept terse, callers
/// that need richer context should wrap `Error` in their own type.
#[derive(Debug, Error)]
pub enum Error {
    /// The buffer is shorter than the structure's fixed minimum size.
    #[error("truncated input: need {expected:#x} bytes, got {actual:#x}")]
    TruncatedInput { expected: usize, actual: usize },
    /// A magic field did not match any recognised value.
    #[error("bad magic value")]
    BadMagic,
    /// A format version constant did not match the supported value.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),
    /// A flags constant did not match the supported value.
    #[error("unsupported flags: {0:#x}")]
    UnsupportedFlags(u32),
    /// More entries than the fixed architectural maximum.
    #[error("too many {what} (max {max})")]
    CapacityExceeded { what: &'static str, max: usize },
    /// Explicit signature validation failed.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// A SHA-256 digest did not match the recorded hash.
    #[error("hash mismatch")]
    HashMismatch,
    /// Encode was requested for a format variant with no defined layout.
    #[error("unknown format variant")]
    UnknownFormatVariant,
    /// An offset or size would read outside the valid region, or cannot be
    /// represented in its on-disk field.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A field value exceeds the bit width it is packed into.
    #[error("{field} out of range: {value}")]
    ValueOutOfRange { field: &'static str, value: u32 },
    /// A service name is empty, too long or not ASCII.
    #[error("invalid service name")]
    InvalidName,
    /// A structural constraint was violated (message describes which one).
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    /// A caller-supplied signing capability failed.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl Error {
    pub(crate) fn truncated(expected: usize, actual: usize) -> Self {
        Error::TruncatedInput { expected, actual }
    }
}
