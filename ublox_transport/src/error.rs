use std::io;

/// Errors reported by the transport core.
///
/// Framing and checksum problems seen while scanning the stream are recovered
/// internally by resynchronising and never show up here; only a caller-facing
/// outcome (nothing arrived in time, the receiver refused a request, a table
/// is full, ...) does.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad call-site arguments
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// A well-formed partial frame never completed within the available data/time
    #[error("timed out waiting for a complete message")]
    Timeout,

    /// No recognizable frame at all
    #[error("no message found")]
    NotFound,

    /// The receiver answered UBX-ACK-NAK for the request being waited on
    #[error("receiver rejected message class {class:#04x} id {id:#04x}")]
    Nack { class: u8, id: u8 },

    /// A read cursor or subscriber table is full
    #[error("no free {0} left")]
    ResourceExhausted(&'static str),

    #[error("out of memory")]
    NoMemory,

    /// The operation is not available on this transport
    #[error("operation not supported by this transport")]
    NotSupported,

    /// The caller's keep-going predicate asked to stop
    #[error("cancelled by caller")]
    Cancelled,

    /// A message is shorter than its decoder requires
    #[error("message too short, expect {expect} bytes, got {got}")]
    Truncated { expect: usize, got: usize },

    /// Neither the decoder table nor the fallback decoder handle this message
    #[error("no decoder available for this message")]
    NoDecoder,

    #[error("invalid checksum, expect {expect:#06x}, got {got:#06x}")]
    InvalidChecksum { expect: u16, got: u16 },

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DateTimeError {
    #[error("invalid date")]
    InvalidDate,
    #[error("invalid time")]
    InvalidTime,
    #[error("invalid nanoseconds")]
    InvalidNanoseconds,
}
