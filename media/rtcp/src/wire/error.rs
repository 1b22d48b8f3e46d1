use thiserror::Error;

/// Why an incoming RTCP datagram was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("datagram shorter than an RTCP header ({len} bytes)")]
    TooShort { len: usize },

    #[error("unsupported RTCP version {0}")]
    BadVersion(u8),

    #[error("declared packet length ({declared} bytes) exceeds remaining datagram ({available} bytes)")]
    BadLength { declared: usize, available: usize },

    #[error("invalid padding")]
    BadPadding,

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("malformed {0}")]
    Malformed(&'static str),
}
