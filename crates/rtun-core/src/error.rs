//! Wire error taxonomy and the crate's typed error enum.

use thiserror::Error;

/// One-byte error code carried on the wire in `CONN`/`BIND` answers.
///
/// See `spec.md` §7. Values are fixed by the protocol, not reorderable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Success = 0,
    Generic = 1,
    Forbidden = 2,
    ConnRefused = 3,
    NotAvailable = 4,
    Resolve = 5,
}

impl ErrorCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Success),
            1 => Some(Self::Generic),
            2 => Some(Self::Forbidden),
            3 => Some(Self::ConnRefused),
            4 => Some(Self::NotAvailable),
            5 => Some(Self::Resolve),
            _ => None,
        }
    }

    /// Map an OS-level connect/bind/resolve failure to the wire taxonomy.
    ///
    /// Mirrors the `wsa_to_r2t_error` table from the original tunnel
    /// implementation: access-denied, connection-refused,
    /// address-not-available, and host-not-found each get a dedicated code;
    /// everything else falls back to `Generic`.
    pub fn from_io_error(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::PermissionDenied => Self::Forbidden,
            ErrorKind::ConnectionRefused => Self::ConnRefused,
            ErrorKind::AddrNotAvailable => Self::NotAvailable,
            _ => Self::Generic,
        }
    }
}

/// Errors produced by the rtun protocol layer (framing, addressing).
#[derive(Debug, Error)]
pub enum RtunError {
    #[error("frame too large: {0} bytes exceeds u16 payload limit")]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("unsupported address family tag: {0}")]
    UnknownAddressFamily(u8),

    #[error("truncated address payload: need {need} bytes, have {have}")]
    TruncatedAddress { need: usize, have: usize },

    #[error("unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RtunResult<T> = Result<T, RtunError>;
