use std::io;

use crate::RouterId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("packet truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("unsupported protocol version {0}")]
    BadVersion(u8),

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("packet checksum mismatch (carried {carried:#06x}, computed {computed:#06x})")]
    BadChecksum { carried: u16, computed: u16 },

    #[error("LSA checksum mismatch for {advertising_router} seq {sequence:#010x}")]
    BadLsaChecksum {
        advertising_router: RouterId,
        sequence: i32,
    },

    #[error("length field {declared} does not match buffer of {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("unknown LSA type {0}")]
    UnknownLsaType(u8),

    #[error("unknown congestion color {0}")]
    UnknownColor(u8),

    #[error("sequence number space exhausted for self-originated LSA of {router}; operator intervention required")]
    SequenceExhausted { router: RouterId },

    #[error("message from unknown neighbor {router} on {iface}")]
    UnknownNeighbor { iface: String, router: RouterId },

    #[error("unknown interface {0}")]
    UnknownInterface(String),

    #[error("unknown router {0}")]
    UnknownRouter(RouterId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Errors the engine cannot recover from on its own.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::SequenceExhausted { .. } | Error::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
