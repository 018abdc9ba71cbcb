//! Protocol error taxonomy.

use std::io;

use crate::header::FrameType;

/// Alias for `Result<T, ProtoError>`.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors produced by framing, transport, and descriptor transfer.
///
/// Every variant leaves the connection in an unknown state: a frame may
/// have been partially written or read, or the side-channel may hold an
/// unconsumed descriptor. Callers should drop the connection rather than
/// attempt another frame.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProtoError {
    /// Fewer bytes than the fixed header size were available.
    #[error("truncated header: {len} bytes")]
    TruncatedHeader {
        /// Number of bytes available.
        len: usize,
    },

    /// The header length field disagrees with the fixed header size.
    #[error("bad header length: {found}")]
    BadHeaderLength {
        /// Value of the header length field.
        found: u8,
    },

    /// The frame version differs from the connection's pinned version.
    #[error("protocol version mismatch: expected {expected}, got {found}")]
    VersionMismatch {
        /// Version pinned for the connection.
        expected: u16,
        /// Version carried by the frame.
        found: u16,
    },

    /// The frame type byte is outside the type space.
    #[error("unknown frame type {0}")]
    UnknownType(u8),

    /// The opcode is outside the closed space for its frame type.
    #[error("opcode {opcode} invalid for {ty:?} frames")]
    UnknownOpcode {
        /// Frame type the opcode was interpreted against.
        ty: FrameType,
        /// The out-of-range opcode.
        opcode: u16,
    },

    /// The payload length exceeds [`MAX_PAYLOAD`](crate::MAX_PAYLOAD).
    #[error("payload of {length} bytes exceeds frame limit")]
    PayloadTooLarge {
        /// Declared or actual payload length.
        length: usize,
    },

    /// The stream ended before the full declared payload arrived.
    #[error("short payload: expected {expected} bytes")]
    ShortPayload {
        /// Payload length the header declared.
        expected: u32,
    },

    /// A frame of the wrong type arrived where a response was expected.
    #[error("unexpected {ty:?} frame while awaiting a response")]
    UnexpectedFrame {
        /// Type of the frame that arrived.
        ty: FrameType,
    },

    /// An envelope body could not be encoded or decoded.
    #[error("envelope codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// The descriptor side-channel failed.
    #[error("fd transfer: {reason}")]
    FdTransfer {
        /// What went wrong.
        reason: String,
    },

    /// The underlying socket read or write failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
