//! Error types for vmux client operations.

use vmux_proto::ProtoError;

/// Alias for `Result<T, vmux::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by client calls.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Framing, transport, or descriptor failure on the connection.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// The supervisor reported that the operation failed.
    #[error("{message}")]
    Remote {
        /// Peer-supplied failure text, or `"unknown error"`.
        message: String,
    },

    /// A result field the operation requires was absent.
    #[error("{op}: missing field \"{field}\" in response")]
    MissingField {
        /// Operation that expected the field.
        op: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },

    /// A result field was present but not of the expected shape.
    #[error("{op}: field \"{field}\" is not {expected}")]
    TypeMismatch {
        /// Operation that expected the field.
        op: &'static str,
        /// Name of the malformed field.
        field: &'static str,
        /// Shape the field was expected to have.
        expected: &'static str,
    },
}

impl Error {
    /// Builds a [`Error::Remote`] from the peer's optional message.
    pub(crate) fn remote(message: Option<String>) -> Self {
        Self::Remote {
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "unknown error".to_owned()),
        }
    }

    /// Whether the connection must be abandoned after this error.
    ///
    /// Remote failures and response-shape mismatches leave the frame
    /// stream intact and the connection usable; anything from the
    /// protocol layer does not.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Proto(_))
    }
}
