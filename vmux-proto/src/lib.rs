//! Wire protocol for the vmux supervisor control socket.
//!
//! Four message kinds share one Unix stream connection: commands,
//! command responses, I/O byte streams, and one-way notifications.
//! Every message starts with a fixed 14-byte big-endian header
//! ([`FrameHeader`]) carrying the protocol version, frame type, opcode,
//! and exact payload length. Command and response payloads are JSON
//! envelopes ([`Request`] / [`Response`]); stream and notification
//! payloads are raw bytes. An open file descriptor can additionally
//! ride the connection as `SCM_RIGHTS` ancillary data ([`send_fd`] /
//! [`recv_fd`]).

mod codec;
mod error;
#[cfg(unix)]
mod fd;
mod header;
mod message;

pub use codec::{MAX_PAYLOAD, read_frame, write_frame};
pub use error::{ProtoError, Result};
#[cfg(unix)]
pub use fd::{recv_fd, send_fd};
pub use header::{Command, FrameHeader, FrameType, HEADER_SIZE, PROTOCOL_VERSION, StreamKind};
pub use message::{AllocateIo, Attach, Hyper, RegisterVm, Request, Response, UnregisterVm};
