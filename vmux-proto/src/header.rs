//! Fixed-size frame header and the type/opcode tables.

use crate::error::{ProtoError, Result};

/// Protocol version spoken by this crate.
///
/// Version 2 widened the header with version, header length, type and
/// opcode fields and is not backward compatible with version 1.
pub const PROTOCOL_VERSION: u16 = 2;

/// Encoded size of [`FrameHeader`] in bytes.
pub const HEADER_SIZE: usize = 14;

/// The kind of frame, carried in the header's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u8)]
pub enum FrameType {
    /// A command from a client to the supervisor.
    Command = 0,
    /// A reply from the supervisor to exactly one command.
    Response = 1,
    /// I/O bytes to forward to or from the VM agent.
    Stream = 2,
    /// A one-way notification; never answered.
    Notification = 3,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::Response),
            2 => Ok(Self::Stream),
            3 => Ok(Self::Notification),
            other => Err(ProtoError::UnknownType(other)),
        }
    }
}

/// Opcode space for [`FrameType::Command`] frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u16)]
pub enum Command {
    /// Register a new VM with the supervisor.
    RegisterVm = 0,
    /// Unregister a VM.
    UnregisterVm = 1,
    /// Attach to an already-registered VM.
    AttachVm = 2,
    /// Forward a command to the agent inside the VM.
    Hyper = 3,
    /// Identify the client as a shim and obtain its I/O endpoint.
    ConnectShim = 4,
    /// Unregister a shim.
    DisconnectShim = 5,
    /// Send a signal to a process inside the VM; shims only.
    Signal = 6,
}

impl From<Command> for u16 {
    fn from(cmd: Command) -> Self {
        cmd as Self
    }
}

impl TryFrom<u16> for Command {
    type Error = ProtoError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::RegisterVm),
            1 => Ok(Self::UnregisterVm),
            2 => Ok(Self::AttachVm),
            3 => Ok(Self::Hyper),
            4 => Ok(Self::ConnectShim),
            5 => Ok(Self::DisconnectShim),
            6 => Ok(Self::Signal),
            opcode => Err(ProtoError::UnknownOpcode {
                ty: FrameType::Command,
                opcode,
            }),
        }
    }
}

/// Opcode space for [`FrameType::Stream`] frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[repr(u16)]
pub enum StreamKind {
    /// Stdin bytes.
    Stdin = 0,
    /// Stdout bytes.
    Stdout = 1,
    /// Stderr bytes.
    Stderr = 2,
}

impl From<StreamKind> for u16 {
    fn from(kind: StreamKind) -> Self {
        kind as Self
    }
}

impl TryFrom<u16> for StreamKind {
    type Error = ProtoError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            opcode => Err(ProtoError::UnknownOpcode {
                ty: FrameType::Stream,
                opcode,
            }),
        }
    }
}

/// Decoded frame header.
///
/// The encoding carries two reserved regions (bytes 3..7) that are
/// written as zero and ignored on receive; they are not represented
/// here, which is what lets the header grow in a future version behind
/// the header length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol version the frame was encoded with.
    pub version: u16,
    /// Frame kind.
    pub ty: FrameType,
    /// Opcode, interpreted relative to `ty`.
    pub opcode: u16,
    /// Exact byte length of the payload that follows the header.
    pub payload_length: u32,
}

impl FrameHeader {
    /// Creates a header for a payload of `payload_length` bytes.
    pub fn new(version: u16, ty: FrameType, opcode: u16, payload_length: u32) -> Self {
        Self {
            version,
            ty,
            opcode,
            payload_length,
        }
    }

    /// Encodes the header into its fixed-size wire form.
    ///
    /// Multi-byte fields are big-endian; reserved bytes are zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2] = HEADER_SIZE as u8;
        // bytes 3..7 reserved
        buf[7] = self.ty as u8;
        buf[8..10].copy_from_slice(&self.opcode.to_be_bytes());
        buf[10..14].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decodes a header from `bytes`, validating it against the
    /// connection's pinned `version`.
    ///
    /// Command and stream opcodes are checked against their closed
    /// spaces; response and notification opcodes pass through.
    pub fn decode(bytes: &[u8], version: u16) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtoError::TruncatedHeader { len: bytes.len() });
        }
        let found = u16::from_be_bytes([bytes[0], bytes[1]]);
        if found != version {
            return Err(ProtoError::VersionMismatch {
                expected: version,
                found,
            });
        }
        if usize::from(bytes[2]) != HEADER_SIZE {
            return Err(ProtoError::BadHeaderLength { found: bytes[2] });
        }
        let ty = FrameType::try_from(bytes[7])?;
        let opcode = u16::from_be_bytes([bytes[8], bytes[9]]);
        match ty {
            FrameType::Command => {
                Command::try_from(opcode)?;
            }
            FrameType::Stream => {
                StreamKind::try_from(opcode)?;
            }
            _ => {}
        }
        let payload_length = u32::from_be_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
        Ok(Self {
            version: found,
            ty,
            opcode,
            payload_length,
        })
    }
}
