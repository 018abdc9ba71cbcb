//! Frame envelope over any `Read`/`Write` stream.
//!
//! Each frame is a fixed-size big-endian header followed by exactly
//! `payload_length` payload bytes.

use std::io::{self, Read, Write};

use crate::error::{ProtoError, Result};
use crate::header::{FrameHeader, FrameType, HEADER_SIZE};

/// Maximum allowed frame payload (16 MiB).
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// Writes one frame: header plus payload as a single buffered write.
///
/// On error the stream must be considered unusable; a partial frame may
/// have been written.
pub fn write_frame<W: Write>(
    w: &mut W,
    version: u16,
    ty: FrameType,
    opcode: u16,
    payload: &[u8],
) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtoError::PayloadTooLarge {
        length: payload.len(),
    })?;
    if len > MAX_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            length: payload.len(),
        });
    }

    let header = FrameHeader::new(version, ty, opcode, len);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    w.write_all(&buf)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame, validating the header against the connection's
/// pinned `version`.
///
/// A payload length above [`MAX_PAYLOAD`] is rejected before any
/// allocation. A stream that ends inside the declared payload is a
/// [`ProtoError::ShortPayload`], never a partial frame.
pub fn read_frame<R: Read>(r: &mut R, version: u16) -> Result<(FrameType, u16, Vec<u8>)> {
    let mut head = [0u8; HEADER_SIZE];
    r.read_exact(&mut head)?;
    let header = FrameHeader::decode(&head, version)?;

    if header.payload_length > MAX_PAYLOAD {
        return Err(ProtoError::PayloadTooLarge {
            length: header.payload_length as usize,
        });
    }
    let mut payload = vec![0u8; header.payload_length as usize];
    r.read_exact(&mut payload).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtoError::ShortPayload {
                expected: header.payload_length,
            }
        } else {
            ProtoError::Io(e)
        }
    })?;
    Ok((header.ty, header.opcode, payload))
}
