//! Descriptor side-channel.
//!
//! One open descriptor rides as `SCM_RIGHTS` ancillary data on a single
//! carrier byte, so the receiver consumes exactly one byte and the
//! stream stays aligned with the frame protocol. The wire carries no
//! "descriptor follows" marker; sender and receiver agree on when one
//! is expected through the operation catalog.

#![allow(unsafe_code)]

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{
    ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr, recvmsg, sendmsg,
};

use crate::error::{ProtoError, Result};

/// Sends one open descriptor over `sock`.
///
/// The descriptor itself is not consumed; the kernel installs a
/// duplicate in the receiving process.
pub fn send_fd(sock: &impl AsFd, fd: &impl AsFd) -> Result<()> {
    let fds = [fd.as_fd().as_raw_fd()];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    let iov = [IoSlice::new(&[0u8])];
    let sent = sendmsg::<UnixAddr>(
        sock.as_fd().as_raw_fd(),
        &iov,
        &cmsgs,
        MsgFlags::empty(),
        None,
    )
    .map_err(|e| ProtoError::FdTransfer {
        reason: format!("sendmsg: {e}"),
    })?;
    if sent == 0 {
        return Err(ProtoError::FdTransfer {
            reason: "sendmsg wrote no bytes".to_owned(),
        });
    }
    Ok(())
}

/// Receives one descriptor from `sock`, consuming its carrier byte.
///
/// Ownership transfers to the caller. Zero or more than one attached
/// descriptor, or a closed connection, is a
/// [`ProtoError::FdTransfer`]; surplus descriptors are closed before
/// returning.
pub fn recv_fd(sock: &impl AsFd) -> Result<OwnedFd> {
    let mut carrier = [0u8; 1];
    let mut iov = [IoSliceMut::new(&mut carrier)];
    let mut cmsg_buf = nix::cmsg_space!([RawFd; 2]);

    let msg = recvmsg::<UnixAddr>(
        sock.as_fd().as_raw_fd(),
        &mut iov,
        Some(&mut cmsg_buf),
        MsgFlags::empty(),
    )
    .map_err(|e| ProtoError::FdTransfer {
        reason: format!("recvmsg: {e}"),
    })?;

    if msg.bytes == 0 {
        return Err(ProtoError::FdTransfer {
            reason: "connection closed before descriptor arrived".to_owned(),
        });
    }

    let mut fds: Vec<OwnedFd> = Vec::new();
    let cmsgs = msg.cmsgs().map_err(|e| ProtoError::FdTransfer {
        reason: format!("ancillary data: {e}"),
    })?;
    for cmsg in cmsgs {
        if let ControlMessageOwned::ScmRights(raw) = cmsg {
            for fd in raw {
                // SAFETY: the fd was just installed by the kernel for
                // this process and is owned by no one else yet.
                fds.push(unsafe { OwnedFd::from_raw_fd(fd) });
            }
        }
    }

    match fds.len() {
        1 => Ok(fds.remove(0)),
        0 => Err(ProtoError::FdTransfer {
            reason: "no descriptor attached to carrier byte".to_owned(),
        }),
        // Surplus fds are dropped, which closes them.
        n => Err(ProtoError::FdTransfer {
            reason: format!("{n} descriptors in one message"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Read, Seek, Write};
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn passes_open_descriptor() {
        let (left, right) = UnixStream::pair().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"io channel").unwrap();
        file.rewind().unwrap();

        send_fd(&left, &file).unwrap();
        let received = recv_fd(&right).unwrap();
        assert_ne!(received.as_raw_fd(), file.as_raw_fd());

        let mut contents = String::new();
        File::from(received).read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "io channel");
    }

    #[test]
    fn missing_descriptor_is_an_error() {
        let (mut left, right) = UnixStream::pair().unwrap();
        // A plain byte with no ancillary data attached.
        left.write_all(&[0]).unwrap();

        let err = recv_fd(&right).unwrap_err();
        assert!(matches!(err, ProtoError::FdTransfer { .. }));
    }

    #[test]
    fn closed_connection_is_an_error() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);

        let err = recv_fd(&right).unwrap_err();
        assert!(matches!(err, ProtoError::FdTransfer { .. }));
    }
}
