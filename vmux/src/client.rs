//! Synchronous client for the supervisor control socket.

use std::net::Shutdown;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use vmux_proto::{self as proto, FrameType, PROTOCOL_VERSION, ProtoError, Request, Response};

use crate::error::{Error, Result};
use crate::ops::{self, Operation};

/// Values returned by a successful `register`.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct RegisterVmReturn {
    /// Protocol version the supervisor negotiated.
    pub version: u16,
}

/// Values returned by a successful `attach`.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct AttachReturn {
    /// Protocol version the supervisor negotiated.
    pub version: u16,
}

/// An allocated I/O channel range and its ready-to-use endpoint.
#[derive(Debug)]
#[non_exhaustive]
pub struct IoAllocation {
    /// Base identifier of the allocated channel range.
    pub io_base: u64,
    /// Descriptor carrying the multiplexed I/O bytes. Ownership is the
    /// caller's, who closes it exactly once (dropping it does).
    pub io_fd: OwnedFd,
}

/// A client connection to the vmux supervisor.
///
/// The client exclusively owns its socket and speaks one call at a
/// time: every operation blocks for the full write-then-read round
/// trip, and replies carry no correlation id, so the next frame after a
/// request is taken to be its reply. The `&mut self` receivers make a
/// second in-flight call on the same connection unrepresentable;
/// callers wanting concurrency open one connection per caller.
///
/// Dropping the client closes the socket. There are no built-in
/// timeouts; set them on the socket with
/// [`UnixStream::set_read_timeout`] before handing it over, or keep a
/// [`UnixStream::try_clone`] of it to [`shutdown`](UnixStream::shutdown)
/// a blocked call from another thread.
#[derive(Debug)]
pub struct Client {
    /// Exclusively owned control socket.
    stream: UnixStream,
    /// Protocol version pinned for this connection.
    version: u16,
}

impl Client {
    /// Wraps an already-connected supervisor socket.
    pub fn new(stream: UnixStream) -> Self {
        Self::with_version(stream, PROTOCOL_VERSION)
    }

    /// Wraps a socket pinned to a non-default negotiated version.
    ///
    /// Every frame sent is stamped with `version` and every frame
    /// received is checked against it.
    pub fn with_version(stream: UnixStream, version: u16) -> Self {
        Self { stream, version }
    }

    /// Connects to the supervisor listening at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(ProtoError::Io)?;
        Ok(Self::new(stream))
    }

    /// Protocol version pinned for this connection.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Shuts down both directions of the socket.
    ///
    /// The client is unusable afterwards; this exists so an owner can
    /// end the connection without waiting for drop.
    pub fn shutdown(&self) -> Result<()> {
        self.stream.shutdown(Shutdown::Both).map_err(ProtoError::Io)?;
        Ok(())
    }

    /// Registers VM `container_id` with its control and I/O serial
    /// channel paths.
    ///
    /// Returns the protocol version the supervisor negotiated for the
    /// registration.
    pub fn register_vm(
        &mut self,
        container_id: &str,
        ctl_serial: &str,
        io_serial: &str,
        console: Option<&str>,
    ) -> Result<RegisterVmReturn> {
        let payload = proto::RegisterVm {
            container_id: container_id.to_owned(),
            ctl_serial: ctl_serial.to_owned(),
            io_serial: io_serial.to_owned(),
            console: console.map(str::to_owned),
        };
        let (resp, _) = self.call(ops::REGISTER, Some(&payload))?;
        Ok(RegisterVmReturn {
            version: take_u16(&resp, ops::REGISTER.name, "version")?,
        })
    }

    /// Tears down the registration of VM `container_id`.
    pub fn unregister_vm(&mut self, container_id: &str) -> Result<()> {
        let payload = proto::UnregisterVm {
            container_id: container_id.to_owned(),
        };
        self.call(ops::UNREGISTER, Some(&payload))?;
        Ok(())
    }

    /// Attaches the caller as a controller of an already-registered VM.
    pub fn attach(&mut self, container_id: &str) -> Result<AttachReturn> {
        let payload = proto::Attach {
            container_id: container_id.to_owned(),
        };
        let (resp, _) = self.call(ops::ATTACH, Some(&payload))?;
        Ok(AttachReturn {
            version: take_u16(&resp, ops::ATTACH.name, "version")?,
        })
    }

    /// Requests `n_streams` I/O channels.
    ///
    /// The supervisor answers with the base identifier of the allocated
    /// range and hands over the descriptor carrying the multiplexed I/O
    /// bytes.
    pub fn allocate_io(&mut self, n_streams: u32) -> Result<IoAllocation> {
        let payload = proto::AllocateIo { n_streams };
        let (resp, mut fds) = self.call(ops::ALLOCATE_IO, Some(&payload))?;
        let io_base = take_u64(&resp, ops::ALLOCATE_IO.name, "ioBase")?;
        let io_fd = fds.pop().ok_or_else(|| ProtoError::FdTransfer {
            reason: "descriptor missing after response".to_owned(),
        })?;
        Ok(IoAllocation { io_base, io_fd })
    }

    /// Forwards agent command `name` into the VM.
    ///
    /// `message` is embedded as the opaque, caller-defined command
    /// body.
    pub fn hyper(&mut self, name: &str, message: Option<Value>) -> Result<()> {
        let payload = proto::Hyper {
            hyper_name: name.to_owned(),
            data: message,
        };
        self.call(ops::HYPER, Some(&payload))?;
        Ok(())
    }

    /// One round trip: writes the request frame, reads the next frame
    /// as the reply, and collects the descriptors the catalog entry
    /// documents.
    ///
    /// The reply frame's opcode is not interpreted; correlation is
    /// positional. Descriptors are assumed to trail successful
    /// responses only, so a `Remote` error consumes nothing from the
    /// side-channel.
    fn call<P: Serialize>(
        &mut self,
        op: Operation,
        payload: Option<&P>,
    ) -> Result<(Response, Vec<OwnedFd>)> {
        let data = payload
            .map(|p| serde_json::to_value(p).map_err(ProtoError::Codec))
            .transpose()?;
        let req = Request {
            id: op.name.to_owned(),
            data,
        };
        let body = req.to_vec()?;
        debug!(op = op.name, bytes = body.len(), "sending command");
        proto::write_frame(
            &mut self.stream,
            self.version,
            FrameType::Command,
            op.opcode.into(),
            &body,
        )?;

        let (ty, _opcode, reply) = proto::read_frame(&mut self.stream, self.version)?;
        if ty != FrameType::Response {
            return Err(ProtoError::UnexpectedFrame { ty }.into());
        }
        let resp = Response::from_slice(&reply)?;
        debug!(op = op.name, success = resp.success, "received response");
        if !resp.success {
            return Err(Error::remote(resp.error));
        }

        let mut fds = Vec::with_capacity(usize::from(op.fds));
        for _ in 0..op.fds {
            fds.push(proto::recv_fd(&self.stream)?);
        }
        Ok((resp, fds))
    }
}

/// Narrows `data[field]` to an unsigned integer, per the operation's
/// result schema.
fn take_u64(resp: &Response, op: &'static str, field: &'static str) -> Result<u64> {
    let value = resp.data.get(field).ok_or(Error::MissingField { op, field })?;
    value.as_u64().ok_or(Error::TypeMismatch {
        op,
        field,
        expected: "an unsigned integer",
    })
}

/// Narrows `data[field]` to a 16-bit unsigned integer.
fn take_u16(resp: &Response, op: &'static str, field: &'static str) -> Result<u16> {
    let wide = take_u64(resp, op, field)?;
    u16::try_from(wide).map_err(|_| Error::TypeMismatch {
        op,
        field,
        expected: "a 16-bit unsigned integer",
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Seek as _, Write as _};
    use std::os::fd::AsRawFd;
    use std::thread;

    use serde_json::{Map, json};
    use vmux_proto::Command;

    use super::*;

    /// Starts a scripted peer on the other end of a socketpair.
    fn spawn_peer<F>(script: F) -> (Client, thread::JoinHandle<()>)
    where
        F: FnOnce(&mut UnixStream) + Send + 'static,
    {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut sock = theirs;
            script(&mut sock);
        });
        (Client::new(ours), handle)
    }

    /// Reads one command frame and returns its opcode and envelope.
    fn read_request(sock: &mut UnixStream) -> (u16, Request) {
        let (ty, opcode, body) = proto::read_frame(sock, PROTOCOL_VERSION).unwrap();
        assert_eq!(ty, FrameType::Command);
        (opcode, Request::from_slice(&body).unwrap())
    }

    /// Writes a response frame echoing `opcode`.
    fn write_response(sock: &mut UnixStream, opcode: u16, resp: &Response) {
        proto::write_frame(
            sock,
            PROTOCOL_VERSION,
            FrameType::Response,
            opcode,
            &resp.to_vec().unwrap(),
        )
        .unwrap();
    }

    fn ok_response(data: Value) -> Response {
        Response {
            success: true,
            error: None,
            data: data.as_object().cloned().unwrap_or_default(),
        }
    }

    fn err_response(message: &str) -> Response {
        Response {
            success: false,
            error: Some(message.to_owned()),
            data: Map::new(),
        }
    }

    #[test]
    fn attach_returns_negotiated_version() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, req) = read_request(sock);
            assert_eq!(opcode, u16::from(Command::AttachVm));
            assert_eq!(req.id, "attach");
            assert_eq!(req.data.unwrap()["containerId"], "container-A");
            write_response(sock, opcode, &ok_response(json!({"version": 2})));
        });

        let ret = client.attach("container-A").unwrap();
        assert_eq!(ret.version, 2);
        peer.join().unwrap();
    }

    #[test]
    fn register_vm_sends_serial_paths_and_reads_version() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, req) = read_request(sock);
            assert_eq!(opcode, u16::from(Command::RegisterVm));
            assert_eq!(req.id, "register");
            let data = req.data.unwrap();
            assert_eq!(data["containerId"], "vm-1");
            assert_eq!(data["ctlSerial"], "/run/ctl.sock");
            assert_eq!(data["ioSerial"], "/run/io.sock");
            assert!(data.get("console").is_none());
            write_response(sock, opcode, &ok_response(json!({"version": 2})));
        });

        let ret = client
            .register_vm("vm-1", "/run/ctl.sock", "/run/io.sock", None)
            .unwrap();
        assert_eq!(ret.version, 2);
        peer.join().unwrap();
    }

    #[test]
    fn register_vm_missing_version_is_recoverable() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, _) = read_request(sock);
            write_response(sock, opcode, &ok_response(json!({})));
        });

        let err = client
            .register_vm("vm-1", "c", "i", None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField {
                op: "register",
                field: "version"
            }
        ));
        assert!(!err.is_connection_fatal());
        peer.join().unwrap();
    }

    #[test]
    fn version_of_wrong_shape_is_type_mismatch() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, _) = read_request(sock);
            write_response(sock, opcode, &ok_response(json!({"version": "two"})));
        });

        let err = client.attach("vm-1").unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                op: "attach",
                field: "version",
                ..
            }
        ));
        assert!(!err.is_connection_fatal());
        peer.join().unwrap();
    }

    #[test]
    fn remote_errors_surface_peer_text_and_spare_the_connection() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, _) = read_request(sock);
            write_response(sock, opcode, &err_response("busy"));
            let (opcode, _) = read_request(sock);
            write_response(sock, opcode, &err_response(""));
        });

        let err = client.unregister_vm("vm-1").unwrap_err();
        assert_eq!(err.to_string(), "busy");
        assert!(!err.is_connection_fatal());

        // The connection survives a remote failure.
        let err = client.unregister_vm("vm-1").unwrap_err();
        assert_eq!(err.to_string(), "unknown error");
        peer.join().unwrap();
    }

    #[test]
    fn allocate_io_returns_base_and_descriptor() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, req) = read_request(sock);
            assert_eq!(opcode, u16::from(Command::ConnectShim));
            assert_eq!(req.id, "allocateIO");
            assert_eq!(req.data.unwrap()["nStreams"], 4);
            write_response(sock, opcode, &ok_response(json!({"ioBase": 1024})));

            let mut file = tempfile::tempfile().unwrap();
            file.write_all(b"ready").unwrap();
            file.rewind().unwrap();
            proto::send_fd(sock, &file).unwrap();
        });

        let alloc = client.allocate_io(4).unwrap();
        assert_eq!(alloc.io_base, 1024);
        assert_ne!(alloc.io_fd.as_raw_fd(), client.stream.as_raw_fd());

        let mut contents = String::new();
        std::fs::File::from(alloc.io_fd)
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "ready");
        peer.join().unwrap();
    }

    #[test]
    fn allocate_io_without_descriptor_is_fatal() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, _) = read_request(sock);
            write_response(sock, opcode, &ok_response(json!({"ioBase": 8})));
            // Connection drops without a descriptor ever being sent.
        });

        let err = client.allocate_io(1).unwrap_err();
        assert!(matches!(err, Error::Proto(ProtoError::FdTransfer { .. })));
        assert!(err.is_connection_fatal());
        peer.join().unwrap();
    }

    #[test]
    fn sequential_calls_pair_replies_in_order() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, req) = read_request(sock);
            assert_eq!(req.id, "attach");
            write_response(sock, opcode, &ok_response(json!({"version": 2})));

            let (opcode, req) = read_request(sock);
            assert_eq!(req.id, "hyper");
            write_response(sock, opcode, &err_response("busy"));
        });

        // `&mut self` forces the calls to complete one at a time, so
        // each reads its own positional reply and never its neighbor's.
        let ret = client.attach("vm-1").unwrap();
        assert_eq!(ret.version, 2);
        let err = client.hyper("ping", None).unwrap_err();
        assert_eq!(err.to_string(), "busy");
        peer.join().unwrap();
    }

    #[test]
    fn hyper_sends_name_and_body() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (opcode, req) = read_request(sock);
            assert_eq!(opcode, u16::from(Command::Hyper));
            let data = req.data.unwrap();
            assert_eq!(data["hyperName"], "newcontainer");
            assert_eq!(data["data"]["image"], "busybox");
            write_response(sock, opcode, &ok_response(json!({})));
        });

        client
            .hyper("newcontainer", Some(json!({"image": "busybox"})))
            .unwrap();
        peer.join().unwrap();
    }

    #[test]
    fn reply_with_wrong_version_is_fatal() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (_, _) = read_request(sock);
            let body = ok_response(json!({})).to_vec().unwrap();
            proto::write_frame(sock, 3, FrameType::Response, 0, &body).unwrap();
        });

        let err = client.unregister_vm("vm-1").unwrap_err();
        assert!(matches!(
            err,
            Error::Proto(ProtoError::VersionMismatch { found: 3, .. })
        ));
        assert!(err.is_connection_fatal());
        peer.join().unwrap();
    }

    #[test]
    fn unexpected_stream_frame_fails_the_call() {
        let (mut client, peer) = spawn_peer(|sock| {
            let (_, _) = read_request(sock);
            proto::write_frame(sock, PROTOCOL_VERSION, FrameType::Stream, 1, b"noise").unwrap();
        });

        let err = client.unregister_vm("vm-1").unwrap_err();
        assert!(matches!(
            err,
            Error::Proto(ProtoError::UnexpectedFrame {
                ty: FrameType::Stream
            })
        ));
        peer.join().unwrap();
    }
}
