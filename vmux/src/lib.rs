//! Client for the vmux VM supervisor control protocol.
//!
//! A vmux supervisor multiplexes four message kinds over one Unix
//! stream connection per client: commands, command responses, I/O byte
//! streams, and one-way notifications. [`Client`] speaks the command
//! half synchronously — registering, attaching to, and unregistering
//! VMs, allocating I/O channels, and forwarding agent commands — and
//! receives ready-to-use I/O descriptors over the connection's
//! ancillary side-channel.
//!
//! # Quick start
//!
//! ```no_run
//! use vmux::Client;
//!
//! let mut client = Client::connect("/run/vmux/vmux.sock")?;
//! let attached = client.attach("vm-1")?;
//! println!("supervisor speaks protocol v{}", attached.version);
//! # Ok::<(), vmux::Error>(())
//! ```

#[cfg(unix)]
mod client;
mod error;
#[cfg(unix)]
mod ops;

#[cfg(unix)]
pub use client::{AttachReturn, Client, IoAllocation, RegisterVmReturn};
pub use error::{Error, Result};
pub use vmux_proto::{PROTOCOL_VERSION, ProtoError};
