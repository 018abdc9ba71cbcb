//! Operation catalog: envelope names, opcodes, and side-channel
//! expectations.
//!
//! The wire format has no "a descriptor follows" marker, so the
//! catalog entry is the single source of truth for how many
//! descriptors trail an operation's response.

use vmux_proto::Command;

/// Descriptor of one supervisor operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Operation {
    /// Request envelope name the supervisor dispatches on.
    pub name: &'static str,
    /// Command opcode stamped on the request frame.
    pub opcode: Command,
    /// Number of descriptors attached after a successful response.
    pub fds: u8,
}

/// Registers a VM with the supervisor.
pub(crate) const REGISTER: Operation = Operation {
    name: "register",
    opcode: Command::RegisterVm,
    fds: 0,
};

/// Tears down a registration.
pub(crate) const UNREGISTER: Operation = Operation {
    name: "unregister",
    opcode: Command::UnregisterVm,
    fds: 0,
};

/// Attaches the caller to an already-registered VM.
pub(crate) const ATTACH: Operation = Operation {
    name: "attach",
    opcode: Command::AttachVm,
    fds: 0,
};

/// Allocates I/O channels; the response trails one descriptor.
///
/// `allocateIO` has no opcode of its own in the closed command space;
/// it rides the shim-connect opcode, the command that hands a client an
/// I/O endpoint. Dispatch is by envelope name like every operation.
pub(crate) const ALLOCATE_IO: Operation = Operation {
    name: "allocateIO",
    opcode: Command::ConnectShim,
    fds: 1,
};

/// Forwards an agent command into the VM.
pub(crate) const HYPER: Operation = Operation {
    name: "hyper",
    opcode: Command::Hyper,
    fds: 0,
};
