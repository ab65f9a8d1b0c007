//! Interfaces consumed from the remote-transfer stack, plus the in-process
//! reference implementation.
//!
//! The real queue-pair library (connection setup, memory registration,
//! completion polling) is external; this module defines exactly what the
//! crate consumes from it:
//!
//! - [`QueuePair`]: post one-sided writes/reads and two-sided sends/recvs,
//!   each returning a completion future.
//! - [`Region`] / [`AccessFlags`] / [`ExportDescriptor`]: registered memory
//!   and the blob a peer needs to target it.
//! - [`bootstrap`]: the TCP side channel that exchanges those blobs.
//!
//! [`loopback`] implements `QueuePair` entirely in-process (memcpy transfers,
//! deterministic completion delivery, fault injection) and backs the test
//! suites and example drivers.

pub mod bootstrap;
pub mod loopback;

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::ptr::NonNull;

use crate::adapter::{LocalWindow, MemSpan, RemoteWindow, TransferError};

pub use loopback::LoopbackFabric;

/// Queue-pair capability the adapters are built on.
///
/// Completions are independent per posted operation; ordering across
/// operations is the caller's concern.
pub trait QueuePair {
    type LocalBuf: LocalWindow;
    type RemoteBuf: RemoteWindow;
    type Completion: Future<Output = Result<(), TransferError>> + Send + 'static;

    /// One-sided write of `src` into the peer window `dst`.
    fn post_write(&self, src: &Self::LocalBuf, dst: &Self::RemoteBuf) -> Self::Completion;

    /// One-sided read of the peer window `src_remote` into `dst`.
    fn post_read(&self, dst: &Self::LocalBuf, src_remote: &Self::RemoteBuf) -> Self::Completion;

    /// Two-sided send of `src`; completes when matched with a peer receive.
    fn post_send(&self, src: &Self::LocalBuf) -> Self::Completion;

    /// Two-sided receive into `dst`; completes when a send arrives.
    fn post_recv(&self, dst: &Self::LocalBuf) -> Self::Completion;
}

/// Access permissions attached to a registered region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const LOCAL_RW: AccessFlags = AccessFlags(0b001);
    pub const REMOTE_READ: AccessFlags = AccessFlags(0b010);
    pub const REMOTE_WRITE: AccessFlags = AccessFlags(0b100);

    /// All three permissions, the usual choice for symmetric regions.
    pub const FULL: AccessFlags = AccessFlags(0b111);

    pub const fn union(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) const fn bits(self) -> u8 {
        self.0
    }

    pub(crate) const fn from_bits(bits: u8) -> AccessFlags {
        AccessFlags(bits & 0b111)
    }
}

/// Owned, registration-ready buffer.
///
/// Storage is interior-mutable (`UnsafeCell`): transfers write through raw
/// spans while the region is only shared. The heap allocation never moves,
/// so spans taken from a region stay valid while the region is alive.
/// Regions must outlive every stage and queue pair that references them.
pub struct Region {
    buf: Box<[std::cell::UnsafeCell<u8>]>,
    flags: AccessFlags,
}

// SAFETY: concurrent access through spans is coordinated by the cursor
// protocol (disjoint ranges); the region itself holds no other state.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocates a zero-filled region of `len` bytes.
    pub fn zeroed(len: usize, flags: AccessFlags) -> Self {
        assert!(len > 0, "region length must be > 0");
        Self {
            buf: (0..len).map(|_| std::cell::UnsafeCell::new(0)).collect(),
            flags,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    /// Window over the whole region.
    pub fn span(&self) -> MemSpan {
        // SAFETY: the boxed storage is stable for the region's lifetime; the
        // caller keeps the region alive while spans are in use (module-level
        // ownership rule).
        unsafe {
            MemSpan::new(
                NonNull::new_unchecked(self.buf.as_ptr() as *mut u8),
                self.buf.len(),
            )
        }
    }

    /// Snapshot of the region contents.
    ///
    /// Callers must ensure no transfer is concurrently writing the region —
    /// in practice: after the relevant completions have resolved.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `UnsafeCell<u8>` is layout-compatible with `u8`; quiescence
        // is the caller's obligation per the doc contract.
        unsafe { std::slice::from_raw_parts(self.buf.as_ptr() as *const u8, self.buf.len()) }
    }
}

/// Window in a peer's exported address space: remote address + length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteSpan {
    addr: u64,
    len: usize,
}

impl RemoteSpan {
    pub fn new(addr: u64, len: usize) -> Self {
        Self { addr, len }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl RemoteWindow for RemoteSpan {
    fn len_bytes(&self) -> usize {
        self.len
    }

    fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len, "slice beyond remote span");
        Self {
            addr: self.addr + offset as u64,
            len,
        }
    }
}

/// Length-prefixed blob describing an exported region: remote base address,
/// length, and access flags. 17 bytes on the wire, little-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportDescriptor {
    pub addr: u64,
    pub len: u64,
    pub flags: AccessFlags,
}

impl ExportDescriptor {
    pub const WIRE_LEN: usize = 17;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[..8].copy_from_slice(&self.addr.to_le_bytes());
        out[8..16].copy_from_slice(&self.len.to_le_bytes());
        out[16] = self.flags.bits();
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DescriptorError> {
        if bytes.len() != Self::WIRE_LEN {
            return Err(DescriptorError::BadLength {
                got: bytes.len(),
                expected: Self::WIRE_LEN,
            });
        }
        let addr = u64::from_le_bytes(bytes[..8].try_into().expect("sized above"));
        let len = u64::from_le_bytes(bytes[8..16].try_into().expect("sized above"));
        Ok(Self {
            addr,
            len,
            flags: AccessFlags::from_bits(bytes[16]),
        })
    }
}

/// Malformed export descriptor received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    BadLength { got: usize, expected: usize },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::BadLength { got, expected } => {
                write!(f, "export descriptor is {got} bytes, expected {expected}")
            }
        }
    }
}

impl Error for DescriptorError {}

/// Registration or import failure reported by a fabric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// The fabric's region inventory is full.
    Exhausted { capacity: usize },
    /// The descriptor does not match any exported region.
    UnknownRegion { addr: u64 },
    /// The region's flags do not allow the requested access.
    AccessDenied { addr: u64 },
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::Exhausted { capacity } => {
                write!(f, "region inventory exhausted (capacity {capacity})")
            }
            RegisterError::UnknownRegion { addr } => {
                write!(f, "no exported region contains address {addr:#x}")
            }
            RegisterError::AccessDenied { addr } => {
                write!(f, "region at {addr:#x} denies the requested access")
            }
        }
    }
}

impl Error for RegisterError {}
