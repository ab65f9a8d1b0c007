//! Transfer adapters: the capability to move bytes from a local buffer to a
//! remote buffer with asynchronous completion.
//!
//! A [`TransferAdapter`] is the single seam between the pipe stages and the
//! underlying transport. Stages are generic over the adapter type, so the hot
//! path is statically dispatched; only the cursor-metadata links (see
//! [`crate::pipe::links`]) go through trait objects.
//!
//! # Module map
//! - `shared_memory`: same-address-space adapter; completion is immediately
//!   ready, copying only when the windows do not alias.
//! - `rdma`: one-sided write/read and two-sided send/recv adapters over an
//!   abstract queue pair ([`crate::remote::QueuePair`]).

pub mod rdma;
pub mod shared_memory;

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::ptr::NonNull;

pub use rdma::{RemoteReadAdapter, RemoteRecvAdapter, RemoteSendAdapter, RemoteWriteAdapter};
pub use shared_memory::SharedMemoryAdapter;

/// Failure reported by a transfer completion or at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The transport reported the operation failed after submission.
    Failed { reason: String },
    /// The submission itself was refused (bad window, exhausted resources).
    Rejected { reason: String },
}

impl TransferError {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        TransferError::Failed {
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        TransferError::Rejected {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Failed { reason } => write!(f, "transfer failed: {reason}"),
            TransferError::Rejected { reason } => write!(f, "transfer rejected: {reason}"),
        }
    }
}

impl Error for TransferError {}

/// A window of local memory an adapter can read from or deliver into.
pub trait LocalWindow: Clone {
    /// Window length in bytes.
    fn len_bytes(&self) -> usize;

    /// A sub-window; panics if `offset + len` exceeds the window.
    fn slice(&self, offset: usize, len: usize) -> Self;

    /// Copies `bytes` into the window at `offset`.
    ///
    /// Used to stage cursor words before a metadata transfer; panics if the
    /// range exceeds the window.
    fn write_bytes(&self, offset: usize, bytes: &[u8]);
}

/// A window of peer memory an adapter can target.
///
/// For in-process transports this is plain memory; for one-sided remote
/// transports it is an address in the peer's exported region.
pub trait RemoteWindow: Clone {
    fn len_bytes(&self) -> usize;

    /// A sub-window; panics if `offset + len` exceeds the window.
    fn slice(&self, offset: usize, len: usize) -> Self;
}

/// Capability to move bytes from a local window to a remote window.
///
/// `transfer` submits the operation and returns a completion future that
/// resolves once the bytes are visible at the destination (or the transport
/// reports failure). Submissions on one adapter complete independently; the
/// pipe stage is responsible for commit ordering.
pub trait TransferAdapter {
    type LocalBuf: LocalWindow;
    type RemoteBuf: RemoteWindow;
    type Completion: Future<Output = Result<(), TransferError>> + Send + 'static;

    fn transfer(&mut self, src: &Self::LocalBuf, dst: &Self::RemoteBuf) -> Self::Completion;
}

/// Raw window over registered local memory: base pointer plus length.
///
/// `MemSpan` is a handle, not a borrow — it is `Copy` and carries no
/// lifetime. The unsafe constructor is where the obligations live; every
/// later access relies on them.
#[derive(Clone, Copy, Debug)]
pub struct MemSpan {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: a MemSpan is an address, not an access; the constructor contract
// (exclusive coordination by the cursor protocol) makes cross-thread use
// sound.
unsafe impl Send for MemSpan {}
unsafe impl Sync for MemSpan {}

impl MemSpan {
    /// Creates a window over `[ptr, ptr + len)`.
    ///
    /// # Safety
    ///
    /// The caller guarantees that the memory stays valid (allocated, not
    /// moved) for as long as any copy of the span is used, and that accesses
    /// through spans are coordinated: ranges concurrently written through one
    /// span must not be read or written through another. The ring/pipe cursor
    /// protocol provides exactly this discipline.
    pub unsafe fn new(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address as an integer, used as the export address by in-process
    /// fabrics.
    #[inline]
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    /// Copies the window's first `out.len()` bytes into `out`.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len, "read beyond span");
        // SAFETY: range checked above; validity per constructor contract.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), out.len())
        };
    }

    /// Copies `bytes` into the window at `offset`.
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "write beyond span");
        // SAFETY: range checked above; validity per constructor contract.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len())
        };
    }
}

impl LocalWindow for MemSpan {
    #[inline]
    fn len_bytes(&self) -> usize {
        self.len
    }

    fn slice(&self, offset: usize, len: usize) -> Self {
        assert!(offset + len <= self.len, "slice beyond span");
        // SAFETY: stays within the original window.
        unsafe {
            Self::new(
                NonNull::new_unchecked(self.ptr.as_ptr().add(offset)),
                len,
            )
        }
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        MemSpan::write_bytes(self, offset, bytes);
    }
}

impl RemoteWindow for MemSpan {
    #[inline]
    fn len_bytes(&self) -> usize {
        self.len
    }

    fn slice(&self, offset: usize, len: usize) -> Self {
        LocalWindow::slice(self, offset, len)
    }
}
