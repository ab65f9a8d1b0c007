//! Adapter for windows that live in the same address space.

use futures::future::{self, Ready};

use super::{LocalWindow, MemSpan, TransferAdapter, TransferError};

/// Transfer adapter for source and destination windows in one address space.
///
/// When the windows alias (same base pointer) the "transfer" is purely
/// logical — the bytes are already where they need to be — and the completion
/// is immediately ready. When they differ, the copy happens inline before the
/// ready completion is returned, so local pipelines get real data movement
/// through the same interface.
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedMemoryAdapter;

impl SharedMemoryAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl TransferAdapter for SharedMemoryAdapter {
    type LocalBuf = MemSpan;
    type RemoteBuf = MemSpan;
    type Completion = Ready<Result<(), TransferError>>;

    fn transfer(&mut self, src: &MemSpan, dst: &MemSpan) -> Self::Completion {
        if src.len_bytes() != dst.len_bytes() {
            return future::ready(Err(TransferError::rejected(format!(
                "window length mismatch: src {} dst {}",
                src.len_bytes(),
                dst.len_bytes()
            ))));
        }
        if src.as_ptr() != dst.as_ptr() {
            // Disjoint windows by the cursor protocol: a stage never overlaps
            // its source and destination ranges.
            // SAFETY: both spans are valid per the MemSpan contract.
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len_bytes());
            }
        }
        future::ready(Ok(()))
    }
}
