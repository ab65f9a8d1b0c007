//! In-process queue-pair fabric.
//!
//! Models a remote memory domain without leaving the process: regions are
//! "registered" into an inventory, export descriptors carry real addresses,
//! and transfers are memcpys. Two knobs make it a useful harness:
//!
//! - **Deferred completions**: submissions queue instead of executing, and
//!   the test decides when (and in which order) each op runs and completes.
//! - **Fault injection**: the nth submission completes with an error and
//!   moves no bytes.
//!
//! The two-sided lane (`post_send`/`post_recv`) buffers messages: a send
//! completes at submission, a receive completes when a message is available.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use parking_lot::Mutex;

use crate::adapter::{MemSpan, TransferError};

use super::{
    AccessFlags, ExportDescriptor, QueuePair, Region, RegisterError, RemoteSpan,
};

const DEFAULT_INVENTORY: usize = 64;

/// Completion token for a loopback operation.
pub struct LoopbackCompletion {
    rx: oneshot::Receiver<Result<(), TransferError>>,
}

impl Future for LoopbackCompletion {
    type Output = Result<(), TransferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_canceled)) => Poll::Ready(Err(TransferError::failed(
                "fabric dropped before completion",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct Registered {
    addr: u64,
    len: usize,
    flags: AccessFlags,
}

enum Action {
    Copy { src: MemSpan, dst: MemSpan },
    Fail { error: TransferError },
}

struct QueuedOp {
    action: Action,
    done: oneshot::Sender<Result<(), TransferError>>,
}

struct PendingRecv {
    dst: MemSpan,
    done: oneshot::Sender<Result<(), TransferError>>,
}

struct Inner {
    inventory: usize,
    regions: Mutex<Vec<Registered>>,
    deferred: Mutex<bool>,
    queue: Mutex<VecDeque<QueuedOp>>,
    fail_ops: Mutex<HashSet<u64>>,
    submitted: AtomicU64,
    messages: Mutex<VecDeque<Vec<u8>>>,
    recvs: Mutex<VecDeque<PendingRecv>>,
}

/// Handle to an in-process fabric. Clones share state.
#[derive(Clone)]
pub struct LoopbackFabric {
    inner: Arc<Inner>,
}

impl Default for LoopbackFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackFabric {
    pub fn new() -> Self {
        Self::with_inventory(DEFAULT_INVENTORY)
    }

    /// Fabric whose region inventory holds at most `inventory` entries.
    pub fn with_inventory(inventory: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                inventory,
                regions: Mutex::new(Vec::new()),
                deferred: Mutex::new(false),
                queue: Mutex::new(VecDeque::new()),
                fail_ops: Mutex::new(HashSet::new()),
                submitted: AtomicU64::new(0),
                messages: Mutex::new(VecDeque::new()),
                recvs: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Registers a region and returns the descriptor a peer would import.
    pub fn register(&self, region: &Region) -> Result<ExportDescriptor, RegisterError> {
        self.register_span(region.span(), region.flags())
    }

    /// Registers a raw window (for cursor registers and ring storage).
    pub fn register_span(
        &self,
        span: MemSpan,
        flags: AccessFlags,
    ) -> Result<ExportDescriptor, RegisterError> {
        let mut regions = self.inner.regions.lock();
        if regions.len() == self.inner.inventory {
            return Err(RegisterError::Exhausted {
                capacity: self.inner.inventory,
            });
        }
        regions.push(Registered {
            addr: span.addr(),
            len: span.len(),
            flags,
        });
        Ok(ExportDescriptor {
            addr: span.addr(),
            len: span.len() as u64,
            flags,
        })
    }

    /// Validates a peer descriptor against the inventory and returns the
    /// targetable window.
    pub fn import(&self, desc: &ExportDescriptor) -> Result<RemoteSpan, RegisterError> {
        let regions = self.inner.regions.lock();
        let covered = regions.iter().any(|r| {
            desc.addr >= r.addr && desc.addr + desc.len <= r.addr + r.len as u64
        });
        if !covered {
            return Err(RegisterError::UnknownRegion { addr: desc.addr });
        }
        Ok(RemoteSpan::new(desc.addr, desc.len as usize))
    }

    /// Queue submissions instead of executing them; drive with
    /// [`complete_next`](Self::complete_next) and friends.
    pub fn set_deferred(&self, deferred: bool) {
        *self.inner.deferred.lock() = deferred;
    }

    /// Injects a failure into the nth submission (1-based, counted across
    /// all one-sided operations).
    pub fn fail_op(&self, n: u64) {
        self.inner.fail_ops.lock().insert(n);
    }

    /// Number of queued (deferred) operations.
    pub fn pending_ops(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Executes the oldest queued operation. Returns false when idle.
    pub fn complete_next(&self) -> bool {
        let op = self.inner.queue.lock().pop_front();
        match op {
            Some(op) => {
                Self::execute(op);
                true
            }
            None => false,
        }
    }

    /// Executes the newest queued operation first — adversarial completion
    /// order for commit-ordering tests.
    pub fn complete_newest(&self) -> bool {
        let op = self.inner.queue.lock().pop_back();
        match op {
            Some(op) => {
                Self::execute(op);
                true
            }
            None => false,
        }
    }

    /// Drains the queue oldest-first.
    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    /// Drains the queue newest-first.
    pub fn complete_all_reversed(&self) {
        while self.complete_newest() {}
    }

    fn execute(op: QueuedOp) {
        let result = match op.action {
            Action::Copy { src, dst } => {
                // SAFETY: both spans were validated at submission and their
                // regions outlive the fabric per the Region ownership rule.
                // The cursor protocol keeps concurrent ranges disjoint.
                unsafe {
                    std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), src.len());
                }
                Ok(())
            }
            Action::Fail { error } => Err(error),
        };
        // The submitter may have dropped its completion; nothing to do then.
        let _ = op.done.send(result);
    }

    fn submit(&self, action: Action) -> LoopbackCompletion {
        let (done, rx) = oneshot::channel();
        let op = QueuedOp { action, done };
        if *self.inner.deferred.lock() {
            self.inner.queue.lock().push_back(op);
        } else {
            Self::execute(op);
        }
        LoopbackCompletion { rx }
    }

    /// Resolves a one-sided target: inventory membership plus access check.
    fn resolve(
        &self,
        dst: &RemoteSpan,
        access: AccessFlags,
    ) -> Result<MemSpan, TransferError> {
        let regions = self.inner.regions.lock();
        let region = regions
            .iter()
            .find(|r| dst.addr() >= r.addr && dst.addr() + dst.len() as u64 <= r.addr + r.len as u64)
            .ok_or_else(|| {
                TransferError::rejected(format!("unregistered remote window {:#x}", dst.addr()))
            })?;
        if !region.flags.contains(access) {
            return Err(TransferError::rejected(format!(
                "remote window {:#x} denies access",
                dst.addr()
            )));
        }
        // SAFETY: the window lies inside a registered region whose storage
        // outlives the fabric.
        Ok(unsafe { MemSpan::new(NonNull::new_unchecked(dst.addr() as *mut u8), dst.len()) })
    }

    fn next_op_faulted(&self) -> Option<TransferError> {
        let n = self.inner.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        if self.inner.fail_ops.lock().remove(&n) {
            Some(TransferError::failed(format!("injected fault on op {n}")))
        } else {
            None
        }
    }
}

impl QueuePair for LoopbackFabric {
    type LocalBuf = MemSpan;
    type RemoteBuf = RemoteSpan;
    type Completion = LoopbackCompletion;

    fn post_write(&self, src: &MemSpan, dst: &RemoteSpan) -> LoopbackCompletion {
        if src.len() != dst.len() {
            return self.submit(Action::Fail {
                error: TransferError::rejected(format!(
                    "window length mismatch: src {} dst {}",
                    src.len(),
                    dst.len()
                )),
            });
        }
        let action = match self.next_op_faulted() {
            Some(error) => Action::Fail { error },
            None => match self.resolve(dst, AccessFlags::REMOTE_WRITE) {
                Ok(resolved) => Action::Copy {
                    src: *src,
                    dst: resolved,
                },
                Err(error) => Action::Fail { error },
            },
        };
        self.submit(action)
    }

    fn post_read(&self, dst: &MemSpan, src_remote: &RemoteSpan) -> LoopbackCompletion {
        if dst.len() != src_remote.len() {
            return self.submit(Action::Fail {
                error: TransferError::rejected(format!(
                    "window length mismatch: dst {} src {}",
                    dst.len(),
                    src_remote.len()
                )),
            });
        }
        let action = match self.next_op_faulted() {
            Some(error) => Action::Fail { error },
            None => match self.resolve(src_remote, AccessFlags::REMOTE_READ) {
                Ok(resolved) => Action::Copy {
                    src: resolved,
                    dst: *dst,
                },
                Err(error) => Action::Fail { error },
            },
        };
        self.submit(action)
    }

    fn post_send(&self, src: &MemSpan) -> LoopbackCompletion {
        let mut payload = vec![0u8; src.len()];
        src.read_bytes(0, &mut payload);

        // Deliver straight into a waiting receive when one is queued.
        let waiting = self.inner.recvs.lock().pop_front();
        let (done, rx) = oneshot::channel();
        match waiting {
            Some(recv) => {
                let result = deliver(&payload, &recv.dst);
                let _ = recv.done.send(result.clone());
                let _ = done.send(result);
            }
            None => {
                self.inner.messages.lock().push_back(payload);
                let _ = done.send(Ok(()));
            }
        }
        LoopbackCompletion { rx }
    }

    fn post_recv(&self, dst: &MemSpan) -> LoopbackCompletion {
        let (done, rx) = oneshot::channel();
        let buffered = self.inner.messages.lock().pop_front();
        match buffered {
            Some(payload) => {
                let _ = done.send(deliver(&payload, dst));
            }
            None => {
                self.inner.recvs.lock().push_back(PendingRecv { dst: *dst, done });
            }
        }
        LoopbackCompletion { rx }
    }
}

fn deliver(payload: &[u8], dst: &MemSpan) -> Result<(), TransferError> {
    if payload.len() > dst.len() {
        return Err(TransferError::rejected(format!(
            "message of {} bytes exceeds receive window of {}",
            payload.len(),
            dst.len()
        )));
    }
    dst.write_bytes(0, payload);
    Ok(())
}
