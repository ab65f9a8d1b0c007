//! One ring-to-ring transfer node.
//!
//! A stage owns a source window it consumes from and a destination window it
//! produces into, connected to its neighbors only through cursor links. Each
//! progress step runs one forward pass (submit up to
//! [`MAX_TRANSFERS_PER_PASS`] contiguous chunks, await them together, commit
//! in order, publish) and one backward pass (refresh downstream credit,
//! propagate consumption upstream).
//!
//! # Cursor naming
//!
//! Stage cursors follow the wire protocol: `tail` counts bytes produced into
//! a window, `head` bytes consumed from it, so `head <= tail` on both sides.
//! All four are 32-bit wrapping counters (the wire width); window lengths
//! must be powers of two so position masking stays consistent across the
//! 32-bit wrap.
//!
//! # In-order commit
//!
//! Submissions are recorded in `pending`, a min-heap keyed on the
//! pre-transfer source cursor. Completions may report in any order; commits
//! walk the heap in cursor order and stop at the first failure, so the
//! public cursors only ever describe a gap-free prefix of the submitted
//! work. A faulted transfer leaves the stage `Faulted` with earlier
//! transfers committed and later ones discarded.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;
use std::fmt;

use futures::future::{join_all, BoxFuture};
use tracing::warn;

use crate::adapter::{LocalWindow, RemoteWindow, TransferAdapter, TransferError};
use crate::stdx::InlineVec;

use super::links::{BackwardLink, ForwardLink};

/// Upper bound on transfer submissions per forward pass, so one stage cannot
/// starve its siblings on the shared scheduler.
pub const MAX_TRANSFERS_PER_PASS: usize = 16;

/// Stage lifecycle. A progress step moves `Idle → Issuing → Awaiting →
/// Committing → Publishing → Idle`; cancellation routes through `Draining`
/// to `Terminated`, and a failed transfer parks the stage in `Faulted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Issuing,
    Awaiting,
    Committing,
    Publishing,
    Draining,
    Faulted,
    Terminated,
}

/// Stage-level failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// A transfer or cursor publish failed; the stage is now `Faulted`.
    Transfer(TransferError),
    /// A progress step was requested on an already-faulted stage.
    Faulted,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Transfer(err) => write!(f, "stage transfer failed: {err}"),
            StageError::Faulted => write!(f, "stage is faulted"),
        }
    }
}

impl Error for StageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StageError::Transfer(err) => Some(err),
            StageError::Faulted => None,
        }
    }
}

impl From<TransferError> for StageError {
    fn from(err: TransferError) -> Self {
        StageError::Transfer(err)
    }
}

/// One reserved transfer: symmetric, non-empty cursor intervals on both
/// windows. Ordering is by `before_src`, the commit key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PendingTransfer {
    before_src: u32,
    after_src: u32,
    before_dst: u32,
    after_dst: u32,
}

/// Object-safe stage interface the pipeline drives.
pub trait Stage: Send {
    /// Runs one forward + backward progress step.
    fn transfer(&mut self) -> BoxFuture<'_, Result<(), StageError>>;

    /// Requests drain: no further submissions; the next step terminates the
    /// stage once nothing is outstanding.
    fn begin_drain(&mut self);

    fn state(&self) -> StageState;
}

/// A transfer node parameterized over its data adapter.
pub struct Pipe<A: TransferAdapter> {
    adapter: A,
    src: A::LocalBuf,
    dst: A::RemoteBuf,
    src_capacity: u32,
    src_mask: u32,
    dst_capacity: u32,
    dst_mask: u32,
    /// Bytes consumed from the source window (committed only).
    src_head: u32,
    /// Bytes the upstream neighbor has produced.
    src_tail: u32,
    /// Bytes the downstream neighbor has consumed.
    dst_head: u32,
    /// Bytes produced into the destination window (committed only).
    dst_tail: u32,
    /// Last `src_head` pushed upstream, to skip redundant publishes.
    published_src_head: u32,
    pending: BinaryHeap<Reverse<PendingTransfer>>,
    forward: Box<dyn ForwardLink>,
    backward: Box<dyn BackwardLink>,
    state: StageState,
}

impl<A: TransferAdapter> Pipe<A> {
    /// Creates a stage over the given windows and neighbor links.
    ///
    /// # Panics
    ///
    /// Panics if either window length is zero, not a power of two, or does
    /// not fit the 32-bit cursor space.
    pub fn new(
        adapter: A,
        src: A::LocalBuf,
        dst: A::RemoteBuf,
        forward: Box<dyn ForwardLink>,
        backward: Box<dyn BackwardLink>,
    ) -> Self {
        let src_capacity = window_capacity(src.len_bytes(), "source");
        let dst_capacity = window_capacity(dst.len_bytes(), "destination");
        Self {
            adapter,
            src,
            dst,
            src_capacity,
            src_mask: src_capacity - 1,
            dst_capacity,
            dst_mask: dst_capacity - 1,
            src_head: 0,
            src_tail: 0,
            dst_head: 0,
            dst_tail: 0,
            published_src_head: 0,
            pending: BinaryHeap::with_capacity(MAX_TRANSFERS_PER_PASS),
            forward,
            backward,
            state: StageState::Idle,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// Committed cursors `(src_head, dst_tail)` — diagnostic surface.
    pub fn committed(&self) -> (u32, u32) {
        (self.src_head, self.dst_tail)
    }

    /// Runs one progress step: a forward pass then a backward pass.
    pub async fn transfer(&mut self) -> Result<(), StageError> {
        match self.state {
            StageState::Faulted => return Err(StageError::Faulted),
            StageState::Draining => {
                // Every submission is awaited within its own pass, so there
                // is never cross-step outstanding work to wait for.
                self.state = StageState::Terminated;
                return Ok(());
            }
            StageState::Terminated => return Ok(()),
            _ => {}
        }
        self.forward().await?;
        self.backward().await?;
        Ok(())
    }

    /// Requests drain. Fault and termination are sticky.
    pub fn begin_drain(&mut self) {
        match self.state {
            StageState::Faulted | StageState::Terminated => {}
            _ => self.state = StageState::Draining,
        }
    }

    /// Largest contiguous chunk transferable at the given window positions:
    /// bounded by available bytes, free destination space, and the distance
    /// to each window's wrap boundary.
    fn chunk_len(&self, src_pos: u32, dst_pos: u32) -> u32 {
        let available = self.src_tail.wrapping_sub(src_pos);
        let src_contig = self.src_capacity - (src_pos & self.src_mask);
        let dst_free = self
            .dst_capacity
            .wrapping_sub(dst_pos.wrapping_sub(self.dst_head));
        let dst_contig = self.dst_capacity - (dst_pos & self.dst_mask);
        available.min(src_contig).min(dst_free).min(dst_contig)
    }

    async fn forward(&mut self) -> Result<(), StageError> {
        self.state = StageState::Issuing;

        if self.src_head == self.src_tail {
            self.src_tail = self.backward.fetch_tail();
            self.dst_head = self.forward.fetch_head();
            if self.src_head == self.src_tail {
                self.state = StageState::Idle;
                return Ok(());
            }
        }

        let mut completions: InlineVec<A::Completion, MAX_TRANSFERS_PER_PASS> = InlineVec::new();
        let mut src_pos = self.src_head;
        let mut dst_pos = self.dst_tail;

        while !completions.is_full() {
            let chunk = self.chunk_len(src_pos, dst_pos);
            if chunk == 0 {
                break;
            }
            let src_off = (src_pos & self.src_mask) as usize;
            let dst_off = (dst_pos & self.dst_mask) as usize;

            self.pending.push(Reverse(PendingTransfer {
                before_src: src_pos,
                after_src: src_pos.wrapping_add(chunk),
                before_dst: dst_pos,
                after_dst: dst_pos.wrapping_add(chunk),
            }));
            completions.push(self.adapter.transfer(
                &self.src.slice(src_off, chunk as usize),
                &self.dst.slice(dst_off, chunk as usize),
            ));

            src_pos = src_pos.wrapping_add(chunk);
            dst_pos = dst_pos.wrapping_add(chunk);
        }

        if completions.is_empty() {
            self.state = StageState::Idle;
            return Ok(());
        }

        self.state = StageState::Awaiting;
        let results = join_all(completions).await;

        self.state = StageState::Committing;
        let mut fault: Option<TransferError> = None;
        for result in results {
            // Heap order equals submission order: reservations were pushed
            // with strictly increasing `before_src`.
            let Some(Reverse(update)) = self.pending.pop() else {
                break;
            };
            match (&fault, result) {
                (None, Ok(())) => {
                    self.src_head = update.after_src;
                    self.dst_tail = update.after_dst;
                }
                (None, Err(err)) => fault = Some(err),
                // Past the fault: even successful transfers stay
                // uncommitted so the cursors remain prefix-closed.
                (Some(_), _) => {}
            }
        }
        self.pending.clear();

        if let Some(err) = fault {
            warn!(error = %err, "transfer failed; stage faulted");
            self.state = StageState::Faulted;
            return Err(StageError::Transfer(err));
        }

        self.state = StageState::Publishing;
        if let Err(err) = self.forward.publish_tail(self.dst_tail).await {
            warn!(error = %err, "cursor publish failed; stage faulted");
            self.state = StageState::Faulted;
            return Err(StageError::Transfer(err));
        }

        self.state = StageState::Idle;
        Ok(())
    }

    async fn backward(&mut self) -> Result<(), StageError> {
        // Downstream consumption frees destination credit for the next
        // forward pass.
        let head = self.forward.fetch_head();
        if head != self.dst_head {
            self.dst_head = head;
        }

        // Propagate our own consumption upstream when it has advanced.
        if self.src_head != self.published_src_head {
            if let Err(err) = self.backward.publish_head(self.src_head).await {
                warn!(error = %err, "credit publish failed; stage faulted");
                self.state = StageState::Faulted;
                return Err(StageError::Transfer(err));
            }
            self.published_src_head = self.src_head;
        }
        Ok(())
    }
}

impl<A> Stage for Pipe<A>
where
    A: TransferAdapter + Send,
    A::LocalBuf: Send,
    A::RemoteBuf: Send,
{
    fn transfer(&mut self) -> BoxFuture<'_, Result<(), StageError>> {
        Box::pin(Pipe::transfer(self))
    }

    fn begin_drain(&mut self) {
        Pipe::begin_drain(self)
    }

    fn state(&self) -> StageState {
        self.state
    }
}

fn window_capacity(len: usize, side: &str) -> u32 {
    assert!(len > 0, "{side} window must not be empty");
    assert!(
        len.is_power_of_two(),
        "{side} window length must be a power of two"
    );
    assert!(len <= 1 << 31, "{side} window exceeds the 32-bit cursor space");
    len as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MemSpan, SharedMemoryAdapter};
    use crate::pipe::links::link_pair;
    use crate::remote::{AccessFlags, Region};

    struct Harness {
        stage: Pipe<SharedMemoryAdapter>,
        upstream: crate::pipe::links::LocalForwardLink,
        downstream: crate::pipe::links::LocalBackwardLink,
        src_region: Region,
        dst_region: Region,
    }

    fn harness(src_len: usize, dst_len: usize) -> Harness {
        let src_region = Region::zeroed(src_len, AccessFlags::FULL);
        let dst_region = Region::zeroed(dst_len, AccessFlags::FULL);
        let (upstream, stage_backward) = link_pair();
        let (stage_forward, downstream) = link_pair();
        let stage = Pipe::new(
            SharedMemoryAdapter::new(),
            src_region.span(),
            dst_region.span(),
            Box::new(stage_forward),
            Box::new(stage_backward),
        );
        Harness {
            stage,
            upstream,
            downstream,
            src_region,
            dst_region,
        }
    }

    fn fill(span: &MemSpan, bytes: &[u8]) {
        span.write_bytes(0, bytes);
    }

    #[tokio::test]
    async fn idle_when_no_data() {
        let mut h = harness(16, 16);
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.state(), StageState::Idle);
        assert_eq!(h.stage.committed(), (0, 0));
    }

    #[tokio::test]
    async fn moves_available_bytes_and_publishes() {
        let mut h = harness(16, 16);
        fill(&h.src_region.span(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        h.upstream.publish_tail(8).await.unwrap();

        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.committed(), (8, 8));
        assert_eq!(&h.dst_region.as_slice()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        // Production published downstream, consumption published upstream.
        assert_eq!(h.downstream.fetch_tail(), 8);
        assert_eq!(h.upstream.fetch_head(), 8);
    }

    #[tokio::test]
    async fn wrap_boundary_splits_into_two_chunks() {
        let mut h = harness(8, 32);
        // First round moves 6 bytes so both stage cursors sit at 6.
        fill(&h.src_region.span(), &[0; 8]);
        h.upstream.publish_tail(6).await.unwrap();
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.committed(), (6, 6));

        // 8 more bytes wrap the 8-byte source window: chunks of 2 and 6.
        let span = h.src_region.span();
        span.write_bytes(6, &[10, 11]);
        span.write_bytes(0, &[12, 13, 14, 15, 16, 17]);
        h.upstream.publish_tail(14).await.unwrap();
        h.stage.transfer().await.unwrap();

        assert_eq!(h.stage.committed(), (14, 14));
        assert_eq!(
            &h.dst_region.as_slice()[6..14],
            &[10, 11, 12, 13, 14, 15, 16, 17]
        );
    }

    #[tokio::test]
    async fn destination_backpressure_stops_issuing() {
        let mut h = harness(32, 8);
        fill(&h.src_region.span(), &[7; 20]);
        h.upstream.publish_tail(20).await.unwrap();

        // Only 8 bytes of destination credit exist.
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.committed(), (8, 8));

        // No downstream consumption: nothing more moves.
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.committed(), (8, 8));

        // Downstream consumes 4. The backward pass observes the credit; the
        // following forward pass spends it.
        h.downstream.publish_head(4).await.unwrap();
        h.stage.transfer().await.unwrap();
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.committed(), (12, 12));
    }

    #[tokio::test]
    async fn drain_terminates_without_new_submissions() {
        let mut h = harness(16, 16);
        fill(&h.src_region.span(), &[9; 4]);
        h.upstream.publish_tail(4).await.unwrap();

        h.stage.begin_drain();
        assert_eq!(h.stage.state(), StageState::Draining);
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.state(), StageState::Terminated);
        // Nothing moved.
        assert_eq!(h.stage.committed(), (0, 0));

        // Idempotent.
        h.stage.begin_drain();
        h.stage.transfer().await.unwrap();
        assert_eq!(h.stage.state(), StageState::Terminated);
    }

    #[tokio::test]
    async fn faulted_stage_refuses_further_steps() {
        use crate::adapter::RemoteWriteAdapter;
        use crate::remote::LoopbackFabric;

        let fabric = LoopbackFabric::new();
        let src_region = Region::zeroed(16, AccessFlags::FULL);
        let dst_region = Region::zeroed(16, AccessFlags::FULL);
        let desc = fabric.register(&dst_region).unwrap();
        let dst = fabric.import(&desc).unwrap();

        let (mut upstream, stage_backward) = link_pair();
        let (stage_forward, _downstream) = link_pair();
        let mut stage = Pipe::new(
            RemoteWriteAdapter::new(std::sync::Arc::new(fabric.clone())),
            src_region.span(),
            dst,
            Box::new(stage_forward),
            Box::new(stage_backward),
        );

        src_region.span().write_bytes(0, &[1; 8]);
        upstream.publish_tail(8).await.unwrap();
        fabric.fail_op(1);

        let err = stage.transfer().await.unwrap_err();
        assert!(matches!(err, StageError::Transfer(_)));
        assert_eq!(stage.state(), StageState::Faulted);
        assert_eq!(stage.committed(), (0, 0));

        assert_eq!(stage.transfer().await.unwrap_err(), StageError::Faulted);
    }
}
