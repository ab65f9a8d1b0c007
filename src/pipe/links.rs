//! Cursor exchange between adjacent stages.
//!
//! Every stage publishes one cursor in each direction and reads one back:
//! the forward link carries produced bytes (`tail`) to the next stage and
//! reads back its consumption (`head`); the backward link is the mirror
//! toward the previous stage. Cursor words are 32-bit little-endian values
//! living in 8-byte registers; publishes are release stores, fetches acquire
//! loads — locally, or through a one-sided metadata transfer when the
//! neighbor is remote.
//!
//! The traits are object-safe on purpose: a stage is generic over its *data*
//! adapter but holds heterogeneous neighbors (local ring on one side, remote
//! register on the other) behind `dyn` links.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use futures::future::{self, BoxFuture, FutureExt};

use crate::adapter::{LocalWindow, MemSpan, TransferAdapter, TransferError};
use crate::ring::{Consumer, Producer};
use crate::util::widen_cursor;

/// Link to the next stage: publish produced bytes, read back consumption.
pub trait ForwardLink: Send {
    /// Acquire-reads the neighbor's consumption cursor (available credit).
    fn fetch_head(&self) -> u32;

    /// Publishes this stage's produced-bytes cursor to the neighbor's
    /// source-tail register.
    fn publish_tail(&mut self, tail: u32) -> BoxFuture<'_, Result<(), TransferError>>;
}

/// Link to the previous stage: publish consumption, read back production.
pub trait BackwardLink: Send {
    /// Acquire-reads the upstream production cursor.
    fn fetch_tail(&self) -> u32;

    /// Publishes this stage's consumption cursor to the neighbor's
    /// destination-head register.
    fn publish_head(&mut self, head: u32) -> BoxFuture<'_, Result<(), TransferError>>;
}

// ============================================================================
// Cursor registers
// ============================================================================

/// The 8-byte wire window: a 32-bit cursor word plus padding. The padding is
/// atomic too so one-sided writes covering the whole window stay within
/// interior-mutable memory.
#[repr(C)]
struct WordCell {
    word: AtomicU32,
    _pad: AtomicU32,
}

/// One cursor register: locally readable, remotely writable.
///
/// The value is stored little-endian so the raw window bytes match the wire
/// format regardless of host order. A peer writes the register through a
/// one-sided transfer into [`CursorWord::span`]; local readers use acquire
/// loads.
pub struct CursorWord {
    cell: CachePadded<WordCell>,
}

impl Default for CursorWord {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorWord {
    pub fn new() -> Self {
        Self {
            cell: CachePadded::new(WordCell {
                word: AtomicU32::new(0),
                _pad: AtomicU32::new(0),
            }),
        }
    }

    #[inline]
    pub fn load(&self) -> u32 {
        u32::from_le(self.cell.word.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: u32) {
        self.cell.word.store(value.to_le(), Ordering::Release);
    }

    /// The register as an 8-byte window, for registration with a fabric.
    pub fn span(&self) -> MemSpan {
        // SAFETY: the window covers exactly the WordCell (8 bytes); callers
        // keep the CursorWord alive (it sits behind an Arc) while the span is
        // registered.
        unsafe {
            MemSpan::new(
                NonNull::new_unchecked(&*self.cell as *const WordCell as *mut u8),
                std::mem::size_of::<WordCell>(),
            )
        }
    }
}

// ============================================================================
// Local neighbors: shared atomics
// ============================================================================

struct LinkWords {
    /// Written by the upstream side, read by the downstream side.
    tail: CursorWord,
    /// Written by the downstream side, read by the upstream side.
    head: CursorWord,
}

/// Upstream half of a local link pair.
pub struct LocalForwardLink {
    words: Arc<LinkWords>,
}

/// Downstream half of a local link pair.
pub struct LocalBackwardLink {
    words: Arc<LinkWords>,
}

/// Creates the two halves of a cursor link between local neighbors.
///
/// The upstream stage takes the forward half, the downstream stage the
/// backward half.
pub fn link_pair() -> (LocalForwardLink, LocalBackwardLink) {
    let words = Arc::new(LinkWords {
        tail: CursorWord::new(),
        head: CursorWord::new(),
    });
    (
        LocalForwardLink {
            words: Arc::clone(&words),
        },
        LocalBackwardLink { words },
    )
}

impl ForwardLink for LocalForwardLink {
    fn fetch_head(&self) -> u32 {
        self.words.head.load()
    }

    fn publish_tail(&mut self, tail: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        self.words.tail.store(tail);
        future::ready(Ok(())).boxed()
    }
}

impl BackwardLink for LocalBackwardLink {
    fn fetch_tail(&self) -> u32 {
        self.words.tail.load()
    }

    fn publish_head(&mut self, head: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        self.words.head.store(head);
        future::ready(Ok(())).boxed()
    }
}

// ============================================================================
// Ring endpoints: the pipeline's edges
// ============================================================================

/// Backward link of the first stage: the stage *is* the source ring's
/// consumer. Production is read off the ring's producer cursor; publishing
/// consumption releases ring slots to the external producer.
pub struct RingSourceLink {
    core: Arc<crate::ring::spsc::RingCore<u8>>,
}

/// Forward link of the last stage: the stage *is* the destination ring's
/// producer. Publishing production makes bytes visible to the external
/// consumer; credit is read off the ring's consumer cursor.
pub struct RingSinkLink {
    core: Arc<crate::ring::spsc::RingCore<u8>>,
}

/// Dissolves a byte ring's consumer side into a transfer window over the
/// ring storage plus the stage-facing backward link.
///
/// The window must not outlive the returned link (the link's ring handle
/// keeps the storage alive).
pub fn ring_source(consumer: Consumer<u8>) -> (MemSpan, RingSourceLink) {
    let core = consumer.into_core();
    // SAFETY: `core` is kept alive by the link returned alongside the span.
    let span = unsafe {
        MemSpan::new(
            NonNull::new_unchecked(core.data_ptr()),
            core.capacity as usize,
        )
    };
    (span, RingSourceLink { core })
}

/// Dissolves a byte ring's producer side into a transfer window over the
/// ring storage plus the stage-facing forward link.
///
/// The window must not outlive the returned link.
pub fn ring_sink(producer: Producer<u8>) -> (MemSpan, RingSinkLink) {
    let core = producer.into_core();
    // SAFETY: as in `ring_source`.
    let span = unsafe {
        MemSpan::new(
            NonNull::new_unchecked(core.data_ptr()),
            core.capacity as usize,
        )
    };
    (span, RingSinkLink { core })
}

impl BackwardLink for RingSourceLink {
    fn fetch_tail(&self) -> u32 {
        // The external producer's published head is this stage's available
        // bytes. The wire carries the low 32 bits.
        self.core.head.load(Ordering::Acquire) as u32
    }

    fn publish_head(&mut self, head: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        let old = self.core.tail.load(Ordering::Relaxed);
        self.core
            .tail
            .store(widen_cursor(old, head), Ordering::Release);
        future::ready(Ok(())).boxed()
    }
}

impl ForwardLink for RingSinkLink {
    fn fetch_head(&self) -> u32 {
        self.core.tail.load(Ordering::Acquire) as u32
    }

    fn publish_tail(&mut self, tail: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        let old = self.core.head.load(Ordering::Relaxed);
        self.core
            .head
            .store(widen_cursor(old, tail), Ordering::Release);
        future::ready(Ok(())).boxed()
    }
}

// ============================================================================
// Remote neighbors: cursor words over a metadata adapter
// ============================================================================

/// Forward link whose neighbor lives across a transport.
///
/// `publish_tail` stages the word in a registered local window and transfers
/// it into the peer's source-tail register; `fetch_head` reads the local
/// register the peer's backward link writes into.
pub struct RemoteForwardLink<A: TransferAdapter> {
    adapter: A,
    staging: A::LocalBuf,
    peer_tail: A::RemoteBuf,
    head_reg: Arc<CursorWord>,
}

impl<A: TransferAdapter> RemoteForwardLink<A> {
    /// `staging` must be a registered local window of at least 8 bytes;
    /// `peer_tail` the peer's exported source-tail register; `head_reg` the
    /// locally registered word the peer publishes its head into.
    pub fn new(
        adapter: A,
        staging: A::LocalBuf,
        peer_tail: A::RemoteBuf,
        head_reg: Arc<CursorWord>,
    ) -> Self {
        assert!(staging.len_bytes() >= 8, "staging window under 8 bytes");
        Self {
            adapter,
            staging,
            peer_tail,
            head_reg,
        }
    }
}

impl<A> ForwardLink for RemoteForwardLink<A>
where
    A: TransferAdapter + Send,
    A::LocalBuf: Send,
    A::RemoteBuf: Send,
{
    fn fetch_head(&self) -> u32 {
        self.head_reg.load()
    }

    fn publish_tail(&mut self, tail: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        let mut wire = [0u8; 8];
        wire[..4].copy_from_slice(&tail.to_le_bytes());
        self.staging.write_bytes(0, &wire);
        self.adapter
            .transfer(&self.staging.slice(0, 8), &self.peer_tail)
            .boxed()
    }
}

/// Backward link whose neighbor lives across a transport; mirror of
/// [`RemoteForwardLink`].
pub struct RemoteBackwardLink<A: TransferAdapter> {
    adapter: A,
    staging: A::LocalBuf,
    peer_head: A::RemoteBuf,
    tail_reg: Arc<CursorWord>,
}

impl<A: TransferAdapter> RemoteBackwardLink<A> {
    pub fn new(
        adapter: A,
        staging: A::LocalBuf,
        peer_head: A::RemoteBuf,
        tail_reg: Arc<CursorWord>,
    ) -> Self {
        assert!(staging.len_bytes() >= 8, "staging window under 8 bytes");
        Self {
            adapter,
            staging,
            peer_head,
            tail_reg,
        }
    }
}

impl<A> BackwardLink for RemoteBackwardLink<A>
where
    A: TransferAdapter + Send,
    A::LocalBuf: Send,
    A::RemoteBuf: Send,
{
    fn fetch_tail(&self) -> u32 {
        self.tail_reg.load()
    }

    fn publish_head(&mut self, head: u32) -> BoxFuture<'_, Result<(), TransferError>> {
        let mut wire = [0u8; 8];
        wire[..4].copy_from_slice(&head.to_le_bytes());
        self.staging.write_bytes(0, &wire);
        self.adapter
            .transfer(&self.staging.slice(0, 8), &self.peer_head)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RemoteWriteAdapter;
    use crate::remote::{AccessFlags, LoopbackFabric, QueuePair as _, Region};
    use crate::ring::{channel, OverflowPolicy};

    #[tokio::test]
    async fn local_pair_carries_cursors_both_ways() {
        let (mut fwd, mut bwd) = link_pair();
        assert_eq!(bwd.fetch_tail(), 0);
        fwd.publish_tail(17).await.unwrap();
        assert_eq!(bwd.fetch_tail(), 17);

        assert_eq!(fwd.fetch_head(), 0);
        bwd.publish_head(9).await.unwrap();
        assert_eq!(fwd.fetch_head(), 9);
    }

    #[tokio::test]
    async fn ring_source_reflects_producer_progress() {
        let (mut tx, rx) = channel::<u8>(16, OverflowPolicy::Drop);
        let (window, mut link) = ring_source(rx);
        assert_eq!(window.len(), 16);
        assert_eq!(link.fetch_tail(), 0);

        tx.try_push_bulk(&[1, 2, 3, 4, 5]);
        assert_eq!(link.fetch_tail(), 5);

        // Releasing 3 bytes gives the producer room back.
        link.publish_head(3).await.unwrap();
        assert_eq!(tx.available(), 14);
    }

    #[tokio::test]
    async fn ring_sink_publishes_to_consumer() {
        let (tx, mut rx) = channel::<u8>(16, OverflowPolicy::Drop);
        let (window, mut link) = ring_sink(tx);

        window.write_bytes(0, &[42, 43]);
        link.publish_tail(2).await.unwrap();

        assert_eq!(rx.try_pop(), Some(42));
        assert_eq!(rx.try_pop(), Some(43));
        assert_eq!(link.fetch_head(), 2);
    }

    #[tokio::test]
    async fn remote_links_move_cursor_words() {
        let fabric = LoopbackFabric::new();

        // Peer-side registers, locally registered for the remote writer.
        let peer_tail_reg = Arc::new(CursorWord::new());
        let peer_tail_desc = fabric
            .register_span(peer_tail_reg.span(), AccessFlags::FULL)
            .unwrap();
        let peer_tail = fabric.import(&peer_tail_desc).unwrap();

        let staging = Region::zeroed(8, AccessFlags::FULL);
        let head_reg = Arc::new(CursorWord::new());

        let adapter = RemoteWriteAdapter::new(Arc::new(fabric.clone()));
        let mut link = RemoteForwardLink::new(adapter, staging.span(), peer_tail, head_reg.clone());

        link.publish_tail(0xABCD).await.unwrap();
        assert_eq!(peer_tail_reg.load(), 0xABCD);

        // Peer writes its head into our local register via the fabric.
        let head_desc = fabric
            .register_span(head_reg.span(), AccessFlags::FULL)
            .unwrap();
        let our_head = fabric.import(&head_desc).unwrap();
        let peer_staging = Region::zeroed(8, AccessFlags::FULL);
        peer_staging.span().write_bytes(0, &0x1234u32.to_le_bytes());
        fabric
            .post_write(&peer_staging.span(), &our_head)
            .await
            .unwrap();
        assert_eq!(link.fetch_head(), 0x1234);
    }
}
