//! Data-plane substrate for single-producer / single-consumer streaming
//! pipelines across memory domains.
//!
//! Two tightly coupled subsystems:
//!
//! - A lock-free **SPSC ring buffer** ([`ring`]) with configurable overflow
//!   policy, bulk transfer for trivially copyable elements, and borrowed
//!   zero-copy views into the backing storage (split views across the wrap).
//! - A **pipe stage engine** ([`pipe`]) — a chain of transfer nodes, each
//!   moving bytes from its source window to its destination window through a
//!   pluggable [`adapter::TransferAdapter`], publishing cursors to its
//!   neighbors through the same abstraction whether they are local or remote.
//!
//! Flow of a pipeline: an external producer pushes into the first stage's
//! source ring; every stage copies forward and acknowledges backward; the
//! final consumer pops from the last destination ring. Backpressure is
//! credit-based end to end — a stalled consumer eventually stalls the
//! producer, never drops bytes.
//!
//! The transports themselves are external. [`remote`] defines exactly what
//! is consumed from them (queue pairs, registered regions, a TCP bootstrap
//! for descriptor exchange) and ships an in-process loopback fabric for
//! tests and local pipelines.
//!
//! # Example: a ring as a thread-safe byte queue
//!
//! ```
//! use ringpipe::ring::{channel, OverflowPolicy};
//!
//! let (mut tx, mut rx) = channel::<u8>(1024, OverflowPolicy::Drop);
//! assert_eq!(tx.try_push_bulk(b"hello"), 5);
//!
//! let mut out = [0u8; 5];
//! assert_eq!(rx.try_pop_bulk(&mut out), 5);
//! assert_eq!(&out, b"hello");
//! ```

pub mod adapter;
pub mod pipe;
pub mod remote;
pub mod ring;
pub mod stdx;
pub mod util;

pub use adapter::{
    MemSpan, RemoteReadAdapter, RemoteRecvAdapter, RemoteSendAdapter, RemoteWriteAdapter,
    SharedMemoryAdapter, TransferAdapter, TransferError,
};
pub use pipe::{Pipe, Pipeline, PipelineError, Stage, StageError, StageState};
pub use ring::{channel, Consumer, OverflowPolicy, Producer};
