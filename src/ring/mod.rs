//! Lock-free SPSC ring buffer with policy-based overflow handling.
//!
//! The ring is split into a [`Producer`] / [`Consumer`] handle pair sharing a
//! cache-line-padded core. Exactly one thread may drive each handle; the
//! handles may live on different OS threads. Coordination is a pair of
//! monotonically increasing 64-bit cursors:
//!
//! ```text
//! producer writes slot, then Release-stores head  →  consumer Acquire-loads head, then reads slot
//! consumer reads slot, then Release-stores tail   →  producer Acquire-loads tail, then writes slot
//! ```
//!
//! On top of the element API, `Pod` element types get bulk `memcpy` transfer
//! ([`Producer::try_push_bulk`], [`Consumer::try_pop_bulk`]) and borrowed
//! zero-copy views into the backing storage ([`Producer::write_view`],
//! [`Consumer::read_views`] and friends) with scoped commits.
//!
//! # Module map
//! - `spsc`: the shared core, handles, overflow policies, element operations.
//! - `bulk`: contiguous/split bulk copies for `Pod` element types.
//! - `views`: borrowed read and write views with commit semantics.

pub mod bulk;
pub mod spsc;
pub mod views;

pub use spsc::{channel, Consumer, OverflowPolicy, Producer};
pub use views::{ReadSegments, RingError, ViewError, WriteSegments, WriteView};
