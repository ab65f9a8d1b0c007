//! The pipeline stage engine.
//!
//! A pipeline is a doubly linked chain of pipe stages. Each stage copies
//! bytes from its source window to its destination window through a
//! [`TransferAdapter`](crate::adapter::TransferAdapter), and exchanges
//! head/tail cursors with its neighbors through [`links`] — the same
//! abstraction whether the neighbor is a local ring, a stage in the same
//! process, or a peer across a one-sided transport.
//!
//! # Module map
//! - `links`: forward/backward cursor exchange (local word pairs, ring
//!   endpoints, remote registers over a metadata adapter).
//! - `stage`: the transfer node — chunked forward pass, in-order commit,
//!   backward credit propagation, drain/fault state machine.
//! - `pipeline`: the orchestrator that owns the stages and drives one
//!   cooperative progress step at a time.

pub mod links;
pub mod pipeline;
pub mod stage;

pub use links::{
    link_pair, ring_sink, ring_source, BackwardLink, CursorWord, ForwardLink, LocalBackwardLink,
    LocalForwardLink, RemoteBackwardLink, RemoteForwardLink, RingSinkLink, RingSourceLink,
};
pub use pipeline::{Pipeline, PipelineError};
pub use stage::{Pipe, Stage, StageError, StageState, MAX_TRANSFERS_PER_PASS};
