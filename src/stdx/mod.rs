//! Support structures with protocol-bounded, allocation-free storage.
//!
//! Everything the ring and pipe hot paths collect has a small compile-time
//! bound (two view segments, sixteen in-flight transfers), so the containers
//! here keep their storage inline and fail fast when a bound is violated.
//!
//! # Module map
//! - `inline_vec`: fixed-capacity inline vector backing ring view segments
//!   and per-pass completion batches.

pub mod inline_vec;

pub use inline_vec::InlineVec;
