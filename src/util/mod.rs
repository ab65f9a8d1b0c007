//! Low-level byte and cursor helpers shared across the crate.

pub mod bytes;

pub use bytes::{as_byte_slice, widen_cursor, Pod};
