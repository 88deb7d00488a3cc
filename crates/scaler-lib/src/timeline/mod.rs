//! Request timeline reconstruction
//!
//! Turns raw log lines into per-request arrival/completion intervals.

pub mod protocol;
mod reconstruct;

pub use protocol::{LineKind, ProtocolLine};
pub use reconstruct::{reconstruct, Timeline};
