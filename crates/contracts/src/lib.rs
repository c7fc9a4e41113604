//! # Contracts
//!
//! Frozen interface contracts shared by every blockbeat crate.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Chain Model
//! - A `BlockEpoch` is the raw `(height, hash)` notification from the block source
//! - A `Beat` is the dispatcher's immutable snapshot of the current tip
//! - Heights are `u32`, hashes are 32 opaque bytes

mod beat;
mod block;
mod block_source;
mod blueprint;
mod consumer;
mod error;

pub use beat::Beat;
pub use block::{BlockEpoch, BlockHash};
pub use block_source::{BlockEpochEvent, BlockSource, LocalBlockSource};
pub use blueprint::*;
pub use consumer::Consumer;
pub use error::*;
