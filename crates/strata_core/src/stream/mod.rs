//! # Change Stream
//!
//! Publish/subscribe of component values, independent of the group store.
//!
//! ```text
//! publish(Position, egid) ──▶ EntityStream<Position>
//!                               ├──▶ Consumer "render"  [ring, cap 64]
//!                               ├──▶ Consumer "audio"   [ring, cap 16]
//!                               └──▶ Consumer "hud" (group 3 only)
//! ```
//!
//! ## Rules
//!
//! - A full consumer fails the publish with `CapacityExceeded`; nothing is
//!   dropped and nothing blocks
//! - Disposal only flags a consumer; the stream unlinks it on the next
//!   publish, never while a fan-out is in progress

mod consumer;
mod streams;

pub use consumer::{Consumer, StreamItem};
pub use streams::{EntityStream, EntityStreams};
