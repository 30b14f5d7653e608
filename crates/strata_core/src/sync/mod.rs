//! # Producer-Side Staging
//!
//! Everything producers touch between submissions.
//!
//! ```text
//! Producers (any thread):   build ──▶ CreationSet (current generation)
//!                           remove/move/swap ──▶ PendingQueue
//!
//! Submission (one thread):  drain PendingQueue ──▶ GroupStore
//!                           flip + take CreationSet ──▶ GroupStore
//! ```
//!
//! Neither structure touches the group store. Storage only changes inside
//! a submission.

mod creation_set;
mod pending;

pub use creation_set::{CreationGeneration, CreationSet};
pub use pending::{OperationKind, OperationTrace, PendingOperation, PendingQueue};
