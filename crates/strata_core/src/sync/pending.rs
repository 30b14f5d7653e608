//! # Pending Operations Queue
//!
//! Structural changes requested between submissions.
//!
//! Producers on any thread enqueue; only the submission engine drains.
//! Operations are applied in enqueue order and consumed exactly once.

use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::ecs::{Egid, EntityDescriptor, GroupId};

/// Where and when an operation was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationTrace {
    /// Global request counter; later requests have larger numbers.
    pub sequence: u64,
    /// Source location of the factory call.
    pub caller: &'static Location<'static>,
    /// Time of the request.
    pub requested_at: Instant,
}

impl OperationTrace {
    /// Captures the caller's location.
    #[track_caller]
    #[must_use]
    pub fn capture(sequence: u64) -> Self {
        Self {
            sequence,
            caller: Location::caller(),
            requested_at: Instant::now(),
        }
    }
}

impl fmt::Display for OperationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} ({}:{})",
            self.sequence,
            self.caller.file(),
            self.caller.line()
        )
    }
}

/// A structural change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Move an entity's rows to another EGID.
    Move {
        /// Current location.
        from: Egid,
        /// Destination.
        to: Egid,
        /// Tables to move.
        descriptor: EntityDescriptor,
    },
    /// Remove an entity's rows.
    Remove {
        /// The entity.
        egid: Egid,
        /// Tables to remove from.
        descriptor: EntityDescriptor,
    },
    /// Remove a group with every entity in it.
    RemoveGroup {
        /// The group.
        group: GroupId,
    },
    /// Exchange the storage of two groups.
    SwapGroup {
        /// First group.
        a: GroupId,
        /// Second group.
        b: GroupId,
    },
}

impl OperationKind {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Remove { .. } => "remove",
            Self::RemoveGroup { .. } => "remove_group",
            Self::SwapGroup { .. } => "swap_group",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { from, to, descriptor } => {
                write!(f, "move `{}` {from} -> {to}", descriptor.name())
            }
            Self::Remove { egid, descriptor } => {
                write!(f, "remove `{}` {egid}", descriptor.name())
            }
            Self::RemoveGroup { group } => write!(f, "remove {group}"),
            Self::SwapGroup { a, b } => write!(f, "swap {a} <-> {b}"),
        }
    }
}

/// A queued structural change plus its trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingOperation {
    /// What to do.
    pub kind: OperationKind,
    /// Where it was requested.
    pub trace: OperationTrace,
}

/// Multi-producer, single-consumer log of structural changes.
#[derive(Debug)]
pub struct PendingQueue {
    sender: Sender<PendingOperation>,
    receiver: Receiver<PendingOperation>,
    sequence: AtomicU64,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            sequence: AtomicU64::new(0),
        }
    }

    /// Appends an operation, tracing it to the caller.
    ///
    /// Returns the operation's sequence number.
    #[track_caller]
    pub fn enqueue(&self, kind: OperationKind) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let trace = OperationTrace::capture(sequence);
        tracing::trace!(op = %kind, %trace, "operation enqueued");
        // The queue owns the receiver, so the channel cannot be disconnected.
        let _ = self.sender.send(PendingOperation { kind, trace });
        sequence
    }

    /// Number of queued operations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Removes and returns every operation queued so far, in enqueue order.
    ///
    /// Operations enqueued while draining stay for the next drain.
    #[must_use]
    pub fn drain(&self) -> Vec<PendingOperation> {
        let snapshot = self.receiver.len();
        self.receiver.try_iter().take(snapshot).collect()
    }
}
