//! Bounded stream consumers and the producer side of their buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::ecs::{Egid, GroupId};
use crate::error::{DbError, DbResult};

/// A published value with the EGID it belongs to.
pub type StreamItem<C> = (C, Egid);

/// An independent, bounded queue of published `C` values.
///
/// Dropping the consumer disposes it.
#[derive(Debug)]
pub struct Consumer<C> {
    name: String,
    receiver: Receiver<StreamItem<C>>,
    capacity: usize,
    group: Option<GroupId>,
    disposed: Arc<AtomicBool>,
}

impl<C> Consumer<C> {
    /// Name given at creation, used in capacity errors.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed buffer capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The group this consumer is filtered to, if any.
    #[inline]
    #[must_use]
    pub fn group_filter(&self) -> Option<GroupId> {
        self.group
    }

    /// Number of buffered values.
    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if nothing is buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Takes the oldest buffered value, if any.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<StreamItem<C>> {
        self.receiver.try_recv().ok()
    }

    /// Takes every buffered value, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<StreamItem<C>> {
        self.receiver.try_iter().collect()
    }

    /// Discards every buffered value. Returns how many were discarded.
    pub fn flush(&self) -> usize {
        self.receiver.try_iter().count()
    }

    /// Stops receiving. The stream unlinks the consumer on its next publish.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::trace!(consumer = %self.name, "consumer disposed");
        }
    }

    /// Checks whether [`Consumer::dispose`] was called.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<C> Drop for Consumer<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The stream's end of one consumer.
#[derive(Debug)]
pub(crate) struct Subscription<C> {
    name: String,
    sender: Sender<StreamItem<C>>,
    capacity: usize,
    group: Option<GroupId>,
    disposed: Arc<AtomicBool>,
}

impl<C: Clone> Subscription<C> {
    /// Creates a linked subscription/consumer pair.
    pub(crate) fn pair(name: String, capacity: usize, group: Option<GroupId>) -> (Self, Consumer<C>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        let disposed = Arc::new(AtomicBool::new(false));
        let subscription = Self {
            name: name.clone(),
            sender,
            capacity,
            group,
            disposed: Arc::clone(&disposed),
        };
        let consumer = Consumer {
            name,
            receiver,
            capacity,
            group,
            disposed,
        };
        (subscription, consumer)
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        !self.disposed.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn accepts(&self, egid: Egid) -> bool {
        self.group.map_or(true, |group| group == egid.group())
    }

    /// Enqueues without blocking.
    ///
    /// # Errors
    ///
    /// [`DbError::CapacityExceeded`] if the buffer is full; its contents
    /// are left unchanged.
    pub(crate) fn deliver(&self, value: &C, egid: Egid) -> DbResult<()> {
        match self.sender.try_send((value.clone(), egid)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DbError::CapacityExceeded {
                consumer: self.name.clone(),
                capacity: self.capacity,
            }),
            // The consumer was dropped without the flag being observed yet.
            Err(TrySendError::Disconnected(_)) => {
                self.disposed.store(true, Ordering::Release);
                Ok(())
            }
        }
    }
}
