//! # Entity Factory
//!
//! The producer-facing front end. Cheap to clone and safe to share across
//! threads; every method only stages or enqueues. Nothing here touches the
//! group store.

use std::sync::Arc;

use crate::ecs::{Component, ComponentRegistry, Egid, EntityDescriptor, GroupId};
use crate::error::{DbError, DbResult};
use crate::sync::{CreationSet, OperationKind, PendingQueue};

/// Shared state behind every factory clone.
#[derive(Debug)]
pub(crate) struct SubmissionQueues {
    pub(crate) pending: PendingQueue,
    pub(crate) creations: CreationSet,
    pub(crate) registry: ComponentRegistry,
}

/// Thread-safe handle for requesting structural changes.
///
/// # Example
///
/// ```rust,ignore
/// let factory = db.factory().clone();
/// std::thread::spawn(move || {
///     factory
///         .build_entity(Egid::from_raw(1, 0), &descriptor)?
///         .init(Position { x: 3.0 })?;
///     factory.swap_entity_group(Egid::from_raw(2, 0), GroupId(1), &descriptor);
///     Ok::<_, DbError>(())
/// });
/// ```
#[derive(Clone, Debug)]
pub struct EntityFactory {
    queues: Arc<SubmissionQueues>,
}

impl EntityFactory {
    pub(crate) fn new(registry: ComponentRegistry, staging_capacity: usize) -> Self {
        Self {
            queues: Arc::new(SubmissionQueues {
                pending: PendingQueue::new(),
                creations: CreationSet::new(staging_capacity),
                registry,
            }),
        }
    }

    pub(crate) fn queues(&self) -> &SubmissionQueues {
        &self.queues
    }

    /// The closed set of component types this database accepts.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.queues.registry
    }

    /// Stages a new entity at `egid` with every component of `descriptor`
    /// default-initialized.
    ///
    /// The entity becomes visible at the next submission.
    ///
    /// # Errors
    ///
    /// - [`DbError::UnregisteredComponent`] if the descriptor names a type
    ///   the registry does not know
    /// - [`DbError::DuplicateEntity`] if `egid` is already staged
    pub fn build_entity(
        &self,
        egid: Egid,
        descriptor: &EntityDescriptor,
    ) -> DbResult<EntityInitializer> {
        let registry = &self.queues.registry;
        if let Some(entry) = descriptor
            .entries()
            .iter()
            .find(|entry| !registry.is_registered(entry.id, entry.type_id))
        {
            return Err(DbError::UnregisteredComponent { name: entry.name });
        }

        let epoch = self.queues.creations.build(egid, descriptor)?;
        tracing::trace!(%egid, descriptor = descriptor.name(), epoch, "entity staged");
        Ok(EntityInitializer {
            queues: Arc::clone(&self.queues),
            egid,
            epoch,
        })
    }

    /// Requests removal of `egid`'s rows in every table of `descriptor`.
    #[track_caller]
    pub fn remove_entity(&self, egid: Egid, descriptor: &EntityDescriptor) {
        self.queues.pending.enqueue(OperationKind::Remove {
            egid,
            descriptor: descriptor.clone(),
        });
    }

    /// Requests moving `egid` to `group`, keeping its entity id.
    #[track_caller]
    pub fn swap_entity_group(&self, egid: Egid, group: GroupId, descriptor: &EntityDescriptor) {
        self.move_entity(egid, egid.with_group(group), descriptor);
    }

    /// Requests moving `from` to `to`; entity id and group may both change.
    #[track_caller]
    pub fn move_entity(&self, from: Egid, to: Egid, descriptor: &EntityDescriptor) {
        self.queues.pending.enqueue(OperationKind::Move {
            from,
            to,
            descriptor: descriptor.clone(),
        });
    }

    /// Requests removal of `group` and every entity in it.
    #[track_caller]
    pub fn remove_group_and_entities(&self, group: GroupId) {
        self.queues
            .pending
            .enqueue(OperationKind::RemoveGroup { group });
    }

    /// Requests exchanging the storage of groups `a` and `b`.
    #[track_caller]
    pub fn swap_groups(&self, a: GroupId, b: GroupId) {
        self.queues.pending.enqueue(OperationKind::SwapGroup { a, b });
    }

    /// Operations waiting for the next submission.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.queues.pending.len()
    }

    /// Entities waiting for the next submission.
    #[must_use]
    pub fn staged_entities(&self) -> usize {
        self.queues.creations.staged_count()
    }
}

/// Sets component values of a staged entity before it is submitted.
#[derive(Debug)]
pub struct EntityInitializer {
    queues: Arc<SubmissionQueues>,
    egid: Egid,
    epoch: u64,
}

impl EntityInitializer {
    /// The EGID the entity will have.
    #[inline]
    #[must_use]
    pub fn egid(&self) -> Egid {
        self.egid
    }

    /// Overwrites the staged `C` value.
    ///
    /// # Errors
    ///
    /// - [`DbError::InvalidOperationOrdering`] if the entity was already
    ///   submitted
    /// - [`DbError::EntityNotFound`] if `C` is not part of the entity's
    ///   descriptor
    pub fn init<C: Component>(&self, value: C) -> DbResult<&Self> {
        self.queues.creations.init(self.epoch, self.egid, value)?;
        Ok(self)
    }
}
