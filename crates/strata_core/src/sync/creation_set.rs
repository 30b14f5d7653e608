//! # Double-Buffered Creation Set
//!
//! Newly built entities are staged here until the next submission.
//!
//! ## Architecture
//!
//! ```text
//!   producers ──build──▶ generation[epoch & 1]      (current)
//!                        generation[!(epoch & 1)]   (other)
//!
//!   submission: epoch += 1 ──▶ producers now fill the other slot
//!               take(old slot) ──▶ merge into the group store
//! ```
//!
//! The epoch is the single "current generation" flag. It only advances
//! inside the submission's exclusive section. Each generation has its own
//! lock, so producers filling the current generation never contend with a
//! merge draining the previous one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::ecs::{Component, Egid, EntityDescriptor, GroupId, GroupTables};
use crate::error::{DbError, DbResult};

/// One generation of staged entities, per group.
#[derive(Debug, Default)]
pub struct CreationGeneration {
    groups: HashMap<GroupId, GroupTables>,
    entity_count: usize,
}

impl CreationGeneration {
    /// Number of staged entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Checks if nothing is staged.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// Checks whether `egid` is staged.
    #[must_use]
    pub fn contains(&self, egid: Egid) -> bool {
        self.groups
            .get(&egid.group())
            .is_some_and(|tables| tables.contains_entity(egid.entity()))
    }

    /// Staged groups in ascending group order.
    #[must_use]
    pub fn into_groups(self) -> Vec<(GroupId, GroupTables)> {
        let mut groups: Vec<_> = self.groups.into_iter().collect();
        groups.sort_unstable_by_key(|(group, _)| *group);
        groups
    }

    fn stage(&mut self, egid: Egid, descriptor: &EntityDescriptor, capacity: usize) -> DbResult<()> {
        self.groups
            .entry(egid.group())
            .or_default()
            .push_defaults(egid.entity(), descriptor, capacity)
            .map_err(|err| err.in_group(egid.group()))?;
        self.entity_count += 1;
        Ok(())
    }

    fn set<C: Component>(&mut self, egid: Egid, value: C) -> DbResult<()> {
        let slot = self
            .groups
            .get_mut(&egid.group())
            .map(GroupTables::typed_mut::<C>)
            .transpose()?
            .flatten()
            .and_then(|table| table.get_mut(egid.entity()))
            .ok_or(DbError::not_found(egid))?;
        *slot = value;
        Ok(())
    }
}

/// Two creation generations behind an atomic epoch.
#[derive(Debug)]
pub struct CreationSet {
    generations: [Mutex<CreationGeneration>; 2],
    epoch: AtomicU64,
    initial_capacity: usize,
}

impl Default for CreationSet {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CreationSet {
    /// Creates an empty set whose staging tables reserve `capacity` rows.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            generations: [
                Mutex::new(CreationGeneration::default()),
                Mutex::new(CreationGeneration::default()),
            ],
            epoch: AtomicU64::new(0),
            initial_capacity: capacity,
        }
    }

    /// The current epoch. Advances by one per submission iteration.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Stages default-initialized rows for `egid` in the current generation.
    ///
    /// Returns the epoch the entity was staged in.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateEntity`] if `egid` is already staged.
    pub fn build(&self, egid: Egid, descriptor: &EntityDescriptor) -> DbResult<u64> {
        let (epoch, mut generation) = self.lock_current();
        generation.stage(egid, descriptor, self.initial_capacity)?;
        Ok(epoch)
    }

    /// Overwrites the staged `C` of `egid`, staged during `epoch`.
    ///
    /// # Errors
    ///
    /// - [`DbError::InvalidOperationOrdering`] if that generation was
    ///   already submitted
    /// - [`DbError::EntityNotFound`] if the entity has no staged `C`
    pub fn init<C: Component>(&self, epoch: u64, egid: Egid, value: C) -> DbResult<()> {
        let mut generation = self.generations[Self::slot(epoch)].lock();
        if self.epoch() != epoch {
            return Err(DbError::InvalidOperationOrdering {
                egid,
                reason: "entity initializer used after its entity was submitted",
            });
        }
        generation.set(egid, value)
    }

    /// Number of entities waiting in the current generation.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.lock_current().1.entity_count()
    }

    /// Checks whether anything waits in the current generation.
    #[must_use]
    pub fn has_staged(&self) -> bool {
        self.staged_count() > 0
    }

    /// Checks whether `egid` waits in the current generation.
    #[must_use]
    pub fn is_staged(&self, egid: Egid) -> bool {
        self.lock_current().1.contains(egid)
    }

    /// Flips the current generation and takes the previous one.
    ///
    /// Builds racing with the flip land in exactly one of the two
    /// generations. Only the submission engine calls this.
    #[must_use]
    pub fn swap_and_take(&self) -> CreationGeneration {
        let previous = self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut generation = self.generations[Self::slot(previous)].lock();
        std::mem::take(&mut *generation)
    }

    /// Locks the current generation, retrying if the epoch advances
    /// between reading it and acquiring the lock.
    fn lock_current(&self) -> (u64, MutexGuard<'_, CreationGeneration>) {
        loop {
            let epoch = self.epoch();
            let generation = self.generations[Self::slot(epoch)].lock();
            if self.epoch() == epoch {
                return (epoch, generation);
            }
        }
    }

    #[inline]
    fn slot(epoch: u64) -> usize {
        usize::from(epoch % 2 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{ComponentId, EntityId};
    use std::sync::Arc;
    use std::thread;

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Position {
        x: f32,
    }
    impl Component for Position {
        const ID: ComponentId = ComponentId(0);
        const NAME: &'static str = "Position";
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Health(u32);
    impl Component for Health {
        const ID: ComponentId = ComponentId(1);
        const NAME: &'static str = "Health";
    }

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::builder("dot").with::<Position>().build()
    }

    #[test]
    fn test_build_then_take() {
        let set = CreationSet::default();
        let egid = Egid::from_raw(1, 7);
        set.build(egid, &descriptor()).unwrap();
        assert!(set.is_staged(egid));
        assert_eq!(set.staged_count(), 1);

        let generation = set.swap_and_take();
        assert_eq!(generation.entity_count(), 1);
        assert!(!set.has_staged());
        assert_eq!(set.epoch(), 1);

        let groups = generation.into_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, GroupId(7));
        assert!(groups[0].1.contains_entity(EntityId(1)));
    }

    #[test]
    fn test_duplicate_build_is_rejected() {
        let set = CreationSet::default();
        let egid = Egid::from_raw(1, 7);
        set.build(egid, &descriptor()).unwrap();
        assert_eq!(
            set.build(egid, &descriptor()),
            Err(DbError::DuplicateEntity { egid })
        );
        assert_eq!(set.staged_count(), 1);
    }

    #[test]
    fn test_init_overwrites_default() {
        let set = CreationSet::default();
        let egid = Egid::from_raw(2, 0);
        let epoch = set.build(egid, &descriptor()).unwrap();
        set.init(epoch, egid, Position { x: 4.5 }).unwrap();

        let (_, mut tables) = set.swap_and_take().into_groups().remove(0);
        let table = tables.typed_mut::<Position>().unwrap().unwrap();
        assert_eq!(table.get(EntityId(2)), Some(&Position { x: 4.5 }));
    }

    #[test]
    fn test_init_after_submission_fails() {
        let set = CreationSet::default();
        let egid = Egid::from_raw(3, 0);
        let epoch = set.build(egid, &descriptor()).unwrap();
        let _ = set.swap_and_take();

        assert!(matches!(
            set.init(epoch, egid, Position { x: 1.0 }),
            Err(DbError::InvalidOperationOrdering { .. })
        ));
    }

    #[test]
    fn test_init_component_outside_descriptor() {
        let set = CreationSet::default();
        let egid = Egid::from_raw(3, 0);
        let epoch = set.build(egid, &descriptor()).unwrap();
        assert_eq!(
            set.init(epoch, egid, Health(10)),
            Err(DbError::not_found(egid))
        );
    }

    #[test]
    fn test_concurrent_builds_land_in_exactly_one_generation() {
        let set = Arc::new(CreationSet::default());
        let builders: Vec<_> = (0..4_u32)
            .map(|thread_index| {
                let set = Arc::clone(&set);
                thread::spawn(move || {
                    for i in 0..500 {
                        set.build(Egid::from_raw(thread_index * 10_000 + i, 0), &descriptor())
                            .unwrap();
                    }
                })
            })
            .collect();

        let mut taken = 0;
        while builders.iter().any(|builder| !builder.is_finished()) {
            taken += set.swap_and_take().entity_count();
        }
        for builder in builders {
            builder.join().unwrap();
        }
        taken += set.swap_and_take().entity_count();

        assert_eq!(taken, 2000);
    }
}
