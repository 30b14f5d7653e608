//! # Queries
//!
//! Typed views over the dense arrays of the group store.
//!
//! ## Validity
//!
//! A collection borrows the store, so the borrow checker already prevents
//! holding one across `step()`. Anything derived from a collection that
//! outlives the borrow (a copied row index, a cached length) is only
//! meaningful until the next submission: rows are swap-removed and
//! appended there, so indices and occupancy change.
//!
//! Multi-component views assume every listed table shares row indices for
//! the same entity, which holds for entities built from one descriptor.
//! Mixing descriptors inside one group breaks that assumption; keeping
//! them apart is the caller's contract.

use std::ops::Range;

use super::component::Component;
use super::egid::{Egid, EntityId, GroupId};
use super::group_store::GroupStore;
use super::table::ComponentTable;
use crate::error::{DbError, DbResult, EntityLookup};

// ============================================================================
// SINGLE GROUP
// ============================================================================

/// Read-only rows of one component type in one group.
#[derive(Debug)]
pub struct EntityCollection<'a, C> {
    group: GroupId,
    components: &'a [C],
    entities: &'a [EntityId],
}

impl<C> Clone for EntityCollection<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for EntityCollection<'_, C> {}

impl<'a, C: Component> EntityCollection<'a, C> {
    /// A collection with no rows.
    #[must_use]
    pub fn empty(group: GroupId) -> Self {
        Self {
            group,
            components: &[],
            entities: &[],
        }
    }

    /// Every row of `table`.
    #[must_use]
    pub fn from_table(group: GroupId, table: &'a ComponentTable<C>) -> Self {
        Self {
            group,
            components: table.components(),
            entities: table.entity_ids(),
        }
    }
}

impl<'a, C> EntityCollection<'a, C> {
    /// The group the rows belong to.
    #[inline]
    #[must_use]
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Dense component array, indexable by row.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &'a [C] {
        self.components
    }

    /// Dense entity id array, parallel to [`EntityCollection::components`].
    #[inline]
    #[must_use]
    pub fn entity_ids(&self) -> &'a [EntityId] {
        self.entities
    }

    /// The row at `index` with its EGID.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(&'a C, Egid)> {
        let component = self.components.get(index)?;
        let entity = self.entities.get(index)?;
        Some((component, Egid::new(*entity, self.group)))
    }

    /// A sub-collection of rows `range`, clamped to the collection.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            group: self.group,
            components: &self.components[start..end],
            entities: &self.entities[start..end],
        }
    }

    /// Cursor over `(component, egid)` pairs in row order.
    #[must_use]
    pub fn iter(&self) -> EntityCursor<'a, C> {
        EntityCursor {
            collection: *self,
            index: 0,
        }
    }
}

impl<'a, C> IntoIterator for EntityCollection<'a, C> {
    type Item = (&'a C, Egid);
    type IntoIter = EntityCursor<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Cursor-based enumerator over an [`EntityCollection`].
#[derive(Debug)]
pub struct EntityCursor<'a, C> {
    collection: EntityCollection<'a, C>,
    index: usize,
}

impl<'a, C> EntityCursor<'a, C> {
    /// Row index the next call to `next` yields.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.index
    }
}

impl<'a, C> Iterator for EntityCursor<'a, C> {
    type Item = (&'a C, Egid);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.collection.get(self.index)?;
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.collection.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<C> ExactSizeIterator for EntityCursor<'_, C> {}

/// Mutable rows of one component type in one group.
#[derive(Debug)]
pub struct EntityCollectionMut<'a, C> {
    group: GroupId,
    components: &'a mut [C],
    entities: &'a [EntityId],
}

impl<'a, C> EntityCollectionMut<'a, C> {
    /// The group the rows belong to.
    #[inline]
    #[must_use]
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Dense mutable component array.
    #[inline]
    pub fn components_mut(&mut self) -> &mut [C] {
        &mut *self.components
    }

    /// Dense entity id array.
    #[inline]
    #[must_use]
    pub fn entity_ids(&self) -> &[EntityId] {
        self.entities
    }

    /// Iterates over `(component, egid)` pairs in row order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&mut C, Egid)> + '_ {
        let group = self.group;
        self.components
            .iter_mut()
            .zip(self.entities.iter())
            .map(move |(component, &entity)| (component, Egid::new(entity, group)))
    }
}

// ============================================================================
// TWO COMPONENTS
// ============================================================================

/// Rows of two component types in one group, aligned by row index.
#[derive(Debug)]
pub struct EntityPair<'a, A, B> {
    group: GroupId,
    first: &'a [A],
    second: &'a [B],
    entities: &'a [EntityId],
}

impl<'a, A, B> EntityPair<'a, A, B> {
    /// The group the rows belong to.
    #[inline]
    #[must_use]
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Number of aligned rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Both dense arrays.
    #[inline]
    #[must_use]
    pub fn components(&self) -> (&'a [A], &'a [B]) {
        (self.first, self.second)
    }

    /// Iterates over `(a, b, egid)` in row order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a A, &'a B, Egid)> + 'a {
        let group = self.group;
        self.first
            .iter()
            .zip(self.second)
            .zip(self.entities)
            .map(move |((a, b), &entity)| (a, b, Egid::new(entity, group)))
    }
}

/// Mutable rows of two component types in one group.
#[derive(Debug)]
pub struct EntityPairMut<'a, A, B> {
    group: GroupId,
    first: &'a mut [A],
    second: &'a mut [B],
    entities: &'a [EntityId],
}

impl<A, B> EntityPairMut<'_, A, B> {
    /// The group the rows belong to.
    #[inline]
    #[must_use]
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Number of aligned rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Checks if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Both dense arrays, mutably.
    #[inline]
    pub fn components_mut(&mut self) -> (&mut [A], &mut [B]) {
        (&mut *self.first, &mut *self.second)
    }

    /// Iterates over `(a, b, egid)` in row order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&mut A, &mut B, Egid)> + '_ {
        let group = self.group;
        self.first
            .iter_mut()
            .zip(self.second.iter_mut())
            .zip(self.entities.iter())
            .map(move |((a, b), &entity)| (a, b, Egid::new(entity, group)))
    }
}

// ============================================================================
// MULTIPLE GROUPS
// ============================================================================

/// One component type across several groups. Empty groups are skipped.
#[derive(Debug)]
pub struct MultiGroupCollection<'a, C> {
    collections: Vec<EntityCollection<'a, C>>,
}

impl<'a, C> MultiGroupCollection<'a, C> {
    /// Total rows over every group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.iter().map(EntityCollection::len).sum()
    }

    /// Checks if no group contributed rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Per-group collections, in the order the groups were requested.
    #[must_use]
    pub fn collections(&self) -> &[EntityCollection<'a, C>] {
        &self.collections
    }

    /// Groups that contributed rows.
    pub fn groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.collections.iter().map(EntityCollection::group)
    }

    /// Iterates over every row of every group.
    pub fn iter(&self) -> impl Iterator<Item = (&'a C, Egid)> + '_ {
        self.collections.iter().flat_map(EntityCollection::iter)
    }
}

// ============================================================================
// STORE QUERIES
// ============================================================================

impl GroupStore {
    /// Every `C` row in `group`.
    ///
    /// A group or table that was never created yields an empty collection.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn query<C: Component>(&self, group: GroupId) -> DbResult<EntityCollection<'_, C>> {
        Ok(match self.typed_table::<C>(group)? {
            Some(table) => EntityCollection::from_table(group, table),
            None => EntityCollection::empty(group),
        })
    }

    /// Every `C` row in `group`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn query_mut<C: Component>(
        &mut self,
        group: GroupId,
    ) -> DbResult<EntityCollectionMut<'_, C>> {
        Ok(match self.typed_table_mut::<C>(group)? {
            Some(table) => {
                let (components, entities) = table.split_mut();
                EntityCollectionMut {
                    group,
                    components,
                    entities,
                }
            }
            None => EntityCollectionMut {
                group,
                components: &mut [],
                entities: &[],
            },
        })
    }

    /// Rows of `A` and `B` in `group`, aligned by row.
    ///
    /// Empty if either table is missing.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if an id is stored as another type.
    pub fn query_pair<A: Component, B: Component>(
        &self,
        group: GroupId,
    ) -> DbResult<EntityPair<'_, A, B>> {
        let first = self.typed_table::<A>(group)?;
        let second = self.typed_table::<B>(group)?;
        Ok(match (first, second) {
            (Some(a), Some(b)) => {
                debug_assert_eq!(a.len(), b.len(), "paired tables out of step");
                let rows = a.len().min(b.len());
                EntityPair {
                    group,
                    first: &a.components()[..rows],
                    second: &b.components()[..rows],
                    entities: &a.entity_ids()[..rows],
                }
            }
            _ => EntityPair {
                group,
                first: &[],
                second: &[],
                entities: &[],
            },
        })
    }

    /// Rows of `A` and `B` in `group`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if `A` and `B` share an id or an id
    /// is stored as another type.
    pub fn query_pair_mut<A: Component, B: Component>(
        &mut self,
        group: GroupId,
    ) -> DbResult<EntityPairMut<'_, A, B>> {
        if A::ID == B::ID {
            return Err(DbError::ComponentTypeMismatch {
                expected: A::NAME,
                found: B::NAME,
            });
        }
        let empty = || EntityPairMut {
            group,
            first: &mut [],
            second: &mut [],
            entities: &[],
        };
        let Some(tables) = self.group_mut(group) else {
            return Ok(empty());
        };
        let (Some(first), Some(second)) = tables.pair_mut(A::ID, B::ID) else {
            return Ok(empty());
        };

        let first_name = first.component_name();
        let second_name = second.component_name();
        let first = first
            .downcast_mut::<A>()
            .ok_or(DbError::ComponentTypeMismatch {
                expected: first_name,
                found: A::NAME,
            })?;
        let second = second
            .downcast_mut::<B>()
            .ok_or(DbError::ComponentTypeMismatch {
                expected: second_name,
                found: B::NAME,
            })?;

        debug_assert_eq!(first.len(), second.len(), "paired tables out of step");
        let rows = first.len().min(second.len());
        let (first, entities) = first.split_mut();
        Ok(EntityPairMut {
            group,
            first: &mut first[..rows],
            second: &mut second.components_mut()[..rows],
            entities: &entities[..rows],
        })
    }

    /// Every `C` row across `groups`, skipping groups with no rows.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn query_groups<C: Component>(
        &self,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> DbResult<MultiGroupCollection<'_, C>> {
        let mut collections = Vec::new();
        for group in groups {
            let collection = self.query::<C>(group)?;
            if !collection.is_empty() {
                collections.push(collection);
            }
        }
        Ok(MultiGroupCollection { collections })
    }

    /// Every `C` row in every group that has a `C` table.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn query_all<C: Component>(&self) -> DbResult<MultiGroupCollection<'_, C>> {
        self.query_groups::<C>(self.groups_with(C::ID))
    }

    /// The single `C` row of `group`.
    ///
    /// # Errors
    ///
    /// - [`DbError::EntityNotFound`] if the group has no `C` row
    /// - [`DbError::MultipleUniqueEntities`] if it has more than one
    pub fn query_unique<C: Component>(&self, group: GroupId) -> DbResult<(&C, Egid)> {
        let collection = self.query::<C>(group)?;
        match collection.len() {
            1 => collection.get(0).ok_or(DbError::EntityNotFound(EntityLookup::Unique {
                group,
                component: C::NAME,
            })),
            0 => Err(DbError::EntityNotFound(EntityLookup::Unique {
                group,
                component: C::NAME,
            })),
            count => Err(DbError::MultipleUniqueEntities {
                group,
                component: C::NAME,
                count,
            }),
        }
    }

    /// The `C` component of `egid`.
    ///
    /// # Errors
    ///
    /// [`DbError::EntityNotFound`] if the row does not exist.
    pub fn query_entity<C: Component>(&self, egid: Egid) -> DbResult<&C> {
        self.typed_table::<C>(egid.group())?
            .and_then(|table| table.get(egid.entity()))
            .ok_or(DbError::not_found(egid))
    }

    /// The `C` component of `egid`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::EntityNotFound`] if the row does not exist.
    pub fn query_entity_mut<C: Component>(&mut self, egid: Egid) -> DbResult<&mut C> {
        self.typed_table_mut::<C>(egid.group())?
            .and_then(|table| table.get_mut(egid.entity()))
            .ok_or(DbError::not_found(egid))
    }

    /// Checks whether `egid` has a `C` row.
    #[must_use]
    pub fn exists<C: Component>(&self, egid: Egid) -> bool {
        matches!(self.typed_table::<C>(egid.group()), Ok(Some(table)) if table.contains(egid.entity()))
    }

    /// Checks whether `group` has at least one `C` row.
    #[must_use]
    pub fn has_any<C: Component>(&self, group: GroupId) -> bool {
        self.count::<C>(group) > 0
    }

    /// Number of `C` rows in `group`.
    #[must_use]
    pub fn count<C: Component>(&self, group: GroupId) -> usize {
        match self.typed_table::<C>(group) {
            Ok(Some(table)) => table.len(),
            _ => 0,
        }
    }
}
