//! # Component Tables
//!
//! Dense, structure-of-arrays storage for one component type within one
//! group.
//!
//! The table uses a swap-remove strategy:
//! - Components and their entity ids live in two parallel dense arrays
//! - An `entity -> row` map gives O(1) lookup
//! - Removal moves the last row into the hole, so row order is NOT
//!   insertion order
//!
//! Invariant: `rows.len() == len()`, every stored row is `< len()`, and
//! `entities[rows[e]] == e`.

use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;

use bytemuck::Pod;

use super::component::{Component, ComponentId};
use super::egid::EntityId;
use crate::error::TableError;

/// Dense storage for component `C`, keyed by entity id.
///
/// # Example
///
/// ```rust,ignore
/// let mut table: ComponentTable<Position> = ComponentTable::new();
/// table.push(EntityId(1), Position { x: 0.0 })?;
/// let pos = table.get(EntityId(1));
/// ```
#[derive(Debug)]
pub struct ComponentTable<C: Component> {
    /// The dense array of components.
    components: Vec<C>,
    /// `entities[row]` owns `components[row]`.
    entities: Vec<EntityId>,
    /// Reverse map: entity id to row index.
    rows: HashMap<EntityId, u32>,
}

impl<C: Component> Default for ComponentTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> ComponentTable<C> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty table with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            components: Vec::with_capacity(capacity),
            entities: Vec::with_capacity(capacity),
            rows: HashMap::with_capacity(capacity),
        }
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks if the table has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Checks whether `entity` has a row.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Returns the row index of `entity`.
    #[inline]
    #[must_use]
    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.rows.get(&entity).map(|&row| row as usize)
    }

    /// Gets the component of `entity`.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<&C> {
        let row = self.row_of(entity)?;
        self.components.get(row)
    }

    /// Gets the component of `entity` mutably.
    #[inline]
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut C> {
        let row = self.row_of(entity)?;
        self.components.get_mut(row)
    }

    /// Appends a row for `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Occupied`] if `entity` already has a row.
    pub fn push(&mut self, entity: EntityId, component: C) -> Result<usize, TableError> {
        if self.rows.contains_key(&entity) {
            return Err(TableError::Occupied(entity));
        }
        let row = self.components.len();
        self.rows.insert(entity, Self::row_index(row));
        self.components.push(component);
        self.entities.push(entity);
        Ok(row)
    }

    /// Overwrites the component of `entity`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Missing`] if `entity` has no row.
    pub fn replace(&mut self, entity: EntityId, component: C) -> Result<C, TableError> {
        let slot = self.get_mut(entity).ok_or(TableError::Missing(entity))?;
        Ok(std::mem::replace(slot, component))
    }

    /// Removes the row of `entity` with swap-remove and returns its value.
    ///
    /// The last row takes the vacated slot; its mapping is updated.
    pub fn swap_remove(&mut self, entity: EntityId) -> Option<C> {
        let row = self.rows.remove(&entity)? as usize;
        let removed = self.components.swap_remove(row);
        self.entities.swap_remove(row);

        // The former last row now lives at `row`.
        if let Some(&moved) = self.entities.get(row) {
            self.rows.insert(moved, Self::row_index(row));
        }
        Some(removed)
    }

    /// Dense component array. Row `i` belongs to `entity_ids()[i]`.
    #[inline]
    #[must_use]
    pub fn components(&self) -> &[C] {
        &self.components
    }

    /// Mutable dense component array.
    #[inline]
    pub fn components_mut(&mut self) -> &mut [C] {
        &mut self.components
    }

    /// Dense entity id array, parallel to [`ComponentTable::components`].
    #[inline]
    #[must_use]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.entities
    }

    /// Splits into mutable components and shared entity ids.
    #[inline]
    pub fn split_mut(&mut self) -> (&mut [C], &[EntityId]) {
        (&mut self.components, &self.entities)
    }

    /// Iterates over `(entity, component)` pairs in row order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &C)> {
        self.entities.iter().copied().zip(self.components.iter())
    }

    /// Iterates mutably over `(entity, component)` pairs in row order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut C)> {
        self.entities.iter().copied().zip(self.components.iter_mut())
    }

    /// Verifies the row-mapping invariant.
    ///
    /// O(n); intended for tests and debug assertions.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        self.rows.len() == self.components.len()
            && self.entities.len() == self.components.len()
            && self.rows.iter().all(|(entity, &row)| {
                (row as usize) < self.components.len() && self.entities[row as usize] == *entity
            })
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn row_index(row: usize) -> u32 {
        debug_assert!(u32::try_from(row).is_ok(), "table exceeded u32 rows");
        row as u32
    }
}

impl<C: Component + Pod> ComponentTable<C> {
    /// Raw bytes of the dense component array.
    ///
    /// Serialization codecs read and write rows through this buffer.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.components)
    }

    /// Raw bytes of one entity's row.
    #[must_use]
    pub fn row_bytes(&self, entity: EntityId) -> Option<&[u8]> {
        self.get(entity).map(bytemuck::bytes_of)
    }
}

/// Type-erased view over a [`ComponentTable`].
///
/// Structural operations (move, remove, merge) go through this trait so the
/// group store can operate on every table of an entity without knowing the
/// component types.
pub trait ErasedTable: Any + Send + Sync {
    /// The component type stored.
    fn component_id(&self) -> ComponentId;

    /// The component name stored.
    fn component_name(&self) -> &'static str;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Checks if the table has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks whether `entity` has a row.
    fn contains(&self, entity: EntityId) -> bool;

    /// Returns the row index of `entity`.
    fn row_of(&self, entity: EntityId) -> Option<usize>;

    /// Dense entity id array.
    fn entity_ids(&self) -> &[EntityId];

    /// Appends a default-initialized row for `entity`.
    ///
    /// # Errors
    ///
    /// [`TableError::Occupied`] if `entity` already has a row.
    fn push_default(&mut self, entity: EntityId) -> Result<usize, TableError>;

    /// Swap-removes the row of `entity`.
    ///
    /// # Errors
    ///
    /// [`TableError::Missing`] if `entity` has no row.
    fn remove_entity(&mut self, entity: EntityId) -> Result<(), TableError>;

    /// Moves the row of `entity` into `dest` under the id `dest_entity`.
    ///
    /// Returns the row index in `dest`.
    ///
    /// # Errors
    ///
    /// Fails without modifying either table if the source row is missing,
    /// the destination id is taken, or `dest` stores another type.
    fn move_entity_to(
        &mut self,
        entity: EntityId,
        dest: &mut dyn ErasedTable,
        dest_entity: EntityId,
    ) -> Result<usize, TableError>;

    /// Re-keys the row of `entity` to `new_entity` within this table.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is missing or `new_entity` is taken.
    fn rekey(&mut self, entity: EntityId, new_entity: EntityId) -> Result<(), TableError>;

    /// Drains every row of `source` onto the end of this table.
    ///
    /// Returns the range of newly appended rows.
    ///
    /// # Errors
    ///
    /// Fails without modifying either table if any source entity already
    /// has a row here, or `source` stores another type.
    fn append_from(&mut self, source: &mut dyn ErasedTable) -> Result<Range<usize>, TableError>;

    /// An empty table of the same component type.
    fn new_empty(&self, capacity: usize) -> Box<dyn ErasedTable>;

    /// Reserves room for `additional` rows.
    fn reserve(&mut self, additional: usize);

    /// Upcast for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn ErasedTable + 'a {
    /// Downcasts to the typed table.
    #[inline]
    #[must_use]
    pub fn downcast_ref<C: Component>(&self) -> Option<&ComponentTable<C>> {
        self.as_any().downcast_ref::<ComponentTable<C>>()
    }

    /// Downcasts to the typed table mutably.
    #[inline]
    pub fn downcast_mut<C: Component>(&mut self) -> Option<&mut ComponentTable<C>> {
        self.as_any_mut().downcast_mut::<ComponentTable<C>>()
    }
}

impl<C: Component> ErasedTable for ComponentTable<C> {
    fn component_id(&self) -> ComponentId {
        C::ID
    }

    fn component_name(&self) -> &'static str {
        C::NAME
    }

    fn len(&self) -> usize {
        self.components.len()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    fn row_of(&self, entity: EntityId) -> Option<usize> {
        ComponentTable::row_of(self, entity)
    }

    fn entity_ids(&self) -> &[EntityId] {
        &self.entities
    }

    fn push_default(&mut self, entity: EntityId) -> Result<usize, TableError> {
        self.push(entity, C::default())
    }

    fn remove_entity(&mut self, entity: EntityId) -> Result<(), TableError> {
        self.swap_remove(entity)
            .map(drop)
            .ok_or(TableError::Missing(entity))
    }

    fn move_entity_to(
        &mut self,
        entity: EntityId,
        dest: &mut dyn ErasedTable,
        dest_entity: EntityId,
    ) -> Result<usize, TableError> {
        let dest_name = dest.component_name();
        let dest = dest
            .downcast_mut::<C>()
            .ok_or(TableError::TypeMismatch {
                expected: dest_name,
                found: C::NAME,
            })?;
        if !self.contains(entity) {
            return Err(TableError::Missing(entity));
        }
        if dest.contains(dest_entity) {
            return Err(TableError::Occupied(dest_entity));
        }

        let component = self.swap_remove(entity).ok_or(TableError::Missing(entity))?;
        dest.push(dest_entity, component)
    }

    fn rekey(&mut self, entity: EntityId, new_entity: EntityId) -> Result<(), TableError> {
        if entity == new_entity {
            return Ok(());
        }
        if self.rows.contains_key(&new_entity) {
            return Err(TableError::Occupied(new_entity));
        }
        let row = self.rows.remove(&entity).ok_or(TableError::Missing(entity))?;
        self.entities[row as usize] = new_entity;
        self.rows.insert(new_entity, row);
        Ok(())
    }

    fn append_from(&mut self, source: &mut dyn ErasedTable) -> Result<Range<usize>, TableError> {
        let source_name = source.component_name();
        let source = source
            .downcast_mut::<C>()
            .ok_or(TableError::TypeMismatch {
                expected: C::NAME,
                found: source_name,
            })?;
        if let Some(&taken) = source.entities.iter().find(|&&e| self.contains(e)) {
            return Err(TableError::Occupied(taken));
        }

        let start = self.components.len();
        self.reserve(source.len());
        for (row, &entity) in source.entities.iter().enumerate() {
            self.rows.insert(entity, Self::row_index(start + row));
        }
        self.entities.append(&mut source.entities);
        self.components.append(&mut source.components);
        source.rows.clear();

        Ok(start..self.components.len())
    }

    fn new_empty(&self, capacity: usize) -> Box<dyn ErasedTable> {
        Box::new(Self::with_capacity(capacity))
    }

    fn reserve(&mut self, additional: usize) {
        self.components.reserve(additional);
        self.entities.reserve(additional);
        self.rows.reserve(additional);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
