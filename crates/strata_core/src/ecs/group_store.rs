//! # Group Store
//!
//! The queryable database: component tables partitioned by group.
//!
//! ```text
//! GroupStore
//!   group 0 ─┬─ Position table  [P P P]
//!            └─ Velocity table  [V V V]
//!   group 1 ─── Position table  [P]
//! ```
//!
//! Groups come into existence on first table access and are pruned at the
//! end of a submission once every table in them is empty. Structural
//! operations validate every table they will touch before mutating any of
//! them, so a failing operation leaves the store as it found it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Range;

use super::component::{Component, ComponentId};
use super::descriptor::{ComponentEntry, EntityDescriptor};
use super::egid::{Egid, EntityId, GroupId};
use super::table::{ComponentTable, ErasedTable};
use crate::error::{DbError, DbResult, TableError};

// ============================================================================
// GROUP TABLES
// ============================================================================

/// Every component table of one group, keyed by component id.
#[derive(Default)]
pub struct GroupTables {
    tables: BTreeMap<ComponentId, Box<dyn ErasedTable>>,
}

impl GroupTables {
    /// Creates an empty set of tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table of `id`.
    #[inline]
    #[must_use]
    pub fn table(&self, id: ComponentId) -> Option<&dyn ErasedTable> {
        self.tables.get(&id).map(|table| &**table)
    }

    /// Returns the table of `id` mutably.
    #[inline]
    pub fn table_mut(&mut self, id: ComponentId) -> Option<&mut (dyn ErasedTable + 'static)> {
        self.tables.get_mut(&id).map(|table| table.as_mut())
    }

    /// Returns the table for `entry`, creating an empty one if missing.
    ///
    /// The flag is `true` when the table was just created.
    pub fn table_or_create(
        &mut self,
        entry: &ComponentEntry,
        capacity: usize,
    ) -> (&mut (dyn ErasedTable + 'static), bool) {
        let mut created = false;
        let table = self.tables.entry(entry.id).or_insert_with(|| {
            created = true;
            entry.new_table(capacity)
        });
        (table.as_mut(), created)
    }

    /// Typed view of the table of `C`.
    ///
    /// `Ok(None)` if the group has no such table.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn typed<C: Component>(&self) -> DbResult<Option<&ComponentTable<C>>> {
        let Some(table) = self.tables.get(&C::ID) else {
            return Ok(None);
        };
        let expected = table.component_name();
        table
            .downcast_ref::<C>()
            .map(Some)
            .ok_or(DbError::ComponentTypeMismatch {
                expected,
                found: C::NAME,
            })
    }

    /// Typed mutable view of the table of `C`.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn typed_mut<C: Component>(&mut self) -> DbResult<Option<&mut ComponentTable<C>>> {
        let Some(table) = self.tables.get_mut(&C::ID) else {
            return Ok(None);
        };
        let expected = table.component_name();
        table
            .downcast_mut::<C>()
            .map(Some)
            .ok_or(DbError::ComponentTypeMismatch {
                expected,
                found: C::NAME,
            })
    }

    /// Two distinct tables borrowed mutably at the same time.
    pub(crate) fn pair_mut(
        &mut self,
        first: ComponentId,
        second: ComponentId,
    ) -> (
        Option<&mut (dyn ErasedTable + 'static)>,
        Option<&mut (dyn ErasedTable + 'static)>,
    ) {
        let mut a = None;
        let mut b = None;
        for (id, table) in &mut self.tables {
            if *id == first {
                a = Some(table.as_mut());
            } else if *id == second {
                b = Some(table.as_mut());
            }
        }
        (a, b)
    }

    /// Stages a default-initialized row for `entity` in every table of
    /// `descriptor`.
    ///
    /// # Errors
    ///
    /// [`TableError::Occupied`] without modifying anything if `entity`
    /// already has a row in any of those tables.
    pub fn push_defaults(
        &mut self,
        entity: EntityId,
        descriptor: &EntityDescriptor,
        capacity: usize,
    ) -> Result<(), TableError> {
        if self.contains_any(entity, descriptor) {
            return Err(TableError::Occupied(entity));
        }
        for entry in descriptor.entries() {
            let (table, _) = self.table_or_create(entry, capacity);
            table.push_default(entity)?;
        }
        Ok(())
    }

    /// Checks whether `entity` has a row in any table.
    #[must_use]
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.tables.values().any(|table| table.contains(entity))
    }

    /// Checks whether `entity` has a row in any table of `descriptor`.
    #[must_use]
    pub fn contains_any(&self, entity: EntityId, descriptor: &EntityDescriptor) -> bool {
        descriptor
            .ids()
            .filter_map(|id| self.tables.get(&id))
            .any(|table| table.contains(entity))
    }

    /// Checks whether `entity` has a row in every table of `descriptor`.
    #[must_use]
    pub fn contains_all(&self, entity: EntityId, descriptor: &EntityDescriptor) -> bool {
        descriptor.ids().all(|id| {
            self.tables
                .get(&id)
                .is_some_and(|table| table.contains(entity))
        })
    }

    /// Component ids with a table in this group.
    pub fn component_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.tables.keys().copied()
    }

    /// Iterates over tables in component id order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ErasedTable> {
        self.tables.values().map(|table| &**table)
    }

    /// Iterates mutably over tables in component id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ComponentId, &mut Box<dyn ErasedTable>)> {
        self.tables.iter_mut().map(|(id, table)| (*id, table))
    }

    /// Number of distinct entities with at least one row.
    ///
    /// Entities built from one descriptor share rows across tables, so this
    /// is the row count of the largest table.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.tables.values().map(|table| table.len()).max().unwrap_or(0)
    }

    /// Checks if every table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|table| table.is_empty())
    }

    /// Number of tables.
    #[inline]
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl std::fmt::Debug for GroupTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.tables
                    .values()
                    .map(|table| (table.component_name(), table.len())),
            )
            .finish()
    }
}

// ============================================================================
// GROUP STORE
// ============================================================================

/// Component tables partitioned by group id.
///
/// Mutation is exclusive to the submission engine; everything else reads.
#[derive(Debug, Default)]
pub struct GroupStore {
    groups: HashMap<GroupId, GroupTables>,
    /// Which groups hold a table of each component type.
    groups_by_component: HashMap<ComponentId, BTreeSet<GroupId>>,
    /// Row reservation for newly created tables.
    initial_capacity: usize,
}

impl GroupStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that reserves `capacity` rows per new table.
    #[must_use]
    pub fn with_initial_capacity(capacity: usize) -> Self {
        Self {
            initial_capacity: capacity,
            ..Self::default()
        }
    }

    /// Creates `group` if it does not exist. Returns `true` if created.
    pub fn create_group(&mut self, group: GroupId) -> bool {
        if self.groups.contains_key(&group) {
            return false;
        }
        self.groups.insert(group, GroupTables::new());
        tracing::trace!(%group, "group created");
        true
    }

    /// Checks whether `group` exists.
    #[inline]
    #[must_use]
    pub fn has_group(&self, group: GroupId) -> bool {
        self.groups.contains_key(&group)
    }

    /// Returns the tables of `group`.
    #[inline]
    #[must_use]
    pub fn group(&self, group: GroupId) -> Option<&GroupTables> {
        self.groups.get(&group)
    }

    /// Existing group ids in ascending order.
    #[must_use]
    pub fn group_ids(&self) -> Vec<GroupId> {
        let mut ids: Vec<_> = self.groups.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of existing groups.
    #[inline]
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Returns the table of `id` in `group`, if one was ever created.
    #[must_use]
    pub fn table(&self, group: GroupId, id: ComponentId) -> Option<&dyn ErasedTable> {
        self.groups.get(&group)?.table(id)
    }

    /// Returns the table for `entry` in `group`, creating both on first use.
    pub fn table_or_create(
        &mut self,
        group: GroupId,
        entry: &ComponentEntry,
    ) -> &mut (dyn ErasedTable + 'static) {
        let capacity = self.initial_capacity;
        let tables = self.groups.entry(group).or_default();
        let (table, created) = tables.table_or_create(entry, capacity);
        if created {
            self.groups_by_component
                .entry(entry.id)
                .or_default()
                .insert(group);
        }
        table
    }

    /// Typed view of the `C` table in `group`.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn typed_table<C: Component>(&self, group: GroupId) -> DbResult<Option<&ComponentTable<C>>> {
        match self.groups.get(&group) {
            Some(tables) => tables.typed::<C>(),
            None => Ok(None),
        }
    }

    /// Typed mutable view of the `C` table in `group`.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn typed_table_mut<C: Component>(
        &mut self,
        group: GroupId,
    ) -> DbResult<Option<&mut ComponentTable<C>>> {
        match self.groups.get_mut(&group) {
            Some(tables) => tables.typed_mut::<C>(),
            None => Ok(None),
        }
    }

    /// Mutable access to all tables of `group`.
    pub(crate) fn group_mut(&mut self, group: GroupId) -> Option<&mut GroupTables> {
        self.groups.get_mut(&group)
    }

    /// Checks whether `egid` has a row in any table.
    #[must_use]
    pub fn contains(&self, egid: Egid) -> bool {
        self.groups
            .get(&egid.group())
            .is_some_and(|tables| tables.contains_entity(egid.entity()))
    }

    /// Checks whether `egid` has a row in every table of `descriptor`.
    #[must_use]
    pub fn contains_rows(&self, egid: Egid, descriptor: &EntityDescriptor) -> bool {
        self.groups
            .get(&egid.group())
            .is_some_and(|tables| tables.contains_all(egid.entity(), descriptor))
    }

    /// Number of entities in `group`.
    #[must_use]
    pub fn entity_count(&self, group: GroupId) -> usize {
        self.groups.get(&group).map_or(0, GroupTables::entity_count)
    }

    /// Groups holding a table of `id`, in ascending order.
    pub fn groups_with(&self, id: ComponentId) -> impl Iterator<Item = GroupId> + '_ {
        self.groups_by_component
            .get(&id)
            .into_iter()
            .flat_map(|groups| groups.iter().copied())
    }

    // ------------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------------

    /// Checks that no staged entity already has a row in `group`.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateEntity`] naming the first occupied EGID.
    pub fn check_append(&self, group: GroupId, staged: &GroupTables) -> DbResult<()> {
        let Some(existing) = self.groups.get(&group) else {
            return Ok(());
        };
        for table in staged.iter() {
            if let Some(dest) = existing.table(table.component_id()) {
                if let Some(&taken) = table.entity_ids().iter().find(|&&e| dest.contains(e)) {
                    return Err(DbError::DuplicateEntity {
                        egid: Egid::new(taken, group),
                    });
                }
            }
        }
        Ok(())
    }

    /// Merges a group of staged rows into `group`.
    ///
    /// Returns the appended row range per component type.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateEntity`] without modifying the store if any staged
    /// entity already has a row in the destination.
    pub fn append_rows(
        &mut self,
        group: GroupId,
        staged: &mut GroupTables,
    ) -> DbResult<Vec<(ComponentId, Range<usize>)>> {
        self.check_append(group, staged)?;

        let capacity = self.initial_capacity;
        let tables = self.groups.entry(group).or_default();
        let mut appended = Vec::with_capacity(staged.table_count());
        for (id, source) in staged.iter_mut() {
            if source.is_empty() {
                continue;
            }
            let dest = tables
                .tables
                .entry(id)
                .or_insert_with(|| source.new_empty(capacity));
            let range = dest
                .append_from(source.as_mut())
                .map_err(|err| err.in_group(group))?;
            self.groups_by_component.entry(id).or_default().insert(group);
            appended.push((id, range));
        }
        Ok(appended)
    }

    /// Removes the rows of `egid` from every table of `descriptor`.
    ///
    /// # Errors
    ///
    /// [`DbError::EntityNotFound`] without modifying anything if a table is
    /// missing or lacks the row.
    pub fn remove_row(&mut self, egid: Egid, descriptor: &EntityDescriptor) -> DbResult<()> {
        let tables = self
            .groups
            .get_mut(&egid.group())
            .ok_or(DbError::not_found(egid))?;
        Self::check_rows(tables, egid, descriptor)?;

        for id in descriptor.ids() {
            if let Some(table) = tables.table_mut(id) {
                table
                    .remove_entity(egid.entity())
                    .map_err(|err| err.in_group(egid.group()))?;
            }
        }
        Ok(())
    }

    /// Moves the rows of `from` in every table of `descriptor` to `to`.
    ///
    /// Source tables compact with swap-remove; destination tables are
    /// created on first use.
    ///
    /// # Errors
    ///
    /// Without modifying anything:
    /// - [`DbError::EntityNotFound`] if the source rows are missing
    /// - [`DbError::DuplicateEntity`] if `to` is already occupied
    pub fn move_row(&mut self, from: Egid, to: Egid, descriptor: &EntityDescriptor) -> DbResult<()> {
        if from == to {
            return match self.groups.get(&from.group()) {
                Some(tables) => Self::check_rows(tables, from, descriptor),
                None => Err(DbError::not_found(from)),
            };
        }

        let source_tables = self
            .groups
            .get(&from.group())
            .ok_or(DbError::not_found(from))?;
        Self::check_rows(source_tables, from, descriptor)?;
        let occupied = if from.group() == to.group() {
            source_tables.contains_any(to.entity(), descriptor)
        } else {
            self.groups
                .get(&to.group())
                .is_some_and(|tables| tables.contains_any(to.entity(), descriptor))
        };
        if occupied {
            return Err(DbError::DuplicateEntity { egid: to });
        }

        if from.group() == to.group() {
            let tables = self
                .groups
                .get_mut(&from.group())
                .ok_or(DbError::not_found(from))?;
            for id in descriptor.ids() {
                if let Some(table) = tables.table_mut(id) {
                    table
                        .rekey(from.entity(), to.entity())
                        .map_err(|err| err.in_group(from.group()))?;
                }
            }
            return Ok(());
        }

        // Detach the source so both groups can be borrowed mutably.
        let mut source = self
            .groups
            .remove(&from.group())
            .ok_or(DbError::not_found(from))?;
        let result = self.transfer(&mut source, from, to, descriptor);
        self.groups.insert(from.group(), source);
        result
    }

    fn transfer(
        &mut self,
        source: &mut GroupTables,
        from: Egid,
        to: Egid,
        descriptor: &EntityDescriptor,
    ) -> DbResult<()> {
        for entry in descriptor.entries() {
            let Some(source_table) = source.table_mut(entry.id) else {
                continue;
            };
            let dest = self.table_or_create(to.group(), entry);
            source_table
                .move_entity_to(from.entity(), dest, to.entity())
                .map_err(|err| err.in_group(from.group()))?;
        }
        Ok(())
    }

    /// Removes `group` with all of its tables.
    pub fn remove_group(&mut self, group: GroupId) -> Option<GroupTables> {
        let tables = self.groups.remove(&group)?;
        for id in tables.component_ids() {
            self.unindex(id, group);
        }
        Some(tables)
    }

    /// Exchanges the full storage of two groups.
    ///
    /// Only the two map slots change hands; no row is copied. Entities of
    /// `a` become addressable under `b` and vice versa.
    pub fn swap_group_contents(&mut self, a: GroupId, b: GroupId) {
        if a == b {
            return;
        }
        let tables_a = self.remove_group(a);
        let tables_b = self.remove_group(b);
        if let Some(tables) = tables_a {
            self.insert_group(b, tables);
        }
        if let Some(tables) = tables_b {
            self.insert_group(a, tables);
        }
    }

    /// Removes every group whose tables are all empty.
    ///
    /// Returns how many groups were removed.
    pub fn prune_empty_groups(&mut self) -> usize {
        let empty: Vec<GroupId> = self
            .groups
            .iter()
            .filter(|(_, tables)| tables.is_empty())
            .map(|(&group, _)| group)
            .collect();
        for &group in &empty {
            self.remove_group(group);
        }
        empty.len()
    }

    fn insert_group(&mut self, group: GroupId, tables: GroupTables) {
        for id in tables.component_ids() {
            self.groups_by_component.entry(id).or_default().insert(group);
        }
        self.groups.insert(group, tables);
    }

    fn unindex(&mut self, id: ComponentId, group: GroupId) {
        if let Some(groups) = self.groups_by_component.get_mut(&id) {
            groups.remove(&group);
            if groups.is_empty() {
                self.groups_by_component.remove(&id);
            }
        }
    }

    fn check_rows(tables: &GroupTables, egid: Egid, descriptor: &EntityDescriptor) -> DbResult<()> {
        if tables.contains_all(egid.entity(), descriptor) {
            Ok(())
        } else {
            Err(DbError::not_found(egid))
        }
    }
}
