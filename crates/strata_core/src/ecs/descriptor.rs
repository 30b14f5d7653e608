//! # Entity Descriptors
//!
//! A descriptor is the component set an entity is built with. Every
//! structural operation carries one so the group store knows which tables
//! to touch without inspecting types at runtime.
//!
//! Entries are sorted and deduplicated by [`ComponentId`], so two
//! descriptors listing the same components in a different order are equal.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use super::component::{Component, ComponentId};
use super::table::{ComponentTable, ErasedTable};

/// One component of a descriptor.
#[derive(Clone, Copy)]
pub struct ComponentEntry {
    /// The component id.
    pub id: ComponentId,
    /// The component name.
    pub name: &'static str,
    /// The Rust type behind the id.
    pub type_id: TypeId,
    new_table: fn(usize) -> Box<dyn ErasedTable>,
}

impl ComponentEntry {
    /// Entry for component `C`.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            id: C::ID,
            name: C::NAME,
            type_id: TypeId::of::<C>(),
            new_table: new_erased_table::<C>,
        }
    }

    /// Creates an empty table for this component.
    #[inline]
    #[must_use]
    pub fn new_table(&self, capacity: usize) -> Box<dyn ErasedTable> {
        (self.new_table)(capacity)
    }
}

fn new_erased_table<C: Component>(capacity: usize) -> Box<dyn ErasedTable> {
    Box::new(ComponentTable::<C>::with_capacity(capacity))
}

impl fmt::Debug for ComponentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable, cheaply cloneable component set.
#[derive(Clone)]
pub struct EntityDescriptor {
    name: &'static str,
    entries: Arc<[ComponentEntry]>,
}

impl EntityDescriptor {
    /// Starts building a descriptor.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in diagnostics only
    #[must_use]
    pub fn builder(name: &'static str) -> DescriptorBuilder {
        DescriptorBuilder {
            name,
            entries: Vec::new(),
        }
    }

    /// Diagnostic label.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Component entries in id order.
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ComponentEntry] {
        &self.entries
    }

    /// Component ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    /// Checks whether the descriptor lists `id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.entries.binary_search_by_key(&id, |entry| entry.id).is_ok()
    }

    /// Number of component types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the descriptor lists no components.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Composes a new descriptor from this one plus every entry of `other`.
    #[must_use]
    pub fn extend(&self, name: &'static str, other: &EntityDescriptor) -> EntityDescriptor {
        let mut builder = Self::builder(name);
        builder.entries.extend_from_slice(&self.entries);
        builder.entries.extend_from_slice(&other.entries);
        builder.build()
    }
}

impl PartialEq for EntityDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.ids().eq(other.ids())
    }
}

impl Eq for EntityDescriptor {}

impl fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("name", &self.name)
            .field(
                "components",
                &self.entries.iter().map(|entry| entry.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    name: &'static str,
    entries: Vec<ComponentEntry>,
}

impl DescriptorBuilder {
    /// Adds component `C`.
    #[must_use]
    pub fn with<C: Component>(mut self) -> Self {
        self.entries.push(ComponentEntry::of::<C>());
        self
    }

    /// Finishes the descriptor.
    #[must_use]
    pub fn build(mut self) -> EntityDescriptor {
        self.entries.sort_by_key(|entry| entry.id);
        self.entries.dedup_by_key(|entry| entry.id);
        EntityDescriptor {
            name: self.name,
            entries: self.entries.into(),
        }
    }
}
