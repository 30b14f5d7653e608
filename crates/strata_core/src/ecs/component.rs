//! # Component System
//!
//! Components are plain data attached to entities. Each component type
//! carries a compile-time [`ComponentId`] used as the table key, so no
//! runtime type lookup happens on the hot path.

use std::any::TypeId;
use std::fmt;

use crate::error::{DbError, DbResult};

/// Closed, compile-time identifier of a component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentId(pub u16);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Marker trait for entity components.
///
/// Components must be:
/// - `Default`: building an entity default-initializes every declared
///   component before the initializer overrides the ones it cares about
/// - `Send + Sync + 'static`: producers stage them from any thread
///
/// # Example
///
/// ```rust
/// use strata_core::{Component, ComponentId};
///
/// #[derive(Clone, Copy, Debug, Default)]
/// struct Health {
///     current: f32,
/// }
///
/// impl Component for Health {
///     const ID: ComponentId = ComponentId(3);
///     const NAME: &'static str = "Health";
/// }
/// ```
pub trait Component: Default + Send + Sync + 'static {
    /// Unique identifier for this component type.
    const ID: ComponentId;

    /// Human-readable name used in diagnostics.
    const NAME: &'static str;
}

/// Metadata of one registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentMeta {
    /// The component id.
    pub id: ComponentId,
    /// The component name.
    pub name: &'static str,
    /// The Rust type behind the id.
    pub type_id: TypeId,
}

impl ComponentMeta {
    /// Metadata for `C`.
    #[must_use]
    pub fn of<C: Component>() -> Self {
        Self {
            id: C::ID,
            name: C::NAME,
            type_id: TypeId::of::<C>(),
        }
    }
}

/// The closed set of component types an application declares at startup.
///
/// Slots are indexed directly by [`ComponentId`], so membership checks are
/// a bounds check plus a compare.
#[derive(Clone, Debug, Default)]
pub struct ComponentRegistry {
    slots: Vec<Option<ComponentMeta>>,
    count: usize,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `C`, returning the registry for chaining.
    ///
    /// Registering the same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ComponentIdCollision`] if another type already
    /// claimed `C::ID`.
    pub fn register<C: Component>(&mut self) -> DbResult<&mut Self> {
        let meta = ComponentMeta::of::<C>();
        let slot = usize::from(meta.id.0);
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }

        match self.slots[slot] {
            Some(existing) if existing.type_id == meta.type_id => {}
            Some(existing) => {
                return Err(DbError::ComponentIdCollision {
                    id: meta.id,
                    existing: existing.name,
                    incoming: meta.name,
                });
            }
            None => {
                self.slots[slot] = Some(meta);
                self.count += 1;
            }
        }
        Ok(self)
    }

    /// Returns the metadata registered under `id`.
    #[inline]
    #[must_use]
    pub fn meta(&self, id: ComponentId) -> Option<&ComponentMeta> {
        self.slots.get(usize::from(id.0))?.as_ref()
    }

    /// Checks whether `type_id` is the type registered under `id`.
    #[inline]
    #[must_use]
    pub fn is_registered(&self, id: ComponentId, type_id: TypeId) -> bool {
        self.meta(id).is_some_and(|meta| meta.type_id == type_id)
    }

    /// Returns the registered name for `id`, or `"<unregistered>"`.
    #[must_use]
    pub fn name_of(&self, id: ComponentId) -> &'static str {
        self.meta(id).map_or("<unregistered>", |meta| meta.name)
    }

    /// Number of registered component types.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Checks if no component type is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterates over registered components in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
