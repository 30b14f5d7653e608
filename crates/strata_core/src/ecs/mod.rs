//! # Grouped Entity Storage
//!
//! Entities are rows spread over per-type component tables, partitioned
//! by caller-chosen groups.
//!
//! ## Design Philosophy
//!
//! - Components are stored in dense arrays, one table per type per group
//! - Removal is swap-remove: O(1), row order is not insertion order
//! - Component types are keyed by a compile-time id, never by runtime
//!   type lookup on the hot path
//! - Structural changes are validated before any table is touched

mod component;
mod descriptor;
mod egid;
mod group_store;
pub mod groups;
pub mod query;
mod table;

pub use component::{Component, ComponentId, ComponentMeta, ComponentRegistry};
pub use descriptor::{ComponentEntry, DescriptorBuilder, EntityDescriptor};
pub use egid::{Egid, EntityId, GroupId};
pub use group_store::{GroupStore, GroupTables};
pub use groups::{GroupRange, GroupRegistry};
pub use query::{
    EntityCollection, EntityCollectionMut, EntityCursor, EntityPair, EntityPairMut,
    MultiGroupCollection,
};
pub use table::{ComponentTable, ErasedTable};
