//! # STRATA Core
//!
//! In-memory entity database for simulation loops. Entities are rows of
//! per-type component tables, partitioned into groups; structural changes
//! are deferred and committed at a single submission point per tick.
//!
//! ## Architecture Rules
//!
//! 1. **Storage changes only in `step()`** - Producers stage and enqueue
//! 2. **Producers never block on a commit** - Staging is double-buffered
//! 3. **Dense iteration** - One contiguous table per component per group
//! 4. **Bounded reactions** - Reactive engines may cascade, up to a limit
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{ComponentRegistry, Egid, EntitiesDb, EntityDescriptor, GroupId};
//!
//! let mut registry = ComponentRegistry::new();
//! registry.register::<Position>()?;
//! let mut db = EntitiesDb::new(registry);
//!
//! let ship = EntityDescriptor::builder("ship").with::<Position>().build();
//! db.factory().build_entity(Egid::from_raw(0, 1), &ship)?;
//! db.step()?;
//!
//! for (position, egid) in db.store().query::<Position>(GroupId(1))? {
//!     println!("{egid}: {position:?}");
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod stream;
pub mod submission;
pub mod sync;

pub use config::{DatabaseConfig, StreamConfig, SubmissionConfig};
pub use ecs::{
    Component, ComponentId, ComponentRegistry, ComponentTable, Egid, EntityCollection,
    EntityCollectionMut, EntityDescriptor, EntityId, EntityPair, EntityPairMut, GroupId,
    GroupRange, GroupRegistry, GroupStore, MultiGroupCollection,
};
pub use error::{DbError, DbResult, EntityLookup};
pub use stream::{Consumer, EntityStream, EntityStreams, StreamItem};
pub use submission::{
    EntitiesDb, EntityFactory, EntityInitializer, ReactionContext, ReactiveEngine,
    SubmissionObserver, SubmissionStats,
};
pub use sync::OperationTrace;
