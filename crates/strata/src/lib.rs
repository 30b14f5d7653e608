//! # STRATA
//!
//! In-memory grouped entity database for fixed-rate simulations.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SimulationDriver                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   tick N:   caller logic ──▶ EntityFactory (stage / enqueue)     │
//! │                  │                                               │
//! │                  ▼                                               │
//! │             EntitiesDb::step()  ── the single commit point       │
//! │                  │                                               │
//! │                  ├──▶ GroupStore        (tables mutate here)     │
//! │                  ├──▶ ReactiveEngines   (on_add/remove/move)     │
//! │                  └──▶ SubmissionObservers                        │
//! │                                                                  │
//! │   queries and change streams see the state of tick N from here   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `driver`: Tick orchestration and timing
//! - `core`: The storage engine (`strata_core`), also re-exported at the root

pub mod driver;

pub use strata_core as core;

pub use driver::{DriverConfig, SimulationDriver, TickStats, TickStatsAccumulator};
pub use strata_core::{
    Component, ComponentId, ComponentRegistry, Consumer, DatabaseConfig, DbError, DbResult, Egid,
    EntitiesDb, EntityCollection, EntityDescriptor, EntityFactory, EntityId, EntityInitializer,
    EntityLookup, GroupId, GroupRegistry, GroupStore, ReactionContext, ReactiveEngine,
    StreamConfig, SubmissionConfig, SubmissionObserver, SubmissionStats,
};
