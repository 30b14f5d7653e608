//! # Deferred Submission
//!
//! Producers request structural changes through an [`EntityFactory`]; the
//! [`EntitiesDb`] applies them all at one point per tick.
//!
//! ```text
//!  ┌──────────────┐  build / remove / move   ┌──────────────────┐
//!  │ EntityFactory│ ───────────────────────▶ │ staging + queue  │
//!  │  (any thread)│                          └────────┬─────────┘
//!  └──────────────┘                                   │ step()
//!                                                     ▼
//!  ┌──────────────┐   on_add / on_remove     ┌──────────────────┐
//!  │ReactiveEngine│ ◀─────────────────────── │    GroupStore    │
//!  └──────────────┘      / on_move           └──────────────────┘
//! ```

mod engine;
mod factory;
mod reactive;
mod stats;

pub use engine::EntitiesDb;
pub use factory::{EntityFactory, EntityInitializer};
pub use reactive::{ReactionContext, ReactiveEngine, SubmissionObserver};
pub use stats::SubmissionStats;
