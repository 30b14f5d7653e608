//! # Reactive Engines
//!
//! Callbacks raised by the submission engine when entities appear,
//! disappear, or change group.
//!
//! ## Ordering
//!
//! ```text
//! drain pending ops:  on_remove (before the rows go away)
//!                     on_move   (after the rows arrive)
//! merge creations:    on_add    (after every group is appended)
//! ```
//!
//! Callbacks may enqueue further work through the context's factory. That
//! work is picked up by the next fixed-point iteration of the same
//! submission, which is bounded.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Range;

use crate::ecs::{Component, ComponentId, EntityCollection, GroupId, GroupStore};
use crate::error::DbResult;

use super::factory::EntityFactory;
use super::stats::SubmissionStats;

/// What a reactive engine can see and do during a callback.
#[derive(Clone, Copy)]
pub struct ReactionContext<'a> {
    factory: &'a EntityFactory,
    store: &'a GroupStore,
    iteration: u32,
}

impl<'a> ReactionContext<'a> {
    pub(crate) fn new(factory: &'a EntityFactory, store: &'a GroupStore, iteration: u32) -> Self {
        Self {
            factory,
            store,
            iteration,
        }
    }

    /// Factory for enqueueing follow-up structural changes.
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &'a EntityFactory {
        self.factory
    }

    /// Read-only view of the store as it is at this point of the submission.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &'a GroupStore {
        self.store
    }

    /// Fixed-point iteration the callback runs in, starting at 0.
    #[inline]
    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }
}

/// Reacts to structural changes of entities carrying component `C`.
///
/// Every callback receives a batch: the affected rows of one group, in one
/// call per group and component type.
///
/// # Errors
///
/// An error returned from a callback aborts the submission.
pub trait ReactiveEngine<C: Component>: Send {
    /// Name used in spans and logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Rows were added to `batch.group()`.
    #[allow(unused_variables)]
    fn on_add(&mut self, batch: EntityCollection<'_, C>, ctx: &ReactionContext<'_>) -> DbResult<()> {
        Ok(())
    }

    /// Rows are about to be removed from `batch.group()`.
    #[allow(unused_variables)]
    fn on_remove(
        &mut self,
        batch: EntityCollection<'_, C>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        Ok(())
    }

    /// Rows arrived in `batch.group()` from group `from`.
    #[allow(unused_variables)]
    fn on_move(
        &mut self,
        batch: EntityCollection<'_, C>,
        from: GroupId,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        Ok(())
    }
}

/// Notified once at the end of every submission that did work.
pub trait SubmissionObserver: Send {
    /// The submission finished.
    fn on_submission_complete(&mut self, stats: &SubmissionStats);
}

// ============================================================================
// TYPE ERASURE
// ============================================================================

trait ErasedReactor: Send {
    fn notify_add(&mut self, group: GroupId, rows: Range<usize>, ctx: &ReactionContext<'_>) -> DbResult<()>;

    fn notify_remove(&mut self, group: GroupId, rows: Range<usize>, ctx: &ReactionContext<'_>) -> DbResult<()>;

    fn notify_move(
        &mut self,
        from: GroupId,
        to: GroupId,
        rows: Range<usize>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()>;
}

struct TypedReactor<C, E> {
    engine: E,
    _component: PhantomData<fn() -> C>,
}

impl<C: Component, E: ReactiveEngine<C>> TypedReactor<C, E> {
    fn batch<'s>(store: &'s GroupStore, group: GroupId, rows: Range<usize>) -> DbResult<EntityCollection<'s, C>> {
        Ok(store.query::<C>(group)?.slice(rows))
    }
}

impl<C: Component, E: ReactiveEngine<C>> ErasedReactor for TypedReactor<C, E> {
    fn notify_add(&mut self, group: GroupId, rows: Range<usize>, ctx: &ReactionContext<'_>) -> DbResult<()> {
        let span = tracing::trace_span!(
            "reactive_engine",
            engine = self.engine.name(),
            component = C::NAME,
            %group,
            callback = "add"
        );
        let _entered = span.enter();
        let batch = Self::batch(ctx.store(), group, rows)?;
        self.engine.on_add(batch, ctx)
    }

    fn notify_remove(&mut self, group: GroupId, rows: Range<usize>, ctx: &ReactionContext<'_>) -> DbResult<()> {
        let span = tracing::trace_span!(
            "reactive_engine",
            engine = self.engine.name(),
            component = C::NAME,
            %group,
            callback = "remove"
        );
        let _entered = span.enter();
        let batch = Self::batch(ctx.store(), group, rows)?;
        self.engine.on_remove(batch, ctx)
    }

    fn notify_move(
        &mut self,
        from: GroupId,
        to: GroupId,
        rows: Range<usize>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        let span = tracing::trace_span!(
            "reactive_engine",
            engine = self.engine.name(),
            component = C::NAME,
            group = %to,
            %from,
            callback = "move"
        );
        let _entered = span.enter();
        let batch = Self::batch(ctx.store(), to, rows)?;
        self.engine.on_move(batch, from, ctx)
    }
}

/// Registered reactive engines, per component type, in registration order.
#[derive(Default)]
pub(crate) struct ReactorRegistry {
    reactors: HashMap<ComponentId, Vec<Box<dyn ErasedReactor>>>,
    observers: Vec<Box<dyn SubmissionObserver>>,
}

impl ReactorRegistry {
    pub(crate) fn add<C, E>(&mut self, engine: E)
    where
        C: Component,
        E: ReactiveEngine<C> + 'static,
    {
        tracing::debug!(engine = engine.name(), component = C::NAME, "reactive engine registered");
        self.reactors
            .entry(C::ID)
            .or_default()
            .push(Box::new(TypedReactor {
                engine,
                _component: PhantomData,
            }));
    }

    pub(crate) fn add_observer(&mut self, observer: Box<dyn SubmissionObserver>) {
        self.observers.push(observer);
    }

    /// Checks whether any engine listens to `id`.
    pub(crate) fn listens_to(&self, id: ComponentId) -> bool {
        self.reactors.get(&id).is_some_and(|list| !list.is_empty())
    }

    pub(crate) fn engine_count(&self) -> usize {
        self.reactors.values().map(Vec::len).sum()
    }

    pub(crate) fn notify_add(
        &mut self,
        id: ComponentId,
        group: GroupId,
        rows: Range<usize>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        for reactor in self.reactors.get_mut(&id).into_iter().flatten() {
            reactor.notify_add(group, rows.clone(), ctx)?;
        }
        Ok(())
    }

    pub(crate) fn notify_remove(
        &mut self,
        id: ComponentId,
        group: GroupId,
        rows: Range<usize>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        for reactor in self.reactors.get_mut(&id).into_iter().flatten() {
            reactor.notify_remove(group, rows.clone(), ctx)?;
        }
        Ok(())
    }

    pub(crate) fn notify_move(
        &mut self,
        id: ComponentId,
        from: GroupId,
        to: GroupId,
        rows: Range<usize>,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        for reactor in self.reactors.get_mut(&id).into_iter().flatten() {
            reactor.notify_move(from, to, rows.clone(), ctx)?;
        }
        Ok(())
    }

    pub(crate) fn notify_complete(&mut self, stats: &SubmissionStats) {
        for observer in &mut self.observers {
            observer.on_submission_complete(stats);
        }
    }
}

impl std::fmt::Debug for ReactorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorRegistry")
            .field("engines", &self.engine_count())
            .field("observers", &self.observers.len())
            .finish()
    }
}
