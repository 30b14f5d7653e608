//! # Submission Engine
//!
//! The single commit point. Everything producers staged or enqueued since
//! the last `step()` is applied here, in a bounded fixed-point loop:
//!
//! ```text
//! step():
//!   while pending ops or staged entities:
//!     ├─ iterations == max ──▶ CyclicSubmission
//!     ├─ drain pending ops ──▶ apply in enqueue order (on_remove / on_move)
//!     ├─ flip creation set ──▶ append staged rows
//!     ├─ notify on_add
//!     └─ iterations += 1
//!   prune empty groups, notify observers
//! ```
//!
//! ## Ordering Rules
//!
//! Within one drain:
//! - An operation targeting an EGID removed earlier is skipped (removal wins)
//! - Removing or moving an EGID that is only staged for creation fails
//!   with `InvalidOperationOrdering`
//! - Moving onto an occupied EGID fails with `DuplicateEntity`
//!
//! A failing operation aborts the submission. Operations applied before it
//! stay applied; the rest of that drain is discarded.

use std::collections::HashSet;
use std::time::Instant;

use crate::config::{DatabaseConfig, SubmissionConfig};
use crate::ecs::{
    Component, ComponentId, ComponentRegistry, Egid, EntityCollectionMut, EntityDescriptor,
    EntityPairMut, GroupId, GroupRegistry, GroupStore,
};
use crate::error::{DbError, DbResult};
use crate::stream::EntityStreams;
use crate::sync::OperationKind;

use super::factory::EntityFactory;
use super::reactive::{ReactionContext, ReactiveEngine, ReactorRegistry, SubmissionObserver};
use super::stats::SubmissionStats;

/// Which EGIDs earlier operations of the current drain removed or vacated.
#[derive(Debug, Default)]
struct DrainLedger {
    removed: HashSet<Egid>,
    moved_away: HashSet<Egid>,
}

impl DrainLedger {
    fn record_removed(&mut self, egid: Egid) {
        self.removed.insert(egid);
        self.moved_away.remove(&egid);
    }

    fn record_moved(&mut self, from: Egid, to: Egid) {
        if from != to {
            self.moved_away.insert(from);
        }
        self.removed.remove(&to);
        self.moved_away.remove(&to);
    }

    fn record_swap(&mut self, a: GroupId, b: GroupId) {
        let remap = |egid: Egid| match egid.group() {
            group if group == a => egid.with_group(b),
            group if group == b => egid.with_group(a),
            _ => egid,
        };
        self.removed = self.removed.drain().map(remap).collect();
        self.moved_away = self.moved_away.drain().map(remap).collect();
    }
}

/// The entity database: group store, producer front end, reactive engines
/// and change streams.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = ComponentRegistry::new();
/// registry.register::<Position>()?;
/// let mut db = EntitiesDb::new(registry);
///
/// db.factory()
///     .build_entity(Egid::from_raw(1, 0), &descriptor)?
///     .init(Position { x: 0.0 })?;
/// db.step()?;
///
/// assert_eq!(db.store().count::<Position>(GroupId(0)), 1);
/// ```
#[derive(Debug)]
pub struct EntitiesDb {
    store: GroupStore,
    factory: EntityFactory,
    reactors: ReactorRegistry,
    streams: EntityStreams,
    groups: GroupRegistry,
    config: SubmissionConfig,
    submissions: u64,
}

impl EntitiesDb {
    /// Creates a database accepting the components of `registry`, with the
    /// default configuration.
    #[must_use]
    pub fn new(registry: ComponentRegistry) -> Self {
        Self::assemble(registry, DatabaseConfig::default())
    }

    /// Creates a database with an explicit configuration.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidConfig`] if the configuration is invalid.
    pub fn with_config(registry: ComponentRegistry, config: DatabaseConfig) -> DbResult<Self> {
        config.validate()?;
        Ok(Self::assemble(registry, config))
    }

    fn assemble(registry: ComponentRegistry, config: DatabaseConfig) -> Self {
        let capacity = config.submission.initial_group_capacity;
        tracing::debug!(
            components = registry.len(),
            max_iterations = config.submission.max_iterations,
            "entity database created"
        );
        Self {
            store: GroupStore::with_initial_capacity(capacity),
            factory: EntityFactory::new(registry, capacity),
            reactors: ReactorRegistry::default(),
            streams: EntityStreams::new(config.stream),
            groups: GroupRegistry::new(),
            config: config.submission,
            submissions: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// The producer front end. Clone it to hand it to other threads.
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    /// Read access to the stored entities.
    ///
    /// Results are only meaningful until the next [`EntitiesDb::step`].
    #[inline]
    #[must_use]
    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    /// The change streams.
    #[inline]
    #[must_use]
    pub fn streams(&self) -> &EntityStreams {
        &self.streams
    }

    /// Named group ranges.
    #[inline]
    #[must_use]
    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Named group ranges, for reserving new ones.
    #[inline]
    pub fn groups_mut(&mut self) -> &mut GroupRegistry {
        &mut self.groups
    }

    /// The submission configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Number of submissions that did work.
    #[inline]
    #[must_use]
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Checks whether anything waits for the next submission.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        let queues = self.factory.queues();
        !queues.pending.is_empty() || queues.creations.has_staged()
    }

    // ------------------------------------------------------------------------
    // In-place component access
    // ------------------------------------------------------------------------

    /// Every `C` row in `group`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if the id is stored as another type.
    pub fn query_mut<C: Component>(&mut self, group: GroupId) -> DbResult<EntityCollectionMut<'_, C>> {
        self.store.query_mut::<C>(group)
    }

    /// Rows of `A` and `B` in `group`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::ComponentTypeMismatch`] if `A` and `B` share an id.
    pub fn query_pair_mut<A: Component, B: Component>(
        &mut self,
        group: GroupId,
    ) -> DbResult<EntityPairMut<'_, A, B>> {
        self.store.query_pair_mut::<A, B>(group)
    }

    /// The `C` component of `egid`, mutably.
    ///
    /// # Errors
    ///
    /// [`DbError::EntityNotFound`] if the row does not exist.
    pub fn query_entity_mut<C: Component>(&mut self, egid: Egid) -> DbResult<&mut C> {
        self.store.query_entity_mut::<C>(egid)
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers a reactive engine for component `C`.
    ///
    /// Engines of one type are notified in registration order.
    pub fn add_reactive_engine<C, E>(&mut self, engine: E)
    where
        C: Component,
        E: ReactiveEngine<C> + 'static,
    {
        self.reactors.add::<C, E>(engine);
    }

    /// Registers an observer notified after every submission that did work.
    pub fn add_submission_observer<O: SubmissionObserver + 'static>(&mut self, observer: O) {
        self.reactors.add_observer(Box::new(observer));
    }

    // ------------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------------

    /// Publishes the stored `C` value of `egid` to the consumers of `C`.
    ///
    /// # Errors
    ///
    /// - [`DbError::EntityNotFound`] if `egid` has no `C` row
    /// - [`DbError::CapacityExceeded`] if a consumer is full
    pub fn publish_entity<C: Component + Clone>(&self, egid: Egid) -> DbResult<()> {
        let value = self.store.query_entity::<C>(egid)?;
        self.streams.publish(value, egid)
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Applies every pending operation and staged entity.
    ///
    /// Call once per tick, before trusting any query of that tick. With
    /// nothing pending this is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DbError::CyclicSubmission`] if reactive engines keep producing
    ///   work past the iteration bound
    /// - [`DbError::SubmissionFailed`] wrapping the first failing operation
    /// - [`DbError::DuplicateEntity`] if a staged entity collides with a
    ///   stored one
    /// - Any error returned by a reactive engine
    pub fn step(&mut self) -> DbResult<SubmissionStats> {
        let started = Instant::now();
        let mut stats = SubmissionStats::default();

        while self.has_pending_work() {
            if stats.iterations >= self.config.max_iterations {
                let queues = self.factory.queues();
                tracing::error!(
                    iterations = stats.iterations,
                    pending = queues.pending.len(),
                    staged = queues.creations.staged_count(),
                    "entity submission did not settle"
                );
                return Err(DbError::CyclicSubmission {
                    iterations: stats.iterations,
                });
            }

            let iteration = stats.iterations;
            self.apply_pending_operations(iteration, &mut stats)?;
            self.merge_creations(iteration, &mut stats)?;
            stats.iterations += 1;
        }

        if stats.is_idle() {
            return Ok(stats);
        }

        stats.groups_pruned = self.store.prune_empty_groups();
        stats.elapsed = started.elapsed();
        self.submissions += 1;

        tracing::debug!(submission = self.submissions, %stats, "entities submitted");
        if stats.elapsed > self.config.slow_submission_threshold() {
            tracing::warn!(
                submission = self.submissions,
                elapsed_us = u64::try_from(stats.elapsed.as_micros()).unwrap_or(u64::MAX),
                budget_us = self.config.slow_submission_warn_us,
                "slow entity submission"
            );
        }

        self.reactors.notify_complete(&stats);
        Ok(stats)
    }

    fn apply_pending_operations(&mut self, iteration: u32, stats: &mut SubmissionStats) -> DbResult<()> {
        let operations = self.factory.queues().pending.drain();
        let mut ledger = DrainLedger::default();

        for operation in operations {
            match self.apply_operation(&operation.kind, iteration, &mut ledger, stats) {
                Ok(true) => stats.operations_applied += 1,
                Ok(false) => stats.operations_skipped += 1,
                Err(source) => {
                    tracing::error!(
                        op = %operation.kind,
                        trace = %operation.trace,
                        error = %source,
                        "pending operation failed, submission aborted"
                    );
                    return Err(DbError::SubmissionFailed {
                        operation: operation.kind.to_string(),
                        trace: operation.trace,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns `false` if the operation was skipped.
    fn apply_operation(
        &mut self,
        kind: &OperationKind,
        iteration: u32,
        ledger: &mut DrainLedger,
        stats: &mut SubmissionStats,
    ) -> DbResult<bool> {
        match kind {
            OperationKind::Remove { egid, descriptor } => {
                self.apply_remove(*egid, descriptor, iteration, ledger, stats)
            }
            OperationKind::Move {
                from,
                to,
                descriptor,
            } => self.apply_move(*from, *to, descriptor, iteration, ledger, stats),
            OperationKind::RemoveGroup { group } => {
                self.apply_remove_group(*group, iteration, ledger, stats)
            }
            OperationKind::SwapGroup { a, b } => {
                self.store.swap_group_contents(*a, *b);
                ledger.record_swap(*a, *b);
                stats.groups_swapped += 1;
                tracing::trace!(%a, %b, "groups swapped");
                Ok(true)
            }
        }
    }

    fn apply_remove(
        &mut self,
        egid: Egid,
        descriptor: &EntityDescriptor,
        iteration: u32,
        ledger: &mut DrainLedger,
        stats: &mut SubmissionStats,
    ) -> DbResult<bool> {
        if ledger.removed.contains(&egid) {
            tracing::warn!(%egid, "remove of an entity already removed in this submission skipped");
            return Ok(false);
        }
        if !self.store.contains_rows(egid, descriptor) {
            return Err(self.missing_target(egid, ledger));
        }

        let ctx = ReactionContext::new(&self.factory, &self.store, iteration);
        for id in descriptor.ids() {
            if !self.reactors.listens_to(id) {
                continue;
            }
            let Some(row) = self
                .store
                .table(egid.group(), id)
                .and_then(|table| table.row_of(egid.entity()))
            else {
                continue;
            };
            self.reactors
                .notify_remove(id, egid.group(), row..row + 1, &ctx)?;
        }

        self.store.remove_row(egid, descriptor)?;
        ledger.record_removed(egid);
        stats.entities_removed += 1;
        tracing::trace!(%egid, descriptor = descriptor.name(), "entity removed");
        Ok(true)
    }

    fn apply_move(
        &mut self,
        from: Egid,
        to: Egid,
        descriptor: &EntityDescriptor,
        iteration: u32,
        ledger: &mut DrainLedger,
        stats: &mut SubmissionStats,
    ) -> DbResult<bool> {
        if ledger.removed.contains(&from) {
            tracing::warn!(%from, %to, "move of an entity removed in this submission skipped");
            return Ok(false);
        }
        if !self.store.contains_rows(from, descriptor) {
            return Err(self.missing_target(from, ledger));
        }

        self.store.move_row(from, to, descriptor)?;
        ledger.record_moved(from, to);
        stats.entities_moved += 1;
        tracing::trace!(%from, %to, descriptor = descriptor.name(), "entity moved");

        let ctx = ReactionContext::new(&self.factory, &self.store, iteration);
        for id in descriptor.ids() {
            if !self.reactors.listens_to(id) {
                continue;
            }
            let Some(row) = self
                .store
                .table(to.group(), id)
                .and_then(|table| table.row_of(to.entity()))
            else {
                continue;
            };
            self.reactors
                .notify_move(id, from.group(), to.group(), row..row + 1, &ctx)?;
        }
        Ok(true)
    }

    fn apply_remove_group(
        &mut self,
        group: GroupId,
        iteration: u32,
        ledger: &mut DrainLedger,
        stats: &mut SubmissionStats,
    ) -> DbResult<bool> {
        let Some(tables) = self.store.group(group) else {
            tracing::trace!(%group, "remove of a missing group");
            return Ok(true);
        };

        // One batched callback per component type, before the rows go away.
        let batches: Vec<(ComponentId, usize)> = tables
            .iter()
            .filter(|table| !table.is_empty() && self.reactors.listens_to(table.component_id()))
            .map(|table| (table.component_id(), table.len()))
            .collect();
        let ctx = ReactionContext::new(&self.factory, &self.store, iteration);
        for (id, rows) in batches {
            self.reactors.notify_remove(id, group, 0..rows, &ctx)?;
        }

        if let Some(removed) = self.store.remove_group(group) {
            let mut entities = HashSet::new();
            for table in removed.iter() {
                entities.extend(table.entity_ids().iter().map(|&entity| Egid::new(entity, group)));
            }
            stats.entities_removed += entities.len();
            for egid in entities {
                ledger.record_removed(egid);
            }
        }
        stats.groups_removed += 1;
        tracing::trace!(%group, "group removed");
        Ok(true)
    }

    fn missing_target(&self, egid: Egid, ledger: &DrainLedger) -> DbError {
        if self.factory.queues().creations.is_staged(egid) {
            DbError::InvalidOperationOrdering {
                egid,
                reason: "entity is staged for creation but not yet submitted",
            }
        } else if ledger.moved_away.contains(&egid) {
            DbError::InvalidOperationOrdering {
                egid,
                reason: "entity was moved away earlier in the same submission",
            }
        } else {
            DbError::not_found(egid)
        }
    }

    fn merge_creations(&mut self, iteration: u32, stats: &mut SubmissionStats) -> DbResult<()> {
        let generation = self.factory.queues().creations.swap_and_take();
        if generation.is_empty() {
            return Ok(());
        }

        let staged = generation.entity_count();
        let groups = generation.into_groups();
        // All or nothing: a duplicate anywhere discards the whole generation
        // before any group is appended.
        for (group, tables) in &groups {
            self.store.check_append(*group, tables).map_err(|err| {
                tracing::error!(%group, staged, error = %err, "staged entities discarded");
                err
            })?;
        }

        let mut appended = Vec::new();
        for (group, mut tables) in groups {
            let entities = tables.entity_count();
            let ranges = self.store.append_rows(group, &mut tables)?;
            stats.entities_added += entities;
            appended.extend(ranges.into_iter().map(|(id, rows)| (group, id, rows)));
        }

        let ctx = ReactionContext::new(&self.factory, &self.store, iteration);
        for (group, id, rows) in appended {
            self.reactors.notify_add(id, group, rows, &ctx)?;
        }
        Ok(())
    }
}
