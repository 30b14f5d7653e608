//! # Submission Scenarios
//!
//! End-to-end behavior of the commit point:
//!
//! 1. **Build and move**: an entity built in one group and moved to another
//! 2. **Empty commits**: `step()` with nothing pending changes nothing
//! 3. **Cycle bound**: a self-feeding engine fails after exactly 5 iterations
//! 4. **Ordering rules**: removal wins, staged targets are rejected
//! 5. **Group operations**: batched removal callbacks, O(1) swaps
//!
//! Run with: cargo test --test submission_scenarios

use std::sync::Arc;

use parking_lot::Mutex;
use strata::{
    Component, ComponentId, ComponentRegistry, DbError, DbResult, Egid, EntitiesDb,
    EntityCollection, EntityDescriptor, EntityId, EntityLookup, GroupId, ReactionContext,
    ReactiveEngine,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Position {
    x: f32,
}

impl Component for Position {
    const ID: ComponentId = ComponentId(0);
    const NAME: &'static str = "Position";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Marker(u32);

impl Component for Marker {
    const ID: ComponentId = ComponentId(1);
    const NAME: &'static str = "Marker";
}

const GROUP_A: GroupId = GroupId(10);
const GROUP_B: GroupId = GroupId(11);

fn body() -> EntityDescriptor {
    EntityDescriptor::builder("body").with::<Position>().build()
}

fn tagged() -> EntityDescriptor {
    body().extend("tagged", &EntityDescriptor::builder("marker").with::<Marker>().build())
}

fn database() -> EntitiesDb {
    let mut registry = ComponentRegistry::new();
    registry.register::<Position>().unwrap();
    registry.register::<Marker>().unwrap();
    EntitiesDb::new(registry)
}

// ============================================================================
// BUILD AND MOVE
// ============================================================================

#[test]
fn test_build_then_move_between_groups() {
    let mut db = database();
    let egid = Egid::new(EntityId(1), GROUP_A);

    db.factory()
        .build_entity(egid, &body())
        .unwrap()
        .init(Position { x: 0.0 })
        .unwrap();
    assert_eq!(db.store().count::<Position>(GROUP_A), 0, "nothing is visible before step");
    db.step().unwrap();

    let rows = db.store().query::<Position>(GROUP_A).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.get(0), Some((&Position { x: 0.0 }, egid)));

    db.factory().swap_entity_group(egid, GROUP_B, &body());
    db.step().unwrap();

    assert_eq!(db.store().query::<Position>(GROUP_A).unwrap().len(), 0);
    let moved = db.store().query::<Position>(GROUP_B).unwrap();
    assert_eq!(moved.components(), &[Position { x: 0.0 }]);
    assert_eq!(moved.get(0).map(|(_, egid)| egid), Some(egid.with_group(GROUP_B)));
}

#[test]
fn test_duplicate_build_fails_at_commit() {
    let mut db = database();
    let egid = Egid::new(EntityId(4), GROUP_A);
    db.factory().build_entity(egid, &body()).unwrap();
    db.step().unwrap();

    db.factory().build_entity(egid, &body()).unwrap();
    assert_eq!(db.step().unwrap_err(), DbError::DuplicateEntity { egid });
    assert_eq!(db.store().count::<Position>(GROUP_A), 1);
}

#[test]
fn test_initializer_after_commit_is_rejected() {
    let mut db = database();
    let init = db
        .factory()
        .build_entity(Egid::new(EntityId(2), GROUP_A), &body())
        .unwrap();
    db.step().unwrap();

    assert!(matches!(
        init.init(Position { x: 1.0 }),
        Err(DbError::InvalidOperationOrdering { .. })
    ));
}

// ============================================================================
// EMPTY COMMITS
// ============================================================================

#[test]
fn test_empty_step_changes_nothing() {
    let mut db = database();
    for i in 0..8 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_A), &tagged())
            .unwrap();
    }
    db.step().unwrap();

    let groups_before = db.store().group_ids();
    let positions_before = db.store().query::<Position>(GROUP_A).unwrap().entity_ids().to_vec();

    for _ in 0..3 {
        let stats = db.step().unwrap();
        assert!(stats.is_idle());
    }

    assert_eq!(db.store().group_ids(), groups_before);
    assert_eq!(
        db.store().query::<Position>(GROUP_A).unwrap().entity_ids(),
        positions_before.as_slice()
    );
    assert_eq!(db.store().count::<Marker>(GROUP_A), 8);
}

// ============================================================================
// CYCLE BOUND
// ============================================================================

/// Answers every arrival with another move, forever.
struct Bouncer {
    notifications: Arc<Mutex<u32>>,
}

impl ReactiveEngine<Position> for Bouncer {
    fn on_move(
        &mut self,
        batch: EntityCollection<'_, Position>,
        from: GroupId,
        ctx: &ReactionContext<'_>,
    ) -> DbResult<()> {
        *self.notifications.lock() += 1;
        for (_, egid) in batch {
            ctx.factory().swap_entity_group(egid, from, &body());
        }
        Ok(())
    }
}

#[test]
fn test_cyclic_engine_fails_after_five_iterations() {
    let mut db = database();
    let egid = Egid::new(EntityId(1), GROUP_A);
    db.factory().build_entity(egid, &body()).unwrap();
    db.step().unwrap();

    let notifications = Arc::new(Mutex::new(0));
    db.add_reactive_engine::<Position, _>(Bouncer {
        notifications: Arc::clone(&notifications),
    });
    db.factory().swap_entity_group(egid, GROUP_B, &body());

    let err = db.step().unwrap_err();
    assert_eq!(err, DbError::CyclicSubmission { iterations: 5 });
    assert!(err.is_configuration_error());
    assert_eq!(*notifications.lock(), 5);
}

/// Reacts once: newly added markers spawn a companion in group B.
struct Spawner;

impl ReactiveEngine<Marker> for Spawner {
    fn on_add(&mut self, batch: EntityCollection<'_, Marker>, ctx: &ReactionContext<'_>) -> DbResult<()> {
        if batch.group() != GROUP_A {
            return Ok(());
        }
        for (marker, egid) in batch {
            ctx.factory()
                .build_entity(Egid::new(egid.entity(), GROUP_B), &tagged())?
                .init(Marker(marker.0 + 100))?;
        }
        Ok(())
    }
}

#[test]
fn test_engine_cascade_settles_within_one_step() {
    let mut db = database();
    db.add_reactive_engine::<Marker, _>(Spawner);
    for i in 0..3 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_A), &tagged())
            .unwrap()
            .init(Marker(i))
            .unwrap();
    }

    let stats = db.step().unwrap();
    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.entities_added, 6);

    let mut spawned: Vec<u32> = db
        .store()
        .query::<Marker>(GROUP_B)
        .unwrap()
        .components()
        .iter()
        .map(|marker| marker.0)
        .collect();
    spawned.sort_unstable();
    assert_eq!(spawned, vec![100, 101, 102]);
}

// ============================================================================
// ORDERING RULES
// ============================================================================

#[test]
fn test_remove_then_move_removal_wins() {
    let mut db = database();
    let egid = Egid::new(EntityId(1), GROUP_A);
    db.factory().build_entity(egid, &body()).unwrap();
    db.step().unwrap();

    db.factory().remove_entity(egid, &body());
    db.factory().swap_entity_group(egid, GROUP_B, &body());
    let stats = db.step().unwrap();

    assert_eq!(stats.entities_removed, 1);
    assert_eq!(stats.operations_skipped, 1);
    assert!(!db.store().exists::<Position>(egid));
    assert!(!db.store().exists::<Position>(egid.with_group(GROUP_B)));
}

#[test]
fn test_move_of_staged_entity_is_ordering_error() {
    let mut db = database();
    let egid = Egid::new(EntityId(1), GROUP_A);
    db.factory().build_entity(egid, &body()).unwrap();
    db.factory().swap_entity_group(egid, GROUP_B, &body());

    let err = db.step().unwrap_err();
    let DbError::SubmissionFailed {
        operation, trace, ..
    } = &err
    else {
        panic!("expected SubmissionFailed, got {err:?}");
    };
    assert!(operation.starts_with("move"));
    assert!(trace.caller.file().ends_with("submission_scenarios.rs"));
    assert!(matches!(
        err.root_cause(),
        DbError::InvalidOperationOrdering { .. }
    ));
}

#[test]
fn test_failure_keeps_earlier_operations() {
    let mut db = database();
    for i in 0..3 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_A), &body())
            .unwrap();
    }
    db.step().unwrap();

    db.factory().remove_entity(Egid::new(EntityId(0), GROUP_A), &body());
    db.factory().remove_entity(Egid::new(EntityId(7), GROUP_A), &body());
    db.factory().remove_entity(Egid::new(EntityId(1), GROUP_A), &body());

    let err = db.step().unwrap_err();
    assert_eq!(
        err.root_cause(),
        &DbError::EntityNotFound(EntityLookup::Entity(Egid::new(EntityId(7), GROUP_A)))
    );
    // No rollback, and the rest of the drain is gone.
    assert_eq!(db.store().count::<Position>(GROUP_A), 2);
    assert!(!db.has_pending_work());
    assert!(db.step().unwrap().is_idle());
}

// ============================================================================
// GROUP OPERATIONS
// ============================================================================

#[derive(Default)]
struct RemovalLog {
    batches: Arc<Mutex<Vec<(GroupId, usize)>>>,
}

impl ReactiveEngine<Marker> for RemovalLog {
    fn on_remove(&mut self, batch: EntityCollection<'_, Marker>, _: &ReactionContext<'_>) -> DbResult<()> {
        self.batches.lock().push((batch.group(), batch.len()));
        Ok(())
    }
}

#[test]
fn test_remove_group_notifies_once_per_type() {
    let mut db = database();
    let log = RemovalLog::default();
    let batches = Arc::clone(&log.batches);
    db.add_reactive_engine::<Marker, _>(log);

    for i in 0..5 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_A), &tagged())
            .unwrap();
    }
    db.step().unwrap();

    db.factory().remove_group_and_entities(GROUP_A);
    let stats = db.step().unwrap();

    assert_eq!(*batches.lock(), vec![(GROUP_A, 5)]);
    assert_eq!(stats.groups_removed, 1);
    assert_eq!(stats.entities_removed, 5);
    assert!(!db.store().has_group(GROUP_A));
}

#[test]
fn test_swap_groups_exchanges_storage() {
    let mut db = database();
    db.factory()
        .build_entity(Egid::new(EntityId(1), GROUP_A), &body())
        .unwrap()
        .init(Position { x: 1.0 })
        .unwrap();
    for i in 0..2 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_B), &body())
            .unwrap()
            .init(Position { x: 2.0 })
            .unwrap();
    }
    db.step().unwrap();

    db.factory().swap_groups(GROUP_A, GROUP_B);
    db.step().unwrap();

    assert_eq!(db.store().count::<Position>(GROUP_A), 2);
    assert_eq!(db.store().count::<Position>(GROUP_B), 1);
    assert_eq!(
        db.store().query_entity::<Position>(Egid::new(EntityId(1), GROUP_B)),
        Ok(&Position { x: 1.0 })
    );
}

#[test]
fn test_query_unique() {
    let mut db = database();
    let lone = Egid::new(EntityId(3), GROUP_B);
    db.factory().build_entity(lone, &tagged()).unwrap().init(Marker(9)).unwrap();
    for i in 0..2 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), GROUP_A), &tagged())
            .unwrap();
    }
    db.step().unwrap();

    assert_eq!(db.store().query_unique::<Marker>(GROUP_B), Ok((&Marker(9), lone)));
    assert!(matches!(
        db.store().query_unique::<Marker>(GROUP_A),
        Err(DbError::MultipleUniqueEntities { count: 2, .. })
    ));
    assert!(matches!(
        db.store().query_unique::<Marker>(GroupId(99)),
        Err(DbError::EntityNotFound(EntityLookup::Unique { .. }))
    ));
}
