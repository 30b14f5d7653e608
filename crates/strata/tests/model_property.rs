//! # Model Property Test
//!
//! Random build/remove/move/group sequences, applied between commits and
//! checked against a plain ordered map that applies the same operations in
//! enqueue order:
//!
//! 1. **No lost or duplicated entity**: after every commit the store holds
//!    exactly the model's entities, with the model's values
//! 2. **Swap-remove invariant**: every remaining entity id maps to a valid
//!    row below the table's row count
//! 3. **Row agreement**: every component type of an entity shares its row
//!
//! Seeded, so any failure reproduces.
//!
//! Run with: cargo test --test model_property

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata::{
    Component, ComponentId, ComponentRegistry, Egid, EntitiesDb, EntityDescriptor, EntityId,
    GroupId,
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
struct Serial(u32);

impl Component for Serial {
    const ID: ComponentId = ComponentId(1);
    const NAME: &'static str = "Serial";
}

const GROUPS: u32 = 4;
const ROUNDS: usize = 200;

type Model = BTreeMap<Egid, u32>;

fn descriptor() -> EntityDescriptor {
    EntityDescriptor::builder("particle")
        .with::<Position>()
        .with::<Serial>()
        .build()
}

fn database() -> EntitiesDb {
    let mut registry = ComponentRegistry::new();
    registry.register::<Position>().unwrap();
    registry.register::<Serial>().unwrap();
    EntitiesDb::new(registry)
}

fn random_group(rng: &mut StdRng) -> GroupId {
    GroupId(rng.gen_range(0..GROUPS))
}

fn pick(rng: &mut StdRng, model: &Model) -> Option<Egid> {
    if model.is_empty() {
        return None;
    }
    model.keys().nth(rng.gen_range(0..model.len())).copied()
}

/// Enqueues one random operation valid against `model`, and applies it to
/// `model` the way the commit should.
fn enqueue_random(rng: &mut StdRng, db: &EntitiesDb, descriptor: &EntityDescriptor, model: &mut Model) {
    let factory = db.factory();
    match rng.gen_range(0..100) {
        0..=39 => {
            if let Some(egid) = pick(rng, model) {
                factory.remove_entity(egid, descriptor);
                model.remove(&egid);
            }
        }
        40..=84 => {
            let Some(from) = pick(rng, model) else {
                return;
            };
            let to = from.with_group(random_group(rng));
            if to != from && model.contains_key(&to) {
                return;
            }
            factory.swap_entity_group(from, to.group(), descriptor);
            if let Some(value) = model.remove(&from) {
                model.insert(to, value);
            }
        }
        85..=91 => {
            let group = random_group(rng);
            factory.remove_group_and_entities(group);
            model.retain(|egid, _| egid.group() != group);
        }
        _ => {
            let a = random_group(rng);
            let b = random_group(rng);
            factory.swap_groups(a, b);
            if a != b {
                *model = std::mem::take(model)
                    .into_iter()
                    .map(|(egid, value)| match egid.group() {
                        group if group == a => (egid.with_group(b), value),
                        group if group == b => (egid.with_group(a), value),
                        _ => (egid, value),
                    })
                    .collect();
            }
        }
    }
}

fn assert_matches_model(db: &EntitiesDb, model: &Model, round: usize) {
    let mut stored = Model::new();
    for group in (0..GROUPS).map(GroupId) {
        let serials = db.store().query::<Serial>(group).unwrap();
        let positions = db.store().query::<Position>(group).unwrap();
        assert_eq!(serials.entity_ids(), positions.entity_ids(), "round {round}: rows diverge in {group}");

        for (serial, egid) in serials {
            assert!(
                stored.insert(egid, serial.0).is_none(),
                "round {round}: {egid} stored twice"
            );
        }

        if let Some(table) = db.store().typed_table::<Serial>(group).unwrap() {
            assert!(table.check_invariants(), "round {round}: broken row map in {group}");
        }
    }
    assert_eq!(&stored, model, "round {round}: store diverged from model");
}

fn run(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let descriptor = descriptor();
    let mut db = database();
    let mut model = Model::new();
    let mut next_entity = 0_u32;

    for round in 0..ROUNDS {
        for _ in 0..rng.gen_range(0..6) {
            enqueue_random(&mut rng, &db, &descriptor, &mut model);
        }

        // Fresh entity ids never collide with anything the ops produced.
        let mut built = Vec::new();
        for _ in 0..rng.gen_range(0..8) {
            let egid = Egid::new(EntityId(next_entity), random_group(&mut rng));
            let serial = next_entity * 10;
            next_entity += 1;
            db.factory()
                .build_entity(egid, &descriptor)
                .unwrap()
                .init(Serial(serial))
                .unwrap();
            built.push((egid, serial));
        }
        model.extend(built);

        db.step()
            .unwrap_or_else(|err| panic!("seed {seed}, round {round}: {err}"));
        assert_matches_model(&db, &model, round);
    }
}

#[test]
fn test_random_sequences_match_model() {
    for seed in [1, 7, 42, 1_337, 90_210] {
        run(seed);
    }
}

#[test]
fn test_swap_remove_keeps_rows_dense() {
    let mut rng = StdRng::seed_from_u64(3);
    let descriptor = descriptor();
    let mut db = database();
    let group = GroupId(0);

    for i in 0..64 {
        db.factory()
            .build_entity(Egid::new(EntityId(i), group), &descriptor)
            .unwrap();
    }
    db.step().unwrap();

    let mut alive: Vec<u32> = (0..64).collect();
    while !alive.is_empty() {
        let victim = alive.swap_remove(rng.gen_range(0..alive.len()));
        let before = db.store().count::<Serial>(group);
        db.factory()
            .remove_entity(Egid::new(EntityId(victim), group), &descriptor);
        db.step().unwrap();

        if alive.is_empty() {
            // The emptied group is pruned at the end of the commit.
            assert!(!db.store().has_group(group));
            break;
        }
        assert_eq!(db.store().count::<Serial>(group), before - 1);
        let table = db.store().typed_table::<Serial>(group).unwrap().unwrap();
        assert!(table.check_invariants());
        for &entity in &alive {
            let row = table.row_of(EntityId(entity)).unwrap();
            assert!(row < table.len());
        }
    }
}
