//! # Concurrent Producer Tests
//!
//! Factory clones used from several threads at once, while the owning
//! thread keeps committing:
//!
//! 1. **No lost builds**: every staged entity lands in exactly one commit
//! 2. **No lost operations**: removes enqueued concurrently are all applied
//!
//! Run with: cargo test --test concurrent_producers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use strata::{
    Component, ComponentId, ComponentRegistry, Egid, EntitiesDb, EntityDescriptor, EntityId,
    GroupId,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Owner(u32);

impl Component for Owner {
    const ID: ComponentId = ComponentId(0);
    const NAME: &'static str = "Owner";
}

const PRODUCERS: u32 = 4;
const PER_PRODUCER: u32 = 500;

fn database() -> EntitiesDb {
    let mut registry = ComponentRegistry::new();
    registry.register::<Owner>().unwrap();
    EntitiesDb::new(registry)
}

fn descriptor() -> EntityDescriptor {
    EntityDescriptor::builder("owned").with::<Owner>().build()
}

#[test]
fn test_builds_while_committing() {
    let mut db = database();
    let done = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let factory = db.factory().clone();
            let descriptor = descriptor();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let egid = Egid::new(EntityId(producer * PER_PRODUCER + i), GroupId(producer));
                    // Not initialized: a commit may consume the generation
                    // between build and init.
                    factory.build_entity(egid, &descriptor).unwrap();
                }
            })
        })
        .collect();

    let watcher = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for handle in handles {
                handle.join().unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    while !done.load(Ordering::Acquire) {
        db.step().unwrap();
    }
    watcher.join().unwrap();
    db.step().unwrap();

    for producer in 0..PRODUCERS {
        let owned = db.store().query::<Owner>(GroupId(producer)).unwrap();
        assert_eq!(owned.len(), PER_PRODUCER as usize);
        let first = producer * PER_PRODUCER;
        assert!(owned
            .entity_ids()
            .iter()
            .all(|entity| (first..first + PER_PRODUCER).contains(&entity.0)));
    }
    assert!(!db.has_pending_work());
}

#[test]
fn test_concurrent_removes_all_applied() {
    let mut db = database();
    let group = GroupId(0);
    let total = PRODUCERS * PER_PRODUCER;
    for i in 0..total {
        db.factory()
            .build_entity(Egid::new(EntityId(i), group), &descriptor())
            .unwrap();
    }
    db.step().unwrap();

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let factory = db.factory().clone();
            scope.spawn(move || {
                let descriptor = descriptor();
                for i in 0..PER_PRODUCER {
                    let entity = EntityId(producer * PER_PRODUCER + i);
                    factory.remove_entity(Egid::new(entity, group), &descriptor);
                }
            });
        }
    });

    assert_eq!(db.factory().pending_operations(), total as usize);
    let stats = db.step().unwrap();
    assert_eq!(stats.entities_removed, total as usize);
    assert_eq!(stats.groups_pruned, 1);
    assert_eq!(db.store().count::<Owner>(group), 0);
}
