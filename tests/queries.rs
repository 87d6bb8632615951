mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use category_db::prelude::*;
use category_db::QueryError;
use common::{pos, setup, spawn, Health, Position, Velocity};

fn populate(world: &mut World, ids: &common::Ids) {
    for i in 0..3 {
        let e = spawn(world, &[ids.position]);
        world.set_value(e, ids.position, &pos(i as f32, 0.0, 0.0)).unwrap();
    }
    for _ in 0..2 {
        spawn(world, &[ids.position, ids.velocity]);
    }
    spawn(world, &[ids.position, ids.velocity, ids.frozen]);
    spawn(world, &[ids.health]);
}

#[test]
fn query_visits_exactly_the_matching_tables() {
    let (mut world, ids) = setup();
    populate(&mut world, &ids);

    let filter = world
        .create_filter(&FilterCreateInfo::new().read(ids.position).without(ids.frozen))
        .unwrap();
    let dataset = world.query(filter).unwrap();

    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.total_rows(), 5);
    for view in dataset.views() {
        let table = world.database().table(view.table()).unwrap();
        assert!(table.has_component(ids.position));
        assert!(!table.has_component(ids.frozen));
    }
    let tables: Vec<_> = dataset.views().iter().map(|v| v.table()).collect();
    let mut sorted = tables.clone();
    sorted.sort_unstable();
    assert_eq!(tables, sorted, "views are in ascending table order");
}

#[test]
fn empty_tables_still_produce_views() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.velocity]);
    world.delete_entity(entity, true).unwrap();

    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.velocity)).unwrap();
    let dataset = world.query(filter).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.views()[0].rows(), 0);
    assert!(world.column::<Velocity>(&dataset, 0, 0).unwrap().is_empty());
}

#[test]
fn projection_follows_declaration_order() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position, ids.health]);
    world.set_value(entity, ids.position, &pos(1.0, 2.0, 3.0)).unwrap();

    let filter = world
        .create_filter(&FilterCreateInfo::new().write(ids.health).read(ids.position))
        .unwrap();
    let dataset = world.query(filter).unwrap();
    assert_eq!(dataset.projection(), &[ids.health, ids.position]);
    assert_eq!(dataset.access(), &[AccessMode::Write, AccessMode::Read]);

    let view = world.view(&dataset, 0).unwrap();
    assert_eq!(view.column::<Health>(0).unwrap()[0], Health(100));
    assert_eq!(view.column::<Position>(1).unwrap()[0], pos(1.0, 2.0, 3.0));
    assert_eq!(view.entities(), &[entity]);
}

#[test]
fn flag_slots_have_no_buffer() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.position, ids.frozen]);

    let filter = world
        .create_filter(&FilterCreateInfo::new().read(ids.frozen).read(ids.position))
        .unwrap();
    let dataset = world.query(filter).unwrap();
    let view = &dataset.views()[0];
    assert_eq!(view.slots(), 2);
    assert!(view.buffer(0).is_none());
    assert_eq!(view.buffer(1).unwrap().len, 1);
    assert_eq!(
        world.column::<u8>(&dataset, 0, 0).unwrap_err(),
        DbError::Query(QueryError::FlagComponent(ids.frozen))
    );
}

#[test]
fn write_guards_mutate_in_place() {
    let (mut world, ids) = setup();
    populate(&mut world, &ids);

    let filter = world
        .create_filter(&FilterCreateInfo::new().write(ids.position).without(ids.velocity))
        .unwrap();
    let dataset = world.query(filter).unwrap();
    {
        let mut positions = world.column_mut::<Position>(&dataset, 0, 0).unwrap();
        for p in positions.iter_mut() {
            p.y = p.x * 10.0;
        }
    }
    let positions = world.column::<Position>(&dataset, 0, 0).unwrap();
    let ys: Vec<f32> = positions.iter().map(|p| p.y).collect();
    assert_eq!(ys, vec![0.0, 10.0, 20.0]);
}

#[test]
fn read_only_slots_reject_write_guards() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.health]);
    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.health)).unwrap();
    let dataset = world.query(filter).unwrap();
    assert!(matches!(
        world.column_mut::<Health>(&dataset, 0, 0),
        Err(DbError::Query(QueryError::NotWritable { slot: 0 }))
    ));
}

#[test]
fn conflicting_guards_on_one_column_are_refused() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.health]);
    let filter = world.create_filter(&FilterCreateInfo::new().write(ids.health)).unwrap();
    let dataset = world.query(filter).unwrap();

    let first = world.column::<Health>(&dataset, 0, 0).unwrap();
    let second = world.column::<Health>(&dataset, 0, 0).unwrap();
    assert!(
        matches!(world.column_mut::<Health>(&dataset, 0, 0), Err(DbError::Query(QueryError::BorrowConflict { .. }))),
        "readers must block a writer"
    );
    drop((first, second));

    let writer = world.column_mut::<Health>(&dataset, 0, 0).unwrap();
    assert!(matches!(
        world.column::<Health>(&dataset, 0, 0),
        Err(DbError::Query(QueryError::BorrowConflict { .. }))
    ));
    drop(writer);
    assert!(world.column::<Health>(&dataset, 0, 0).is_ok(), "dropping the writer releases the column");
}

#[test]
fn guards_check_element_type() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.position]);
    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.position)).unwrap();
    let dataset = world.query(filter).unwrap();
    assert!(matches!(
        world.column::<Health>(&dataset, 0, 0),
        Err(DbError::Query(QueryError::TypeMismatch { registered: 12, requested: 4, .. }))
    ));
    assert!(world.column::<[f32; 3]>(&dataset, 0, 0).is_ok(), "any type of matching layout is accepted");
    assert!(matches!(
        world.column::<Position>(&dataset, 0, 1),
        Err(DbError::Query(QueryError::ProjectionOutOfBounds(1)))
    ));
    assert!(matches!(
        world.column::<Position>(&dataset, 3, 0),
        Err(DbError::Query(QueryError::ViewOutOfBounds(3)))
    ));
}

#[test]
fn structural_change_makes_dataset_stale() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.health]);
    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.health)).unwrap();
    let dataset = world.query(filter).unwrap();

    spawn(&mut world, &[ids.health]);
    assert!(matches!(
        world.column::<Health>(&dataset, 0, 0),
        Err(DbError::Query(QueryError::StaleDataset { .. }))
    ));

    let fresh = world.query(filter).unwrap();
    assert_eq!(world.column::<Health>(&fresh, 0, 0).unwrap().len(), 2);
}

#[test]
fn released_datasets_are_rejected() {
    let (mut world, ids) = setup();
    spawn(&mut world, &[ids.health]);
    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.health)).unwrap();
    let dataset = world.query(filter).unwrap();

    world.release_datasets();
    assert_eq!(world.view(&dataset, 0).err(), Some(DbError::Query(QueryError::ReleasedDataset)));
    assert_eq!(
        world.par_for_each_view(&dataset, |_| Ok(())),
        Err(DbError::Query(QueryError::ReleasedDataset))
    );
}

#[test]
fn parallel_views_write_disjoint_tables() {
    let (mut world, ids) = setup();
    for _ in 0..4 {
        spawn(&mut world, &[ids.health]);
        spawn(&mut world, &[ids.health, ids.position]);
        spawn(&mut world, &[ids.health, ids.velocity]);
    }
    let filter = world.create_filter(&FilterCreateInfo::new().write(ids.health)).unwrap();
    let dataset = world.query(filter).unwrap();
    assert_eq!(dataset.len(), 3);

    let visited = AtomicUsize::new(0);
    world
        .par_for_each_view(&dataset, |view| {
            let mut health = view.column_mut::<Health>(0)?;
            for hp in health.iter_mut() {
                hp.0 -= 1;
            }
            visited.fetch_add(view.rows(), Ordering::Relaxed);
            Ok(())
        })
        .unwrap();

    assert_eq!(visited.load(Ordering::Relaxed), 12);
    for index in 0..dataset.len() {
        assert!(world.column::<Health>(&dataset, index, 0).unwrap().iter().all(|hp| *hp == Health(99)));
    }
}

#[test]
fn filter_validation() {
    let (mut world, ids) = setup();
    assert_eq!(
        world.create_filter(&FilterCreateInfo::new().without(ids.frozen)).unwrap_err(),
        DbError::Query(QueryError::EmptyInclusive)
    );
    assert_eq!(
        world
            .create_filter(&FilterCreateInfo::new().read(ids.frozen).without(ids.frozen))
            .unwrap_err(),
        DbError::Query(QueryError::Contradiction(ids.frozen))
    );
    assert!(world.create_filter(&FilterCreateInfo::new().read(777)).is_err());
}

#[test]
fn destroyed_filters_cannot_be_queried() {
    let (mut world, ids) = setup();
    let filter = world.create_filter(&FilterCreateInfo::new().read(ids.health)).unwrap();
    world.destroy_filter(filter).unwrap();
    assert_eq!(
        world.query(filter).unwrap_err(),
        DbError::Query(QueryError::UnknownFilter(filter.id()))
    );
    assert!(world.destroy_filter(filter).is_err());
}

#[test]
fn access_sets_expose_write_conflicts() {
    let (mut world, ids) = setup();
    let movers = world
        .create_filter(&FilterCreateInfo::new().write(ids.position).read(ids.velocity))
        .unwrap();
    let readers = world.create_filter(&FilterCreateInfo::new().read(ids.position)).unwrap();
    let healers = world
        .create_filter(&FilterCreateInfo::new().write(ids.health).read(ids.velocity))
        .unwrap();

    assert!(world.filters_conflict(movers, readers).unwrap(), "write vs read of position");
    assert!(!world.filters_conflict(movers, healers).unwrap(), "shared reads never conflict");
    assert!(!world.filters_conflict(readers, healers).unwrap());

    let access = world.filter_access(movers).unwrap();
    assert!(access.write.contains(ids.position));
    assert!(access.read.contains(ids.velocity));
}
