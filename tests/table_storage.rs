mod common;

use category_db::engine::database::Database;
use category_db::engine::storage::Table;
use category_db::prelude::*;
use category_db::{TableError, TypeRegistry};
use common::{pos, setup, spawn, Health, Position};

fn registry() -> (TypeRegistry, ComponentID, ComponentID, ComponentID) {
    let mut registry = TypeRegistry::default();
    let position = registry.register_pod("Position", Position::default(), ComponentFlags::NONE).unwrap();
    let health = registry.register_pod("Health", Health(100), ComponentFlags::NONE).unwrap();
    let frozen = registry.register_flag("Frozen", ComponentFlags::NONE).unwrap();
    (registry, position, health, frozen)
}

#[test]
fn schema_is_sorted_and_flags_get_no_column() {
    let (registry, position, health, frozen) = registry();
    let table = Table::new(0, &[frozen, health, position, health], &registry, 0).unwrap();

    assert_eq!(table.schema(), &[position, health, frozen]);
    assert_eq!(table.columns().len(), 2, "flags must not allocate a column");
    assert!(table.has_component(frozen));
    assert_eq!(table.column_index(frozen), None);
    assert_eq!(table.column_index(health), Some(1));
    assert_eq!(table.columns()[0].stride(), std::mem::size_of::<Position>());
}

#[test]
fn capacity_doubles_from_eight_and_epoch_tracks_structure() {
    let (registry, position, health, _) = registry();
    let mut table = Table::new(0, &[position, health], &registry, 0).unwrap();
    assert_eq!(table.capacity(), 0);

    let mut last_epoch = table.epoch();
    for i in 0..9u32 {
        table.allocate_row(Entity::new(i, 0)).unwrap();
        assert!(table.epoch() > last_epoch, "every allocation must advance the epoch");
        last_epoch = table.epoch();
        if i < 8 {
            assert_eq!(table.capacity(), 8);
        }
    }
    assert_eq!(table.capacity(), 16);
    assert_eq!(table.len(), 9);

    for column in table.columns() {
        assert!(column.align().is_power_of_two());
    }
    assert_eq!(table.raw_buffer(0).unwrap().stride, 12);
}

#[test]
fn free_row_swaps_last_row_into_hole() {
    common::init_logging();
    let (registry, position, _, _) = registry();
    let mut table = Table::new(3, &[position], &registry, 4).unwrap();
    let (a, b, c) = (Entity::new(0, 0), Entity::new(1, 0), Entity::new(2, 0));
    for entity in [a, b, c] {
        table.allocate_row(entity).unwrap();
    }

    let moved = table.free_row(0).unwrap().expect("row 0 is not the last row");
    assert_eq!(moved.entity, c);
    assert_eq!(moved.to_row, 0);
    assert_eq!(table.entities(), &[c, b]);

    assert_eq!(table.free_row(1).unwrap(), None, "freeing the last row relocates nothing");
    assert_eq!(table.entities(), &[c]);

    assert_eq!(
        table.free_row(5).unwrap_err(),
        TableError::RowOutOfBounds { table: 3, row: 5, len: 1 }
    );
}

#[test]
fn raw_buffer_reports_live_rows() {
    let (registry, position, health, _) = registry();
    let mut table = Table::new(0, &[position, health], &registry, 0).unwrap();
    table.allocate_row(Entity::new(0, 0)).unwrap();
    table.allocate_row(Entity::new(1, 0)).unwrap();

    let raw = table.raw_buffer(1).unwrap();
    assert_eq!(raw.len, 2);
    assert_eq!(raw.stride, 4);
    assert!(table.raw_buffer(2).is_none());
}

#[test]
fn database_matches_tables_by_signature() {
    let (registry, position, health, frozen) = registry();
    let mut db = Database::new(0);
    let p = db.create_table(&[position], &registry).unwrap();
    let ph = db.create_table(&[position, health], &registry).unwrap();
    let phf = db.create_table(&[position, health, frozen], &registry).unwrap();

    let inc = category_db::engine::types::build_signature(&[position]);
    let exc = category_db::engine::types::build_signature(&[frozen]);
    let matched: Vec<_> = db.query(&inc, &exc).collect();
    assert_eq!(matched, vec![p, ph]);

    let inc = category_db::engine::types::build_signature(&[health]);
    let none = category_db::Signature::default();
    let matched: Vec<_> = db.query(&inc, &none).collect();
    assert_eq!(matched, vec![ph, phf]);

    assert_eq!(db.column_index(phf, frozen), None);
    assert!(matches!(db.buffer(phf, frozen), Err(TableError::MissingColumn { .. })));
    assert_eq!(db.table(42).unwrap_err(), TableError::UnknownTable(42));
}

#[test]
fn new_rows_start_at_registered_defaults() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position, ids.health]);
    let category = world.entity_mapping(entity).unwrap().category;

    let health = world.instance_column::<Health>(category, ids.health).unwrap();
    assert_eq!(health[0], Health(100));
    drop(health);
    assert_eq!(world.get_value::<Position>(entity, ids.position).unwrap(), pos(0.0, 0.0, 0.0));
}

#[test]
fn swap_remove_keeps_entity_mappings_consistent() {
    let (mut world, ids) = setup();
    let entities: Vec<Entity> = (0..5)
        .map(|i| {
            let e = spawn(&mut world, &[ids.position]);
            world.set_value(e, ids.position, &pos(i as f32, 0.0, 0.0)).unwrap();
            e
        })
        .collect();

    world.delete_entity(entities[1], true).unwrap();

    let category = world.entity_mapping(entities[0]).unwrap().category;
    assert_eq!(world.num_instances(category).unwrap(), 4);
    let last = entities[4];
    assert_eq!(world.instance_id(last), Some(1), "last row must fill the hole");
    assert_eq!(world.get_value::<Position>(last, ids.position).unwrap().x, 4.0);

    let table = world.database().table(world.category(category).unwrap().table).unwrap();
    for (row, entity) in table.entities().iter().enumerate() {
        assert_eq!(world.instance_id(*entity), Some(row as u32));
    }
}
