mod common;

use category_db::prelude::*;
use category_db::{EntityError, OpError, OwnedOp, RegistryError};
use common::{pos, setup, spawn, Health, Position, Velocity};

#[test]
fn add_op_migrates_entity_and_writes_value() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let source = world.entity_mapping(entity).unwrap().category;
    spawn(&mut world, &[ids.position]);
    assert_eq!(world.num_instances(source).unwrap(), 2);

    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_pod(entity, ids.health, &Health(50))).unwrap();
    let summary = world.dispatch(ops).unwrap();
    assert_eq!((summary.added, summary.removed, summary.migrations), (1, 0, 1));

    assert!(world.has_component(entity, ids.health));
    let mapping = world.entity_mapping(entity).unwrap();
    assert_ne!(mapping.category, source);
    let health = world.instance_column::<Health>(mapping.category, ids.health).unwrap();
    assert_eq!(health[mapping.instance as usize], Health(50));
    drop(health);

    let raw = world.instance_buffer(mapping.category, ids.health).unwrap();
    assert_eq!(raw.stride, 4);
    assert_eq!(world.num_instances(source).unwrap(), 1, "the source table loses the migrated row");
    assert_eq!(world.get_value::<Position>(entity, ids.position).unwrap(), pos(0.0, 0.0, 0.0));
}

#[test]
fn add_without_value_uses_default() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_default(entity, ids.health)).unwrap();
    world.dispatch(ops).unwrap();
    assert_eq!(world.get_value::<Health>(entity, ids.health).unwrap(), Health(100));
}

#[test]
fn adds_run_before_removes_regardless_of_recording_order() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);

    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::remove(entity, ids.velocity)).unwrap();
    world.add_op(&ops, Op::add_pod(entity, ids.velocity, &Velocity { dx: 1.0, dy: 0.0, dz: 0.0 })).unwrap();
    let summary = world.dispatch(ops).unwrap();

    assert_eq!((summary.added, summary.removed), (1, 1));
    assert!(!world.has_component(entity, ids.velocity));
    assert!(world.has_component(entity, ids.position));
}

#[test]
fn repeated_adds_overwrite_in_recording_order_without_migrating() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.health]);
    let category = world.entity_mapping(entity).unwrap().category;

    let ops = world.create_op_buffer();
    for hp in [1, 2, 3] {
        world.add_op(&ops, Op::add_pod(entity, ids.health, &Health(hp))).unwrap();
    }
    let summary = world.dispatch(ops).unwrap();

    assert_eq!(summary.migrations, 0, "adding a present component writes in place");
    assert_eq!(world.entity_mapping(entity).unwrap().category, category);
    assert_eq!(world.get_value::<Health>(entity, ids.health).unwrap(), Health(3));
}

#[test]
fn values_are_copied_at_record_time() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let ops = world.create_op_buffer();
    {
        let mut scratch = Health(7);
        world.add_op(&ops, Op::add_pod(entity, ids.health, &scratch)).unwrap();
        scratch.0 = -1;
        assert_eq!(scratch, Health(-1));
    }
    world.dispatch(ops).unwrap();
    assert_eq!(world.get_value::<Health>(entity, ids.health).unwrap(), Health(7));
}

#[test]
fn migration_keeps_values_of_surviving_components() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position, ids.velocity]);
    world.set_value(entity, ids.position, &pos(4.0, 5.0, 6.0)).unwrap();

    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_default(entity, ids.frozen)).unwrap();
    world.add_op(&ops, Op::remove(entity, ids.velocity)).unwrap();
    world.dispatch(ops).unwrap();

    assert!(world.has_component(entity, ids.frozen));
    assert!(!world.has_component(entity, ids.velocity));
    assert_eq!(world.get_value::<Position>(entity, ids.position).unwrap(), pos(4.0, 5.0, 6.0));
}

#[test]
fn removing_an_absent_component_fails_dispatch() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);

    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_default(entity, ids.health)).unwrap();
    world.add_op(&ops, Op::remove(entity, ids.velocity)).unwrap();
    let err = world.dispatch(ops).unwrap_err();

    assert_eq!(err, DbError::Op(OpError::ComponentMissing { entity, component: ids.velocity }));
    assert!(world.has_component(entity, ids.health), "ops before the failure stay applied");
}

#[test]
fn stale_entity_fails_dispatch() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_default(entity, ids.health)).unwrap();
    world.delete_entity(entity, true).unwrap();
    assert_eq!(world.dispatch(ops).unwrap_err(), DbError::Entity(EntityError::Stale(entity)));
}

#[test]
fn recording_validates_component_and_value_size() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let ops = world.create_op_buffer();

    assert_eq!(
        world.add_op(&ops, Op::add(entity, ids.health, &[0u8; 3])).unwrap_err(),
        DbError::Op(OpError::ValueSize { component: ids.health, expected: 4, actual: 3 })
    );
    assert_eq!(
        world.add_op(&ops, Op::remove(entity, 900)).unwrap_err(),
        DbError::Registry(RegistryError::UnknownComponent(900))
    );
    assert_eq!(world.discard_op_buffer(ops).unwrap(), 0, "rejected ops are not recorded");
}

#[test]
fn buffers_from_another_world_are_rejected() {
    let (mut world, ids) = setup();
    let (mut other, _) = setup();
    let entity = spawn(&mut world, &[ids.position]);

    let foreign = other.create_op_buffer();
    let err = world.add_op(&foreign, Op::add_default(entity, ids.health)).unwrap_err();
    assert!(matches!(err, DbError::Op(OpError::UnknownBuffer(_))));
    assert!(matches!(world.dispatch(foreign), Err(DbError::Op(OpError::UnknownBuffer(_)))));
}

#[test]
fn release_all_ops_refuses_while_buffers_hold_values() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);

    let pending = world.create_op_buffer();
    world.add_op(&pending, Op::add_pod(entity, ids.health, &Health(1))).unwrap();
    assert_eq!(world.pending_op_buffers(), 1);
    assert_eq!(world.release_all_ops().unwrap_err(), DbError::Op(OpError::BuffersPending(1)));

    world.dispatch(pending).unwrap();
    assert_eq!(world.pending_op_buffers(), 0);
    assert_eq!(world.release_all_ops().unwrap(), std::mem::size_of::<Health>());
    assert_eq!(world.release_all_ops().unwrap(), 0);
}

#[test]
fn buffers_without_values_do_not_block_release() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position, ids.health]);
    let ops = world.create_op_buffer();
    world.add_ops(&ops, [Op::add_default(entity, ids.frozen), Op::remove(entity, ids.health)]).unwrap();
    assert!(world.release_all_ops().is_ok());
    world.dispatch(ops).unwrap();
    assert!(world.has_component(entity, ids.frozen));
}

#[test]
fn discarded_buffer_applies_nothing() {
    let (mut world, ids) = setup();
    let entity = spawn(&mut world, &[ids.position]);
    let ops = world.create_op_buffer();
    world.add_op(&ops, Op::add_default(entity, ids.health)).unwrap();
    world.add_op(&ops, Op::remove(entity, ids.position)).unwrap();
    assert_eq!(world.discard_op_buffer(ops).unwrap(), 2);
    assert!(!world.has_component(entity, ids.health));
    assert!(world.has_component(entity, ids.position));
}

#[test]
fn shared_queue_collects_ops_from_many_threads() {
    let (mut world, ids) = setup();
    let entities: Vec<Entity> = (0..8).map(|_| spawn(&mut world, &[ids.position])).collect();
    let queue = SharedOpQueue::new();

    std::thread::scope(|scope| {
        for (i, &entity) in entities.iter().enumerate() {
            let queue = queue.clone();
            let health = ids.health;
            scope.spawn(move || {
                queue.push(Op::add_pod(entity, health, &Health(i as i32)));
            });
        }
    });
    assert_eq!(queue.len(), entities.len());

    let ops = world.create_op_buffer();
    assert_eq!(world.drain_shared_ops(&queue, &ops).unwrap(), entities.len());
    assert!(queue.is_empty());
    world.dispatch(ops).unwrap();

    for (i, &entity) in entities.iter().enumerate() {
        assert_eq!(world.get_value::<Health>(entity, ids.health).unwrap(), Health(i as i32));
    }
}

#[test]
fn owned_ops_round_trip_through_borrowed_form() {
    let (_, ids) = setup();
    let entity = Entity::new(3, 1);
    let owned = OwnedOp::from(Op::add_pod(entity, ids.health, &Health(9)));
    assert_eq!(owned.as_op(), Op::add(entity, ids.health, bytemuck::bytes_of(&Health(9))));
    assert_eq!(OwnedOp::from(Op::remove(entity, ids.frozen)).as_op(), Op::remove(entity, ids.frozen));
}
