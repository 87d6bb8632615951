mod common;

use category_db::prelude::*;
use category_db::{EntityError, OpError};
use common::{pos, setup, Health, Position};

#[test]
fn blueprint_entities_share_the_preresolved_category() {
    let (mut world, ids) = setup();
    let soldier = world.register_blueprint("soldier", &[ids.health, ids.position]).unwrap();
    assert_eq!(world.blueprint_id("soldier"), Some(soldier));

    let a = world.create_entity(&EntityCreateInfo::blueprint(soldier).immediate(true)).unwrap();
    let b = world.create_entity(&EntityCreateInfo::blueprint(soldier).immediate(true)).unwrap();

    let category = world.blueprints().blueprint(soldier).unwrap().category;
    assert_eq!(world.entity_mapping(a).unwrap().category, category);
    assert_eq!(world.entity_mapping(b).unwrap().category, category);
    assert_eq!(world.num_instances(category).unwrap(), 2);
    assert_eq!(world.get_value::<Health>(a, ids.health).unwrap(), Health(100));
}

#[test]
fn template_values_override_defaults() {
    let (mut world, ids) = setup();
    let soldier = world.register_blueprint("soldier", &[ids.position, ids.health, ids.frozen]).unwrap();
    let veteran = world
        .register_template(soldier, "veteran", &[(ids.health, bytemuck::bytes_of(&Health(250)))])
        .unwrap();
    let sentry = world
        .register_template(
            soldier,
            "sentry",
            &[(ids.position, bytemuck::bytes_of(&pos(5.0, 0.0, 1.0))), (ids.frozen, &[][..])],
        )
        .unwrap();
    assert_eq!(world.template_id("veteran"), Some(veteran));

    let v = world.create_entity(&EntityCreateInfo::template(veteran).immediate(true)).unwrap();
    let s = world.create_entity(&EntityCreateInfo::template(sentry).immediate(true)).unwrap();

    assert_eq!(world.get_value::<Health>(v, ids.health).unwrap(), Health(250));
    assert_eq!(world.get_value::<Position>(v, ids.position).unwrap(), pos(0.0, 0.0, 0.0));
    assert_eq!(world.get_value::<Health>(s, ids.health).unwrap(), Health(100));
    assert_eq!(world.get_value::<Position>(s, ids.position).unwrap(), pos(5.0, 0.0, 1.0));
    assert!(world.has_component(s, ids.frozen));
}

#[test]
fn deferred_template_entity_gets_values_at_flush() {
    let (mut world, ids) = setup();
    let soldier = world.register_blueprint("soldier", &[ids.health]).unwrap();
    let medic = world
        .register_template(soldier, "medic", &[(ids.health, bytemuck::bytes_of(&Health(60)))])
        .unwrap();

    let entity = world.create_entity(&EntityCreateInfo::template(medic)).unwrap();
    assert!(!world.is_active(entity));
    world.flush_instance_queues().unwrap();
    assert_eq!(world.get_value::<Health>(entity, ids.health).unwrap(), Health(60));
}

#[test]
fn template_values_must_belong_to_the_blueprint() {
    let (mut world, ids) = setup();
    let soldier = world.register_blueprint("soldier", &[ids.health]).unwrap();

    let outside = world
        .register_template(soldier, "bad", &[(ids.position, bytemuck::bytes_of(&pos(0.0, 0.0, 0.0)))])
        .unwrap_err();
    assert_eq!(outside, DbError::Entity(EntityError::NotInBlueprint { blueprint: soldier, component: ids.position }));

    let short = world.register_template(soldier, "bad", &[(ids.health, &[1u8][..])]).unwrap_err();
    assert_eq!(short, DbError::Op(OpError::ValueSize { component: ids.health, expected: 4, actual: 1 }));
    assert_eq!(world.template_id("bad"), None);
}

#[test]
fn names_are_unique() {
    let (mut world, ids) = setup();
    let soldier = world.register_blueprint("soldier", &[ids.health]).unwrap();
    assert!(matches!(
        world.register_blueprint("soldier", &[ids.position]),
        Err(DbError::Entity(EntityError::DuplicateName { kind: "blueprint", .. }))
    ));
    world.register_template(soldier, "medic", &[]).unwrap();
    assert!(matches!(
        world.register_template(soldier, "medic", &[]),
        Err(DbError::Entity(EntityError::DuplicateName { kind: "template", .. }))
    ));
}

#[test]
fn unknown_sources_allocate_nothing() {
    let (mut world, _) = setup();
    assert_eq!(
        world.create_entity(&EntityCreateInfo::blueprint(9)).unwrap_err(),
        DbError::Entity(EntityError::UnknownSource { kind: "blueprint", id: 9 })
    );
    assert_eq!(
        world.create_entity(&EntityCreateInfo::template(4).immediate(true)).unwrap_err(),
        DbError::Entity(EntityError::UnknownSource { kind: "template", id: 4 })
    );
    assert_eq!(world.num_entities(), 0);
    assert_eq!(world.pending_instance_ops(), 0);
}
