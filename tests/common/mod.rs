#![allow(dead_code)]

use std::sync::Once;

use bytemuck::{Pod, Zeroable};
use category_db::prelude::*;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Health(pub i32);

pub struct Ids {
    pub position: ComponentID,
    pub velocity: ComponentID,
    pub health: ComponentID,
    pub frozen: ComponentID,
}

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Position, Velocity, Health (default 100) and the `Frozen` flag, in that id order.
pub fn setup() -> (World, Ids) {
    init_logging();
    let mut world = World::default();
    let ids = Ids {
        position: world.register_pod("Position", Position::default(), ComponentFlags::NONE).unwrap(),
        velocity: world.register_pod("Velocity", Velocity::default(), ComponentFlags::NONE).unwrap(),
        health: world.register_pod("Health", Health(100), ComponentFlags::NONE).unwrap(),
        frozen: world.register_flag("Frozen", ComponentFlags::NONE).unwrap(),
    };
    (world, ids)
}

pub fn spawn(world: &mut World, components: &[ComponentID]) -> Entity {
    world
        .create_entity(&EntityCreateInfo::components(components).immediate(true))
        .expect("immediate creation should succeed")
}

pub fn pos(x: f32, y: f32, z: f32) -> Position {
    Position { x, y, z }
}
