#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use category_db::prelude::*;

pub const ENTITIES_SMALL: usize = 10_000;
pub const ENTITIES_MED: usize = 100_000;

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Default, Pod, Zeroable)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[repr(transparent)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Wealth(pub f32);

pub struct Ids {
    pub position: ComponentID,
    pub velocity: ComponentID,
    pub wealth: ComponentID,
    pub tagged: ComponentID,
}

pub fn register(world: &mut World) -> DbResult<Ids> {
    Ok(Ids {
        position: world.register_pod("Position", Position::default(), ComponentFlags::NONE)?,
        velocity: world.register_pod("Velocity", Velocity { dx: 1.0, dy: 0.5 }, ComponentFlags::NONE)?,
        wealth: world.register_pod("Wealth", Wealth(100.0), ComponentFlags::NONE)?,
        tagged: world.register_flag("Tagged", ComponentFlags::NONE)?,
    })
}

/// `count` entities spread over four categories that all carry Position.
pub fn setup_world(count: usize) -> DbResult<(World, Ids, Vec<Entity>)> {
    let mut world = World::new(WorldConfig::default().with_entity_reserve(count));
    let ids = register(&mut world)?;
    let shapes = [
        vec![ids.position],
        vec![ids.position, ids.velocity],
        vec![ids.position, ids.wealth],
        vec![ids.position, ids.velocity, ids.wealth],
    ];

    let mut entities = Vec::with_capacity(count);
    for i in 0..count {
        let info = EntityCreateInfo::components(&shapes[i % shapes.len()]).immediate(true);
        entities.push(world.create_entity(&info)?);
    }
    Ok((world, ids, entities))
}
