//! # Entity Directory
//!
//! Entities are generational handles into a slot pool. Each slot remembers
//! its current generation and, once the entity is placed, where its row
//! lives (`category`, `instance`).
//!
//! ## Lifecycle
//!
//! ```text
//! Unallocated ──allocate──▶ Allocated ──place──▶ Instantiated
//!      ▲                        │                     │
//!      └─────────deallocate─────┴─────────────────────┘   (generation += 1)
//! ```
//!
//! A handle is valid while its generation equals the slot's generation and
//! the slot is live. Deallocation bumps the generation, so every copy of the
//! old handle becomes invalid at once, and the freed index is reused LIFO.
//!
//! ## Invariants
//! - A slot is on the free list if and only if it is not live.
//! - An instantiated slot's mapping names the row whose back-map entry is
//!   this entity.

use std::fmt;

use crate::engine::error::EntityError;
use crate::engine::types::{CategoryID, Generation, IndexID, RowID};


/// Generational entity handle, packed as `generation << 32 | index`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// Builds a handle from its parts.
    #[inline]
    pub const fn new(index: IndexID, generation: Generation) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// Slot index.
    #[inline]
    pub const fn index(self) -> IndexID { self.0 as IndexID }

    /// Generation the handle was issued with.
    #[inline]
    pub const fn generation(self) -> Generation { (self.0 >> 32) as Generation }

    /// Packed representation.
    #[inline]
    pub const fn to_bits(self) -> u64 { self.0 }

    /// Rebuilds a handle from [`to_bits`](Self::to_bits).
    #[inline]
    pub const fn from_bits(bits: u64) -> Self { Self(bits) }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

/// Where an instantiated entity's row lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityMapping {
    /// Category whose table holds the row.
    pub category: CategoryID,
    /// Row within that table.
    pub instance: RowID,
}

/// Observable lifecycle state of a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityState {
    /// The handle does not name a live slot (never issued or deleted).
    Invalid,
    /// Issued, but its row has not been placed yet.
    Allocated,
    /// Issued and placed in a table.
    Instantiated,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: Generation,
    live: bool,
    pending_delete: bool,
    mapping: Option<EntityMapping>,
}

/// Slot pool with generation counters and a LIFO free list.
#[derive(Debug, Default)]
pub struct EntityPool {
    slots: Vec<Slot>,
    free: Vec<IndexID>,
    live: usize,
}

impl EntityPool {
    /// Creates a pool with `reserve` slots pre-reserved.
    pub fn with_capacity(reserve: usize) -> Self {
        Self { slots: Vec::with_capacity(reserve), free: Vec::new(), live: 0 }
    }

    /// Issues a handle, recycling the most recently freed index first.
    ///
    /// ## Errors
    /// `CapacityExceeded` when every `IndexID` is in use.

    pub fn allocate(&mut self) -> Result<Entity, EntityError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = IndexID::try_from(self.slots.len()).map_err(|_| EntityError::CapacityExceeded)?;
                self.slots.push(Slot::default());
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        slot.pending_delete = false;
        slot.mapping = None;
        self.live += 1;
        Ok(Entity::new(index, slot.generation))
    }

    /// Retires a handle, bumping its slot's generation.
    ///
    /// ## Errors
    /// `Stale` if the handle is not valid.

    pub fn deallocate(&mut self, entity: Entity) -> Result<Option<EntityMapping>, EntityError> {
        let slot = self.slot_mut(entity)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.live = false;
        slot.pending_delete = false;
        let mapping = slot.mapping.take();
        self.free.push(entity.index());
        self.live -= 1;
        Ok(mapping)
    }

    /// Returns `true` if the handle names a live slot.
    #[inline]
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index() as usize)
            .is_some_and(|slot| slot.live && slot.generation == entity.generation())
    }

    /// Lifecycle state of `entity`.
    pub fn state(&self, entity: Entity) -> EntityState {
        match self.slot(entity) {
            Ok(slot) if slot.mapping.is_some() => EntityState::Instantiated,
            Ok(_) => EntityState::Allocated,
            Err(_) => EntityState::Invalid,
        }
    }

    /// Mapping of a valid entity, `None` while not placed.
    pub fn mapping(&self, entity: Entity) -> Result<Option<EntityMapping>, EntityError> {
        Ok(self.slot(entity)?.mapping)
    }

    /// Mapping of a valid, instantiated entity.
    pub fn placed(&self, entity: Entity) -> Result<EntityMapping, EntityError> {
        self.mapping(entity)?.ok_or(EntityError::NotInstantiated(entity))
    }

    /// Records where `entity` now lives.
    pub fn set_mapping(&mut self, entity: Entity, mapping: Option<EntityMapping>) -> Result<(), EntityError> {
        self.slot_mut(entity)?.mapping = mapping;
        Ok(())
    }

    /// Updates the row of an entity relocated by a swap-remove.
    ///
    /// ## Panics
    /// Panics if `entity` is not a live, placed entity. A table back-map
    /// naming a dead entity means the directory is corrupt.

    pub fn relocate(&mut self, entity: Entity, row: RowID) {
        match self.slot_mut(entity) {
            Ok(Slot { mapping: Some(mapping), .. }) => mapping.instance = row,
            _ => panic!("table back-map names entity {entity} which is not placed"),
        }
    }

    /// Marks a valid entity as queued for deletion.
    pub fn mark_pending_delete(&mut self, entity: Entity) -> Result<(), EntityError> {
        let slot = self.slot_mut(entity)?;
        if slot.pending_delete {
            return Err(EntityError::PendingDeletion(entity));
        }
        slot.pending_delete = true;
        Ok(())
    }

    /// Returns `true` if `entity` is valid and queued for deletion.
    pub fn is_pending_delete(&self, entity: Entity) -> bool {
        self.slot(entity).is_ok_and(|slot| slot.pending_delete)
    }

    /// Fails with `PendingDeletion` if the entity is queued for deletion.
    pub fn ensure_not_pending(&self, entity: Entity) -> Result<(), EntityError> {
        if self.slot(entity)?.pending_delete {
            return Err(EntityError::PendingDeletion(entity));
        }
        Ok(())
    }

    /// Live handles.
    #[inline]
    pub fn len(&self) -> usize { self.live }

    /// Returns `true` if no handle is live.
    #[inline]
    pub fn is_empty(&self) -> bool { self.live == 0 }

    fn slot(&self, entity: Entity) -> Result<&Slot, EntityError> {
        self.slots
            .get(entity.index() as usize)
            .filter(|slot| slot.live && slot.generation == entity.generation())
            .ok_or(EntityError::Stale(entity))
    }

    fn slot_mut(&mut self, entity: Entity) -> Result<&mut Slot, EntityError> {
        self.slots
            .get_mut(entity.index() as usize)
            .filter(|slot| slot.live && slot.generation == entity.generation())
            .ok_or(EntityError::Stale(entity))
    }
}
