//! # Deferred Op Buffers
//!
//! Structural changes (adding or removing a component) are recorded into an
//! [`OpBuffer`] and applied together by
//! [`World::dispatch`](crate::engine::world::World::dispatch).
//!
//! ## Purpose
//! Recording is cheap and never touches tables, so callers can collect
//! changes while datasets are being read and apply them at a single
//! synchronization point.
//!
//! ## Design
//! - A buffer keeps two FIFO queues: adds and removes. Dispatch drains all
//!   adds first, then all removes, each in recording order.
//! - Values supplied with an add are copied into an op-scoped byte arena at
//!   record time, so the caller's memory can be reused immediately.
//! - The arena is reset in bulk by
//!   [`World::release_all_ops`](crate::engine::world::World::release_all_ops)
//!   once no undispatched buffer references it.
//! - [`OpBuffer`] is a move-only handle. Dispatch consumes it, so a buffer
//!   cannot be dispatched twice.
//!
//! ## Cross-thread recording
//! [`SharedOpQueue`] is the one coarse critical section: producers on any
//! thread push owned ops under a `parking_lot::Mutex`, and the owner of the
//! world drains them into a buffer at the barrier.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::engine::entity::Entity;
use crate::engine::error::OpError;
use crate::engine::types::ComponentID;


/// A structural change to record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op<'v> {
    /// Adds `component` to `entity`, optionally with an initial value.
    ///
    /// Without a value the component starts at its registered default. If
    /// the entity already has the component, a supplied value overwrites it
    /// in place and nothing migrates.
    Add {
        /// Target entity.
        entity: Entity,
        /// Component to add.
        component: ComponentID,
        /// One element of raw bytes, or `None` for the default.
        value: Option<&'v [u8]>,
    },

    /// Removes `component` from `entity`.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Component to remove.
        component: ComponentID,
    },
}

impl<'v> Op<'v> {
    /// Add op carrying raw bytes.
    pub fn add(entity: Entity, component: ComponentID, value: &'v [u8]) -> Self {
        Op::Add { entity, component, value: Some(value) }
    }

    /// Add op carrying a typed value.
    pub fn add_pod<T: Pod>(entity: Entity, component: ComponentID, value: &'v T) -> Self {
        Op::Add { entity, component, value: Some(bytemuck::bytes_of(value)) }
    }

    /// Add op that uses the registered default (and the only form for flags).
    pub fn add_default(entity: Entity, component: ComponentID) -> Self {
        Op::Add { entity, component, value: None }
    }

    /// Remove op.
    pub fn remove(entity: Entity, component: ComponentID) -> Self {
        Op::Remove { entity, component }
    }
}

/// Move-only handle to a recording buffer owned by a world.
#[must_use = "an op buffer does nothing until it is dispatched or discarded"]
#[derive(Debug, PartialEq, Eq)]
pub struct OpBuffer {
    pub(crate) slot: u32,
    pub(crate) owner: u32,
}

impl OpBuffer {
    /// Slot number, for diagnostics.
    pub fn id(&self) -> u32 { self.slot }
}

/// Counts reported by a successful dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Add ops applied.
    pub added: usize,
    /// Remove ops applied.
    pub removed: usize,
    /// Rows that changed table.
    pub migrations: usize,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ArenaSlice {
    offset: usize,
    len: usize,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordedOp {
    pub(crate) entity: Entity,
    pub(crate) component: ComponentID,
    pub(crate) value: Option<ArenaSlice>,
}

#[derive(Debug, Default)]
pub(crate) struct OpQueues {
    pub(crate) adds: Vec<RecordedOp>,
    pub(crate) removes: Vec<RecordedOp>,
}

impl OpQueues {
    fn holds_values(&self) -> bool {
        self.adds.iter().any(|op| op.value.is_some())
    }
}

/// Bump arena for op-scoped values. Offsets stay valid across growth.
#[derive(Debug, Default)]
pub(crate) struct OpArena {
    bytes: Vec<u8>,
}

impl OpArena {
    fn with_capacity(capacity: usize) -> Self {
        Self { bytes: Vec::with_capacity(capacity) }
    }

    fn push(&mut self, value: &[u8]) -> ArenaSlice {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(value);
        ArenaSlice { offset, len: value.len() }
    }

    pub(crate) fn get(&self, slice: ArenaSlice) -> &[u8] {
        &self.bytes[slice.offset..slice.offset + slice.len]
    }

    fn reset(&mut self) {
        self.bytes.clear();
    }

    fn len(&self) -> usize { self.bytes.len() }
}

static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

/// Buffer slots and the shared value arena of one world.
#[derive(Debug)]
pub(crate) struct OpStore {
    owner: u32,
    slots: Vec<Option<OpQueues>>,
    free: Vec<u32>,
    pub(crate) arena: OpArena,
}

impl OpStore {
    pub(crate) fn new(arena_capacity: usize) -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            arena: OpArena::with_capacity(arena_capacity),
        }
    }

    pub(crate) fn create(&mut self) -> OpBuffer {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(OpQueues::default());
                slot
            }
            None => {
                self.slots.push(Some(OpQueues::default()));
                (self.slots.len() - 1) as u32
            }
        };
        OpBuffer { slot, owner: self.owner }
    }

    /// Appends `op`. The value, if any, must already be size-checked.
    pub(crate) fn record(&mut self, buffer: &OpBuffer, op: Op<'_>) -> Result<(), OpError> {
        self.queues_mut(buffer)?;
        match op {
            Op::Add { entity, component, value } => {
                let value = value.map(|bytes| self.arena.push(bytes));
                self.queues_mut(buffer)?.adds.push(RecordedOp { entity, component, value });
            }
            Op::Remove { entity, component } => {
                self.queues_mut(buffer)?.removes.push(RecordedOp { entity, component, value: None });
            }
        }
        Ok(())
    }

    /// Detaches the queues of `buffer`, freeing its slot.
    pub(crate) fn take(&mut self, buffer: OpBuffer) -> Result<OpQueues, OpError> {
        self.queues_mut(&buffer)?;
        let queues = self.slots[buffer.slot as usize].take().unwrap_or_default();
        self.free.push(buffer.slot);
        Ok(queues)
    }

    pub(crate) fn pending(&self) -> usize {
        self.slots.iter().flatten().filter(|queues| queues.holds_values()).count()
    }

    pub(crate) fn release(&mut self) -> Result<usize, OpError> {
        let pending = self.pending();
        if pending > 0 {
            return Err(OpError::BuffersPending(pending));
        }
        let released = self.arena.len();
        self.arena.reset();
        Ok(released)
    }

    fn queues_mut(&mut self, buffer: &OpBuffer) -> Result<&mut OpQueues, OpError> {
        if buffer.owner != self.owner {
            return Err(OpError::UnknownBuffer(buffer.slot));
        }
        self.slots
            .get_mut(buffer.slot as usize)
            .and_then(Option::as_mut)
            .ok_or(OpError::UnknownBuffer(buffer.slot))
    }
}

/// An op with an owned value, as stored by [`SharedOpQueue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnedOp {
    /// See [`Op::Add`].
    Add {
        /// Target entity.
        entity: Entity,
        /// Component to add.
        component: ComponentID,
        /// Owned value bytes.
        value: Option<Box<[u8]>>,
    },
    /// See [`Op::Remove`].
    Remove {
        /// Target entity.
        entity: Entity,
        /// Component to remove.
        component: ComponentID,
    },
}

impl OwnedOp {
    /// Borrowed form for recording.
    pub fn as_op(&self) -> Op<'_> {
        match self {
            OwnedOp::Add { entity, component, value } => {
                Op::Add { entity: *entity, component: *component, value: value.as_deref() }
            }
            OwnedOp::Remove { entity, component } => Op::Remove { entity: *entity, component: *component },
        }
    }
}

impl From<Op<'_>> for OwnedOp {
    fn from(op: Op<'_>) -> Self {
        match op {
            Op::Add { entity, component, value } => OwnedOp::Add { entity, component, value: value.map(Into::into) },
            Op::Remove { entity, component } => OwnedOp::Remove { entity, component },
        }
    }
}

/// Thread-safe op inbox. Clones share the same queue.
#[derive(Clone, Debug, Default)]
pub struct SharedOpQueue {
    inner: Arc<Mutex<Vec<OwnedOp>>>,
}

impl SharedOpQueue {
    /// Creates an empty queue.
    pub fn new() -> Self { Self::default() }

    /// Pushes an op from any thread; its value is copied.
    pub fn push(&self, op: Op<'_>) {
        self.inner.lock().push(op.into());
    }

    /// Pushes several ops under a single lock.
    pub fn extend<'v>(&self, ops: impl IntoIterator<Item = Op<'v>>) {
        let mut queue = self.inner.lock();
        queue.extend(ops.into_iter().map(OwnedOp::from));
    }

    /// Number of queued ops.
    pub fn len(&self) -> usize { self.inner.lock().len() }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool { self.inner.lock().is_empty() }

    /// Takes every queued op, in push order.
    pub fn drain(&self) -> Vec<OwnedOp> {
        std::mem::take(&mut *self.inner.lock())
    }
}
