//! Filter construction and storage.
//!
//! A filter describes *which tables* a query visits and *how* it touches
//! their columns:
//!
//! * **inclusive** components must all be present and form the projection,
//!   in declaration order, each with an [`AccessMode`];
//! * **exclusive** components must all be absent.
//!
//! [`FilterCreateInfo`] is the builder; [`World::create_filter`] compiles it
//! into bitmask signatures and returns a copyable [`Filter`] handle that
//! stays valid until [`World::destroy_filter`].
//!
//! ## Scheduling
//! [`FilterStore::access`] exposes the read/write sets of a filter so a
//! scheduler can prove two filters never alias a writable column
//! ([`AccessSets::conflicts_with`]).
//!
//! [`World::create_filter`]: crate::engine::world::World::create_filter
//! [`World::destroy_filter`]: crate::engine::world::World::destroy_filter

use crate::engine::error::QueryError;
use crate::engine::types::{AccessMode, AccessSets, ComponentID, Signature};


/// Builder for a filter.
///
/// ## Example
/// ```ignore
/// let info = FilterCreateInfo::new()
///     .write(position)
///     .read(velocity)
///     .without(frozen);
/// let filter = world.create_filter(&info)?;
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCreateInfo {
    inclusive: Vec<(ComponentID, AccessMode)>,
    exclusive: Vec<ComponentID>,
}

impl FilterCreateInfo {
    /// Creates an empty builder.
    pub fn new() -> Self { Self::default() }

    /// Requires `component` and projects it with `mode`.
    pub fn include(mut self, component: ComponentID, mode: AccessMode) -> Self {
        self.inclusive.push((component, mode));
        self
    }

    /// Requires `component` and projects it read-only.
    pub fn read(self, component: ComponentID) -> Self {
        self.include(component, AccessMode::Read)
    }

    /// Requires `component` and projects it writable.
    pub fn write(self, component: ComponentID) -> Self {
        self.include(component, AccessMode::Write)
    }

    /// Requires `component` to be absent.
    pub fn without(mut self, component: ComponentID) -> Self {
        self.exclusive.push(component);
        self
    }

    /// Inclusive components and their access modes, in declaration order.
    pub fn inclusive(&self) -> &[(ComponentID, AccessMode)] { &self.inclusive }

    /// Exclusive components.
    pub fn exclusive(&self) -> &[ComponentID] { &self.exclusive }
}

/// Handle to a compiled filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    index: u32,
    generation: u32,
}

impl Filter {
    /// Slot number, for diagnostics.
    pub fn id(&self) -> u32 { self.index }
}

/// Immutable compiled form of a [`FilterCreateInfo`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFilter {
    /// Components every matched table must contain.
    pub inclusive: Signature,
    /// Components every matched table must lack.
    pub exclusive: Signature,
    /// Projection order.
    pub projection: Vec<ComponentID>,
    /// Access mode per projection slot.
    pub access: Vec<AccessMode>,
    /// Aggregated access for conflict checks.
    pub access_sets: AccessSets,
}

impl CompiledFilter {
    /// Compiles a builder.
    ///
    /// ## Errors
    /// - `EmptyInclusive` if no inclusive component was named.
    /// - `Contradiction` if a component is both included and excluded.
    ///
    /// A component projected twice keeps both slots; its access set entry is
    /// the stronger of the two modes.

    pub fn compile(info: &FilterCreateInfo) -> Result<Self, QueryError> {
        if info.inclusive.is_empty() {
            return Err(QueryError::EmptyInclusive);
        }
        let mut inclusive = Signature::default();
        let mut exclusive = Signature::default();
        let mut access_sets = AccessSets::default();
        for &(component, mode) in &info.inclusive {
            inclusive.insert(component);
            access_sets.insert(component, mode);
        }
        for &component in &info.exclusive {
            if inclusive.contains(component) {
                return Err(QueryError::Contradiction(component));
            }
            exclusive.insert(component);
        }
        Ok(Self {
            inclusive,
            exclusive,
            projection: info.inclusive.iter().map(|(component, _)| *component).collect(),
            access: info.inclusive.iter().map(|(_, mode)| *mode).collect(),
            access_sets,
        })
    }
}

#[derive(Debug, Default)]
struct FilterSlot {
    generation: u32,
    filter: Option<CompiledFilter>,
}

/// Generational storage of compiled filters.
#[derive(Debug, Default)]
pub struct FilterStore {
    slots: Vec<FilterSlot>,
    free: Vec<u32>,
}

impl FilterStore {
    /// Stores a compiled filter and returns its handle.
    pub fn insert(&mut self, filter: CompiledFilter) -> Filter {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(FilterSlot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.filter = Some(filter);
        Filter { index, generation: slot.generation }
    }

    /// Drops the filter behind `handle`.
    pub fn remove(&mut self, handle: Filter) -> Result<CompiledFilter, QueryError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(QueryError::UnknownFilter(handle.index))?;
        let filter = slot.filter.take().ok_or(QueryError::UnknownFilter(handle.index))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(filter)
    }

    /// Compiled filter behind `handle`.
    pub fn get(&self, handle: Filter) -> Result<&CompiledFilter, QueryError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.filter.as_ref())
            .ok_or(QueryError::UnknownFilter(handle.index))
    }

    /// Read/write sets of `handle`.
    pub fn access(&self, handle: Filter) -> Result<AccessSets, QueryError> {
        Ok(self.get(handle)?.access_sets)
    }

    /// Live filters.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.filter.is_some()).count()
    }

    /// Returns `true` if no filter is live.
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
