//! World configuration.

use crate::engine::types::COMPONENT_CAP;


/// Sizing knobs applied when a [`World`](crate::engine::world::World) is built.
///
/// All values are reservations or limits; none of them change semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Rows reserved in every newly created table. `0` grows on first insert.
    pub initial_table_capacity: usize,
    /// Slots pre-reserved in the entity pool and mapping array.
    pub entity_reserve: usize,
    /// Bytes reserved for op-scoped component values.
    pub op_arena_capacity: usize,
    /// Maximum number of registered components (clamped to `COMPONENT_CAP`).
    pub component_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            initial_table_capacity: 0,
            entity_reserve: 0,
            op_arena_capacity: 4096,
            component_capacity: COMPONENT_CAP,
        }
    }
}

impl WorldConfig {
    /// Sets [`initial_table_capacity`](Self::initial_table_capacity).
    pub fn with_initial_table_capacity(mut self, rows: usize) -> Self {
        self.initial_table_capacity = rows;
        self
    }

    /// Sets [`entity_reserve`](Self::entity_reserve).
    pub fn with_entity_reserve(mut self, slots: usize) -> Self {
        self.entity_reserve = slots;
        self
    }

    /// Sets [`op_arena_capacity`](Self::op_arena_capacity).
    pub fn with_op_arena_capacity(mut self, bytes: usize) -> Self {
        self.op_arena_capacity = bytes;
        self
    }

    /// Sets [`component_capacity`](Self::component_capacity).
    pub fn with_component_capacity(mut self, components: usize) -> Self {
        self.component_capacity = components.min(COMPONENT_CAP);
        self
    }
}
