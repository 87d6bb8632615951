//! # Category DB
//!
//! In-memory, archetype-style entity-component database. Entities with the
//! same exact component set share a *category*, and each category stores its
//! entities as rows of one dense, column-parallel table.
//!
//! ## Design Goals
//! - Column-parallel tables for cache-friendly iteration
//! - O(1) category lookup by order-independent hash
//! - Deferred structural changes applied at explicit sync points
//! - Zero-copy query results with checked, borrow-tracked access
//!
//! ## Quick tour
//! ```rust
//! use category_db::prelude::*;
//!
//! # fn main() -> DbResult<()> {
//! let mut world = World::default();
//! let health = world.register_pod("Health", 100i32, ComponentFlags::NONE)?;
//! let position = world.register_pod("Position", [0.0f32; 2], ComponentFlags::NONE)?;
//!
//! let unit = world.create_entity(&EntityCreateInfo::components(&[health]).immediate(true))?;
//!
//! let ops = world.create_op_buffer();
//! world.add_op(&ops, Op::add_pod(unit, position, &[1.0f32, 2.0]))?;
//! world.dispatch(ops)?;
//!
//! let filter = world.create_filter(&FilterCreateInfo::new().read(position).write(health))?;
//! let dataset = world.query(filter)?;
//! assert_eq!(dataset.total_rows(), 1);
//! let positions = world.column::<[f32; 2]>(&dataset, 0, 0)?;
//! assert_eq!(positions[0], [1.0, 2.0]);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::world::{FlushSummary, World};

pub use engine::config::WorldConfig;

pub use engine::registry::{ComponentFlags, ComponentInfo, InspectFn, TypeDescriptor, TypeRegistry};

pub use engine::entity::{Entity, EntityMapping, EntityState};

pub use engine::category::{Category, CategoryHash};

pub use engine::blueprint::{BlueprintID, EntityCreateInfo, EntitySource, TemplateID};

pub use engine::ops::{DispatchSummary, Op, OpBuffer, OwnedOp, SharedOpQueue};

pub use engine::filter::{Filter, FilterCreateInfo};

pub use engine::query::{ColumnMut, ColumnRef, Dataset, TableView, ViewAccess};

pub use engine::storage::RawColumn;

pub use engine::error::{
    CategoryError,
    DbError,
    DbResult,
    EntityError,
    OpError,
    QueryError,
    RegistryError,
    TableError,
};

pub use engine::types::{
    AccessMode,
    AccessSets,
    CategoryID,
    ComponentID,
    RowID,
    Signature,
    TableID,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used database types.
///
/// Import with:
/// ```rust
/// use category_db::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AccessMode,
        ComponentFlags,
        ComponentID,
        DbError,
        DbResult,
        Entity,
        EntityCreateInfo,
        FilterCreateInfo,
        Op,
        SharedOpQueue,
        World,
        WorldConfig,
    };
}
