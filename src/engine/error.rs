//! Error types for registration, storage, structural changes, and queries.
//!
//! Each layer of the database owns a focused error enum that carries enough
//! context to make a failure actionable (offending ids, expected vs. actual
//! sizes, the stale handle). Higher layers bubble them with `?` into the
//! aggregate [`DbError`].
//!
//! ## Typical flow
//! ```ignore
//! fn tag(world: &mut World, e: Entity, flag: ComponentID) -> DbResult<()> {
//!     let buffer = world.create_op_buffer();
//!     world.add_op(&buffer, Op::add_default(e, flag))?; // OpError -> DbError
//!     world.dispatch(buffer)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure classes
//! * Contract violations (stale entity, removing an absent component, empty
//!   filter) come back as `Err` in every build profile.
//! * Lookup misses are not errors; they return `Option::None`.
//! * Internal corruption panics; there is no degraded mode.

use thiserror::Error;

use crate::engine::entity::Entity;
use crate::engine::types::{CategoryID, ComponentID, RowID, TableID};


/// Failures raised by the type registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No more component ids are available.
    #[error("component registry is full ({cap} components)")]
    CapacityExceeded {
        /// Configured maximum.
        cap: usize,
    },

    /// A name was re-registered with a different element size.
    #[error("component `{name}` already registered with size {registered}, got {requested}")]
    SizeMismatch {
        /// Component name.
        name: String,
        /// Size on record.
        registered: usize,
        /// Size passed by the caller.
        requested: usize,
    },

    /// A name was re-registered with a different alignment.
    #[error("component `{name}` already registered with alignment {registered}, got {requested}")]
    AlignMismatch {
        /// Component name.
        name: String,
        /// Alignment on record.
        registered: usize,
        /// Alignment passed by the caller.
        requested: usize,
    },

    /// A name was re-registered with different flags.
    #[error("component `{name}` already registered with flags {registered:#x}, got {requested:#x}")]
    FlagsMismatch {
        /// Component name.
        name: String,
        /// Flags on record.
        registered: u32,
        /// Flags passed by the caller.
        requested: u32,
    },

    /// The default value does not have exactly `size` bytes.
    #[error("default value for `{name}` has {actual} bytes, expected {expected}")]
    DefaultValueSize {
        /// Component name.
        name: String,
        /// Declared component size.
        expected: usize,
        /// Length of the supplied default.
        actual: usize,
    },

    /// Alignment is zero or not a power of two.
    #[error("component `{name}` has invalid alignment {align}")]
    InvalidAlignment {
        /// Component name.
        name: String,
        /// Offending alignment.
        align: usize,
    },

    /// The id was never handed out by this registry.
    #[error("unknown component id {0}")]
    UnknownComponent(ComponentID),
}

/// Failures raised by tables and the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Row index past the live row count.
    #[error("row {row} out of bounds for table {table} with {len} rows")]
    RowOutOfBounds {
        /// Table being accessed.
        table: TableID,
        /// Requested row.
        row: RowID,
        /// Live row count.
        len: usize,
    },

    /// The component has no column in this table (absent or a flag).
    #[error("table {table} has no column for component {component}")]
    MissingColumn {
        /// Table being accessed.
        table: TableID,
        /// Requested component.
        component: ComponentID,
    },

    /// Growing the table would overflow the row or byte range.
    #[error("table {table} cannot grow beyond {rows} rows")]
    CapacityOverflow {
        /// Table being grown.
        table: TableID,
        /// Row count that was requested.
        rows: usize,
    },

    /// The id does not name a table.
    #[error("unknown table id {0}")]
    UnknownTable(TableID),

    /// No more table ids are available.
    #[error("database cannot hold more than {0} tables")]
    TooManyTables(usize),
}

/// Failures raised by the category layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    /// The id does not name a category.
    #[error("unknown category id {0}")]
    UnknownCategory(CategoryID),

    /// Two distinct component sets produced the same hash.
    #[error("category hash {hash:#018x} already maps to category {existing} with a different component set")]
    HashCollision {
        /// Colliding hash value.
        hash: u64,
        /// Category that owns the hash.
        existing: CategoryID,
    },
}

/// Failures raised by the entity directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// Handle generation does not match the slot (deleted or never valid).
    #[error("stale or invalid entity handle {0}")]
    Stale(Entity),

    /// The entity is allocated but its instance has not been placed yet.
    #[error("entity {0} is not instantiated yet")]
    NotInstantiated(Entity),

    /// The entity already occupies a row.
    #[error("entity {0} is already instantiated")]
    AlreadyInstantiated(Entity),

    /// The entity is queued for deletion.
    #[error("entity {0} is pending deletion")]
    PendingDeletion(Entity),

    /// The pool cannot hand out more slots.
    #[error("entity pool exhausted")]
    CapacityExceeded,

    /// Blueprint or template id does not exist.
    #[error("unknown {kind} id {id}")]
    UnknownSource {
        /// `"blueprint"` or `"template"`.
        kind: &'static str,
        /// Offending id.
        id: u32,
    },

    /// A template value names a component its blueprint lacks.
    #[error("blueprint {blueprint} has no component {component}")]
    NotInBlueprint {
        /// Blueprint the template refines.
        blueprint: u32,
        /// Offending component.
        component: ComponentID,
    },

    /// A blueprint or template name was registered twice.
    #[error("{kind} `{name}` is already registered")]
    DuplicateName {
        /// `"blueprint"` or `"template"`.
        kind: &'static str,
        /// Offending name.
        name: String,
    },
}

/// Failures raised while recording or dispatching structural ops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    /// A remove op named a component the entity does not have.
    #[error("entity {entity} has no component {component} to remove")]
    ComponentMissing {
        /// Target entity.
        entity: Entity,
        /// Component to remove.
        component: ComponentID,
    },

    /// A value op carried the wrong number of bytes.
    #[error("value for component {component} has {actual} bytes, expected {expected}")]
    ValueSize {
        /// Component being written.
        component: ComponentID,
        /// Registered size.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// The buffer handle belongs to another world or was already consumed.
    #[error("unknown op buffer {0}")]
    UnknownBuffer(u32),

    /// Op storage cannot be reset while buffers still reference it.
    #[error("{0} op buffer(s) still pending; dispatch them before releasing op storage")]
    BuffersPending(usize),
}

/// Failures raised by filters, datasets, and column access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A filter needs at least one inclusive component.
    #[error("filter must name at least one inclusive component")]
    EmptyInclusive,

    /// A component is both included and excluded.
    #[error("component {0} is both included and excluded")]
    Contradiction(ComponentID),

    /// The filter handle was destroyed or never created.
    #[error("unknown filter {0}")]
    UnknownFilter(u32),

    /// A table referenced by the dataset changed structurally.
    #[error("dataset view of table {table} is stale (epoch {captured}, now {current})")]
    StaleDataset {
        /// Table whose epoch moved.
        table: TableID,
        /// Epoch captured at query time.
        captured: u64,
        /// Current table epoch.
        current: u64,
    },

    /// Datasets were bulk-released after this one was produced.
    #[error("dataset was released")]
    ReleasedDataset,

    /// A write guard was requested on a read-only projection.
    #[error("projection {slot} is read-only")]
    NotWritable {
        /// Projection slot.
        slot: usize,
    },

    /// `T` does not match the registered size or alignment of the column.
    #[error("type of size {requested} does not match component {component} of size {registered}")]
    TypeMismatch {
        /// Component being viewed.
        component: ComponentID,
        /// Registered component size.
        registered: usize,
        /// `size_of::<T>()`.
        requested: usize,
    },

    /// A conflicting guard on the same column is alive.
    #[error("column for component {component} in table {table} is already borrowed")]
    BorrowConflict {
        /// Table holding the column.
        table: TableID,
        /// Component of the column.
        component: ComponentID,
    },

    /// View index past the dataset length.
    #[error("view {0} out of bounds")]
    ViewOutOfBounds(usize),

    /// Projection slot past the filter's inclusive list.
    #[error("projection slot {0} out of bounds")]
    ProjectionOutOfBounds(usize),

    /// The table has no such component.
    #[error("table {table} has no component {component}")]
    MissingComponent {
        /// Table being accessed.
        table: TableID,
        /// Requested component.
        component: ComponentID,
    },

    /// Flag components have no storage to view.
    #[error("component {0} is a flag and has no column")]
    FlagComponent(ComponentID),
}

/// Aggregate error returned by [`World`](crate::engine::world::World) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Type registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Table or column failure.
    #[error(transparent)]
    Table(#[from] TableError),
    /// Category failure.
    #[error(transparent)]
    Category(#[from] CategoryError),
    /// Entity directory failure.
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// Op buffer failure.
    #[error(transparent)]
    Op(#[from] OpError),
    /// Filter or dataset failure.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result alias used throughout the database.
pub type DbResult<T> = Result<T, DbError>;
