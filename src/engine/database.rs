//! # Database
//!
//! The database owns every [`Table`], addressed by dense [`TableID`]s that are
//! never reused. It knows nothing about categories or entities beyond the
//! back-map each table keeps; the category layer and the world sit on top.
//!
//! ## Responsibilities
//! - Create tables from a schema (the registry supplies layout and defaults).
//! - Resolve `(table, component)` to a column index or raw buffer.
//! - Match tables against inclusive/exclusive component sets.
//! - Move one row between two tables, copying the columns they share.

use crate::engine::entity::Entity;
use crate::engine::error::{DbResult, TableError};
use crate::engine::registry::TypeRegistry;
use crate::engine::storage::{RawColumn, SwapRemoval, Table};
use crate::engine::types::{ComponentID, RowID, Signature, TableID, TABLE_CAP};


/// Outcome of [`Database::migrate_row`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowMove {
    /// Row the entity now occupies in the destination table.
    pub row: RowID,
    /// Entity relocated inside the source table to fill the hole.
    pub relocated: Option<SwapRemoval>,
}

/// Collection of tables.
#[derive(Debug, Default)]
pub struct Database {
    tables: Vec<Table>,
    initial_capacity: usize,
}

impl Database {
    /// Creates an empty database whose tables reserve `initial_capacity` rows.
    pub fn new(initial_capacity: usize) -> Self {
        Self { tables: Vec::new(), initial_capacity }
    }

    /// Creates a table for `schema`.
    ///
    /// ## Errors
    /// - `TooManyTables` once `TABLE_CAP` tables exist.
    /// - `UnknownComponent` if the schema names an unregistered id.

    pub fn create_table(&mut self, schema: &[ComponentID], registry: &TypeRegistry) -> DbResult<TableID> {
        if self.tables.len() >= TABLE_CAP {
            return Err(TableError::TooManyTables(TABLE_CAP).into());
        }
        let id = self.tables.len() as TableID;
        let table = Table::new(id, schema, registry, self.initial_capacity)?;
        log::debug!("created table {} with schema {:?}", id, table.schema());
        self.tables.push(table);
        Ok(id)
    }

    /// Table `id`.
    #[inline]
    pub fn table(&self, id: TableID) -> Result<&Table, TableError> {
        self.tables.get(id as usize).ok_or(TableError::UnknownTable(id))
    }

    /// Mutable table `id`.
    #[inline]
    pub fn table_mut(&mut self, id: TableID) -> Result<&mut Table, TableError> {
        self.tables.get_mut(id as usize).ok_or(TableError::UnknownTable(id))
    }

    /// Column index of `component` in `table`, `None` if absent or a flag.
    pub fn column_index(&self, table: TableID, component: ComponentID) -> Option<usize> {
        self.table(table).ok()?.column_index(component)
    }

    /// Raw buffer of `component` in `table`.
    pub fn buffer(&self, table: TableID, component: ComponentID) -> Result<RawColumn, TableError> {
        let table_ref = self.table(table)?;
        table_ref
            .column_index(component)
            .and_then(|index| table_ref.raw_buffer(index))
            .ok_or(TableError::MissingColumn { table, component })
    }

    /// Live rows in `table`.
    pub fn num_rows(&self, table: TableID) -> Result<usize, TableError> {
        Ok(self.table(table)?.len())
    }

    /// Number of tables.
    #[inline]
    pub fn num_tables(&self) -> usize { self.tables.len() }

    /// All tables in id order.
    #[inline]
    pub fn tables(&self) -> &[Table] { &self.tables }

    /// Ids of every table whose schema contains all of `inclusive` and none
    /// of `exclusive`, ascending.
    pub fn query<'a>(
        &'a self,
        inclusive: &'a Signature,
        exclusive: &'a Signature,
    ) -> impl Iterator<Item = TableID> + 'a {
        self.tables
            .iter()
            .filter(move |table| table.signature().matches(inclusive, exclusive))
            .map(Table::id)
    }

    /// Moves `entity` from `source[source_row]` to a new row in `destination`.
    ///
    /// ## Behavior
    /// 1. A destination row is allocated and filled with defaults.
    /// 2. Every column both tables share is copied from the source row.
    /// 3. The source row is swap-removed.
    ///
    /// Columns only the source has are dropped with the source row.
    ///
    /// ## Errors
    /// `UnknownTable` or `RowOutOfBounds` before anything is modified.

    pub fn migrate_row(
        &mut self,
        source: TableID,
        source_row: RowID,
        destination: TableID,
        entity: Entity,
    ) -> Result<RowMove, TableError> {
        let len = self.table(source)?.len();
        if source_row as usize >= len {
            return Err(TableError::RowOutOfBounds { table: source, row: source_row, len });
        }
        self.table(destination)?;
        debug_assert_eq!(self.tables[source as usize].entity_at(source_row), Some(entity));

        let (from, to) = self.pair_mut(source, destination);
        let row = to.allocate_row(entity)?;
        to.copy_shared_from(row, from, source_row);
        let relocated = from.free_row(source_row)?;
        Ok(RowMove { row, relocated })
    }

    fn pair_mut(&mut self, a: TableID, b: TableID) -> (&mut Table, &mut Table) {
        assert!(a != b, "source and destination table must differ");
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.tables.split_at_mut(high as usize);
        let low_ref = &mut head[low as usize];
        let high_ref = &mut tail[0];
        if a < b { (low_ref, high_ref) } else { (high_ref, low_ref) }
    }
}
