//! # Column Storage
//!
//! This module implements the dense, column-parallel row container that backs
//! every category.
//!
//! ## Layout
//!
//! A [`Table`] owns one [`Column`] per non-flag component in its schema plus
//! a row → entity back-map. Row `r` of every column and `entities[r]`
//! together describe one entity instance:
//!
//! ```text
//!            row 0    row 1    row 2
//! Position | x,y    | x,y    | x,y    |   stride = 8
//! Health   | hp     | hp     | hp     |   stride = 4
//! entities | e7     | e2     | e9     |
//! ```
//!
//! ## Operations
//!
//! - **Allocate**: appends a row and writes each column's default value.
//! - **Free**: swap-remove. The last row is copied into the hole and the
//!   entity it belonged to is reported so the caller can fix its mapping.
//! - **Growth**: capacity doubles (minimum 8 rows) and every column
//!   reallocates together, so all columns always share one capacity.
//!
//! ## Invariants
//!
//! - `columns[i].capacity == table.capacity` for every column.
//! - `entities.len()` is the live row count and every column holds exactly
//!   that many initialized rows.
//! - `epoch` increases on every structural change (allocate, free, growth),
//!   which is how datasets detect that their raw pointers went stale.
//!
//! ## Safety
//!
//! Columns are raw allocations sized `capacity * stride` with the component's
//! alignment. All byte access is bounds-checked against the live row count
//! before any pointer arithmetic. Typed views over columns are built in the
//! query layer, which checks size and alignment with `bytemuck`.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::engine::borrow::BorrowState;
use crate::engine::entity::Entity;
use crate::engine::error::{RegistryError, TableError};
use crate::engine::registry::TypeRegistry;
use crate::engine::types::{build_signature, ComponentID, RowID, Signature, TableID};


const MIN_GROWTH_ROWS: usize = 8;

/// Raw description of one column: base pointer, stride, and live rows.
///
/// Produced for zero-copy iteration. The pointer is only meaningful while
/// the owning table's epoch is unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawColumn {
    /// Base address of row 0.
    pub ptr: NonNull<u8>,
    /// Bytes between consecutive rows (the component size).
    pub stride: usize,
    /// Live rows.
    pub len: usize,
}

// SAFETY: `RawColumn` is an address plus two counts. Every dereference goes
// through the world, which validates the table epoch and column borrow first.
unsafe impl Send for RawColumn {}
unsafe impl Sync for RawColumn {}

/// Reported by [`Table::free_row`] when a row was relocated to fill the hole.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapRemoval {
    /// Entity whose row moved.
    pub entity: Entity,
    /// Its new row (the freed one).
    pub to_row: RowID,
}

/// Type-erased, aligned buffer of fixed-stride elements.
pub struct Column {
    component: ComponentID,
    stride: usize,
    align: usize,
    default: Box<[u8]>,
    data: NonNull<u8>,
    capacity: usize,
    borrow: BorrowState,
}

// SAFETY: the column exclusively owns its allocation. Shared access from
// several threads is coordinated by `borrow`.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    fn new(component: ComponentID, stride: usize, align: usize, default: &[u8]) -> Self {
        debug_assert!(stride > 0, "flag components own no column");
        debug_assert_eq!(default.len(), stride);
        Self {
            component,
            stride,
            align,
            default: default.into(),
            data: dangling(align),
            capacity: 0,
            borrow: BorrowState::new(),
        }
    }

    /// Component stored in this column.
    #[inline]
    pub fn component(&self) -> ComponentID { self.component }

    /// Element size in bytes.
    #[inline]
    pub fn stride(&self) -> usize { self.stride }

    /// Element alignment in bytes.
    #[inline]
    pub fn align(&self) -> usize { self.align }

    /// Borrow flag guarding typed access.
    #[inline]
    pub(crate) fn borrow_state(&self) -> &BorrowState { &self.borrow }

    #[inline]
    pub(crate) fn base_ptr(&self) -> NonNull<u8> { self.data }

    /// Reallocates to `new_capacity` rows, preserving existing rows.
    fn grow(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity > self.capacity);
        let new_layout = layout_for(self.stride, self.align, new_capacity);
        // SAFETY: the new layout has non-zero size. When an allocation exists
        // it was made with `old_layout`, and realloc preserves its prefix.
        let raw = unsafe {
            if self.capacity == 0 {
                alloc::alloc(new_layout)
            } else {
                let old_layout = layout_for(self.stride, self.align, self.capacity);
                alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size())
            }
        };
        self.data = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(new_layout));
        self.capacity = new_capacity;
    }

    #[inline]
    fn row_ptr(&self, row: usize) -> *mut u8 {
        debug_assert!(row < self.capacity);
        // SAFETY: `row < capacity`, so the offset stays inside the allocation.
        unsafe { self.data.as_ptr().add(row * self.stride) }
    }

    #[inline]
    fn write_default(&mut self, row: usize) {
        // SAFETY: `row < capacity`; `default` has exactly `stride` bytes and
        // lives in a separate allocation.
        unsafe { ptr::copy_nonoverlapping(self.default.as_ptr(), self.row_ptr(row), self.stride) }
    }

    #[inline]
    fn copy_row(&mut self, from: usize, to: usize) {
        if from != to {
            // SAFETY: both rows are in bounds and distinct rows never overlap.
            unsafe { ptr::copy_nonoverlapping(self.row_ptr(from), self.row_ptr(to), self.stride) }
        }
    }

    #[inline]
    fn bytes(&self, row: usize) -> &[u8] {
        // SAFETY: caller checked `row < len <= capacity`; rows below `len`
        // are initialized.
        unsafe { std::slice::from_raw_parts(self.row_ptr(row), self.stride) }
    }

    #[inline]
    fn bytes_mut(&mut self, row: usize) -> &mut [u8] {
        // SAFETY: as `bytes`, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.row_ptr(row), self.stride) }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if self.capacity > 0 {
            // SAFETY: the allocation was made with exactly this layout.
            unsafe { alloc::dealloc(self.data.as_ptr(), layout_for(self.stride, self.align, self.capacity)) }
        }
    }
}

fn layout_for(stride: usize, align: usize, rows: usize) -> Layout {
    stride
        .checked_mul(rows)
        .and_then(|bytes| Layout::from_size_align(bytes, align).ok())
        .unwrap_or_else(|| panic!("column layout overflow: {rows} rows of {stride} bytes"))
}

fn dangling(align: usize) -> NonNull<u8> {
    // An aligned, non-null address that is never dereferenced.
    NonNull::new(ptr::null_mut::<u8>().wrapping_add(align)).unwrap_or(NonNull::dangling())
}

/// Dense row container for one category.
pub struct Table {
    id: TableID,
    schema: Vec<ComponentID>,
    signature: Signature,
    column_ids: Vec<ComponentID>,
    columns: Vec<Column>,
    entities: Vec<Entity>,
    capacity: usize,
    epoch: u64,
}

impl Table {
    /// Builds an empty table for `schema`.
    ///
    /// ## Behavior
    /// - The schema is sorted and deduplicated.
    /// - One column is created per non-flag component, in ascending id order.
    /// - `initial_capacity` rows are reserved up front.
    ///
    /// ## Errors
    /// `UnknownComponent` if any id is not registered.

    pub fn new(
        id: TableID,
        schema: &[ComponentID],
        registry: &TypeRegistry,
        initial_capacity: usize,
    ) -> Result<Self, RegistryError> {
        let mut schema = schema.to_vec();
        schema.sort_unstable();
        schema.dedup();

        let mut column_ids = Vec::new();
        let mut columns = Vec::new();
        for &component in &schema {
            let descriptor = registry.require(component)?;
            if descriptor.is_flag() {
                continue;
            }
            column_ids.push(component);
            columns.push(Column::new(component, descriptor.size, descriptor.align, &descriptor.default));
        }

        let mut table = Self {
            id,
            signature: build_signature(&schema),
            schema,
            column_ids,
            columns,
            entities: Vec::new(),
            capacity: 0,
            epoch: 0,
        };
        if initial_capacity > 0 {
            table.grow_to(initial_capacity);
        }
        Ok(table)
    }

    /// Table id.
    #[inline]
    pub fn id(&self) -> TableID { self.id }

    /// Sorted component ids, flags included.
    #[inline]
    pub fn schema(&self) -> &[ComponentID] { &self.schema }

    /// Schema as a bitset.
    #[inline]
    pub fn signature(&self) -> &Signature { &self.signature }

    /// Live row count.
    #[inline]
    pub fn len(&self) -> usize { self.entities.len() }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }

    /// Reserved rows.
    #[inline]
    pub fn capacity(&self) -> usize { self.capacity }

    /// Structural version of the table.
    #[inline]
    pub fn epoch(&self) -> u64 { self.epoch }

    /// Row → entity back-map.
    #[inline]
    pub fn entities(&self) -> &[Entity] { &self.entities }

    /// Entity at `row`.
    #[inline]
    pub fn entity_at(&self, row: RowID) -> Option<Entity> {
        self.entities.get(row as usize).copied()
    }

    /// Columns in ascending component order.
    #[inline]
    pub fn columns(&self) -> &[Column] { &self.columns }

    /// Returns `true` if `component` is in the schema (flags included).
    #[inline]
    pub fn has_component(&self, component: ComponentID) -> bool {
        self.signature.contains(component)
    }

    /// Index of the column storing `component`, or `None` if it is absent
    /// or a flag.
    #[inline]
    pub fn column_index(&self, component: ComponentID) -> Option<usize> {
        self.column_ids.binary_search(&component).ok()
    }

    /// Column at `index`.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Base pointer, stride, and live rows of column `index`.
    pub fn raw_buffer(&self, index: usize) -> Option<RawColumn> {
        self.columns.get(index).map(|column| RawColumn {
            ptr: column.base_ptr(),
            stride: column.stride(),
            len: self.len(),
        })
    }

    /// Appends a row for `entity` filled with default values.
    ///
    /// ## Errors
    /// `CapacityOverflow` if the row count would exceed `RowID` range.

    pub fn allocate_row(&mut self, entity: Entity) -> Result<RowID, TableError> {
        let row = self.len();
        if row >= RowID::MAX as usize {
            return Err(TableError::CapacityOverflow { table: self.id, rows: row + 1 });
        }
        if row == self.capacity {
            let target = (self.capacity * 2).max(MIN_GROWTH_ROWS).min(RowID::MAX as usize);
            self.grow_to(target);
        }
        for column in &mut self.columns {
            column.write_default(row);
        }
        self.entities.push(entity);
        self.epoch += 1;
        Ok(row as RowID)
    }

    /// Removes `row` by moving the last row into it.
    ///
    /// ## Returns
    /// `Some(SwapRemoval)` naming the entity that moved into `row`, or `None`
    /// when `row` was the last row.
    ///
    /// ## Errors
    /// `RowOutOfBounds` if `row >= len`.

    pub fn free_row(&mut self, row: RowID) -> Result<Option<SwapRemoval>, TableError> {
        let len = self.len();
        let index = row as usize;
        if index >= len {
            return Err(TableError::RowOutOfBounds { table: self.id, row, len });
        }
        let last = len - 1;
        for column in &mut self.columns {
            column.copy_row(last, index);
        }
        self.entities.swap_remove(index);
        self.epoch += 1;
        if index == last {
            return Ok(None);
        }
        let moved = self.entities[index];
        log::trace!("table {}: entity {moved} relocated from row {last} to row {row}", self.id);
        Ok(Some(SwapRemoval { entity: moved, to_row: row }))
    }

    /// Bytes of `component` at `row`.
    pub(crate) fn value(&self, component: ComponentID, row: RowID) -> Result<&[u8], TableError> {
        let index = self.checked_cell(component, row)?;
        Ok(self.columns[index].bytes(row as usize))
    }

    /// Mutable bytes of `component` at `row`.
    pub(crate) fn value_mut(&mut self, component: ComponentID, row: RowID) -> Result<&mut [u8], TableError> {
        let index = self.checked_cell(component, row)?;
        Ok(self.columns[index].bytes_mut(row as usize))
    }

    /// Copies `bytes` into `component` at `row`. `bytes` must be one element.
    pub(crate) fn write_value(&mut self, component: ComponentID, row: RowID, bytes: &[u8]) -> Result<(), TableError> {
        let cell = self.value_mut(component, row)?;
        debug_assert_eq!(cell.len(), bytes.len());
        cell.copy_from_slice(bytes);
        Ok(())
    }

    /// Copies every column `source` shares with this table from
    /// `source_row` into `row`. Columns only this table has keep the
    /// defaults written by `allocate_row`.
    pub(crate) fn copy_shared_from(&mut self, row: RowID, source: &Table, source_row: RowID) {
        debug_assert!((row as usize) < self.len() && (source_row as usize) < source.len());
        for column in &mut self.columns {
            if let Some(source_index) = source.column_index(column.component) {
                let bytes = source.columns[source_index].bytes(source_row as usize);
                column.bytes_mut(row as usize).copy_from_slice(bytes);
            }
        }
    }

    fn checked_cell(&self, component: ComponentID, row: RowID) -> Result<usize, TableError> {
        let index = self
            .column_index(component)
            .ok_or(TableError::MissingColumn { table: self.id, component })?;
        if row as usize >= self.len() {
            return Err(TableError::RowOutOfBounds { table: self.id, row, len: self.len() });
        }
        Ok(index)
    }

    fn grow_to(&mut self, rows: usize) {
        if rows <= self.capacity {
            return;
        }
        let len = self.len();
        for column in &mut self.columns {
            column.grow(rows);
        }
        self.entities.reserve(rows - len);
        self.capacity = rows;
        self.epoch += 1;
        log::trace!("table {} grew to {} rows", self.id, rows);
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("epoch", &self.epoch)
            .finish()
    }
}
