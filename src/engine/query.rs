//! Query results and checked column access.
//!
//! Running a filter produces a [`Dataset`]: one [`TableView`] per matching
//! table, each carrying the row count, the category, and one raw column per
//! projection slot (`None` for flag components, which have no storage).
//!
//! ## Staleness
//! Raw pointers in a view are only meaningful until the referenced table
//! changes structurally. Each view records the table's epoch at query time,
//! and each dataset records the world's dataset generation, which
//! [`World::release_datasets`] bumps. Typed access re-checks both and fails
//! with [`QueryError::StaleDataset`] or [`QueryError::ReleasedDataset`].
//!
//! ## Aliasing
//! Typed access hands out RAII guards over column memory:
//! * [`ColumnRef`] derefs to `&[T]` and holds a shared column borrow;
//! * [`ColumnMut`] derefs to `&mut [T]`, holds the exclusive borrow, and is
//!   only granted for projection slots declared [`AccessMode::Write`].
//!
//! Guards borrow the world immutably while every structural mutation needs
//! `&mut World`, so the compiler forbids changing tables while a guard is
//! alive. The per-column borrow flag covers the remaining case of two guards
//! over the same column, including from different threads.
//!
//! [`World::release_datasets`]: crate::engine::world::World::release_datasets

use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::engine::borrow::BorrowState;
use crate::engine::entity::Entity;
use crate::engine::error::QueryError;
use crate::engine::registry::TypeRegistry;
use crate::engine::storage::{RawColumn, Table};
use crate::engine::types::{AccessMode, CategoryID, ComponentID, TableID};


/// One matching table inside a [`Dataset`].
#[derive(Clone, Debug)]
pub struct TableView {
    pub(crate) table: TableID,
    pub(crate) category: CategoryID,
    pub(crate) rows: usize,
    pub(crate) epoch: u64,
    pub(crate) buffers: Vec<Option<RawColumn>>,
}

impl TableView {
    /// Table id.
    #[inline]
    pub fn table(&self) -> TableID { self.table }

    /// Category owning the table.
    #[inline]
    pub fn category(&self) -> CategoryID { self.category }

    /// Rows at query time.
    #[inline]
    pub fn rows(&self) -> usize { self.rows }

    /// Table epoch at query time.
    #[inline]
    pub fn epoch(&self) -> u64 { self.epoch }

    /// Raw column of projection `slot`; `None` for flags.
    ///
    /// The pointer is unchecked. Prefer the typed guards unless handing the
    /// memory to code that validates the dataset itself.
    #[inline]
    pub fn buffer(&self, slot: usize) -> Option<RawColumn> {
        self.buffers.get(slot).copied().flatten()
    }

    /// Number of projection slots.
    #[inline]
    pub fn slots(&self) -> usize { self.buffers.len() }
}

/// Result of one query: per-table views in ascending table order.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub(crate) views: Vec<TableView>,
    pub(crate) projection: Vec<ComponentID>,
    pub(crate) access: Vec<AccessMode>,
    pub(crate) generation: u64,
}

impl Dataset {
    /// Views, one per matching table (empty tables included).
    #[inline]
    pub fn views(&self) -> &[TableView] { &self.views }

    /// Number of views.
    #[inline]
    pub fn len(&self) -> usize { self.views.len() }

    /// Returns `true` if no table matched.
    #[inline]
    pub fn is_empty(&self) -> bool { self.views.is_empty() }

    /// Sum of rows over all views.
    pub fn total_rows(&self) -> usize {
        self.views.iter().map(TableView::rows).sum()
    }

    /// Projected components in slot order.
    #[inline]
    pub fn projection(&self) -> &[ComponentID] { &self.projection }

    /// Access mode per slot.
    #[inline]
    pub fn access(&self) -> &[AccessMode] { &self.access }
}

/// Validated access to one view of a dataset.
///
/// Obtained from [`World::view`](crate::engine::world::World::view); holding
/// it keeps the world immutably borrowed.
pub struct ViewAccess<'w> {
    pub(crate) table: &'w Table,
    pub(crate) registry: &'w TypeRegistry,
    pub(crate) view: &'w TableView,
    pub(crate) projection: &'w [ComponentID],
    pub(crate) access: &'w [AccessMode],
}

impl<'w> ViewAccess<'w> {
    /// Validates `view` against the live table and builds the accessor.
    pub(crate) fn new(
        table: &'w Table,
        registry: &'w TypeRegistry,
        dataset: &'w Dataset,
        view: &'w TableView,
    ) -> Result<Self, QueryError> {
        if table.epoch() != view.epoch {
            return Err(QueryError::StaleDataset {
                table: view.table,
                captured: view.epoch,
                current: table.epoch(),
            });
        }
        Ok(Self { table, registry, view, projection: &dataset.projection, access: &dataset.access })
    }

    /// The underlying view.
    #[inline]
    pub fn view(&self) -> &'w TableView { self.view }

    /// Live rows.
    #[inline]
    pub fn rows(&self) -> usize { self.table.len() }

    /// Category of the view.
    #[inline]
    pub fn category(&self) -> CategoryID { self.view.category }

    /// Entity owning each row.
    #[inline]
    pub fn entities(&self) -> &'w [Entity] { self.table.entities() }

    /// Shared typed access to projection `slot`.
    pub fn column<T: Pod>(&self, slot: usize) -> Result<ColumnRef<'w, T>, QueryError> {
        let component = self.slot_component(slot)?;
        read_column(self.table, self.registry, component)
    }

    /// Exclusive typed access to projection `slot`.
    ///
    /// ## Errors
    /// `NotWritable` unless the slot was declared [`AccessMode::Write`].

    pub fn column_mut<T: Pod>(&self, slot: usize) -> Result<ColumnMut<'w, T>, QueryError> {
        let component = self.slot_component(slot)?;
        if self.access[slot] != AccessMode::Write {
            return Err(QueryError::NotWritable { slot });
        }
        write_column(self.table, self.registry, component)
    }

    fn slot_component(&self, slot: usize) -> Result<ComponentID, QueryError> {
        self.projection.get(slot).copied().ok_or(QueryError::ProjectionOutOfBounds(slot))
    }
}

/// Takes a shared borrow of `component`'s column in `table`.
pub(crate) fn read_column<'w, T: Pod>(
    table: &'w Table,
    registry: &TypeRegistry,
    component: ComponentID,
) -> Result<ColumnRef<'w, T>, QueryError> {
    let (raw, state) = resolve::<T>(table, registry, component)?;
    if !state.try_acquire_read() {
        return Err(QueryError::BorrowConflict { table: table.id(), component });
    }
    // SAFETY: `raw` comes from the live table, so it addresses `len * stride`
    // initialized bytes, and the read borrow excludes writers until the
    // guard drops.
    let bytes = unsafe { std::slice::from_raw_parts(raw.ptr.as_ptr(), raw.len * raw.stride) };
    match bytemuck::try_cast_slice::<u8, T>(bytes) {
        Ok(slice) => Ok(ColumnRef { slice, state }),
        Err(_) => {
            state.release_read();
            Err(type_mismatch::<T>(component, raw.stride))
        }
    }
}

/// Takes the exclusive borrow of `component`'s column in `table`.
pub(crate) fn write_column<'w, T: Pod>(
    table: &'w Table,
    registry: &TypeRegistry,
    component: ComponentID,
) -> Result<ColumnMut<'w, T>, QueryError> {
    let (raw, state) = resolve::<T>(table, registry, component)?;
    if !state.try_acquire_write() {
        return Err(QueryError::BorrowConflict { table: table.id(), component });
    }
    // SAFETY: as in `read_column`, and the write borrow makes this the only
    // live reference to the column.
    let bytes = unsafe { std::slice::from_raw_parts_mut(raw.ptr.as_ptr(), raw.len * raw.stride) };
    match bytemuck::try_cast_slice_mut::<u8, T>(bytes) {
        Ok(slice) => Ok(ColumnMut {
            ptr: NonNull::from(&mut slice[..]).cast(),
            len: slice.len(),
            state,
            _marker: PhantomData,
        }),
        Err(_) => {
            state.release_write();
            Err(type_mismatch::<T>(component, raw.stride))
        }
    }
}

fn resolve<'w, T: Pod>(
    table: &'w Table,
    registry: &TypeRegistry,
    component: ComponentID,
) -> Result<(RawColumn, &'w BorrowState), QueryError> {
    let missing = QueryError::MissingComponent { table: table.id(), component };
    let descriptor = registry.descriptor(component).ok_or(missing.clone())?;
    if descriptor.is_flag() {
        return Err(QueryError::FlagComponent(component));
    }
    if descriptor.size != size_of::<T>() {
        return Err(type_mismatch::<T>(component, descriptor.size));
    }
    let index = table.column_index(component).ok_or(missing.clone())?;
    let raw = table.raw_buffer(index).ok_or(missing.clone())?;
    let state = table.column(index).map(|column| column.borrow_state()).ok_or(missing)?;
    Ok((raw, state))
}

fn type_mismatch<T>(component: ComponentID, registered: usize) -> QueryError {
    QueryError::TypeMismatch { component, registered, requested: size_of::<T>() }
}

/// Shared guard over one column.
#[derive(Debug)]
pub struct ColumnRef<'w, T> {
    slice: &'w [T],
    state: &'w BorrowState,
}

impl<T> Deref for ColumnRef<'_, T> {
    type Target = [T];
    fn deref(&self) -> &[T] { self.slice }
}

impl<T> Drop for ColumnRef<'_, T> {
    fn drop(&mut self) { self.state.release_read(); }
}

/// Exclusive guard over one column.
pub struct ColumnMut<'w, T> {
    ptr: NonNull<T>,
    len: usize,
    state: &'w BorrowState,
    _marker: PhantomData<&'w mut [T]>,
}

// SAFETY: the guard behaves like `&mut [T]` for `T: Pod` (which is `Send + Sync`).
unsafe impl<T: Pod> Send for ColumnMut<'_, T> {}
unsafe impl<T: Pod> Sync for ColumnMut<'_, T> {}

impl<T> Deref for ColumnMut<'_, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        // SAFETY: `ptr`/`len` came from a valid slice and the write borrow is held.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> DerefMut for ColumnMut<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as above; `&mut self` keeps this the only slice handed out.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for ColumnMut<'_, T> {
    fn drop(&mut self) { self.state.release_write(); }
}
