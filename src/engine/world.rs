//! World context and execution layer.
//!
//! [`World`] is the single context object of the database. It owns
//!
//! * the type registry,
//! * the tables and the categories that name them,
//! * the entity directory and its pending instance queues,
//! * blueprints, filters, and op buffers.
//!
//! There is no global state; independent worlds can coexist.
//!
//! ## Concurrency model
//!
//! Every structural mutation (entity creation and deletion, migration,
//! dispatch, queue flushes, dataset release) takes `&mut self`. Reading
//! (queries, column guards, value lookups) takes `&self`, and `World` is
//! `Sync`, so many threads may read at once, for example through
//! [`World::par_for_each_view`]. The borrow checker therefore guarantees
//! that dispatch never runs while a reader holds a column.
//!
//! Two threads that want to *write* different columns concurrently declare
//! it through filter access modes; column guards enforce it at runtime.
//!
//! ## Deferred work
//!
//! * Instance queues: non-immediate entity creation and deletion are queued
//!   and applied in bulk by [`World::flush_instance_queues`].
//! * Op buffers: component adds and removes are recorded and applied by
//!   [`World::dispatch`].

use rayon::prelude::*;

use bytemuck::Pod;

use crate::engine::blueprint::{
    BlueprintID, BlueprintRegistry, EntityCreateInfo, EntitySource, TemplateID,
};
use crate::engine::category::{Category, CategoryHash, CategoryIndex};
use crate::engine::config::WorldConfig;
use crate::engine::database::Database;
use crate::engine::entity::{Entity, EntityMapping, EntityPool, EntityState};
use crate::engine::error::{DbResult, EntityError, OpError, QueryError, TableError};
use crate::engine::filter::{CompiledFilter, Filter, FilterCreateInfo, FilterStore};
use crate::engine::ops::{DispatchSummary, Op, OpBuffer, OpStore, RecordedOp, SharedOpQueue};
use crate::engine::query::{read_column, ColumnMut, ColumnRef, Dataset, TableView, ViewAccess};
use crate::engine::registry::{ComponentFlags, ComponentInfo, InspectValue, TypeRegistry};
use crate::engine::storage::RawColumn;
use crate::engine::types::{AccessSets, CategoryID, ComponentID, RowID};


#[derive(Clone, Copy, Debug)]
struct PendingInstance {
    entity: Entity,
    category: CategoryID,
    template: Option<TemplateID>,
}

/// Counts reported by [`World::flush_instance_queues`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Entities placed into their tables.
    pub placed: usize,
    /// Entities removed and their handles retired.
    pub removed: usize,
}

/// The database context.
pub struct World {
    registry: TypeRegistry,
    database: Database,
    categories: CategoryIndex,
    entities: EntityPool,
    blueprints: BlueprintRegistry,
    filters: FilterStore,
    ops: OpStore,
    alloc_queue: Vec<PendingInstance>,
    dealloc_queue: Vec<Entity>,
    dataset_generation: u64,
}

impl Default for World {
    fn default() -> Self { Self::new(WorldConfig::default()) }
}

impl World {
    /// Creates an empty world.
    pub fn new(config: WorldConfig) -> Self {
        Self {
            registry: TypeRegistry::new(config.component_capacity),
            database: Database::new(config.initial_table_capacity),
            categories: CategoryIndex::new(),
            entities: EntityPool::with_capacity(config.entity_reserve),
            blueprints: BlueprintRegistry::default(),
            filters: FilterStore::default(),
            ops: OpStore::new(config.op_arena_capacity),
            alloc_queue: Vec::new(),
            dealloc_queue: Vec::new(),
            dataset_generation: 0,
        }
    }

    // ── Type registry ──────────────────────────────────────────────────────

    /// Registers a component type. See [`TypeRegistry::register`].
    pub fn register_component(&mut self, info: ComponentInfo<'_>) -> DbResult<ComponentID> {
        Ok(self.registry.register(info)?)
    }

    /// Registers a plain-old-data component with a typed default.
    pub fn register_pod<T: Pod>(&mut self, name: &str, default: T, flags: ComponentFlags) -> DbResult<ComponentID> {
        Ok(self.registry.register_pod(name, default, flags)?)
    }

    /// Registers a zero-sized flag component.
    pub fn register_flag(&mut self, name: &str, flags: ComponentFlags) -> DbResult<ComponentID> {
        Ok(self.registry.register_flag(name, flags)?)
    }

    /// Component id by name.
    pub fn component_id(&self, name: &str) -> Option<ComponentID> {
        self.registry.id_of(name)
    }

    /// The type registry.
    pub fn registry(&self) -> &TypeRegistry { &self.registry }

    /// Mutable type registry, for registration and inspectors.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry { &mut self.registry }

    /// The table store.
    pub fn database(&self) -> &Database { &self.database }

    // ── Categories ─────────────────────────────────────────────────────────

    /// All categories.
    pub fn categories(&self) -> &CategoryIndex { &self.categories }

    /// Returns `true` if a category with `hash` exists.
    pub fn category_exists(&self, hash: CategoryHash) -> bool {
        self.categories.exists(hash)
    }

    /// Category id for `hash`.
    pub fn category_id(&self, hash: CategoryHash) -> Option<CategoryID> {
        self.categories.id_of(hash)
    }

    /// Category `id`.
    pub fn category(&self, id: CategoryID) -> DbResult<&Category> {
        Ok(self.categories.get(id)?)
    }

    /// Resolves or creates the category for exactly `components`.
    pub fn find_or_create_category(&mut self, components: &[ComponentID]) -> DbResult<CategoryID> {
        self.categories.find_or_create(components, &mut self.database, &self.registry)
    }

    /// Number of entities instantiated in `category`.
    pub fn num_instances(&self, category: CategoryID) -> DbResult<usize> {
        let table = self.categories.get(category)?.table;
        Ok(self.database.num_rows(table)?)
    }

    /// Raw column of `component` in `category`.
    ///
    /// ## Errors
    /// `MissingColumn` if the category lacks the component or it is a flag.
    pub fn instance_buffer(&self, category: CategoryID, component: ComponentID) -> DbResult<RawColumn> {
        let table = self.categories.get(category)?.table;
        Ok(self.database.buffer(table, component)?)
    }

    /// Shared typed guard over `component` in `category`.
    pub fn instance_column<T: Pod>(&self, category: CategoryID, component: ComponentID) -> DbResult<ColumnRef<'_, T>> {
        let table = self.database.table(self.categories.get(category)?.table)?;
        Ok(read_column(table, &self.registry, component)?)
    }

    // ── Blueprints ─────────────────────────────────────────────────────────

    /// Registers a named component set and resolves its category.
    pub fn register_blueprint(&mut self, name: &str, components: &[ComponentID]) -> DbResult<BlueprintID> {
        if self.blueprints.blueprint_id(name).is_some() {
            return Err(EntityError::DuplicateName { kind: "blueprint", name: name.to_owned() }.into());
        }
        let category = self.find_or_create_category(components)?;
        Ok(self.blueprints.insert_blueprint(name, components.to_vec(), category)?)
    }

    /// Registers initial values on top of a blueprint.
    ///
    /// ## Errors
    /// - `NotInBlueprint` if a value names a component outside the blueprint.
    /// - `ValueSize` if a value is not exactly one element.

    pub fn register_template(
        &mut self,
        blueprint: BlueprintID,
        name: &str,
        values: &[(ComponentID, &[u8])],
    ) -> DbResult<TemplateID> {
        let members = &self.blueprints.blueprint(blueprint)?.components;
        let mut owned = Vec::with_capacity(values.len());
        for &(component, bytes) in values {
            let descriptor = self.registry.require(component)?;
            if members.binary_search(&component).is_err() {
                return Err(EntityError::NotInBlueprint { blueprint, component }.into());
            }
            if bytes.len() != descriptor.size {
                return Err(OpError::ValueSize { component, expected: descriptor.size, actual: bytes.len() }.into());
            }
            owned.push((component, Box::<[u8]>::from(bytes)));
        }
        Ok(self.blueprints.insert_template(name, blueprint, owned)?)
    }

    /// Blueprint id by name.
    pub fn blueprint_id(&self, name: &str) -> Option<BlueprintID> {
        self.blueprints.blueprint_id(name)
    }

    /// Template id by name.
    pub fn template_id(&self, name: &str) -> Option<TemplateID> {
        self.blueprints.template_id(name)
    }

    /// Registered blueprints and templates.
    pub fn blueprints(&self) -> &BlueprintRegistry { &self.blueprints }

    // ── Entity lifecycle ───────────────────────────────────────────────────

    /// Creates an entity.
    ///
    /// ## Behavior
    /// - The source category is resolved first, so a bad source allocates
    ///   nothing.
    /// - A handle is issued immediately and counts toward
    ///   [`num_entities`](Self::num_entities).
    /// - With `immediate` the row is placed now; otherwise it is queued until
    ///   [`flush_instance_queues`](Self::flush_instance_queues) and the
    ///   entity stays inactive.

    pub fn create_entity(&mut self, info: &EntityCreateInfo) -> DbResult<Entity> {
        let (category, template) = self.resolve_source(&info.source)?;
        let entity = self.entities.allocate()?;
        if info.immediate {
            if let Err(error) = self.place(entity, category, template) {
                self.entities.deallocate(entity)?;
                return Err(error);
            }
        } else {
            self.alloc_queue.push(PendingInstance { entity, category, template });
        }
        Ok(entity)
    }

    /// Deletes an entity.
    ///
    /// ## Behavior
    /// - `immediate`: the row is swap-removed and the handle retired now.
    /// - An entity still waiting in the creation queue has no row, so its
    ///   handle is retired now either way and the queued creation is skipped.
    /// - Otherwise the entity is marked pending-deletion and queued. It stays
    ///   valid (and its slot reserved) until the queue is flushed, but every
    ///   further op on it fails with `PendingDeletion`.
    ///
    /// ## Errors
    /// `Stale` for an invalid handle, `PendingDeletion` if already queued.

    pub fn delete_entity(&mut self, entity: Entity, immediate: bool) -> DbResult<()> {
        self.entities.ensure_not_pending(entity)?;
        if immediate || self.entities.mapping(entity)?.is_none() {
            self.release_instance(entity)?;
            self.entities.deallocate(entity)?;
            log::trace!("deleted entity {entity}");
        } else {
            self.entities.mark_pending_delete(entity)?;
            self.dealloc_queue.push(entity);
        }
        Ok(())
    }

    /// Applies every queued creation, then every queued deletion, each in
    /// FIFO order.
    ///
    /// Queued creations whose handle was deleted in the meantime are skipped.
    /// On error the failing entry and everything after it stay queued.

    pub fn flush_instance_queues(&mut self) -> DbResult<FlushSummary> {
        let mut summary = FlushSummary::default();
        let mut allocs = std::mem::take(&mut self.alloc_queue).into_iter();
        while let Some(pending) = allocs.next() {
            if self.entities.state(pending.entity) != EntityState::Allocated {
                continue;
            }
            if let Err(error) = self.place(pending.entity, pending.category, pending.template) {
                self.alloc_queue = std::iter::once(pending).chain(allocs).collect();
                return Err(error);
            }
            summary.placed += 1;
        }
        let mut deallocs = std::mem::take(&mut self.dealloc_queue).into_iter();
        while let Some(entity) = deallocs.next() {
            if !self.entities.is_valid(entity) {
                continue;
            }
            let released = self
                .release_instance(entity)
                .and_then(|()| self.entities.deallocate(entity).map_err(Into::into));
            if let Err(error) = released {
                self.dealloc_queue = std::iter::once(entity).chain(deallocs).collect();
                return Err(error);
            }
            summary.removed += 1;
        }
        if summary != FlushSummary::default() {
            log::debug!("flushed instance queues: {} placed, {} removed", summary.placed, summary.removed);
        }
        Ok(summary)
    }

    /// Queued creations plus queued deletions.
    pub fn pending_instance_ops(&self) -> usize {
        self.alloc_queue.len() + self.dealloc_queue.len()
    }

    /// Returns `true` if `entity` names a live slot.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity)
    }

    /// Returns `true` if `entity` is valid and placed in a table.
    pub fn is_active(&self, entity: Entity) -> bool {
        self.entities.state(entity) == EntityState::Instantiated
    }

    /// Lifecycle state of `entity`.
    pub fn entity_state(&self, entity: Entity) -> EntityState {
        self.entities.state(entity)
    }

    /// Live entity handles, placed or not.
    pub fn num_entities(&self) -> usize {
        self.entities.len()
    }

    /// Where `entity` lives, `None` if invalid or not placed.
    pub fn entity_mapping(&self, entity: Entity) -> Option<EntityMapping> {
        self.entities.mapping(entity).ok().flatten()
    }

    /// Row of `entity`, `None` if invalid or not placed.
    pub fn instance_id(&self, entity: Entity) -> Option<RowID> {
        self.entity_mapping(entity).map(|mapping| mapping.instance)
    }

    /// Returns `true` if `entity` is placed and has `component`.
    pub fn has_component(&self, entity: Entity, component: ComponentID) -> bool {
        self.entity_mapping(entity)
            .and_then(|mapping| self.categories.get(mapping.category).ok())
            .and_then(|category| self.database.table(category.table).ok())
            .is_some_and(|table| table.has_component(component))
    }

    /// Moves `entity` into `category`.
    ///
    /// ## Behavior
    /// - Components both categories share keep their values.
    /// - Components only the destination has start at their defaults.
    /// - Components only the source has are dropped.
    /// - The source row is swap-removed and the relocated entity's mapping
    ///   is updated.
    ///
    /// Returns the entity's new row. Migrating to the current category is a
    /// no-op.

    pub fn migrate(&mut self, entity: Entity, category: CategoryID) -> DbResult<RowID> {
        let mapping = self.entities.placed(entity)?;
        if mapping.category == category {
            return Ok(mapping.instance);
        }
        let source = self.categories.get(mapping.category)?.table;
        let destination = self.categories.get(category)?.table;
        let moved = self.database.migrate_row(source, mapping.instance, destination, entity)?;
        if let Some(relocated) = moved.relocated {
            self.entities.relocate(relocated.entity, relocated.to_row);
        }
        self.entities.set_mapping(entity, Some(EntityMapping { category, instance: moved.row }))?;
        log::trace!(
            "migrated {entity}: category {} row {} -> category {category} row {}",
            mapping.category,
            mapping.instance,
            moved.row
        );
        Ok(moved.row)
    }

    /// Copies `component` of `entity` out as `T`.
    pub fn get_value<T: Pod>(&self, entity: Entity, component: ComponentID) -> DbResult<T> {
        let mapping = self.entities.placed(entity)?;
        let table = self.database.table(self.categories.get(mapping.category)?.table)?;
        let column = read_column::<T>(table, &self.registry, component)?;
        Ok(column[mapping.instance as usize])
    }

    /// Overwrites `component` of `entity` with `value`.
    pub fn set_value<T: Pod>(&mut self, entity: Entity, component: ComponentID, value: &T) -> DbResult<()> {
        let registered = self.registry.require(component)?.size;
        if registered != std::mem::size_of::<T>() {
            return Err(QueryError::TypeMismatch { component, registered, requested: std::mem::size_of::<T>() }.into());
        }
        self.write_value_bytes(entity, component, bytemuck::bytes_of(value))
    }

    /// Overwrites `component` of `entity` with one element of raw bytes.
    pub fn write_value_bytes(&mut self, entity: Entity, component: ComponentID, bytes: &[u8]) -> DbResult<()> {
        let expected = self.registry.require(component)?.size;
        if bytes.len() != expected {
            return Err(OpError::ValueSize { component, expected, actual: bytes.len() }.into());
        }
        let mapping = self.entities.placed(entity)?;
        let table = self.categories.get(mapping.category)?.table;
        Ok(self.database.table_mut(table)?.write_value(component, mapping.instance, bytes)?)
    }

    /// Renders an entity and every component value for diagnostics.
    ///
    /// Values use the component's inspector, or a hex dump without one.
    ///
    /// ## Errors
    /// `BorrowConflict` if a column is exclusively borrowed.

    pub fn describe_entity(&self, entity: Entity) -> DbResult<String> {
        let mapping = self.entities.placed(entity)?;
        let category = self.categories.get(mapping.category)?;
        let table = self.database.table(category.table)?;
        let mut out = format!("{entity} [{}]", category.name);
        for &component in table.schema() {
            let descriptor = self.registry.require(component)?;
            let Some(index) = table.column_index(component) else {
                out.push_str(&format!("\n  {}: <flag>", descriptor.name));
                continue;
            };
            let state = table.columns()[index].borrow_state();
            if !state.try_acquire_read() {
                return Err(QueryError::BorrowConflict { table: table.id(), component }.into());
            }
            let rendered = table
                .value(component, mapping.instance)
                .map(|bytes| InspectValue { descriptor, bytes }.to_string());
            state.release_read();
            out.push_str(&format!("\n  {}: {}", descriptor.name, rendered?));
        }
        Ok(out)
    }

    fn resolve_source(&mut self, source: &EntitySource) -> DbResult<(CategoryID, Option<TemplateID>)> {
        match source {
            EntitySource::Blueprint(id) => Ok((self.blueprints.blueprint(*id)?.category, None)),
            EntitySource::Template(id) => {
                let template = self.blueprints.template(*id)?;
                Ok((self.blueprints.blueprint(template.blueprint)?.category, Some(*id)))
            }
            EntitySource::Components(components) => Ok((self.find_or_create_category(components)?, None)),
        }
    }

    fn place(&mut self, entity: Entity, category: CategoryID, template: Option<TemplateID>) -> DbResult<RowID> {
        if self.entities.mapping(entity)?.is_some() {
            return Err(EntityError::AlreadyInstantiated(entity).into());
        }
        let table = self.database.table_mut(self.categories.get(category)?.table)?;
        let row = table.allocate_row(entity)?;
        if let Some(template) = template {
            for (component, value) in &self.blueprints.template(template)?.values {
                if !value.is_empty() {
                    table.write_value(*component, row, value)?;
                }
            }
        }
        self.entities.set_mapping(entity, Some(EntityMapping { category, instance: row }))?;
        Ok(row)
    }

    fn release_instance(&mut self, entity: Entity) -> DbResult<()> {
        let Some(mapping) = self.entities.mapping(entity)? else {
            return Ok(());
        };
        let table = self.database.table_mut(self.categories.get(mapping.category)?.table)?;
        for &component in table.schema() {
            warn_if_managed(&self.registry, component, entity, "deleted");
        }
        if let Some(relocated) = table.free_row(mapping.instance)? {
            self.entities.relocate(relocated.entity, relocated.to_row);
        }
        self.entities.set_mapping(entity, None)?;
        Ok(())
    }

    // ── Op buffers ─────────────────────────────────────────────────────────

    /// Opens a new op buffer.
    pub fn create_op_buffer(&mut self) -> OpBuffer {
        self.ops.create()
    }

    /// Records `op` into `buffer`, copying its value.
    ///
    /// ## Errors
    /// - `UnknownComponent` for an unregistered id.
    /// - `ValueSize` if a value is not exactly one element.
    /// - `UnknownBuffer` for a handle of another world.
    ///
    /// Entities are checked at dispatch, since they may be created between
    /// recording and dispatch.

    pub fn add_op(&mut self, buffer: &OpBuffer, op: Op<'_>) -> DbResult<()> {
        match op {
            Op::Add { component, value, .. } => {
                let expected = self.registry.require(component)?.size;
                let actual = value.map_or(expected, <[u8]>::len);
                if actual != expected {
                    return Err(OpError::ValueSize { component, expected, actual }.into());
                }
            }
            Op::Remove { component, .. } => {
                self.registry.require(component)?;
            }
        }
        Ok(self.ops.record(buffer, op)?)
    }

    /// Records several ops; stops at the first invalid one.
    pub fn add_ops<'v>(&mut self, buffer: &OpBuffer, ops: impl IntoIterator<Item = Op<'v>>) -> DbResult<usize> {
        let mut recorded = 0;
        for op in ops {
            self.add_op(buffer, op)?;
            recorded += 1;
        }
        Ok(recorded)
    }

    /// Moves everything queued in `queue` into `buffer`.
    pub fn drain_shared_ops(&mut self, queue: &SharedOpQueue, buffer: &OpBuffer) -> DbResult<usize> {
        let drained = queue.drain();
        for op in &drained {
            self.add_op(buffer, op.as_op())?;
        }
        Ok(drained.len())
    }

    /// Drops `buffer` without applying it. Returns the number of ops dropped.
    pub fn discard_op_buffer(&mut self, buffer: OpBuffer) -> DbResult<usize> {
        let queues = self.ops.take(buffer)?;
        Ok(queues.adds.len() + queues.removes.len())
    }

    /// Applies and consumes `buffer`.
    ///
    /// ## Behavior
    /// All add ops run first, then all remove ops, each in recording order.
    /// For each op the destination hash is the current category's hash with
    /// the component added or removed; the destination category is resolved
    /// or created, the entity migrates, and an add's value is written.
    ///
    /// An add of a component the entity already has writes the value in
    /// place without migrating.
    ///
    /// ## Errors
    /// The first failing op (stale or pending-deletion entity, removing an
    /// absent component) aborts dispatch. Ops before it stay applied; ops
    /// after it are dropped with the buffer.

    pub fn dispatch(&mut self, buffer: OpBuffer) -> DbResult<DispatchSummary> {
        let queues = self.ops.take(buffer)?;
        let mut summary = DispatchSummary::default();
        for op in &queues.adds {
            if self.apply_add(op)? {
                summary.migrations += 1;
            }
            summary.added += 1;
        }
        for op in &queues.removes {
            self.apply_remove(op)?;
            summary.migrations += 1;
            summary.removed += 1;
        }
        log::debug!(
            "dispatched op buffer: {} adds, {} removes, {} migrations",
            summary.added,
            summary.removed,
            summary.migrations
        );
        Ok(summary)
    }

    /// Resets op value storage. Returns the number of bytes released.
    ///
    /// ## Errors
    /// `BuffersPending` while an undispatched buffer still holds values.
    pub fn release_all_ops(&mut self) -> DbResult<usize> {
        self.ops.release().map_err(|error| {
            log::warn!("release_all_ops refused: {error}");
            error.into()
        })
    }

    /// Undispatched buffers that hold op values.
    pub fn pending_op_buffers(&self) -> usize {
        self.ops.pending()
    }

    fn apply_add(&mut self, op: &RecordedOp) -> DbResult<bool> {
        self.entities.ensure_not_pending(op.entity)?;
        let mapping = self.entities.placed(op.entity)?;
        let source_table = self.categories.get(mapping.category)?.table;
        let migrated = !self.database.table(source_table)?.has_component(op.component);
        if migrated {
            let destination = self.categories.find_or_create_neighbor(
                mapping.category,
                op.component,
                true,
                &mut self.database,
                &self.registry,
            )?;
            self.migrate(op.entity, destination)?;
        }
        if let Some(slice) = op.value.filter(|_| !self.registry.is_flag(op.component)) {
            let mapping = self.entities.placed(op.entity)?;
            let table = self.categories.get(mapping.category)?.table;
            let bytes = self.ops.arena.get(slice);
            self.database.table_mut(table)?.write_value(op.component, mapping.instance, bytes)?;
        }
        Ok(migrated)
    }

    fn apply_remove(&mut self, op: &RecordedOp) -> DbResult<()> {
        self.entities.ensure_not_pending(op.entity)?;
        let mapping = self.entities.placed(op.entity)?;
        let table = self.categories.get(mapping.category)?.table;
        if !self.database.table(table)?.has_component(op.component) {
            return Err(OpError::ComponentMissing { entity: op.entity, component: op.component }.into());
        }
        warn_if_managed(&self.registry, op.component, op.entity, "removed");
        let destination = self.categories.find_or_create_neighbor(
            mapping.category,
            op.component,
            false,
            &mut self.database,
            &self.registry,
        )?;
        self.migrate(op.entity, destination)?;
        Ok(())
    }

    // ── Filters and queries ────────────────────────────────────────────────

    /// Compiles a filter.
    ///
    /// ## Errors
    /// `EmptyInclusive`, `Contradiction`, or `UnknownComponent`.
    pub fn create_filter(&mut self, info: &FilterCreateInfo) -> DbResult<Filter> {
        for component in info.inclusive().iter().map(|(c, _)| *c).chain(info.exclusive().iter().copied()) {
            self.registry.require(component)?;
        }
        let compiled = CompiledFilter::compile(info)?;
        let filter = self.filters.insert(compiled);
        log::debug!("created filter {} over {:?}", filter.id(), info.inclusive());
        Ok(filter)
    }

    /// Destroys a filter. Its handle becomes invalid.
    pub fn destroy_filter(&mut self, filter: Filter) -> DbResult<()> {
        self.filters.remove(filter)?;
        log::debug!("destroyed filter {}", filter.id());
        Ok(())
    }

    /// Read/write sets of `filter`.
    pub fn filter_access(&self, filter: Filter) -> DbResult<AccessSets> {
        Ok(self.filters.access(filter)?)
    }

    /// Returns `true` if `a` and `b` may alias a writable column.
    pub fn filters_conflict(&self, a: Filter, b: Filter) -> DbResult<bool> {
        Ok(self.filters.access(a)?.conflicts_with(&self.filters.access(b)?))
    }

    /// Runs `filter` and returns one view per matching table.
    ///
    /// Views are in ascending table order and include empty tables.
    pub fn query(&self, filter: Filter) -> DbResult<Dataset> {
        let compiled = self.filters.get(filter)?;
        let mut views = Vec::new();
        for table_id in self.database.query(&compiled.inclusive, &compiled.exclusive) {
            let table = self.database.table(table_id)?;
            let category = self.categories.of_table(table_id).ok_or(TableError::UnknownTable(table_id))?;
            let buffers = compiled
                .projection
                .iter()
                .map(|&component| table.column_index(component).and_then(|index| table.raw_buffer(index)))
                .collect();
            views.push(TableView { table: table_id, category, rows: table.len(), epoch: table.epoch(), buffers });
        }
        Ok(Dataset {
            views,
            projection: compiled.projection.clone(),
            access: compiled.access.clone(),
            generation: self.dataset_generation,
        })
    }

    /// Validated accessor for view `index` of `dataset`.
    ///
    /// ## Errors
    /// `ReleasedDataset`, `ViewOutOfBounds`, or `StaleDataset`.
    pub fn view<'w>(&'w self, dataset: &'w Dataset, index: usize) -> DbResult<ViewAccess<'w>> {
        if dataset.generation != self.dataset_generation {
            return Err(QueryError::ReleasedDataset.into());
        }
        let view = dataset.views.get(index).ok_or(QueryError::ViewOutOfBounds(index))?;
        let table = self.database.table(view.table)?;
        Ok(ViewAccess::new(table, &self.registry, dataset, view)?)
    }

    /// Shared typed guard over projection `slot` of view `index`.
    pub fn column<'w, T: Pod>(&'w self, dataset: &'w Dataset, index: usize, slot: usize) -> DbResult<ColumnRef<'w, T>> {
        Ok(self.view(dataset, index)?.column(slot)?)
    }

    /// Exclusive typed guard over projection `slot` of view `index`.
    pub fn column_mut<'w, T: Pod>(&'w self, dataset: &'w Dataset, index: usize, slot: usize) -> DbResult<ColumnMut<'w, T>> {
        Ok(self.view(dataset, index)?.column_mut(slot)?)
    }

    /// Runs `f` once per view on the rayon pool.
    ///
    /// Views address distinct tables, so guards taken inside different calls
    /// never contend. Stops at the first error.
    pub fn par_for_each_view<F>(&self, dataset: &Dataset, f: F) -> DbResult<()>
    where
        F: Fn(ViewAccess<'_>) -> DbResult<()> + Send + Sync,
    {
        if dataset.generation != self.dataset_generation {
            return Err(QueryError::ReleasedDataset.into());
        }
        (0..dataset.len())
            .into_par_iter()
            .try_for_each(|index| f(self.view(dataset, index)?))
    }

    /// Invalidates every dataset produced so far.
    pub fn release_datasets(&mut self) {
        self.dataset_generation += 1;
    }
}

fn warn_if_managed(registry: &TypeRegistry, component: ComponentID, entity: Entity, action: &str) {
    if let Some(descriptor) = registry.descriptor(component) {
        if descriptor.flags.contains(ComponentFlags::MANAGED) {
            log::warn!("managed component `{}` of {entity} {action} without manager cleanup", descriptor.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::{CategoryError, DbError};

    #[test]
    fn failed_flush_keeps_unplaced_creations_queued() {
        let mut world = World::default();
        let hp = world.register_pod("Health", 100i32, ComponentFlags::NONE).unwrap();
        let first = world.create_entity(&EntityCreateInfo::components(&[hp])).unwrap();
        let orphan = world.entities.allocate().unwrap();
        world.alloc_queue.push(PendingInstance { entity: orphan, category: 999, template: None });
        let last = world.create_entity(&EntityCreateInfo::components(&[hp])).unwrap();

        assert_eq!(
            world.flush_instance_queues().unwrap_err(),
            DbError::Category(CategoryError::UnknownCategory(999))
        );
        assert!(world.is_active(first));
        assert_eq!(world.pending_instance_ops(), 2, "the failing entry and its tail stay queued");
        assert_eq!(world.entity_state(last), EntityState::Allocated);

        world.delete_entity(orphan, false).unwrap();
        let summary = world.flush_instance_queues().unwrap();
        assert_eq!(summary.placed, 1);
        assert!(world.is_active(last));
        assert_eq!(world.pending_instance_ops(), 0);
    }
}
