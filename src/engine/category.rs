//! # Category Layer
//!
//! A *category* is the identity of one exact component set. Every category
//! owns exactly one table whose schema is that set.
//!
//! ## Hashing
//!
//! Categories are found through a [`CategoryHash`]: the XOR of a 64-bit mix
//! of each member id. XOR makes the hash independent of insertion order and
//! lets a single component be added or removed in O(1), which is how op
//! dispatch derives the destination category of an add or remove without
//! rebuilding the set.
//!
//! ## Bijection
//!
//! A 64-bit hash is not a proof of identity. Every hash hit is checked
//! against the owning table's schema; a mismatch is reported as
//! [`CategoryError::HashCollision`] instead of silently merging two sets.
//!
//! ## Naming
//!
//! Categories carry a display name for diagnostics: `"A + B"` when created
//! from a set, `"<parent> + X"` / `"<parent> - X"` when derived by an op.

use std::collections::HashMap;
use std::fmt;

use crate::engine::database::Database;
use crate::engine::error::{CategoryError, DbResult, TableError};
use crate::engine::registry::TypeRegistry;
use crate::engine::types::{build_signature, CategoryID, ComponentID, Signature, TableID, TABLE_CAP};


/// Order-independent, incrementally updatable hash of a component set.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryHash(pub u64);

impl CategoryHash {
    /// Hash of the empty set.
    pub const EMPTY: Self = Self(0);

    /// Hash of a component set. Duplicates are ignored.
    pub fn from_components(components: &[ComponentID]) -> Self {
        let mut sorted = components.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.into_iter().fold(Self::EMPTY, Self::add)
    }

    /// Hash of the set with `component` added. Caller ensures it was absent.
    #[inline]
    #[must_use]
    pub fn add(self, component: ComponentID) -> Self {
        Self(self.0 ^ mix(component))
    }

    /// Hash of the set with `component` removed. Caller ensures it was present.
    #[inline]
    #[must_use]
    pub fn remove(self, component: ComponentID) -> Self {
        Self(self.0 ^ mix(component))
    }
}

impl fmt::Debug for CategoryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryHash({:#018x})", self.0)
    }
}

impl fmt::Display for CategoryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

// splitmix64 finalizer over a golden-ratio offset, so id 0 does not hash to 0.
#[inline]
fn mix(component: ComponentID) -> u64 {
    let mut z = (component as u64).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// One category: a hash, the table holding its rows, and a display name.
#[derive(Clone, Debug)]
pub struct Category {
    /// Category id.
    pub id: CategoryID,
    /// Hash of the component set.
    pub hash: CategoryHash,
    /// Table holding the rows.
    pub table: TableID,
    /// Diagnostic name.
    pub name: String,
}

/// Hash-indexed set of categories.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    by_hash: HashMap<CategoryHash, CategoryID>,
    by_table: HashMap<TableID, CategoryID>,
    categories: Vec<Category>,
}

impl CategoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self { Self::default() }

    /// Returns `true` if a category with `hash` exists.
    #[inline]
    pub fn exists(&self, hash: CategoryHash) -> bool {
        self.by_hash.contains_key(&hash)
    }

    /// Category id for `hash`.
    #[inline]
    pub fn id_of(&self, hash: CategoryHash) -> Option<CategoryID> {
        self.by_hash.get(&hash).copied()
    }

    /// Category `id`.
    #[inline]
    pub fn get(&self, id: CategoryID) -> Result<&Category, CategoryError> {
        self.categories.get(id as usize).ok_or(CategoryError::UnknownCategory(id))
    }

    /// Category owning `table`.
    #[inline]
    pub fn of_table(&self, table: TableID) -> Option<CategoryID> {
        self.by_table.get(&table).copied()
    }

    /// Number of categories.
    #[inline]
    pub fn len(&self) -> usize { self.categories.len() }

    /// Returns `true` if no category exists.
    #[inline]
    pub fn is_empty(&self) -> bool { self.categories.is_empty() }

    /// All categories in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Resolves the category for exactly `components`, creating it (and its
    /// table) on a miss.
    ///
    /// ## Errors
    /// - `UnknownComponent` for an id the registry does not know.
    /// - `HashCollision` if the hash is owned by a different set.
    /// - Table creation failures (too many tables).

    pub fn find_or_create(
        &mut self,
        components: &[ComponentID],
        database: &mut Database,
        registry: &TypeRegistry,
    ) -> DbResult<CategoryID> {
        for &component in components {
            registry.require(component)?;
        }
        let mut sorted = components.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let hash = sorted.iter().copied().fold(CategoryHash::EMPTY, CategoryHash::add);
        let signature = build_signature(&sorted);

        if let Some(id) = self.verified(hash, &signature, database)? {
            return Ok(id);
        }
        let name = display_name(&sorted, registry);
        self.create(hash, &sorted, name, database, registry)
    }

    /// Resolves the category reached from `parent` by adding (`adding ==
    /// true`) or removing `component`, creating it on a miss.
    ///
    /// The destination hash is derived incrementally from the parent's.

    pub fn find_or_create_neighbor(
        &mut self,
        parent: CategoryID,
        component: ComponentID,
        adding: bool,
        database: &mut Database,
        registry: &TypeRegistry,
    ) -> DbResult<CategoryID> {
        let component_name = registry.require(component)?.name.as_str();
        let parent_category = self.get(parent)?;
        let parent_table = database.table(parent_category.table)?;
        let mut signature = *parent_table.signature();
        let hash = if adding {
            signature.insert(component);
            parent_category.hash.add(component)
        } else {
            signature.remove(component);
            parent_category.hash.remove(component)
        };

        if let Some(id) = self.verified(hash, &signature, database)? {
            return Ok(id);
        }

        let components: Vec<ComponentID> = signature.iter().collect();
        let name = format!("{} {} {}", parent_category.name, if adding { '+' } else { '-' }, component_name);
        self.create(hash, &components, name, database, registry)
    }

    fn verified(
        &self,
        hash: CategoryHash,
        signature: &Signature,
        database: &Database,
    ) -> DbResult<Option<CategoryID>> {
        let Some(id) = self.id_of(hash) else { return Ok(None) };
        let table = database.table(self.categories[id as usize].table)?;
        if table.signature() != signature {
            return Err(CategoryError::HashCollision { hash: hash.0, existing: id }.into());
        }
        Ok(Some(id))
    }

    fn create(
        &mut self,
        hash: CategoryHash,
        components: &[ComponentID],
        name: String,
        database: &mut Database,
        registry: &TypeRegistry,
    ) -> DbResult<CategoryID> {
        if self.categories.len() >= TABLE_CAP {
            return Err(TableError::TooManyTables(TABLE_CAP).into());
        }
        let table = database.create_table(components, registry)?;
        let id = self.categories.len() as CategoryID;
        log::debug!("created category {id} `{name}` ({hash}) on table {table}");
        self.categories.push(Category { id, hash, table, name });
        self.by_hash.insert(hash, id);
        self.by_table.insert(table, id);
        Ok(id)
    }
}

fn display_name(sorted: &[ComponentID], registry: &TypeRegistry) -> String {
    if sorted.is_empty() {
        return "<empty>".to_owned();
    }
    sorted
        .iter()
        .map(|&id| registry.name(id).unwrap_or("?"))
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_ignores_order_and_duplicates() {
        let forward = CategoryHash::from_components(&[1, 4, 9]);
        let shuffled = CategoryHash::from_components(&[9, 1, 4, 4]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn incremental_add_then_remove_restores_hash() {
        let base = CategoryHash::from_components(&[2, 3]);
        let grown = base.add(7);
        assert_eq!(grown, CategoryHash::from_components(&[2, 3, 7]));
        assert_eq!(grown.remove(7), base);
    }

    #[test]
    fn single_component_zero_differs_from_empty_set() {
        assert_ne!(CategoryHash::from_components(&[0]), CategoryHash::EMPTY);
    }
}
