//! Identifiers, capacities, and component-set bitsets.
//!
//! Every layer shares the small numeric ids below. Component sets (table
//! schemas, filter inclusive/exclusive sets, access sets) are [`Signature`]
//! bitsets, so matching a table against a filter is
//!
//! ```text
//! (table & inclusive) == inclusive  &&  (table & exclusive) == 0
//! ```
//!
//! evaluated one `u64` word at a time.

/// Unique identifier for a registered component type.
pub type ComponentID = u16;
/// Identifier of a table in the database.
pub type TableID = u16;
/// Identifier of a category (one category owns exactly one table).
pub type CategoryID = u16;
/// Row index within a table.
pub type RowID = u32;
/// Slot index within the entity pool.
pub type IndexID = u32;
/// Generation counter used to detect stale entity handles.
pub type Generation = u32;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 1024;
/// Maximum number of tables (and therefore categories).
pub const TABLE_CAP: usize = TableID::MAX as usize;

const WORD_BITS: usize = u64::BITS as usize;
const SIGNATURE_WORDS: usize = COMPONENT_CAP.div_ceil(WORD_BITS);

/// Fixed-width bitset over component ids.
///
/// Table schemas, filter sets, and access sets are all signatures, so every
/// set test is a word-wise AND over `COMPONENT_CAP` bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    words: [u64; SIGNATURE_WORDS],
}

impl Default for Signature {
    fn default() -> Self { Self { words: [0; SIGNATURE_WORDS] } }
}

impl Signature {
    /// Adds `component`.
    ///
    /// # Panics
    /// If `component` is not below `COMPONENT_CAP`. Registered ids always are.
    #[inline]
    pub fn insert(&mut self, component: ComponentID) {
        let (word, mask) = locate(component);
        self.words[word] |= mask;
    }

    /// Removes `component`.
    #[inline]
    pub fn remove(&mut self, component: ComponentID) {
        let (word, mask) = locate(component);
        if let Some(bits) = self.words.get_mut(word) {
            *bits &= !mask;
        }
    }

    /// Returns `true` if `component` is in the set. Ids past
    /// `COMPONENT_CAP` are never members.
    #[inline]
    pub fn contains(&self, component: ComponentID) -> bool {
        let (word, mask) = locate(component);
        self.words.get(word).is_some_and(|bits| bits & mask != 0)
    }

    /// Returns `true` if every member of `other` is also in `self`.
    #[inline]
    pub fn is_superset_of(&self, other: &Signature) -> bool {
        self.words.iter().zip(&other.words).all(|(a, b)| a & b == *b)
    }

    /// Returns `true` if the two sets share at least one member.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// Table predicate: all of `inclusive`, none of `exclusive`.
    #[inline]
    pub fn matches(&self, inclusive: &Signature, exclusive: &Signature) -> bool {
        self.is_superset_of(inclusive) && !self.intersects(exclusive)
    }

    /// Returns `true` if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Members in ascending id order.
    pub fn iter(&self) -> SignatureIter<'_> {
        SignatureIter { words: &self.words, index: 0, current: self.words[0] }
    }
}

impl FromIterator<ComponentID> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentID>>(iter: I) -> Self {
        let mut signature = Signature::default();
        iter.into_iter().for_each(|component| signature.insert(component));
        signature
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the members of a [`Signature`].
pub struct SignatureIter<'a> {
    words: &'a [u64; SIGNATURE_WORDS],
    index: usize,
    current: u64,
}

impl Iterator for SignatureIter<'_> {
    type Item = ComponentID;

    fn next(&mut self) -> Option<ComponentID> {
        while self.current == 0 {
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some((self.index * WORD_BITS + bit) as ComponentID)
    }
}

#[inline]
fn locate(component: ComponentID) -> (usize, u64) {
    let id = component as usize;
    (id / WORD_BITS, 1u64 << (id % WORD_BITS))
}

/// Signature of a component list. Duplicates collapse.
pub fn build_signature(components: &[ComponentID]) -> Signature {
    components.iter().copied().collect()
}

/// How a filter touches a projected component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Shared read.
    Read,
    /// Exclusive write.
    Write,
}

/// Components a filter reads and components it writes.
///
/// A component that is both read and written is kept in `write` only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessSets {
    /// Read-only components.
    pub read: Signature,
    /// Written components.
    pub write: Signature,
}

impl AccessSets {
    /// Records `component` under `mode`. Write dominates read.
    pub fn insert(&mut self, component: ComponentID, mode: AccessMode) {
        match mode {
            AccessMode::Read if !self.write.contains(component) => self.read.insert(component),
            AccessMode::Read => {}
            AccessMode::Write => {
                self.read.remove(component);
                self.write.insert(component);
            }
        }
    }

    /// Returns `true` if one side writes a component the other reads or
    /// writes. Shared reads never conflict.
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }
}
