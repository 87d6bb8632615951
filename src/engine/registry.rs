//! # Type Registry
//!
//! Assigns stable `ComponentID` values to named component types and records
//! the layout facts storage needs: element size, alignment, default value,
//! and flags.
//!
//! ## Purpose
//! The registry decouples a component's *identity* (its name) from the raw
//! bytes tables store. Tables only ever see `(id, size, align, default)`.
//!
//! ## Design
//! - Ids are assigned sequentially in registration order.
//! - Registration is idempotent by name. Re-registering with a different
//!   size, alignment, or flags is an error.
//! - Components of size `0` are *flags*: they are part of a category's
//!   identity but own no column.
//! - Default values are owned copies and are released with the registry.
//! - Optional per-component inspectors render values for diagnostics.
//!
//! ## Invariants
//! - `descriptors[id].id == id` for every registered id.
//! - `descriptors[id].default.len() == descriptors[id].size`.
//!
//! ## Concurrency
//! The registry lives inside the world context and is mutated only through
//! `&mut`. There is no global instance.

use std::collections::HashMap;
use std::fmt;
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::engine::error::RegistryError;
use crate::engine::types::{ComponentID, COMPONENT_CAP};


/// Bitset of component flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ComponentFlags(pub u32);

impl ComponentFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Values are owned by an external manager that must be told when they
    /// disappear.
    pub const MANAGED: Self = Self(1 << 0);
    /// Values are scratch data that is not expected to persist across ticks.
    pub const TRANSIENT: Self = Self(1 << 1);

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ComponentFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

/// Formats the raw bytes of one component value.
pub type InspectFn = fn(&[u8], &mut fmt::Formatter<'_>) -> fmt::Result;

/// Registration request.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo<'a> {
    /// Unique component name.
    pub name: &'a str,
    /// Element size in bytes. `0` declares a flag.
    pub size: usize,
    /// Element alignment in bytes (power of two).
    pub align: usize,
    /// Default value, exactly `size` bytes.
    pub default: &'a [u8],
    /// Flags.
    pub flags: ComponentFlags,
}

/// Registered component metadata.
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    /// Assigned id.
    pub id: ComponentID,
    /// Unique component name.
    pub name: String,
    /// Element size in bytes.
    pub size: usize,
    /// Element alignment in bytes.
    pub align: usize,
    /// Owned copy of the default value.
    pub default: Box<[u8]>,
    /// Flags.
    pub flags: ComponentFlags,
    /// Optional value formatter.
    pub inspector: Option<InspectFn>,
}

impl TypeDescriptor {
    /// Returns `true` if this component owns no column.
    #[inline]
    pub fn is_flag(&self) -> bool { self.size == 0 }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id={}, size={}, align={})", self.name, self.id, self.size, self.align)
    }
}

/// Name-keyed registry of component types.
pub struct TypeRegistry {
    capacity: usize,
    by_name: HashMap<String, ComponentID>,
    descriptors: Vec<TypeDescriptor>,
}

impl Default for TypeRegistry {
    fn default() -> Self { Self::new(COMPONENT_CAP) }
}

impl TypeRegistry {
    /// Creates an empty registry holding at most `capacity` components.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.min(COMPONENT_CAP),
            by_name: HashMap::new(),
            descriptors: Vec::new(),
        }
    }

    /// Registers a component type and returns its id.
    ///
    /// ## Behavior
    /// - If `info.name` is already registered with the same layout and flags,
    ///   returns the existing id and ignores `info.default`.
    /// - Otherwise validates the layout, copies the default value, and
    ///   assigns the next id.
    ///
    /// ## Errors
    /// `SizeMismatch`, `AlignMismatch`, or `FlagsMismatch` on a conflicting
    /// re-registration; `DefaultValueSize`, `InvalidAlignment`, or
    /// `CapacityExceeded` for a new one.

    pub fn register(&mut self, info: ComponentInfo<'_>) -> Result<ComponentID, RegistryError> {
        if let Some(&existing) = self.by_name.get(info.name) {
            let descriptor = &self.descriptors[existing as usize];
            if descriptor.size != info.size {
                return Err(RegistryError::SizeMismatch {
                    name: info.name.to_owned(),
                    registered: descriptor.size,
                    requested: info.size,
                });
            }
            if descriptor.align != info.align.max(1) {
                return Err(RegistryError::AlignMismatch {
                    name: info.name.to_owned(),
                    registered: descriptor.align,
                    requested: info.align,
                });
            }
            if descriptor.flags != info.flags {
                return Err(RegistryError::FlagsMismatch {
                    name: info.name.to_owned(),
                    registered: descriptor.flags.0,
                    requested: info.flags.0,
                });
            }
            return Ok(existing);
        }

        let align = info.align.max(1);
        if !align.is_power_of_two() {
            return Err(RegistryError::InvalidAlignment { name: info.name.to_owned(), align: info.align });
        }
        if info.default.len() != info.size {
            return Err(RegistryError::DefaultValueSize {
                name: info.name.to_owned(),
                expected: info.size,
                actual: info.default.len(),
            });
        }
        if self.descriptors.len() >= self.capacity {
            return Err(RegistryError::CapacityExceeded { cap: self.capacity });
        }

        let id = self.descriptors.len() as ComponentID;
        self.by_name.insert(info.name.to_owned(), id);
        self.descriptors.push(TypeDescriptor {
            id,
            name: info.name.to_owned(),
            size: info.size,
            align,
            default: info.default.into(),
            flags: info.flags,
            inspector: None,
        });
        log::debug!("registered component {}", self.descriptors[id as usize]);
        Ok(id)
    }

    /// Registers a plain-old-data component with a typed default.
    pub fn register_pod<T: Pod>(
        &mut self,
        name: &str,
        default: T,
        flags: ComponentFlags,
    ) -> Result<ComponentID, RegistryError> {
        self.register(ComponentInfo {
            name,
            size: size_of::<T>(),
            align: align_of::<T>(),
            default: bytemuck::bytes_of(&default),
            flags,
        })
    }

    /// Registers a zero-sized flag component.
    pub fn register_flag(&mut self, name: &str, flags: ComponentFlags) -> Result<ComponentID, RegistryError> {
        self.register(ComponentInfo { name, size: 0, align: 1, default: &[], flags })
    }

    /// Installs a value formatter used by entity inspection.
    pub fn set_inspector(&mut self, id: ComponentID, inspector: InspectFn) -> Result<(), RegistryError> {
        let descriptor = self
            .descriptors
            .get_mut(id as usize)
            .ok_or(RegistryError::UnknownComponent(id))?;
        descriptor.inspector = Some(inspector);
        Ok(())
    }

    /// Looks a component up by name.
    #[inline]
    pub fn id_of(&self, name: &str) -> Option<ComponentID> {
        self.by_name.get(name).copied()
    }

    /// Returns the descriptor for `id`.
    #[inline]
    pub fn descriptor(&self, id: ComponentID) -> Option<&TypeDescriptor> {
        self.descriptors.get(id as usize)
    }

    /// Returns the descriptor for `id` or `UnknownComponent`.
    #[inline]
    pub fn require(&self, id: ComponentID) -> Result<&TypeDescriptor, RegistryError> {
        self.descriptor(id).ok_or(RegistryError::UnknownComponent(id))
    }

    /// Element size of `id`.
    #[inline]
    pub fn size(&self, id: ComponentID) -> Option<usize> {
        self.descriptor(id).map(|d| d.size)
    }

    /// Element alignment of `id`.
    #[inline]
    pub fn align(&self, id: ComponentID) -> Option<usize> {
        self.descriptor(id).map(|d| d.align)
    }

    /// Default value bytes of `id`.
    #[inline]
    pub fn default_value(&self, id: ComponentID) -> Option<&[u8]> {
        self.descriptor(id).map(|d| &*d.default)
    }

    /// Name of `id`.
    #[inline]
    pub fn name(&self, id: ComponentID) -> Option<&str> {
        self.descriptor(id).map(|d| d.name.as_str())
    }

    /// Returns `true` if `id` is a registered flag.
    #[inline]
    pub fn is_flag(&self, id: ComponentID) -> bool {
        self.descriptor(id).is_some_and(TypeDescriptor::is_flag)
    }

    /// Number of registered components.
    #[inline]
    pub fn len(&self) -> usize { self.descriptors.len() }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool { self.descriptors.is_empty() }

    /// Iterates all descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter()
    }
}

/// Renders one value with its inspector, or as hex when none is installed.
pub(crate) struct InspectValue<'a> {
    pub(crate) descriptor: &'a TypeDescriptor,
    pub(crate) bytes: &'a [u8],
}

impl fmt::Display for InspectValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.descriptor.inspector {
            Some(inspect) => inspect(self.bytes, f),
            None if self.descriptor.is_flag() => f.write_str("<flag>"),
            None => {
                f.write_str("0x")?;
                for byte in self.bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}
