//! # Blueprints and Templates
//!
//! A **blueprint** is a named component set whose category is resolved once
//! at registration, so creating an entity from it never hashes.
//! A **template** is a blueprint plus initial values for some of its
//! components; values not named by the template keep their registered
//! defaults.
//!
//! Entity creation names its source through [`EntityCreateInfo`].

use std::collections::HashMap;

use crate::engine::error::EntityError;
use crate::engine::types::{CategoryID, ComponentID};


/// Identifier of a registered blueprint.
pub type BlueprintID = u32;
/// Identifier of a registered template.
pub type TemplateID = u32;

/// Named component set with a pre-resolved category.
#[derive(Clone, Debug)]
pub struct Blueprint {
    /// Blueprint id.
    pub id: BlueprintID,
    /// Unique name.
    pub name: String,
    /// Sorted member components.
    pub components: Vec<ComponentID>,
    /// Category every entity created from this blueprint starts in.
    pub category: CategoryID,
}

/// Blueprint plus initial component values.
#[derive(Clone, Debug)]
pub struct Template {
    /// Template id.
    pub id: TemplateID,
    /// Unique name.
    pub name: String,
    /// Blueprint the template refines.
    pub blueprint: BlueprintID,
    /// Initial values, one element each, validated against the registry.
    pub values: Vec<(ComponentID, Box<[u8]>)>,
}

/// What a new entity is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntitySource {
    /// All components at their defaults.
    Blueprint(BlueprintID),
    /// Blueprint components with the template's values applied.
    Template(TemplateID),
    /// An ad-hoc component set at defaults.
    Components(Vec<ComponentID>),
}

/// Parameters of [`World::create_entity`](crate::engine::world::World::create_entity).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityCreateInfo {
    /// Source of the initial component set.
    pub source: EntitySource,
    /// Place the row now instead of queueing it.
    pub immediate: bool,
}

impl EntityCreateInfo {
    /// Creation from a blueprint, deferred by default.
    pub fn blueprint(id: BlueprintID) -> Self {
        Self { source: EntitySource::Blueprint(id), immediate: false }
    }

    /// Creation from a template, deferred by default.
    pub fn template(id: TemplateID) -> Self {
        Self { source: EntitySource::Template(id), immediate: false }
    }

    /// Creation from an explicit component list, deferred by default.
    pub fn components(components: &[ComponentID]) -> Self {
        Self { source: EntitySource::Components(components.to_vec()), immediate: false }
    }

    /// Sets [`immediate`](Self::immediate).
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

/// Name-indexed storage of blueprints and templates.
#[derive(Debug, Default)]
pub struct BlueprintRegistry {
    blueprints: Vec<Blueprint>,
    templates: Vec<Template>,
    blueprint_names: HashMap<String, BlueprintID>,
    template_names: HashMap<String, TemplateID>,
}

impl BlueprintRegistry {
    /// Stores a blueprint whose category is already resolved.
    pub(crate) fn insert_blueprint(
        &mut self,
        name: &str,
        mut components: Vec<ComponentID>,
        category: CategoryID,
    ) -> Result<BlueprintID, EntityError> {
        if self.blueprint_names.contains_key(name) {
            return Err(EntityError::DuplicateName { kind: "blueprint", name: name.to_owned() });
        }
        components.sort_unstable();
        components.dedup();
        let id = self.blueprints.len() as BlueprintID;
        self.blueprints.push(Blueprint { id, name: name.to_owned(), components, category });
        self.blueprint_names.insert(name.to_owned(), id);
        log::debug!("registered blueprint {id} `{name}` -> category {category}");
        Ok(id)
    }

    /// Stores a template whose values were validated by the caller.
    pub(crate) fn insert_template(
        &mut self,
        name: &str,
        blueprint: BlueprintID,
        values: Vec<(ComponentID, Box<[u8]>)>,
    ) -> Result<TemplateID, EntityError> {
        self.blueprint(blueprint)?;
        if self.template_names.contains_key(name) {
            return Err(EntityError::DuplicateName { kind: "template", name: name.to_owned() });
        }
        let id = self.templates.len() as TemplateID;
        self.templates.push(Template { id, name: name.to_owned(), blueprint, values });
        self.template_names.insert(name.to_owned(), id);
        log::debug!("registered template {id} `{name}` on blueprint {blueprint}");
        Ok(id)
    }

    /// Blueprint `id`.
    pub fn blueprint(&self, id: BlueprintID) -> Result<&Blueprint, EntityError> {
        self.blueprints
            .get(id as usize)
            .ok_or(EntityError::UnknownSource { kind: "blueprint", id })
    }

    /// Template `id`.
    pub fn template(&self, id: TemplateID) -> Result<&Template, EntityError> {
        self.templates
            .get(id as usize)
            .ok_or(EntityError::UnknownSource { kind: "template", id })
    }

    /// Blueprint id by name.
    pub fn blueprint_id(&self, name: &str) -> Option<BlueprintID> {
        self.blueprint_names.get(name).copied()
    }

    /// Template id by name.
    pub fn template_id(&self, name: &str) -> Option<TemplateID> {
        self.template_names.get(name).copied()
    }
}
